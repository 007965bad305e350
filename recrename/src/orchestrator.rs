//! Per-recording rename pipeline.
//!
//! ```text
//! CheckInput -> Extract -> ResolveService -> MatchProgram -> [VerifyTime]
//!   -> BuildMacros -> BuildPath -> [CheckDuplicate | Disambiguate]
//!   -> [VerifyDrop] -> MakeDirectories -> Move
//! ```
//!
//! A recoverable failure before `MakeDirectories` switches to the error
//! templates when they are configured.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use log::{debug, info, warn};
use recrename_guide::GuideService;

use crate::clock::{measure_duration, measure_start, verify_timing};
use crate::config::{DuplicatePolicy, Options, RunOptions};
use crate::continuity::check_drops;
use crate::correlator::extract_identity;
use crate::error::{FailureCategory, RenameError, Result};
use crate::fs_ops;
use crate::macros::MacroSet;
use crate::matcher::{MatchRequest, ProgramMatcher};
use crate::normalize::{normalize_event_name, strip_decorations, to_half};

/// Result of one successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOutcome {
    /// Where the input went, or would go on a dry run.
    pub target: PathBuf,
    /// Set when the input was routed through the error templates.
    pub failure: Option<FailureCategory>,
    pub moved: bool,
}

/// Runs the pipeline for one input at a time.
pub struct Renamer<'a, G: GuideService + ?Sized> {
    options: &'a Options,
    guide: &'a G,
}

impl<'a, G: GuideService + ?Sized> Renamer<'a, G> {
    pub fn new(options: &'a Options, guide: &'a G) -> Self {
        Self { options, guide }
    }

    /// Identify, verify and move `input`.
    pub async fn run(
        &self,
        input: &Path,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<RenameOutcome> {
        let size = check_input(input).await?;
        let original = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (target, failure) = match self.plan(input, size, &original, progress).await {
            Ok(target) => (target, None),
            Err(e) => {
                let Some(category) = e.category().filter(|_| self.options.has_error_output()) else {
                    return Err(e);
                };
                warn!("{}: {}", input.display(), e);

                let macros = MacroSet::for_error(&original, category);
                let target = self.build_target(
                    input,
                    &original,
                    &macros,
                    self.options.error_dir.as_deref().unwrap_or_default(),
                    self.options.error_file.as_deref().unwrap_or_default(),
                );
                (disambiguate(target).await, Some(category))
            }
        };

        if self.options.dry_run {
            info!("Dry run: {} -> {}", input.display(), target.display());
            return Ok(RenameOutcome {
                target,
                failure,
                moved: false,
            });
        }

        if let Some(dir) = target.parent() {
            fs_ops::make_directories(dir)
                .await
                .map_err(|source| RenameError::MakeDirectories {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }
        fs_ops::move_file(input, &target)
            .await
            .map_err(|source| RenameError::Move {
                from: input.to_path_buf(),
                to: target.clone(),
                source,
            })?;
        info!("Renamed {} -> {}", input.display(), target.display());

        Ok(RenameOutcome {
            target,
            failure,
            moved: true,
        })
    }

    /// Every step up to the final target path; errors here are recoverable.
    async fn plan(
        &self,
        input: &Path,
        size: u64,
        original: &str,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<PathBuf> {
        let options = self.options;
        if size == 0 {
            return Err(RenameError::InputEmpty(input.to_path_buf()));
        }
        let extension = input.extension().and_then(OsStr::to_str).unwrap_or_default();
        if !options.accepts_extension(extension) {
            return Err(RenameError::ExtensionNotAllowed(extension.to_string()));
        }

        debug!("Extract information from {}", input.display());
        let identity = extract_identity(input, size, options.format).await?;

        let service = options.find_service(&identity.service_name);
        match service {
            Some(entry) => debug!("Service {:?} matched {:?}", identity.service_name, entry.name),
            None if options.check_service => {
                return Err(RenameError::ServiceNotRecognized(identity.service_name));
            }
            None => debug!("Service {:?} is not in the channel table", identity.service_name),
        }

        let keywords = options.matching_keywords(&strip_decorations(&to_half(&identity.event_name)));
        let replacements = options.replacements_with(&keywords);
        let event_name = normalize_event_name(&identity.event_name, &replacements);

        let overrides = service
            .map(|s| &s.overrides)
            .into_iter()
            .chain(keywords.iter().map(|k| &k.overrides));
        let run = RunOptions::fold(options, overrides);
        debug!("Run options: {:?}", run);

        let request = MatchRequest {
            event_name,
            start_time: identity.start_time,
            duration: identity.duration,
            channel_id: service.and_then(|s| s.channel_id),
        };
        let program = ProgramMatcher::new(self.guide, options.retry)
            .find_program(&request)
            .await?;

        if run.check_time {
            let start = measure_start(input, size, options.format).await?;
            let duration = measure_duration(input, size, options.format).await?;
            verify_timing(start, duration, &program, run.start_offset, run.duration_offset)?;
        }

        let macros = MacroSet::for_program(
            &program,
            original,
            service.and_then(|s| s.channel_name.as_deref()),
        );
        let target = self.build_target(input, original, &macros, &options.dir, &options.file);

        let target = match run.duplicate {
            DuplicatePolicy::Strict if fs_ops::exists(&target).await => {
                return Err(RenameError::TargetExists(target));
            }
            DuplicatePolicy::Strict => target,
            DuplicatePolicy::Disambiguate => disambiguate(target).await,
        };

        if run.check_drop {
            check_drops(input, size, options.format, progress).await?;
        }

        Ok(target)
    }

    fn build_target(
        &self,
        input: &Path,
        original: &str,
        macros: &MacroSet,
        dir_template: &str,
        file_template: &str,
    ) -> PathBuf {
        let parent = self
            .options
            .parent
            .clone()
            .or_else(|| input.parent().map(Path::to_path_buf))
            .unwrap_or_default();

        let dir = confined(macros.resolve(dir_template).trim());
        let file = confined(macros.resolve(file_template).trim());

        let mut name = if file.as_os_str().is_empty() {
            PathBuf::from(original).into_os_string()
        } else {
            file.into_os_string()
        };
        if let Some(extension) = input.extension() {
            name.push(".");
            name.push(extension);
        }

        parent.join(dir).join(name)
    }
}

/// `relative` reduced to its normal components, so it stays below the
/// directory it is joined to.
fn confined(relative: &str) -> PathBuf {
    let path = Path::new(relative);
    let kept: PathBuf = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    if path.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
        warn!("Dropped parent or root components from {:?}", relative);
    }
    kept
}

/// Fatal input checks. Returns the file size.
async fn check_input(input: &Path) -> Result<u64> {
    let metadata = tokio::fs::metadata(input)
        .await
        .map_err(|_| RenameError::InputMissing(input.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(RenameError::InputNotFile(input.to_path_buf()));
    }
    Ok(metadata.len())
}

/// `target`, or `target` with `_<hex>` appended to its stem if it exists.
pub async fn disambiguate(target: PathBuf) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut candidate = target.clone();
    while fs_ops::exists(&candidate).await {
        let suffix: u32 = rand::random();
        candidate = target.with_file_name(format!("{}_{:08x}{}", stem, suffix, extension));
    }
    if candidate != target {
        info!("{} exists, using {}", target.display(), candidate.display());
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeywordEntry, Overrides, ServiceEntry};
    use crate::matcher::tests::{candidate, jst, FakeGuide};
    use crate::matcher::RetryPolicy;
    use crate::scan::tests::{payload_packet, section_packets};
    use recrename_ts::{crc32_mpeg2, descriptor_tag, pid, table_id};
    use std::io::Write;
    use std::time::Duration;

    const ONID: u16 = 0x7FE0;
    const TSID: u16 = 0x7FE1;
    const SID: u16 = 0x0400;

    fn long_section(table: u8, extension: u16, body: &[u8]) -> Vec<u8> {
        let section_length = 5 + body.len() + 4;
        let mut section = vec![
            table,
            0xB0 | ((section_length >> 8) as u8 & 0x0F),
            section_length as u8,
            (extension >> 8) as u8,
            extension as u8,
            0xC1,
            0x00,
            0x00,
        ];
        section.extend_from_slice(body);
        let crc = crc32_mpeg2(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        section
    }

    fn pat() -> Vec<u8> {
        let mut body = SID.to_be_bytes().to_vec();
        body.extend_from_slice(&[0xE1, 0xF0]);
        long_section(table_id::PAT, TSID, &body)
    }

    fn sdt(name: &[u8]) -> Vec<u8> {
        let descriptor_length = 2 + 3 + name.len();
        let mut body = ONID.to_be_bytes().to_vec();
        body.push(0xFF);
        body.extend_from_slice(&SID.to_be_bytes());
        body.push(0xFD);
        body.push(0x80);
        body.push(descriptor_length as u8);
        body.extend_from_slice(&[descriptor_tag::SERVICE, (3 + name.len()) as u8, 0x01, 0x00]);
        body.push(name.len() as u8);
        body.extend_from_slice(name);
        long_section(table_id::SDT_ACTUAL, TSID, &body)
    }

    /// Present event starting 2024-04-05 01:00 JST, 30 minutes.
    fn eit(name: &[u8]) -> Vec<u8> {
        let mut descriptor = vec![descriptor_tag::SHORT_EVENT, (5 + name.len()) as u8];
        descriptor.extend_from_slice(b"jpn");
        descriptor.push(name.len() as u8);
        descriptor.extend_from_slice(name);
        descriptor.push(0);

        let mut body = TSID.to_be_bytes().to_vec();
        body.extend_from_slice(&ONID.to_be_bytes());
        body.extend_from_slice(&[0x01, table_id::EIT_PF_ACTUAL]);
        body.extend_from_slice(&[0x12, 0x34]);
        body.extend_from_slice(&[0xEB, 0xF5, 0x01, 0x00, 0x00]);
        body.extend_from_slice(&[0x00, 0x30, 0x00]);
        body.push(0x80 | ((descriptor.len() >> 8) as u8 & 0x0F));
        body.push(descriptor.len() as u8);
        body.extend_from_slice(&descriptor);
        long_section(table_id::EIT_PF_ACTUAL, SID, &body)
    }

    /// "ＮＨＫ" broadcasting "Ｔａｎｔｅｉ　＃３", tables in the second half.
    fn recording(dir: &Path, name: &str) -> PathBuf {
        let mut packets: Vec<_> = (0..8u8).map(|cc| payload_packet(0x100, cc)).collect();
        packets.extend(section_packets(pid::PAT, &pat(), 0));
        packets.extend(section_packets(pid::SDT, &sdt(b"\x0ENHK"), 0));
        packets.extend(section_packets(pid::EIT, &eit(b"\x0ETantei #3"), 0));

        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for packet in &packets {
            file.write_all(packet).unwrap();
        }
        path
    }

    fn guide() -> FakeGuide {
        FakeGuide::with_programs(vec![
            candidate(10, 3, "Tantei", jst(1, 0)),
            candidate(11, 4, "Other", jst(1, 0)),
        ])
    }

    fn options(parent: &Path) -> Options {
        Options {
            parent: Some(parent.to_path_buf()),
            dir: "${title}".to_string(),
            file: "${title}([ #${count2}])".to_string(),
            retry: RetryPolicy {
                attempts: 1,
                delay: Duration::ZERO,
            },
            ..Default::default()
        }
    }

    fn no_progress() -> impl FnMut(u64, u64) {
        |_, _| {}
    }

    #[tokio::test]
    async fn test_rename_recording() {
        let dir = tempfile::tempdir().unwrap();
        let input = recording(dir.path(), "rec.ts");
        let out = dir.path().join("out");
        let guide = guide();
        let opts = options(&out);

        let outcome = Renamer::new(&opts, &guide)
            .run(&input, &mut no_progress())
            .await
            .unwrap();

        let expected = out.join("Tantei").join("Tantei #03.ts");
        assert_eq!(outcome.target, expected);
        assert_eq!(outcome.failure, None);
        assert!(outcome.moved);
        assert!(expected.is_file());
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn test_channel_table_filters_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let input = recording(dir.path(), "rec.ts");
        let guide = FakeGuide::with_programs(vec![
            candidate(10, 3, "Tantei", jst(1, 0)),
            candidate(12, 7, "Tantei", jst(1, 0)),
        ]);
        let mut opts = options(dir.path());
        opts.file = "${title}_${channelName}_${userChannelName}".to_string();
        opts.dir = String::new();
        opts.dry_run = true;
        opts.services = vec![ServiceEntry {
            name: "NHK".to_string(),
            channel_id: Some(7),
            channel_name: Some("NHK G".to_string()),
            overrides: Overrides::default(),
        }];

        let outcome = Renamer::new(&opts, &guide)
            .run(&input, &mut no_progress())
            .await
            .unwrap();
        assert_eq!(outcome.target, dir.path().join("Tantei_ch7_NHK G.ts"));
        assert!(!outcome.moved);
        assert!(input.exists());
    }

    #[tokio::test]
    async fn test_strict_duplicate_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = recording(dir.path(), "rec.ts");
        let guide = guide();
        let mut opts = options(dir.path());
        opts.duplicate = DuplicatePolicy::Strict;

        let existing = dir.path().join("Tantei").join("Tantei #03.ts");
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, b"old").unwrap();

        let err = Renamer::new(&opts, &guide)
            .run(&input, &mut no_progress())
            .await
            .unwrap_err();
        assert!(matches!(err, RenameError::TargetExists(path) if path == existing));
        assert!(input.exists());
    }

    #[tokio::test]
    async fn test_keyword_can_relax_strict_mode() {
        let dir = tempfile::tempdir().unwrap();
        let input = recording(dir.path(), "rec.ts");
        let guide = guide();
        let mut opts = options(dir.path());
        opts.duplicate = DuplicatePolicy::Strict;
        opts.keywords = vec![KeywordEntry {
            name: "Tantei".to_string(),
            replace: None,
            overrides: Overrides {
                strict_duplicate: Some(false),
                ..Default::default()
            },
        }];

        let existing = dir.path().join("Tantei").join("Tantei #03.ts");
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, b"old").unwrap();

        let outcome = Renamer::new(&opts, &guide)
            .run(&input, &mut no_progress())
            .await
            .unwrap();
        assert_ne!(outcome.target, existing);
        assert_eq!(std::fs::read(&existing).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_disambiguate_never_collides() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("Tantei #03.ts");
        assert_eq!(disambiguate(target.clone()).await, target);

        std::fs::write(&target, b"old").unwrap();
        let first = disambiguate(target.clone()).await;
        assert_ne!(first, target);
        assert!(!first.exists());
        std::fs::write(&first, b"new").unwrap();

        let second = disambiguate(target.clone()).await;
        assert!(second != target && second != first);
        let name = second.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("Tantei #03_") && name.ends_with(".ts"));
    }

    #[tokio::test]
    async fn test_error_path() {
        let dir = tempfile::tempdir().unwrap();
        let input = recording(dir.path(), "rec.ts");
        let guide = FakeGuide::with_programs(Vec::new());
        let mut opts = options(dir.path());
        opts.error_dir = Some("error".to_string());
        opts.error_file = Some("${original}_${error}".to_string());

        let outcome = Renamer::new(&opts, &guide)
            .run(&input, &mut no_progress())
            .await
            .unwrap();
        assert_eq!(outcome.failure, Some(FailureCategory::ProgramNotFound));
        assert_eq!(
            outcome.target,
            dir.path().join("error").join("rec_program_not_found.ts")
        );
        assert!(outcome.target.is_file());
    }

    #[tokio::test]
    async fn test_failures_without_error_templates() {
        let dir = tempfile::tempdir().unwrap();
        let guide = guide();
        let mut opts = options(dir.path());

        let input = recording(dir.path(), "rec.mp4");
        let err = Renamer::new(&opts, &guide)
            .run(&input, &mut no_progress())
            .await
            .unwrap_err();
        assert!(matches!(err, RenameError::ExtensionNotAllowed(ext) if ext == "mp4"));

        let input = recording(dir.path(), "rec.ts");
        opts.check_service = true;
        let err = Renamer::new(&opts, &guide)
            .run(&input, &mut no_progress())
            .await
            .unwrap_err();
        assert!(matches!(err, RenameError::ServiceNotRecognized(_)));
        assert!(input.exists());
    }

    #[tokio::test]
    async fn test_missing_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let guide = guide();
        let mut opts = options(dir.path());
        opts.error_file = Some("${original}_${error}".to_string());
        let renamer = Renamer::new(&opts, &guide);

        let err = renamer
            .run(&dir.path().join("missing.ts"), &mut no_progress())
            .await
            .unwrap_err();
        assert!(matches!(err, RenameError::InputMissing(_)));

        let err = renamer.run(dir.path(), &mut no_progress()).await.unwrap_err();
        assert!(matches!(err, RenameError::InputNotFile(_)));

        let empty = dir.path().join("empty.ts");
        std::fs::write(&empty, b"").unwrap();
        let outcome = renamer.run(&empty, &mut no_progress()).await.unwrap();
        assert_eq!(outcome.failure, Some(FailureCategory::InvalidInput));
        assert_eq!(outcome.target, dir.path().join("empty_invalid_input.ts"));
    }

    #[tokio::test]
    async fn test_time_check_without_clock() {
        let dir = tempfile::tempdir().unwrap();
        let input = recording(dir.path(), "rec.ts");
        let guide = guide();
        let mut opts = options(dir.path());
        opts.check_time = true;
        opts.error_file = Some("${error}".to_string());

        let outcome = Renamer::new(&opts, &guide)
            .run(&input, &mut no_progress())
            .await
            .unwrap();
        assert_eq!(outcome.failure, Some(FailureCategory::NoClockReference));
        assert_eq!(outcome.target, dir.path().join("no_clock_reference.ts"));
    }

    #[tokio::test]
    async fn test_drop_check_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let input = recording(dir.path(), "rec.ts");
        let size = std::fs::metadata(&input).unwrap().len();
        let guide = guide();
        let mut opts = options(dir.path());
        opts.check_drop = true;
        opts.dry_run = true;

        let mut last = (0, 0);
        let mut progress = |done: u64, total: u64| last = (done, total);
        Renamer::new(&opts, &guide)
            .run(&input, &mut progress)
            .await
            .unwrap();
        assert_eq!(last, (size, size));
    }

    #[test]
    fn test_confined() {
        assert_eq!(confined("${title}/season 1"), PathBuf::from("${title}/season 1"));
        assert_eq!(confined("../../etc"), PathBuf::from("etc"));
        assert_eq!(confined("/abs/./x"), PathBuf::from("abs/x"));
        assert_eq!(confined(".."), PathBuf::new());
    }

    #[tokio::test]
    async fn test_templates_stay_below_parent() {
        let dir = tempfile::tempdir().unwrap();
        let input = recording(dir.path(), "rec.ts");
        let out = dir.path().join("out");
        let guide = guide();
        let mut opts = options(&out);
        opts.dir = "../../${title}".to_string();
        opts.file = "/${title}".to_string();
        opts.dry_run = true;

        let outcome = Renamer::new(&opts, &guide)
            .run(&input, &mut no_progress())
            .await
            .unwrap();
        assert_eq!(outcome.target, out.join("Tantei").join("Tantei.ts"));

        opts.dir = "..".to_string();
        opts.file = "..".to_string();
        let outcome = Renamer::new(&opts, &guide)
            .run(&input, &mut no_progress())
            .await
            .unwrap();
        assert_eq!(outcome.target, out.join("rec.ts"));
    }
}
