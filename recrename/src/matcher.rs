//! Guide lookup and candidate selection.

use std::future::Future;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, FixedOffset};
use log::{info, warn};
use recrename_guide::{CandidateProgram, GuideError, GuideService};

use crate::error::{RenameError, Result};
use crate::normalize::{search_fragment, title_matches};

/// How guide requests are retried after transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Wait between attempts.
    pub delay: StdDuration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            delay: StdDuration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Run `request`, retrying transient failures.
    pub async fn run<T, F, Fut>(&self, what: &str, mut request: F) -> std::result::Result<T, GuideError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, GuideError>>,
    {
        let mut attempt = 1;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    warn!(
                        "{} failed ({}), retry after {} seconds",
                        what,
                        e,
                        self.delay.as_secs()
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// What the recording says about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRequest {
    /// Normalized event name.
    pub event_name: String,
    /// Observed start time.
    pub start_time: DateTime<FixedOffset>,
    /// Declared duration in seconds.
    pub duration: Option<u32>,
    /// Guide channel resolved from the channel table.
    pub channel_id: Option<u32>,
}

/// Candidate whose start is closest to `start`; the first one on ties.
pub fn select_closest(
    candidates: Vec<CandidateProgram>,
    start: DateTime<FixedOffset>,
) -> Option<CandidateProgram> {
    candidates
        .into_iter()
        .min_by_key(|c| (c.start_time - start).num_milliseconds().abs())
}

/// Finds the guide entry of a recording.
pub struct ProgramMatcher<'a, G: GuideService + ?Sized> {
    guide: &'a G,
    retry: RetryPolicy,
}

impl<'a, G: GuideService + ?Sized> ProgramMatcher<'a, G> {
    pub fn new(guide: &'a G, retry: RetryPolicy) -> Self {
        Self { guide, retry }
    }

    async fn list(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<CandidateProgram>> {
        self.retry
            .run("Program listing", || self.guide.find_programs(start, end))
            .await
            .map_err(RenameError::GuideUnavailable)
    }

    /// Select the program and fill in its series metadata.
    pub async fn find_program(&self, request: &MatchRequest) -> Result<CandidateProgram> {
        let fragment = search_fragment(&request.event_name);
        info!(
            "Search {:?} around {} (channel {:?})",
            fragment, request.start_time, request.channel_id
        );

        let on_channel = |c: &CandidateProgram| request.channel_id.map_or(true, |id| c.channel_id == id);

        let hour = Duration::hours(1);
        let mut candidates: Vec<_> = self
            .list(request.start_time - hour, request.start_time + hour)
            .await?
            .into_iter()
            .filter(|c| title_matches(&c.title, &fragment))
            .filter(|c| on_channel(c))
            .collect();

        if candidates.is_empty() {
            let Some(duration) = request.duration else {
                return Err(RenameError::ProgramNotFound(fragment));
            };
            info!("No title match, listing the broadcast window");
            let end = request.start_time + Duration::seconds(duration as i64);
            candidates = self
                .list(request.start_time, end)
                .await?
                .into_iter()
                .filter(|c| on_channel(c))
                .collect();
        }

        let mut program = select_closest(candidates, request.start_time)
            .ok_or_else(|| RenameError::ProgramNotFound(fragment.clone()))?;

        let title_id = program.title_id;
        let title = self
            .retry
            .run("Title lookup", || self.guide.get_full_title(title_id))
            .await
            .map_err(RenameError::GuideUnavailable)?;
        program.merge_title(title);

        info!(
            "Program: {} / {:?} #{:?} on {}",
            program.title, program.sub_title, program.episode_count, program.channel_name
        );
        Ok(program)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use recrename_guide::TitleMetadata;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    pub(crate) fn jst(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 4, 5, h, m, 0)
            .unwrap()
    }

    pub(crate) fn candidate(title_id: u32, channel_id: u32, title: &str, start: DateTime<FixedOffset>) -> CandidateProgram {
        CandidateProgram {
            title_id,
            channel_id,
            title: title.to_string(),
            short_title: None,
            sub_title: Some(format!("episode of {}", title_id)),
            episode_count: Some(3),
            start_time: start,
            end_time: start + Duration::minutes(30),
            channel_name: format!("ch{}", channel_id),
            title_yomi: None,
            title_english: None,
            first_start_year: None,
            first_start_month: None,
            first_end_year: None,
            first_end_month: None,
        }
    }

    /// In-memory guide listing programs whose start falls inside the query.
    #[derive(Default)]
    pub(crate) struct FakeGuide {
        pub programs: Vec<CandidateProgram>,
        pub titles: HashMap<u32, TitleMetadata>,
        pub failures: AtomicU32,
        pub queries: Mutex<Vec<(DateTime<FixedOffset>, DateTime<FixedOffset>)>>,
    }

    impl FakeGuide {
        pub(crate) fn with_programs(programs: Vec<CandidateProgram>) -> Self {
            let titles = programs
                .iter()
                .map(|p| {
                    let title = TitleMetadata {
                        title_id: p.title_id,
                        title: p.title.clone(),
                        first_year: Some(2024),
                        first_month: Some(4),
                        ..Default::default()
                    };
                    (p.title_id, title)
                })
                .collect();
            Self {
                programs,
                titles,
                ..Default::default()
            }
        }

        fn fail_once(&self) -> bool {
            self.failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl GuideService for FakeGuide {
        async fn find_programs(
            &self,
            start: DateTime<FixedOffset>,
            end: DateTime<FixedOffset>,
        ) -> recrename_guide::Result<Vec<CandidateProgram>> {
            self.queries.lock().unwrap().push((start, end));
            if self.fail_once() {
                return Err(GuideError::Status(503));
            }
            Ok(self
                .programs
                .iter()
                .filter(|p| p.start_time >= start && p.start_time <= end)
                .cloned()
                .collect())
        }

        async fn get_full_title(&self, title_id: u32) -> recrename_guide::Result<TitleMetadata> {
            self.titles
                .get(&title_id)
                .cloned()
                .ok_or(GuideError::TitleNotFound(title_id))
        }
    }

    fn no_delay() -> RetryPolicy {
        RetryPolicy {
            attempts: 2,
            delay: StdDuration::ZERO,
        }
    }

    fn request(name: &str, channel_id: Option<u32>) -> MatchRequest {
        MatchRequest {
            event_name: name.to_string(),
            start_time: jst(1, 0),
            duration: Some(1800),
            channel_id,
        }
    }

    #[test]
    fn test_tie_break_first_wins() {
        let start = jst(1, 0);
        let candidates = vec![
            candidate(1, 1, "a", jst(1, 10)),
            candidate(2, 1, "b", jst(0, 50)),
            candidate(3, 1, "c", jst(1, 10)),
        ];
        assert_eq!(select_closest(candidates, start).map(|c| c.title_id), Some(1));
        assert_eq!(select_closest(Vec::new(), start), None);
    }

    #[tokio::test]
    async fn test_filters_by_title_and_channel() {
        let guide = FakeGuide::with_programs(vec![
            candidate(10, 1, "探偵 物語", jst(1, 0)),
            candidate(11, 2, "探偵物語", jst(1, 0)),
            candidate(12, 2, "別番組", jst(1, 0)),
        ]);
        let matcher = ProgramMatcher::new(&guide, no_delay());

        let program = matcher.find_program(&request("探偵物語 #3", Some(2))).await.unwrap();
        assert_eq!(program.title_id, 11);
        assert_eq!(program.first_start_year, Some(2024));

        let program = matcher.find_program(&request("探偵物語 #3", None)).await.unwrap();
        assert_eq!(program.title_id, 10);

        let queries = guide.queries.lock().unwrap();
        assert_eq!(queries[0], (jst(0, 0), jst(2, 0)));
    }

    #[tokio::test]
    async fn test_fallback_window_filters_by_channel_only() {
        let guide = FakeGuide::with_programs(vec![
            candidate(20, 1, "全然違う", jst(1, 0)),
            candidate(21, 5, "別の名前", jst(1, 0)),
        ]);
        let matcher = ProgramMatcher::new(&guide, no_delay());

        let program = matcher.find_program(&request("探偵物語", Some(5))).await.unwrap();
        assert_eq!(program.title_id, 21);
        let queries = guide.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1], (jst(1, 0), jst(1, 30)));
    }

    #[tokio::test]
    async fn test_not_found_without_duration() {
        let guide = FakeGuide::with_programs(vec![candidate(20, 1, "全然違う", jst(1, 0))]);
        let matcher = ProgramMatcher::new(&guide, no_delay());

        let mut req = request("探偵物語", Some(1));
        req.duration = None;
        assert!(matches!(
            matcher.find_program(&req).await,
            Err(RenameError::ProgramNotFound(fragment)) if fragment == "探偵物語"
        ));

        assert!(matches!(
            matcher.find_program(&request("探偵物語", Some(9))).await,
            Err(RenameError::ProgramNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_delay() {
        let guide = FakeGuide::with_programs(vec![candidate(10, 1, "探偵物語", jst(1, 0))]);
        guide.failures.store(1, Ordering::SeqCst);
        let matcher = ProgramMatcher::new(&guide, RetryPolicy::default());

        let before = tokio::time::Instant::now();
        let program = matcher.find_program(&request("探偵物語", None)).await.unwrap();
        assert_eq!(program.title_id, 10);
        assert!(before.elapsed() >= StdDuration::from_secs(60));
    }

    #[tokio::test]
    async fn test_guide_unavailable_after_retry() {
        let guide = FakeGuide::with_programs(Vec::new());
        guide.failures.store(2, Ordering::SeqCst);
        let matcher = ProgramMatcher::new(&guide, no_delay());

        let err = matcher.find_program(&request("探偵物語", None)).await.unwrap_err();
        assert!(matches!(err, RenameError::GuideUnavailable(GuideError::Status(503))));
        assert_eq!(guide.queries.lock().unwrap().len(), 2);
    }
}
