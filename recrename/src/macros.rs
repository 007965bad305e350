//! Output path templates.
//!
//! A template mixes literal text, `${name}` macros and `([ ... ])` optional
//! blocks. A macro with no value in the [`MacroSet`] is kept literally. An
//! optional block disappears when any macro inside it resolves to an empty
//! string, otherwise its content is kept without the delimiters.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use recrename_guide::CandidateProgram;

use crate::error::FailureCategory;
use crate::sanitize::escape_path_component;

const MACRO_OPEN: &str = "${";
const MACRO_CLOSE: char = '}';
const BLOCK_OPEN: &str = "([";
const BLOCK_CLOSE: &str = "])";

const SEASONS: [&str; 4] = ["春", "夏", "秋", "冬"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Macro(&'a str),
    Optional(Vec<Segment<'a>>),
}

fn parse_macros<'a>(mut rest: &'a str, segments: &mut Vec<Segment<'a>>) {
    while let Some(start) = rest.find(MACRO_OPEN) {
        let after = &rest[start + MACRO_OPEN.len()..];
        let Some(end) = after.find(MACRO_CLOSE) else {
            break;
        };
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        segments.push(Segment::Macro(&after[..end]));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
}

/// First pass: split out optional blocks, then macros inside and between them.
fn parse(template: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find(BLOCK_OPEN) {
        let after = &rest[start + BLOCK_OPEN.len()..];
        let Some(end) = after.find(BLOCK_CLOSE) else {
            break;
        };
        parse_macros(&rest[..start], &mut segments);
        let mut inner = Vec::new();
        parse_macros(&after[..end], &mut inner);
        segments.push(Segment::Optional(inner));
        rest = &after[end + BLOCK_CLOSE.len()..];
    }
    parse_macros(rest, &mut segments);

    segments
}

/// Resolved macro values for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroSet {
    values: BTreeMap<String, String>,
}

impl MacroSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a macro. The value is escaped for use in a path.
    pub fn insert(&mut self, name: impl Into<String>, value: impl AsRef<str>) {
        self.values
            .insert(name.into(), escape_path_component(value.as_ref()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Macros for a matched program. `original` is the input file stem.
    pub fn for_program(
        program: &CandidateProgram,
        original: &str,
        user_channel_name: Option<&str>,
    ) -> Self {
        let mut set = Self::new();
        let text = |v: &Option<String>| v.as_deref().unwrap_or_default().to_string();

        set.insert("original", original);
        set.insert("title", &program.title);
        set.insert(
            "shortTitle",
            program
                .short_title
                .as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or(&program.title),
        );
        set.insert("subTitle", text(&program.sub_title));
        set.insert("titleYomi", text(&program.title_yomi));
        set.insert("titleEnglish", text(&program.title_english));

        set.insert_year_month("firstStart", program.first_start_year, program.first_start_month);
        set.insert_year_month("firstEnd", program.first_end_year, program.first_end_month);

        let count = program.episode_count;
        set.insert("count", count.map(|c| c.to_string()).unwrap_or_default());
        for width in 2..=4 {
            set.insert(
                format!("count{}", width),
                count
                    .map(|c| format!("{:0width$}", c, width = width))
                    .unwrap_or_default(),
            );
        }

        set.insert_time("", &program.start_time);
        set.insert_time("_", &program.end_time);

        set.insert("channelName", &program.channel_name);
        set.insert("userChannelName", user_channel_name.unwrap_or_default());

        set
    }

    /// Reduced set used when the pipeline takes the error path.
    pub fn for_error(original: &str, category: FailureCategory) -> Self {
        let mut set = Self::new();
        set.insert("original", original);
        set.insert("error", category.as_str());
        set
    }

    fn insert_year_month(&mut self, prefix: &str, year: Option<u32>, month: Option<u32>) {
        let year = year.map(|y| y.to_string()).unwrap_or_default();
        let short_year = year
            .char_indices()
            .rev()
            .nth(1)
            .map_or(year.as_str(), |(i, _)| &year[i..])
            .to_string();
        self.insert(format!("{}YYYY", prefix), &year);
        self.insert(format!("{}YY", prefix), short_year);

        let month = month.filter(|m| (1..=12).contains(m));
        let quarter = month.map(|m| ((m - 1) / 3) as usize);
        self.insert(format!("{}M", prefix), month.map(|m| m.to_string()).unwrap_or_default());
        self.insert(
            format!("{}MM", prefix),
            month.map(|m| format!("{:02}", m)).unwrap_or_default(),
        );
        self.insert(
            format!("{}Quarter", prefix),
            quarter.map(|q| (q + 1).to_string()).unwrap_or_default(),
        );
        self.insert(
            format!("{}Season", prefix),
            quarter.map(|q| SEASONS[q]).unwrap_or_default(),
        );
    }

    fn insert_time(&mut self, prefix: &str, time: &DateTime<FixedOffset>) {
        let year = time.year();
        let fields = [
            ("YYYY", year.to_string()),
            ("YY", format!("{:02}", year.rem_euclid(100))),
            ("M", time.month().to_string()),
            ("MM", format!("{:02}", time.month())),
            ("D", time.day().to_string()),
            ("DD", format!("{:02}", time.day())),
            ("h", time.hour().to_string()),
            ("hh", format!("{:02}", time.hour())),
            ("m", time.minute().to_string()),
            ("mm", format!("{:02}", time.minute())),
            ("s", time.second().to_string()),
            ("ss", format!("{:02}", time.second())),
        ];
        for (name, value) in fields {
            self.insert(format!("{}{}", prefix, name), value);
        }
    }

    /// Expand `template` against this set.
    pub fn resolve(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        for segment in parse(template) {
            self.render(&segment, &mut out);
        }
        out
    }

    fn render(&self, segment: &Segment<'_>, out: &mut String) {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Macro(name) => match self.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    out.push_str(MACRO_OPEN);
                    out.push_str(name);
                    out.push(MACRO_CLOSE);
                }
            },
            Segment::Optional(inner) => {
                if let Some(block) = self.render_block(inner) {
                    out.push_str(&block);
                }
            }
        }
    }

    /// `None` when a known macro in the block is empty.
    fn render_block(&self, inner: &[Segment<'_>]) -> Option<String> {
        let empty_macro = inner
            .iter()
            .any(|s| matches!(s, Segment::Macro(name) if self.get(name) == Some("")));
        if empty_macro {
            return None;
        }

        let mut out = String::new();
        for segment in inner {
            self.render(segment, &mut out);
        }
        Some(out)
    }
}
