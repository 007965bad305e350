//! Records returned by a program guide.

use chrono::{DateTime, FixedOffset};

/// One broadcast of an episode, as listed by the guide.
///
/// Series metadata starts out empty and is filled from a
/// [`TitleMetadata`] once the program has been selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateProgram {
    /// Series (title) id.
    pub title_id: u32,
    /// Guide channel id.
    pub channel_id: u32,
    /// Series title.
    pub title: String,
    /// Short series title.
    pub short_title: Option<String>,
    /// Episode subtitle.
    pub sub_title: Option<String>,
    /// Episode number.
    pub episode_count: Option<u32>,
    /// Broadcast start.
    pub start_time: DateTime<FixedOffset>,
    /// Broadcast end.
    pub end_time: DateTime<FixedOffset>,
    /// Channel name as the guide spells it.
    pub channel_name: String,
    /// Reading of the title in kana.
    pub title_yomi: Option<String>,
    /// English title.
    pub title_english: Option<String>,
    /// Year the series first aired.
    pub first_start_year: Option<u32>,
    /// Month the series first aired.
    pub first_start_month: Option<u32>,
    /// Year the first run ended.
    pub first_end_year: Option<u32>,
    /// Month the first run ended.
    pub first_end_month: Option<u32>,
}

impl CandidateProgram {
    /// Fill in series metadata. The guide's title wins over the listing's.
    pub fn merge_title(&mut self, title: TitleMetadata) {
        if !title.title.is_empty() {
            self.title = title.title;
        }
        self.short_title = title.short_title.or(self.short_title.take());
        self.title_yomi = title.title_yomi;
        self.title_english = title.title_english;
        self.first_start_year = title.first_year;
        self.first_start_month = title.first_month;
        self.first_end_year = title.first_end_year;
        self.first_end_month = title.first_end_month;
    }
}

/// Series level metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleMetadata {
    pub title_id: u32,
    pub title: String,
    pub short_title: Option<String>,
    pub title_yomi: Option<String>,
    pub title_english: Option<String>,
    pub first_year: Option<u32>,
    pub first_month: Option<u32>,
    pub first_end_year: Option<u32>,
    pub first_end_month: Option<u32>,
}
