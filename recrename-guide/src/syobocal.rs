//! Syobocal (cal.syoboi.jp) client.
//!
//! Two endpoints are used:
//! - `rss2.php?alt=json` lists broadcasts in a time window,
//! - `json.php?Req=TitleFull` returns series metadata for title ids.
//!
//! Syobocal encodes most numbers as strings and uses empty strings for
//! missing values, so the wire structs below accept both forms.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use log::debug;
use serde::{Deserialize, Deserializer};

use crate::error::{GuideError, Result};
use crate::service::GuideService;
use crate::types::{CandidateProgram, TitleMetadata};

/// Default Syobocal endpoint.
pub const SYOBOCAL_BASE_URL: &str = "https://cal.syoboi.jp";
const USER_AGENT: &str = concat!("recrename/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Time parameter format, minutes resolution.
const TIME_FORMAT: &str = "%Y%m%d%H%M";

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(i64),
    Text(String),
}

fn opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<i64>, D::Error> {
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Number(n)) => Some(n),
        Some(Loose::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

fn opt_u32<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<u32>, D::Error> {
    Ok(opt_i64(deserializer)?.and_then(|n| u32::try_from(n).ok()))
}

fn opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Text(s)) if !s.is_empty() => Some(s),
        Some(Loose::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Deserialize)]
struct Rss2Response {
    #[serde(default)]
    items: Vec<Rss2Item>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Rss2Item {
    #[serde(rename = "TID", deserialize_with = "opt_u32", default)]
    tid: Option<u32>,
    #[serde(rename = "ChID", deserialize_with = "opt_u32", default)]
    ch_id: Option<u32>,
    #[serde(deserialize_with = "opt_text", default)]
    title: Option<String>,
    #[serde(deserialize_with = "opt_text", default)]
    short_title: Option<String>,
    #[serde(deserialize_with = "opt_text", default)]
    sub_title: Option<String>,
    #[serde(deserialize_with = "opt_u32", default)]
    count: Option<u32>,
    #[serde(deserialize_with = "opt_i64", default)]
    st_time: Option<i64>,
    #[serde(deserialize_with = "opt_i64", default)]
    ed_time: Option<i64>,
    #[serde(deserialize_with = "opt_text", default)]
    ch_name: Option<String>,
}

#[derive(Deserialize)]
struct TitleFullResponse {
    #[serde(rename = "Titles", default)]
    titles: HashMap<String, TitleItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TitleItem {
    #[serde(deserialize_with = "opt_text", default)]
    title: Option<String>,
    #[serde(deserialize_with = "opt_text", default)]
    short_title: Option<String>,
    #[serde(deserialize_with = "opt_text", default)]
    title_yomi: Option<String>,
    #[serde(rename = "TitleEN", deserialize_with = "opt_text", default)]
    title_en: Option<String>,
    #[serde(deserialize_with = "opt_u32", default)]
    first_year: Option<u32>,
    #[serde(deserialize_with = "opt_u32", default)]
    first_month: Option<u32>,
    #[serde(deserialize_with = "opt_u32", default)]
    first_end_year: Option<u32>,
    #[serde(deserialize_with = "opt_u32", default)]
    first_end_month: Option<u32>,
}

fn unix_to_local(seconds: i64, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::<Utc>::from_timestamp(seconds, 0).map(|t| t.with_timezone(&offset))
}

/// Parse an `rss2.php?alt=json` body. Items without a title id, channel or
/// valid times are skipped. Times are returned in `offset`.
pub(crate) fn parse_programs(body: &str, offset: FixedOffset) -> Result<Vec<CandidateProgram>> {
    let response: Rss2Response = serde_json::from_str(body)?;

    Ok(response
        .items
        .into_iter()
        .filter_map(|item| {
            Some(CandidateProgram {
                title_id: item.tid?,
                channel_id: item.ch_id?,
                title: item.title.unwrap_or_default(),
                short_title: item.short_title,
                sub_title: item.sub_title,
                episode_count: item.count,
                start_time: unix_to_local(item.st_time?, offset)?,
                end_time: unix_to_local(item.ed_time?, offset)?,
                channel_name: item.ch_name.unwrap_or_default(),
                title_yomi: None,
                title_english: None,
                first_start_year: None,
                first_start_month: None,
                first_end_year: None,
                first_end_month: None,
            })
        })
        .collect())
}

/// Parse a `json.php?Req=TitleFull` body and pick `title_id` out of it.
pub(crate) fn parse_title(body: &str, title_id: u32) -> Result<TitleMetadata> {
    let mut response: TitleFullResponse = serde_json::from_str(body)?;
    let item = response
        .titles
        .remove(&title_id.to_string())
        .ok_or(GuideError::TitleNotFound(title_id))?;

    Ok(TitleMetadata {
        title_id,
        title: item.title.unwrap_or_default(),
        short_title: item.short_title,
        title_yomi: item.title_yomi,
        title_english: item.title_en,
        first_year: item.first_year,
        first_month: item.first_month,
        first_end_year: item.first_end_year,
        first_end_month: item.first_end_month,
    })
}

/// Syobocal API client.
pub struct SyobocalClient {
    http_client: reqwest::Client,
    base_url: String,
    user: String,
}

impl SyobocalClient {
    /// Create a client against the public endpoint. `user` is sent as the
    /// `usr` parameter of listing requests.
    pub fn new(user: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http_client,
            base_url: SYOBOCAL_BASE_URL.to_string(),
            user: user.into(),
        })
    }

    /// Point the client at another endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn programs_request(
        &self,
        start: &DateTime<FixedOffset>,
        end: &DateTime<FixedOffset>,
    ) -> Result<reqwest::Request> {
        let start = start.format(TIME_FORMAT).to_string();
        let end = end.format(TIME_FORMAT).to_string();
        Ok(self
            .http_client
            .get(format!("{}/rss2.php", self.base_url))
            .query(&[
                ("alt", "json"),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("usr", self.user.as_str()),
            ])
            .build()?)
    }

    fn title_request(&self, title_id: u32) -> Result<reqwest::Request> {
        let title_id = title_id.to_string();
        Ok(self
            .http_client
            .get(format!("{}/json.php", self.base_url))
            .query(&[("Req", "TitleFull"), ("TID", title_id.as_str())])
            .build()?)
    }

    async fn get_text(&self, request: reqwest::Request) -> Result<String> {
        debug!("GET {}", request.url());

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GuideError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl GuideService for SyobocalClient {
    async fn find_programs(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<CandidateProgram>> {
        let body = self.get_text(self.programs_request(&start, &end)?).await?;
        let programs = parse_programs(&body, *start.offset())?;
        debug!("Guide listed {} programs between {} and {}", programs.len(), start, end);
        Ok(programs)
    }

    async fn get_full_title(&self, title_id: u32) -> Result<TitleMetadata> {
        let body = self.get_text(self.title_request(title_id)?).await?;
        parse_title(&body, title_id)
    }
}
