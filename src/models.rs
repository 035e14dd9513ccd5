//! Data models for raw fetched items, persisted rows and the dashboard view.
//!
//! Three persisted row shapes exist, one per collection family:
//! - [`PostRecord`]: social posts, one collection per (source, window)
//! - [`NewsRecord`]: RSS news, one row per (article, matched category)
//! - [`DigestRecord`]: blog reading-list links
//!
//! Every row converts into a [`CanonicalRecord`], the source-agnostic shape
//! the dashboard filters, sorts and renders.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::utils::preview;

/// Characters of body text kept in a [`CanonicalRecord`].
pub const BODY_PREVIEW_CHARS: usize = 300;

/// Which family of upstream source produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Social,
    BlogDigest,
    News,
}

impl SourceKind {
    /// Prefix applied to record ids in the read-set. Social ids stay bare.
    pub fn read_prefix(self) -> &'static str {
        match self {
            SourceKind::Social => "",
            SourceKind::BlogDigest => "rth_",
            SourceKind::News => "dsr_",
        }
    }

    /// Namespaced key under which a record id is tracked as read.
    pub fn read_key(self, id: &str) -> String {
        format!("{}{}", self.read_prefix(), id)
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Social => "social",
            SourceKind::BlogDigest => "digest",
            SourceKind::News => "news",
        }
    }
}

/// Time window a social listing was ranked over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    /// Recent window ("top of the month").
    Month,
    /// Historical window ("top of the year").
    Year,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 2] = [TimeWindow::Month, TimeWindow::Year];

    /// Value of the `t=` query parameter upstream.
    pub fn as_param(self) -> &'static str {
        match self {
            TimeWindow::Month => "month",
            TimeWindow::Year => "year",
        }
    }

    /// Directory suffix of the partition holding this window.
    pub fn dir_suffix(self) -> &'static str {
        match self {
            TimeWindow::Month => "",
            TimeWindow::Year => "_yearly",
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

/// Best-effort timestamp.
///
/// Parsing never fails a record: anything that is not a recognised date is
/// kept verbatim as [`Timestamp::Raw`]. Both variants serialize as a plain
/// string, parsed ones in RFC 3339.
///
/// Reading a stored string yields [`Timestamp::Parsed`] only when writing
/// it back reproduces the same text; any other spelling (`Z` for `+00:00`,
/// RFC 2822, free text) stays `Raw`, so rewriting a collection never alters
/// rows it already held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timestamp {
    Parsed(DateTime<FixedOffset>),
    Raw(String),
}

impl Timestamp {
    /// Parse a feed date (RFC 2822 first, RFC 3339 second).
    pub fn parse_feed_date(raw: &str) -> Self {
        parse_date(raw)
            .map(Timestamp::Parsed)
            .unwrap_or_else(|| Timestamp::Raw(raw.to_string()))
    }

    /// Build from epoch seconds (fractional allowed). Out-of-range input
    /// degrades to the raw number.
    pub fn from_unix(secs: f64) -> Self {
        let whole = secs.trunc() as i64;
        let nanos = ((secs - secs.trunc()) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
        match DateTime::<Utc>::from_timestamp(whole, nanos) {
            Some(dt) => Timestamp::Parsed(dt.fixed_offset()),
            None => Timestamp::Raw(secs.to_string()),
        }
    }

    pub fn now() -> Self {
        Timestamp::Parsed(Utc::now().fixed_offset())
    }

    /// The instant, when known. Raw text is parsed on demand.
    pub fn as_datetime(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Timestamp::Parsed(dt) => Some(*dt),
            Timestamp::Raw(s) => parse_date(s),
        }
    }
}

/// RFC 2822 first, RFC 3339 second.
fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = raw.trim();
    DateTime::parse_from_rfc2822(trimmed)
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed))
        .ok()
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::Raw(String::new())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Parsed(dt) => f.write_str(&dt.to_rfc3339()),
            Timestamp::Raw(s) => f.write_str(s),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match DateTime::parse_from_rfc3339(&s) {
            Ok(dt) if dt.to_rfc3339() == s => Timestamp::Parsed(dt),
            _ => Timestamp::Raw(s),
        })
    }
}

/// Kind of content a social post links to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Video,
    Gallery,
    Image,
    Text,
    Link,
}

/// Dedup key inside one persisted collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub id: String,
    pub category: Option<String>,
}

/// Rows that can be merged by the store.
pub trait Keyed {
    fn key(&self) -> RecordKey;
}

/// A post as returned by one social fetch tier, before normalization.
///
/// Fallback tiers fill only a subset of the fields; `score` is `None` when
/// the tier carries no engagement numbers at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPost {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub created: Option<Timestamp>,
    pub permalink: String,
    pub url: Option<String>,
    pub score: Option<i64>,
    pub upvote_ratio: Option<f64>,
    pub num_comments: Option<i64>,
    pub num_crossposts: Option<i64>,
    pub selftext: String,
    pub item_type: Option<ItemType>,
    pub nsfw: bool,
    pub spoiler: bool,
    pub flair: Option<String>,
    pub awards: Option<i64>,
    pub has_media: bool,
}

/// One entry parsed out of an RSS news feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawArticle {
    pub article_id: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: Timestamp,
    pub author: String,
    pub feed_source: String,
}

/// One link extracted from a blog reading-list post.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDigestItem {
    pub url: String,
    pub author: String,
    pub title: String,
    pub description: String,
    pub source_post: String,
}

/// Persisted social post row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub published_at: Timestamp,
    pub permalink: String,
    pub url: String,
    pub engagement_score: i64,
    pub engagement_ratio: f64,
    pub comment_count: i64,
    pub crosspost_count: i64,
    pub body: String,
    pub item_type: ItemType,
    pub flag_nsfw: bool,
    pub flag_spoiler: bool,
    pub label: String,
    pub award_count: i64,
    pub has_media: bool,
    pub media_fetched: bool,
    pub time_window: TimeWindow,
    pub source: String,
}

impl Keyed for PostRecord {
    fn key(&self) -> RecordKey {
        RecordKey {
            id: self.id.clone(),
            category: None,
        }
    }
}

/// Persisted news row; one per (article, matched category).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub article_id: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: Timestamp,
    pub author: String,
    pub category: String,
    pub matched_keywords: String,
    pub feed_source: String,
    pub scraped_at: Timestamp,
}

impl Keyed for NewsRecord {
    fn key(&self) -> RecordKey {
        RecordKey {
            id: self.article_id.clone(),
            category: Some(self.category.clone()),
        }
    }
}

/// Persisted blog reading-list row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestRecord {
    pub article_id: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_at: Timestamp,
    pub author: String,
    pub source_post: String,
    pub scraped_at: Timestamp,
}

impl Keyed for DigestRecord {
    fn key(&self) -> RecordKey {
        RecordKey {
            id: self.article_id.clone(),
            category: None,
        }
    }
}

/// Source-agnostic view of one fetched item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub id: String,
    pub source: SourceKind,
    pub category: Option<String>,
    pub title: String,
    pub author: String,
    pub url: String,
    pub body_preview: String,
    pub published_at: Timestamp,
    pub engagement_score: i64,
    pub comment_count: i64,
    pub scraped_at: Option<Timestamp>,
    /// Sub-source the record came from (community name, feed path, post URL).
    pub origin: String,
    pub time_window: Option<TimeWindow>,
}

impl CanonicalRecord {
    pub fn read_key(&self) -> String {
        self.source.read_key(&self.id)
    }
}

impl From<PostRecord> for CanonicalRecord {
    fn from(p: PostRecord) -> Self {
        CanonicalRecord {
            body_preview: preview(&p.body, BODY_PREVIEW_CHARS),
            id: p.id,
            source: SourceKind::Social,
            category: None,
            title: p.title,
            author: p.author,
            url: p.permalink,
            published_at: p.published_at,
            engagement_score: p.engagement_score,
            comment_count: p.comment_count,
            scraped_at: None,
            origin: p.source,
            time_window: Some(p.time_window),
        }
    }
}

impl From<NewsRecord> for CanonicalRecord {
    fn from(n: NewsRecord) -> Self {
        CanonicalRecord {
            body_preview: preview(&n.description, BODY_PREVIEW_CHARS),
            id: n.article_id,
            source: SourceKind::News,
            category: Some(n.category),
            title: n.title,
            author: n.author,
            url: n.url,
            published_at: n.published_at,
            engagement_score: 0,
            comment_count: 0,
            scraped_at: Some(n.scraped_at),
            origin: n.feed_source,
            time_window: None,
        }
    }
}

impl From<DigestRecord> for CanonicalRecord {
    fn from(d: DigestRecord) -> Self {
        CanonicalRecord {
            body_preview: preview(&d.description, BODY_PREVIEW_CHARS),
            id: d.article_id,
            source: SourceKind::BlogDigest,
            category: None,
            title: d.title,
            author: d.author,
            url: d.url,
            published_at: d.published_at,
            engagement_score: 0,
            comment_count: 0,
            scraped_at: Some(d.scraped_at),
            origin: d.source_post,
            time_window: None,
        }
    }
}
