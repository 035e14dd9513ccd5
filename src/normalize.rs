//! Turning raw fetched items into persisted rows.
//!
//! Identity rules:
//! - social ids are the platform's own alphanumeric ids and stay bare;
//! - news ids are the feed's numeric guid, else a short hash of the link;
//! - digest ids are a short hash of `"{url}_{title}"`.
//!
//! Score synthesis for fallback tiers: a base `B` is drawn once per fetch
//! from the source's configured range and item `i` gets
//! `floor(B * decay^i) + jitter`. Only the strict decrease of the
//! pre-jitter part by position is an invariant; the constants are tuning.
//!
//! News classification is multi-label: [`classify`] reports every matching
//! category and [`expand`] emits one row per match.

use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scraper::Html;

use crate::config::{Category, SocialSettings};
use crate::error::ParseError;
use crate::models::{
    DigestRecord, ItemType, NewsRecord, PostRecord, RawArticle, RawDigestItem, RawPost,
    TimeWindow, Timestamp,
};
use crate::utils::{collapse_whitespace, preview, short_hash};

/// Pre-jitter synthetic score of the item at `position`.
pub fn decayed_base(base: i64, decay: f64, position: usize) -> i64 {
    (base as f64 * decay.powi(position as i32)).floor() as i64
}

/// Synthesizes ordering-preserving scores for tiers without engagement data.
#[derive(Debug)]
pub struct ScoreSynth {
    rng: StdRng,
    decay: f64,
    jitter_min: i64,
    jitter_max: i64,
}

impl ScoreSynth {
    pub fn new(settings: &SocialSettings, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            decay: settings.decay,
            jitter_min: settings.jitter.min,
            jitter_max: settings.jitter.max,
        }
    }

    /// Draw the base score for one fetch of `source`.
    pub fn draw_base(&mut self, settings: &SocialSettings, source: &str) -> i64 {
        let range = settings.score_range(source);
        self.rng.random_range(range.min..=range.max)
    }

    /// Score for the item at `position` of a listing whose base is `base`.
    pub fn score(&mut self, base: i64, position: usize) -> i64 {
        let jitter = self.rng.random_range(self.jitter_min..=self.jitter_max);
        decayed_base(base, self.decay, position) + jitter
    }
}

/// Classify a post from its link and media flags.
pub fn classify_item(
    is_video: bool,
    is_gallery: bool,
    is_self: bool,
    url: &str,
) -> ItemType {
    let lower = url.to_lowercase();
    let image_ext = [".jpg", ".jpeg", ".png", ".gif", ".webp"]
        .iter()
        .any(|ext| lower.contains(ext));
    if is_video {
        ItemType::Video
    } else if is_gallery {
        ItemType::Gallery
    } else if image_ext || lower.contains("i.redd.it") {
        ItemType::Image
    } else if is_self {
        ItemType::Text
    } else {
        ItemType::Link
    }
}

/// Platform ids are plain alphanumerics; anything else would leak into the
/// prefixed namespaces of the read-set.
pub fn validate_social_id(id: &str) -> Result<&str, ParseError> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(id)
    } else {
        Err(ParseError::InvalidId(id.to_string()))
    }
}

/// Build a persisted post row. `score` is the already-decided engagement.
pub fn post_record(
    raw: RawPost,
    source: &str,
    window: TimeWindow,
    score: i64,
) -> Result<PostRecord, ParseError> {
    validate_social_id(&raw.id)?;
    let title = raw.title.trim().to_string();
    if title.is_empty() {
        return Err(ParseError::MissingField("title"));
    }
    let url = raw.url.unwrap_or_else(|| raw.permalink.clone());
    let item_type = raw
        .item_type
        .unwrap_or_else(|| classify_item(false, false, false, &url));
    Ok(PostRecord {
        id: raw.id,
        title,
        author: raw.author.unwrap_or_else(|| "unknown".to_string()),
        published_at: raw.created.unwrap_or_default(),
        permalink: raw.permalink,
        url,
        engagement_score: score,
        engagement_ratio: raw.upvote_ratio.unwrap_or(0.0),
        comment_count: raw.num_comments.unwrap_or(0),
        crosspost_count: raw.num_crossposts.unwrap_or(0),
        body: raw.selftext,
        item_type,
        flag_nsfw: raw.nsfw,
        flag_spoiler: raw.spoiler,
        label: raw.flair.unwrap_or_default(),
        award_count: raw.awards.unwrap_or(0),
        has_media: raw.has_media,
        media_fetched: false,
        time_window: window,
        source: source.to_string(),
    })
}

/// Stable news id: the feed's numeric guid when present, else a link hash.
pub fn news_article_id(guid: Option<&str>, link: &str) -> String {
    match guid.map(str::trim) {
        Some(g) if !g.is_empty() && g.chars().all(|c| c.is_ascii_digit()) => g.to_string(),
        _ => short_hash(link.trim()),
    }
}

/// Stable digest id derived from the link and its title.
pub fn digest_article_id(url: &str, title: &str) -> String {
    short_hash(&format!("{url}_{title}"))
}

/// Plain text of an HTML fragment with whitespace collapsed.
pub fn strip_html(fragment: &str) -> String {
    if fragment.trim().is_empty() {
        return String::new();
    }
    let doc = Html::parse_fragment(fragment);
    let text = doc.root_element().text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&text)
}

/// One category an item matched, with the phrases that hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryMatch<'a> {
    pub category: &'a Category,
    pub keywords: Vec<&'a str>,
}

/// Every category whose phrase list hits the item's title or description.
///
/// Matching is a case-insensitive substring search. Categories are
/// independent; all of them are evaluated.
///
/// # Arguments
///
/// * `article` - A parsed feed item
/// * `categories` - Configured categories, phrases in priority order
///
/// # Returns
///
/// One [`CategoryMatch`] per hit category in configuration order, each with
/// its matched phrases in phrase order. Empty when nothing matched; such
/// items are not stored.
///
/// # Examples
///
/// ```ignore
/// let hits = classify(&article, &config.news.categories);
/// let rows = expand(&article, &hits, 5, &Timestamp::now());
/// assert_eq!(rows.len(), hits.len());
/// ```
pub fn classify<'a>(article: &RawArticle, categories: &'a [Category]) -> Vec<CategoryMatch<'a>> {
    let haystack = format!("{} {}", article.title, article.description).to_lowercase();
    categories
        .iter()
        .filter_map(|category| {
            let keywords: Vec<&str> = category
                .keywords
                .iter()
                .filter(|k| haystack.contains(&k.to_lowercase()))
                .map(String::as_str)
                .collect();
            (!keywords.is_empty()).then_some(CategoryMatch { category, keywords })
        })
        .collect()
}

/// One row per matched category.
pub fn expand(
    article: &RawArticle,
    matches: &[CategoryMatch<'_>],
    max_keywords: usize,
    scraped_at: &Timestamp,
) -> Vec<NewsRecord> {
    matches
        .iter()
        .map(|m| NewsRecord {
            article_id: article.article_id.clone(),
            title: article.title.clone(),
            url: article.url.clone(),
            description: article.description.clone(),
            published_at: article.published_at.clone(),
            author: article.author.clone(),
            category: m.category.name.clone(),
            matched_keywords: m.keywords.iter().take(max_keywords).join(", "),
            feed_source: article.feed_source.clone(),
            scraped_at: scraped_at.clone(),
        })
        .collect()
}

/// Build a persisted digest row.
pub fn digest_record(
    item: RawDigestItem,
    description_chars: usize,
    scraped_at: &Timestamp,
) -> DigestRecord {
    DigestRecord {
        article_id: digest_article_id(&item.url, &item.title),
        description: preview(&item.description, description_chars),
        title: item.title,
        url: item.url,
        published_at: scraped_at.clone(),
        author: item.author,
        source_post: item.source_post,
        scraped_at: scraped_at.clone(),
    }
}
