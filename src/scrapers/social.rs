//! Social link-aggregation scraper with a three-tier fallback chain.
//!
//! # Tiers
//!
//! | Tier | Endpoint | Engagement data |
//! |------|----------|-----------------|
//! | [`Tier::Json`] | `{mirror}/r/{source}/top.json` | authoritative |
//! | [`Tier::Html`] | `{mirror}/r/{source}/top/` | when present in markup, else synthesized |
//! | [`Tier::Feed`] | `{site}/r/{source}/top/.rss` | synthesized |
//!
//! Tiers are tried in order until one yields at least one post. On HTTP 429
//! the JSON tier backs off once and retries before falling through.
//! Successive (source, window) units are separated by a randomized pause.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::config::SocialSettings;
use crate::error::{FetchError, ParseError, PersistenceError};
use crate::models::{PostRecord, RawPost, TimeWindow, Timestamp};
use crate::normalize::{ScoreSynth, classify_item, post_record};
use crate::scrapers::RunReport;
use crate::scrapers::http::{HttpFetch, Pacer, fetch_ok};
use crate::scrapers::xml::parse_document;
use crate::store::Store;

static THING: Lazy<Selector> = Lazy::new(|| Selector::parse("div.thing").expect("valid selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("a.title").expect("valid selector"));
static SCORE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.score.unvoted").expect("valid selector"));
static FLAIR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.linkflairlabel").expect("valid selector"));

/// One fetch strategy in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Json,
    Html,
    Feed,
}

impl Tier {
    pub const CHAIN: [Tier; 3] = [Tier::Json, Tier::Html, Tier::Feed];

    /// Whether this tier reports real engagement numbers.
    pub fn authoritative(self) -> bool {
        matches!(self, Tier::Json)
    }

    pub fn url(self, settings: &SocialSettings, source: &str, window: TimeWindow) -> String {
        let name = urlencoding::encode(source);
        let t = window.as_param();
        match self {
            Tier::Json => format!(
                "{}/r/{name}/top.json?t={t}&limit={}&raw_json=1",
                settings.mirror, settings.limit
            ),
            Tier::Html => format!("{}/r/{name}/top/?sort=top&t={t}", settings.mirror),
            Tier::Feed => format!(
                "{}/r/{name}/top/.rss?t={t}&limit={}",
                settings.site, settings.limit
            ),
        }
    }

    async fn fetch<H: HttpFetch>(
        self,
        http: &H,
        settings: &SocialSettings,
        source: &str,
        window: TimeWindow,
    ) -> Result<Vec<RawPost>, FetchError> {
        let url = self.url(settings, source, window);
        let malformed = |e: ParseError| FetchError::Malformed {
            url: url.clone(),
            reason: e.to_string(),
        };
        match self {
            Tier::Json => {
                let body = match fetch_ok(http, &url).await {
                    Err(e) if e.is_rate_limited() => {
                        let backoff = Duration::from_secs(settings.rate_limit_backoff_secs);
                        warn!(%url, ?backoff, "Rate limited on JSON tier; backing off once");
                        sleep(backoff).await;
                        fetch_ok(http, &url).await?
                    }
                    other => other?,
                };
                parse_listing_json(&body, &settings.site).map_err(malformed)
            }
            Tier::Html => {
                let body = fetch_ok(http, &url).await?;
                Ok(parse_listing_html(&body, &settings.site, settings.max_html_items))
            }
            Tier::Feed => {
                let body = fetch_ok(http, &url).await?;
                parse_listing_feed(&body, &settings.site).map_err(malformed)
            }
        }
    }
}

/// Posts produced by the first successful tier.
#[derive(Debug)]
pub struct Harvest {
    pub tier: Tier,
    pub posts: Vec<RawPost>,
}

/// Walk the fallback chain until a tier yields at least one post.
///
/// # Arguments
///
/// * `http` - Client used for every tier
/// * `settings` - Mirror and site base URLs, listing limit, backoff
/// * `source` - Community name as configured
/// * `window` - Listing window to request
///
/// # Returns
///
/// The posts of the first tier that produced any, tagged with that tier so
/// the caller knows whether its scores are real. A failed or empty tier is
/// logged and the next one is tried; [`FetchError::Exhausted`] when none
/// produced anything.
///
/// # Examples
///
/// ```ignore
/// let harvest = fetch_posts(&http, &config.social, "dataisbeautiful", TimeWindow::Month).await?;
/// assert!(!harvest.posts.is_empty());
/// ```
#[instrument(level = "info", skip(http, settings))]
pub async fn fetch_posts<H: HttpFetch>(
    http: &H,
    settings: &SocialSettings,
    source: &str,
    window: TimeWindow,
) -> Result<Harvest, FetchError> {
    for tier in Tier::CHAIN {
        match tier.fetch(http, settings, source, window).await {
            Ok(posts) if !posts.is_empty() => {
                info!(?tier, count = posts.len(), "Tier produced posts");
                return Ok(Harvest { tier, posts });
            }
            Ok(_) => warn!(?tier, "Tier returned no posts; falling through"),
            Err(e) => warn!(?tier, error = %e, "Tier failed; falling through"),
        }
    }
    Err(FetchError::Exhausted {
        target: format!("r/{source} ({window})"),
    })
}

/// Turn a harvest into rows, synthesizing scores where the tier has none.
pub fn normalize_harvest(
    harvest: Harvest,
    settings: &SocialSettings,
    synth: &mut ScoreSynth,
    source: &str,
    window: TimeWindow,
) -> Vec<PostRecord> {
    let authoritative = harvest.tier.authoritative();
    let base = synth.draw_base(settings, source);
    let mut rows = Vec::with_capacity(harvest.posts.len());
    for (i, raw) in harvest.posts.into_iter().enumerate() {
        let score = if authoritative {
            raw.score.unwrap_or(0)
        } else {
            match raw.score {
                Some(s) if s > 0 => s,
                _ => synth.score(base, i),
            }
        };
        let id = raw.id.clone();
        match post_record(raw, source, window, score) {
            Ok(row) => rows.push(row),
            Err(e) => warn!(%id, error = %e, "Skipping malformed post"),
        }
    }
    rows
}

/// Scrape every configured source for each window and merge the results.
///
/// A failing unit is logged and skipped; a persistence failure aborts.
#[instrument(level = "info", skip_all, fields(windows = ?windows, only = ?only))]
pub async fn run<H: HttpFetch>(
    http: &H,
    store: &Store,
    settings: &SocialSettings,
    windows: &[TimeWindow],
    only: &[String],
) -> Result<RunReport, PersistenceError> {
    let pacer = Pacer::new(settings.delay_secs);
    let mut synth = ScoreSynth::new(settings, rand::random());
    let mut report = RunReport::default();

    let sources: Vec<&str> = settings
        .sources
        .iter()
        .map(|s| s.name.as_str())
        .filter(|name| only.is_empty() || only.iter().any(|o| o.eq_ignore_ascii_case(name)))
        .collect();
    if sources.is_empty() {
        warn!(?only, "No configured source matches the selection");
    }

    let mut first = true;
    for source in &sources {
        for &window in windows {
            if !first {
                pacer.pause().await;
            }
            first = false;

            info!(%source, %window, display = settings.display_name(source), "Processing");
            let harvest = match fetch_posts(http, settings, source, window).await {
                Ok(h) => h,
                Err(e) => {
                    warn!(%source, %window, error = %e, "Skipping sub-source");
                    report.units_failed += 1;
                    continue;
                }
            };
            report.fetched += harvest.posts.len();
            let rows = normalize_harvest(harvest, settings, &mut synth, source, window);
            let merged = store.merge_into(&store.social_path(source, window), rows)?;
            report.added += merged.added;
            report.units_ok += 1;
        }
    }

    info!(
        units_ok = report.units_ok,
        units_failed = report.units_failed,
        added = report.added,
        "Social scrape finished"
    );
    Ok(report)
}

fn absolutize(site: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else if link.starts_with('/') {
        format!("{site}{link}")
    } else {
        format!("{site}/{link}")
    }
}

/// Suffix after the last `_` of a prefixed id like `t3_abc123`.
fn bare_id(fullname: &str) -> String {
    fullname.rsplit('_').next().unwrap_or(fullname).trim().to_string()
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: PostData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PostData {
    id: String,
    title: String,
    author: Option<String>,
    created_utc: Option<f64>,
    permalink: String,
    url: Option<String>,
    url_overridden_by_dest: Option<String>,
    score: Option<i64>,
    upvote_ratio: Option<f64>,
    num_comments: Option<i64>,
    num_crossposts: Option<i64>,
    selftext: Option<String>,
    is_video: bool,
    is_gallery: Option<bool>,
    is_self: bool,
    over_18: bool,
    spoiler: bool,
    stickied: bool,
    link_flair_text: Option<String>,
    total_awards_received: Option<i64>,
    media: Option<serde_json::Value>,
    post_hint: Option<String>,
}

/// Parse the JSON listing of the primary tier.
///
/// Stickied and video posts are skipped. A child that does not match the
/// expected shape is skipped on its own.
pub fn parse_listing_json(body: &str, site: &str) -> Result<Vec<RawPost>, ParseError> {
    let listing: Listing = serde_json::from_str(body)?;
    let mut posts = Vec::new();
    for child in listing.data.children {
        let p = match serde_json::from_value::<Child>(child) {
            Ok(c) => c.data,
            Err(e) => {
                debug!(error = %e, "Skipping malformed listing child");
                continue;
            }
        };
        if p.stickied || p.is_video {
            continue;
        }
        let url = p.url_overridden_by_dest.or(p.url);
        let is_gallery = p.is_gallery.unwrap_or(false);
        let item_type = classify_item(p.is_video, is_gallery, p.is_self, url.as_deref().unwrap_or(""));
        let has_media = is_gallery
            || p.media.as_ref().is_some_and(|m| !m.is_null())
            || p.post_hint.as_deref() == Some("image");
        posts.push(RawPost {
            id: p.id,
            title: p.title,
            author: p.author,
            created: p.created_utc.map(Timestamp::from_unix),
            permalink: absolutize(site, &p.permalink),
            url,
            score: p.score,
            upvote_ratio: p.upvote_ratio,
            num_comments: p.num_comments,
            num_crossposts: p.num_crossposts,
            selftext: p.selftext.unwrap_or_default(),
            item_type: Some(item_type),
            nsfw: p.over_18,
            spoiler: p.spoiler,
            flair: p.link_flair_text,
            awards: p.total_awards_received,
            has_media,
        });
    }
    Ok(posts)
}

fn data_attr<'a>(thing: &ElementRef<'a>, name: &str) -> Option<&'a str> {
    thing.value().attr(name).map(str::trim).filter(|v| !v.is_empty())
}

fn html_score(thing: &ElementRef<'_>) -> Option<i64> {
    data_attr(thing, "data-score")
        .and_then(|s| s.parse().ok())
        .or_else(|| {
            thing
                .select(&SCORE)
                .next()
                .and_then(|e| e.value().attr("title"))
                .and_then(|s| s.trim().parse().ok())
        })
        .filter(|s: &i64| *s > 0)
}

/// Parse the HTML listing of the secondary tier (at most `max_items`).
pub fn parse_listing_html(body: &str, site: &str, max_items: usize) -> Vec<RawPost> {
    let document = Html::parse_document(body);
    let mut posts = Vec::new();
    for thing in document.select(&THING) {
        if posts.len() >= max_items {
            break;
        }
        if thing.value().classes().any(|c| c == "promoted") {
            continue;
        }
        let Some(title) = thing.select(&TITLE).next() else {
            continue;
        };
        let title = title.text().collect::<String>().trim().to_string();
        let id = bare_id(data_attr(&thing, "data-fullname").unwrap_or_default());
        let permalink = absolutize(site, data_attr(&thing, "data-permalink").unwrap_or_default());
        let raw_url = data_attr(&thing, "data-url").unwrap_or_default();
        let is_self = raw_url.starts_with('/') || raw_url.contains("/comments/");
        let url = if raw_url.is_empty() {
            permalink.clone()
        } else {
            absolutize(site, raw_url)
        };
        let is_gallery = data_attr(&thing, "data-is-gallery") == Some("true");
        posts.push(RawPost {
            id,
            title,
            author: data_attr(&thing, "data-author").map(str::to_string),
            created: data_attr(&thing, "data-timestamp")
                .and_then(|ms| ms.parse::<f64>().ok())
                .map(|ms| Timestamp::from_unix(ms / 1000.0)),
            item_type: Some(classify_item(false, is_gallery, is_self, &url)),
            permalink,
            url: Some(url),
            score: html_score(&thing),
            num_comments: data_attr(&thing, "data-comments-count").and_then(|c| c.parse().ok()),
            nsfw: data_attr(&thing, "data-nsfw") == Some("true"),
            spoiler: data_attr(&thing, "data-spoiler") == Some("true"),
            flair: thing
                .select(&FLAIR)
                .next()
                .map(|f| f.text().collect::<String>().trim().to_string())
                .filter(|f| !f.is_empty()),
            has_media: is_gallery,
            ..RawPost::default()
        });
    }
    posts
}

/// Parse the Atom syndication feed of the last-resort tier.
pub fn parse_listing_feed(body: &str, site: &str) -> Result<Vec<RawPost>, ParseError> {
    let root = parse_document(body)?;
    let mut posts = Vec::new();
    for entry in root.children_named("entry") {
        let link = entry
            .child("link")
            .and_then(|l| l.attr("href"))
            .map(|href| absolutize(site, href))
            .unwrap_or_default();
        let published = entry
            .child_text("published")
            .or_else(|| entry.child_text("updated"));
        let author = entry
            .child("author")
            .and_then(|a| a.child_text("name"))
            .map(|n| n.trim_start_matches("/u/").to_string());
        posts.push(RawPost {
            id: bare_id(&entry.child_text("id").unwrap_or_default()),
            title: entry.child_text("title").unwrap_or_default(),
            author,
            created: published.as_deref().map(Timestamp::parse_feed_date),
            permalink: link.clone(),
            url: Some(link),
            ..RawPost::default()
        });
    }
    Ok(posts)
}
