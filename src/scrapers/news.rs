//! RSS news scraper with keyword categories.
//!
//! Every configured feed is fetched in turn with a fixed politeness delay.
//! Items seen in several feeds are kept once, remembering every feed they
//! came from. Each unique item is then classified against the keyword
//! categories and expanded into one row per matching category; items that
//! match nothing are not stored.

use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::NewsSettings;
use crate::error::{ParseError, PersistenceError};
use crate::models::{RawArticle, Timestamp};
use crate::normalize::{classify, expand, news_article_id, strip_html};
use crate::scrapers::RunReport;
use crate::scrapers::http::{HttpFetch, Pacer, fetch_ok};
use crate::scrapers::xml::{XmlElement, parse_document};
use crate::store::Store;

const UNKNOWN_AUTHOR: &str = "Unknown";

/// Short label for a feed: its URL path, e.g. `business/rss.xml`.
pub fn feed_source(feed_url: &str) -> String {
    Url::parse(feed_url)
        .ok()
        .map(|u| u.path().trim_matches('/').to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| feed_url.to_string())
}

fn parse_item(item: &XmlElement, source: &str) -> Result<RawArticle, ParseError> {
    let title = item
        .child_text("title")
        .filter(|t| !t.is_empty())
        .ok_or(ParseError::MissingField("title"))?;
    let link = item
        .child_text("link")
        .filter(|l| !l.is_empty())
        .ok_or(ParseError::MissingField("link"))?;
    let guid = item.child_text("guid");
    let author = item
        .child_qualified("dc:creator")
        .or_else(|| item.child("creator"))
        .map(XmlElement::text)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
    let published_at = item
        .child_text("pubDate")
        .filter(|d| !d.is_empty())
        .map(|d| Timestamp::parse_feed_date(&d))
        .unwrap_or_default();

    Ok(RawArticle {
        article_id: news_article_id(guid.as_deref(), &link),
        description: item
            .child("description")
            .map(|d| strip_html(&d.text()))
            .unwrap_or_default(),
        title: strip_html(&title),
        url: link,
        published_at,
        author,
        feed_source: source.to_string(),
    })
}

/// Parse an RSS 2.0 document. Incomplete items are skipped one by one.
pub fn parse_feed(xml: &str, feed_url: &str) -> Result<Vec<RawArticle>, ParseError> {
    let root = parse_document(xml)?;
    let Some(channel) = root.child("channel") else {
        warn!(%feed_url, root = %root.name, "Feed has no channel");
        return Ok(Vec::new());
    };
    let source = feed_source(feed_url);
    let mut out = Vec::new();
    for item in channel.children_named("item") {
        match parse_item(item, &source) {
            Ok(article) => out.push(article),
            Err(e) => debug!(%feed_url, error = %e, "Skipping feed item"),
        }
    }
    Ok(out)
}

/// Keep the first occurrence of each article id, joining the feed sources
/// of later duplicates into it.
pub fn dedup_across_feeds(articles: Vec<RawArticle>) -> Vec<RawArticle> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<RawArticle> = Vec::new();
    for article in articles {
        match index.get(&article.article_id) {
            Some(&i) => {
                let kept = &mut unique[i];
                if !kept.feed_source.split(", ").any(|s| s == article.feed_source) {
                    kept.feed_source = format!("{}, {}", kept.feed_source, article.feed_source);
                }
            }
            None => {
                index.insert(article.article_id.clone(), unique.len());
                unique.push(article);
            }
        }
    }
    unique
}

/// Fetch every feed, classify and merge the matching rows.
#[instrument(level = "info", skip_all, fields(feeds = settings.feeds.len()))]
pub async fn run<H: HttpFetch>(
    http: &H,
    store: &Store,
    settings: &NewsSettings,
) -> Result<RunReport, PersistenceError> {
    let pacer = Pacer::new(settings.delay_secs);
    let mut report = RunReport::default();
    let mut fetched = Vec::new();

    for (i, feed_url) in settings.feeds.iter().enumerate() {
        if i > 0 {
            pacer.pause().await;
        }
        let parsed = fetch_ok(http, feed_url)
            .await
            .map_err(|e| e.to_string())
            .and_then(|body| parse_feed(&body, feed_url).map_err(|e| e.to_string()));
        match parsed {
            Ok(articles) => {
                info!(%feed_url, count = articles.len(), "Parsed feed");
                report.units_ok += 1;
                fetched.extend(articles);
            }
            Err(e) => {
                warn!(%feed_url, error = %e, "Skipping feed");
                report.units_failed += 1;
            }
        }
    }
    report.fetched = fetched.len();

    let unique = dedup_across_feeds(fetched);
    let scraped_at = Timestamp::now();
    let mut rows = Vec::new();
    for article in &unique {
        let matches = classify(article, &settings.categories);
        rows.extend(expand(article, &matches, settings.max_keywords_stored, &scraped_at));
    }
    info!(unique = unique.len(), rows = rows.len(), "Classified articles");

    let merged = store.merge_into(&store.news_path(), rows)?;
    report.added = merged.added;
    Ok(report)
}
