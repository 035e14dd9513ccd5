//! Blog reading-list scraper.
//!
//! The blog publishes a daily post of curated outbound links. The scrape
//! runs in two steps: find the newest reading-list post on the category
//! page, then extract one entry per list item of that post.
//!
//! Per list item only the first anchor counts. The anchor text names the
//! publication and becomes the author; the remaining item text is split
//! into title and description. Posts laid out as paragraphs rather than a
//! list fall back to scanning every link in the content.

use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::BlogSettings;
use crate::error::{ParseError, PersistenceError};
use crate::models::{RawDigestItem, Timestamp};
use crate::normalize::digest_record;
use crate::scrapers::RunReport;
use crate::scrapers::http::{HttpFetch, Pacer, fetch_ok};
use crate::store::Store;
use crate::utils::strip_leading_bullets;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));
static LIST_ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse("li").expect("valid selector"));
static CONTENT: Lazy<[Selector; 3]> = Lazy::new(|| {
    ["div.entry-content", "article", "div.post-content"]
        .map(|s| Selector::parse(s).expect("valid selector"))
});

const POST_MARKERS: [&str; 4] = ["am-reads", "weekend-reads", "am reads", "weekend reads"];
const BLOCKED_LINKS: [&str; 7] = [
    "twitter", "facebook", "linkedin", "rss", "mailto:", "/intent/", "share?",
];
const SITE_SECTIONS: [&str; 4] = ["/category/", "/tag/", "/author/", "/page/"];
const MIN_LINK_TEXT_CHARS: usize = 3;
/// Stricter minimum when scanning links outside list items.
const MIN_LOOSE_LINK_TEXT_CHARS: usize = 5;
const MAX_TITLE_CHARS: usize = 200;
const UNTITLED: &str = "Untitled";
const SEPARATORS: [&str; 3] = [" : ", " - ", ": "];

fn normalized_host(url: &Url) -> Option<&str> {
    url.host_str().map(|h| h.trim_start_matches("www."))
}

fn same_host(a: &Url, b: &Url) -> bool {
    match (normalized_host(a), normalized_host(b)) {
        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

fn is_blocked(href: &str) -> bool {
    let lower = href.to_lowercase();
    BLOCKED_LINKS.iter().any(|b| lower.contains(b))
}

/// Locate the newest reading-list post linked from the category page.
pub fn find_post_url(html: &str, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let document = Html::parse_document(html);
    document.select(&ANCHOR).find_map(|a| {
        let href = a.value().attr("href")?.trim();
        if is_blocked(href) {
            return None;
        }
        let resolved = base.join(href).ok()?;
        if !same_host(&resolved, &base) || SITE_SECTIONS.iter().any(|s| resolved.path().contains(s)) {
            return None;
        }
        let text = a.text().collect::<String>().to_lowercase();
        let path = resolved.path().to_lowercase();
        POST_MARKERS
            .iter()
            .any(|m| path.contains(m) || text.contains(m))
            .then(|| resolved.to_string())
    })
}

/// Split cleaned item text into title and description.
fn split_title(text: &str) -> (String, String) {
    for sep in SEPARATORS {
        if let Some((title, description)) = text.split_once(sep) {
            return (
                strip_leading_bullets(title.trim()).to_string(),
                strip_leading_bullets(description.trim()).to_string(),
            );
        }
    }
    (text.trim().to_string(), String::new())
}

fn item_text(el: &ElementRef<'_>) -> String {
    el.text().map(str::trim).filter(|t| !t.is_empty()).join(" ")
}

/// Title and description from the text around a link, with the link text
/// itself and any leading bullets removed.
fn split_around_link(container: &ElementRef<'_>, link_text: &str) -> (String, String) {
    let full = item_text(container);
    let rest = strip_leading_bullets(full.replacen(link_text, "", 1).trim()).to_string();
    let (title, description) = split_title(&rest);
    (title.chars().take(MAX_TITLE_CHARS).collect(), description)
}

/// Nearest enclosing list item, else paragraph, else division.
fn text_container<'a>(anchor: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    ["li", "p", "div"].iter().find_map(|tag| {
        anchor
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == *tag)
    })
}

/// Extract up to `max_items` links from a reading-list post.
///
/// List items are read first, one link each. A post with no usable list
/// item is scanned link by link instead, taking the text around each link
/// from its enclosing item, paragraph or division.
///
/// # Arguments
///
/// * `html` - The post page
/// * `page_url` - Where the post was fetched from; resolves relative links
///   and decides which links are the blog's own
/// * `max_items` - Cap on returned entries
///
/// # Returns
///
/// Entries in page order, or [`ParseError::NoContent`] when the page has no
/// recognizable content container.
///
/// # Examples
///
/// ```ignore
/// let items = extract_items(&body, "https://blog.test/2024/05/10-am-reads/", 12)?;
/// for item in &items {
///     println!("{}: {}", item.author, item.title);
/// }
/// ```
pub fn extract_items(
    html: &str,
    page_url: &str,
    max_items: usize,
) -> Result<Vec<RawDigestItem>, ParseError> {
    let base = Url::parse(page_url).map_err(|e| ParseError::InvalidUrl(format!("{page_url}: {e}")))?;
    let document = Html::parse_document(html);
    let content = CONTENT
        .iter()
        .find_map(|sel| document.select(sel).next())
        .ok_or(ParseError::NoContent)?;

    let items = list_items(&content, &base, page_url, max_items);
    if !items.is_empty() {
        return Ok(items);
    }
    debug!("No usable list items; scanning every link");
    Ok(loose_links(&content, &base, page_url, max_items))
}

fn list_items(
    content: &ElementRef<'_>,
    base: &Url,
    page_url: &str,
    max_items: usize,
) -> Vec<RawDigestItem> {
    let mut items = Vec::new();
    for li in content.select(&LIST_ITEM) {
        if items.len() >= max_items {
            break;
        }
        let Some(anchor) = li.select(&ANCHOR).next() else {
            continue;
        };
        let href = anchor.value().attr("href").unwrap_or_default().trim();
        let link_text = anchor.text().collect::<String>().trim().to_string();
        if href.is_empty() || link_text.chars().count() < MIN_LINK_TEXT_CHARS || is_blocked(href) {
            continue;
        }
        let Ok(target) = base.join(href) else {
            debug!(%href, "Unresolvable link");
            continue;
        };
        if same_host(&target, base) {
            debug!(%target, "Dropping same-host link");
            continue;
        }

        let (mut title, description) = split_around_link(&li, &link_text);
        if title.is_empty() {
            title = link_text.chars().take(MAX_TITLE_CHARS).collect();
        }
        items.push(RawDigestItem {
            url: target.to_string(),
            author: link_text,
            title,
            description,
            source_post: page_url.to_string(),
        });
    }
    items
}

fn loose_links(
    content: &ElementRef<'_>,
    base: &Url,
    page_url: &str,
    max_items: usize,
) -> Vec<RawDigestItem> {
    let mut items = Vec::new();
    for anchor in content.select(&ANCHOR) {
        if items.len() >= max_items {
            break;
        }
        let href = anchor.value().attr("href").unwrap_or_default().trim();
        let link_text = anchor.text().collect::<String>().trim().to_string();
        if href.is_empty() || link_text.chars().count() < MIN_LOOSE_LINK_TEXT_CHARS || is_blocked(href) {
            continue;
        }
        let Ok(target) = base.join(href) else {
            debug!(%href, "Unresolvable link");
            continue;
        };
        if same_host(&target, base) && SITE_SECTIONS.iter().any(|s| target.path().contains(s)) {
            debug!(%target, "Dropping site navigation link");
            continue;
        }

        let (title, description) = match text_container(&anchor) {
            Some(container) => split_around_link(&container, &link_text),
            None => (String::new(), String::new()),
        };
        items.push(RawDigestItem {
            url: target.to_string(),
            author: link_text,
            title: if title.is_empty() { UNTITLED.to_string() } else { title },
            description,
            source_post: page_url.to_string(),
        });
    }
    items
}

/// Find today's post, extract its links and merge them into the store.
#[instrument(level = "info", skip_all, fields(category = %settings.category_url))]
pub async fn run<H: HttpFetch>(
    http: &H,
    store: &Store,
    settings: &BlogSettings,
) -> Result<RunReport, PersistenceError> {
    let mut report = RunReport::default();
    let category = match fetch_ok(http, &settings.category_url).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Could not fetch category page");
            report.units_failed += 1;
            return Ok(report);
        }
    };
    let Some(post_url) = find_post_url(&category, &settings.category_url) else {
        warn!("No reading-list post found on category page");
        report.units_failed += 1;
        return Ok(report);
    };
    info!(%post_url, "Found reading-list post");

    Pacer::new(settings.delay_secs).pause().await;

    let post = match fetch_ok(http, &post_url).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Could not fetch reading-list post");
            report.units_failed += 1;
            return Ok(report);
        }
    };
    let items = match extract_items(&post, &post_url, settings.max_items) {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "Could not extract links");
            report.units_failed += 1;
            return Ok(report);
        }
    };
    report.fetched = items.len();

    let scraped_at = Timestamp::now();
    let rows = items
        .into_iter()
        .map(|item| digest_record(item, settings.description_chars, &scraped_at))
        .collect();
    let merged = store.merge_into(&store.digest_path(), rows)?;
    report.added = merged.added;
    report.units_ok = 1;
    info!(fetched = report.fetched, added = report.added, "Blog scrape finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DigestRecord;
    use crate::scrapers::http::testing::StubHttp;
    use crate::store::load_collection;

    const CATEGORY_URL: &str = "https://blog.test/category/links/";
    const POST_URL: &str = "https://blog.test/2024/05/10-friday-am-reads-123/";

    const CATEGORY_PAGE: &str = r#"<html><body>
      <a href="https://twitter.com/intent/tweet?url=am-reads">share</a>
      <a href="/category/links/page/2/">Older AM Reads</a>
      <a href="https://other.test/am-reads-copy/">Elsewhere</a>
      <a href="https://blog.test/2024/05/10-friday-am-reads-123/">Friday AM Reads</a>
      <a href="https://blog.test/2024/05/09-thursday-am-reads-122/">Thursday AM Reads</a>
    </body></html>"#;

    const POST_PAGE: &str = r#"<html><body>
      <nav><ul><li><a href="https://paper.test/nav">Navigation link</a></li></ul></nav>
      <div class="entry-content">
        <p>My morning reads:</p>
        <ul>
          <li>• <a href="https://www.nytimes.test/markets">New York Times</a> Markets Rally : Stocks rose on Friday.</li>
          <li><a href="https://wsj.test/a">WSJ</a> <a href="https://wsj.test/b">second</a> Rates Hold - Fed keeps rates</li>
          <li><a href="/2024/05/older-post/">Our earlier post</a> about stuff</li>
          <li><a href="https://blog.test/about/">About</a> same host absolute</li>
          <li><a href="https://ft.test/x">FT.com</a> Title Only</li>
          <li><a href="https://ab.test/x">AB</a> too short link text</li>
          <li><a href="https://www.facebook.com/sharer">Facebook</a> share me</li>
          <li>No link in this item</li>
          <li><a href="https://bbc.test/y">BBC</a> : Colon Title: colon description</li>
        </ul>
      </div>
    </body></html>"#;

    #[test]
    fn finds_first_post_on_same_host() {
        assert_eq!(find_post_url(CATEGORY_PAGE, CATEGORY_URL).as_deref(), Some(POST_URL));
        assert_eq!(find_post_url("<html></html>", CATEGORY_URL), None);
    }

    #[test]
    fn weekend_posts_qualify() {
        let html = r#"<a href="/2024/05/11-weekend-reads-9/">x</a>"#;
        assert_eq!(
            find_post_url(html, CATEGORY_URL).as_deref(),
            Some("https://blog.test/2024/05/11-weekend-reads-9/")
        );
    }

    #[test]
    fn extracts_first_anchor_and_drops_same_host() {
        let items = extract_items(POST_PAGE, POST_URL, 12).unwrap();
        let urls: Vec<&str> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.nytimes.test/markets",
                "https://wsj.test/a",
                "https://ft.test/x",
                "https://bbc.test/y",
            ]
        );

        let nyt = &items[0];
        assert_eq!(nyt.author, "New York Times");
        assert_eq!(nyt.title, "Markets Rally");
        assert_eq!(nyt.description, "Stocks rose on Friday.");
        assert_eq!(nyt.source_post, POST_URL);

        let wsj = &items[1];
        assert_eq!(wsj.author, "WSJ");
        assert_eq!(wsj.title, "second Rates Hold");
        assert_eq!(wsj.description, "Fed keeps rates");

        assert_eq!(items[2].title, "Title Only");
        assert_eq!(items[2].description, "");

        assert_eq!(items[3].title, "Colon Title");
        assert_eq!(items[3].description, "colon description");
    }

    #[test]
    fn extraction_is_capped() {
        assert_eq!(extract_items(POST_PAGE, POST_URL, 2).unwrap().len(), 2);
    }

    #[test]
    fn missing_container_is_an_error() {
        let err = extract_items("<html><body><ul><li>x</li></ul></body></html>", POST_URL, 12);
        assert!(matches!(err, Err(ParseError::NoContent)));
    }

    #[test]
    fn article_container_is_a_fallback() {
        let html = r#"<article><ul><li><a href="https://x.test/1">Reuters</a> Headline - body</li></ul></article>"#;
        let items = extract_items(html, POST_URL, 12).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Headline");
    }

    const PARAGRAPH_POST: &str = r#"<html><body><div class="entry-content">
      <p><a href="https://bloomberg.test/a">Bloomberg</a> : Oil Slips : Supply worries ease.</p>
      <p>Also: <a href="https://blog.test/category/links/">Category link</a></p>
      <p><a href="https://nyt.test/b">NYT</a> short link text</p>
      <p><a href="https://www.linkedin.com/share">LinkedIn share</a></p>
      <p><a href="https://reuters.test/c">Reuters</a></p>
      <div><a href="https://blog.test/2024/05/older-am-reads/">Yesterday's reads</a> - earlier list</div>
    </div></body></html>"#;

    #[test]
    fn paragraph_posts_fall_back_to_every_link() {
        let items = extract_items(PARAGRAPH_POST, POST_URL, 12).unwrap();
        let urls: Vec<&str> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://bloomberg.test/a",
                "https://reuters.test/c",
                "https://blog.test/2024/05/older-am-reads/",
            ]
        );

        assert_eq!(items[0].author, "Bloomberg");
        assert_eq!(items[0].title, "Oil Slips");
        assert_eq!(items[0].description, "Supply worries ease.");

        assert_eq!(items[1].author, "Reuters");
        assert_eq!(items[1].title, "Untitled");
        assert_eq!(items[1].description, "");

        assert_eq!(items[2].title, "earlier list");
    }

    #[test]
    fn list_items_take_precedence_over_loose_links() {
        let html = r#"<div class="entry-content">
          <p><a href="https://para.test/1">Paragraph source</a> ignored</p>
          <ul><li><a href="https://list.test/1">Listed</a> Kept - yes</li></ul>
        </div>"#;
        let items = extract_items(html, POST_URL, 12).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://list.test/1");
    }

    #[test]
    fn titles_are_capped() {
        let long = "x".repeat(300);
        let html = format!(
            r#"<div class="entry-content"><ul><li><a href="https://a.test/">Source</a> {long} - d</li></ul>
               </div>"#
        );
        let items = extract_items(&html, POST_URL, 12).unwrap();
        assert_eq!(items[0].title.chars().count(), 200);
        assert_eq!(items[0].description, "d");
    }

    #[tokio::test]
    async fn run_merges_extracted_links() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        let settings = BlogSettings {
            category_url: CATEGORY_URL.into(),
            delay_secs: crate::config::Bounds::new(0.0, 0.0),
            ..BlogSettings::default()
        };
        let http = StubHttp::new()
            .with(CATEGORY_URL, 200, CATEGORY_PAGE)
            .with(POST_URL, 200, POST_PAGE);

        let report = run(&http, &store, &settings).await.unwrap();
        assert_eq!(report.units_ok, 1);
        assert_eq!(report.added, 4);

        let again = run(&http, &store, &settings).await.unwrap();
        assert_eq!(again.added, 0);

        let saved: Vec<DigestRecord> = load_collection(&store.digest_path()).unwrap();
        assert_eq!(saved.len(), 4);
        assert_eq!(saved[0].author, "New York Times");
    }

    #[tokio::test]
    async fn unreachable_category_page_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path());
        let settings = BlogSettings {
            category_url: CATEGORY_URL.into(),
            ..BlogSettings::default()
        };
        let report = run(&StubHttp::new(), &store, &settings).await.unwrap();
        assert_eq!(report.units_failed, 1);
        assert!(!store.digest_path().exists());
    }
}
