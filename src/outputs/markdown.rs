//! Markdown report of the dashboard.
//!
//! The report opens with a table of contents linking to one section per
//! tab, favourites last. Each entry shows the title as a link, its read key in backticks and
//! a short detail line; favourites are starred.

use std::fmt::Write;
use std::path::Path;
use tracing::{info, instrument};

use crate::dashboard::{Dashboard, Entry, Tab};
use crate::models::SourceKind;
use crate::error::PersistenceError;
use crate::store::write_atomic;
use crate::utils::{preview, slugify_title, upcase};

const PREVIEW_CHARS: usize = 200;

fn entry_to_markdown(out: &mut String, e: &Entry) {
    let r = &e.record;
    let star = if e.is_favorite { "★ " } else { "" };
    let _ = writeln!(out, "### {star}[{}]({})\n", r.title.trim(), r.url);

    let detail = match r.source {
        SourceKind::Social => format!(
            "{} points · {} comments · r/{} · u/{}",
            r.engagement_score, r.comment_count, r.origin, r.author
        ),
        SourceKind::News => format!(
            "{} · {} · {}",
            r.category.as_deref().unwrap_or_default(),
            r.author,
            r.published_at
        ),
        SourceKind::BlogDigest => format!("via {}", r.author),
    };
    let _ = writeln!(out, "<small>`{}` · {}</small>\n", e.read_key, detail);

    let body = r.body_preview.trim();
    if !body.is_empty() {
        let _ = writeln!(out, "> {}\n", preview(body, PREVIEW_CHARS).replace('\n', " "));
    }
}

/// Render the whole dashboard as a Markdown document.
pub fn dashboard_to_markdown(dash: &Dashboard, generated: &str) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Daily Digest\n");
    let _ = writeln!(md, "_Generated {generated}. {}_\n", dash.summary());

    for warning in &dash.warnings {
        let _ = writeln!(md, "> **Warning:** {warning}\n");
    }

    let _ = writeln!(md, "## Contents\n");
    for tab in Tab::ALL {
        let _ = writeln!(
            md,
            "- [{}](#{}) ({})",
            tab.title(),
            slugify_title(tab.title()),
            dash.tab(tab).len()
        );
    }
    md.push('\n');

    for tab in Tab::ALL {
        let _ = writeln!(md, "## {}\n", tab.title());
        let rows = dash.tab(tab);
        if rows.is_empty() {
            let _ = writeln!(md, "_Nothing {} here._\n", if dash.hidden_read > 0 { "unread" } else { "new" });
            continue;
        }
        let shown = dash.shown(tab);
        for e in shown {
            entry_to_markdown(&mut md, e);
        }
        if shown.len() < rows.len() {
            let _ = writeln!(md, "_Showing {} of {}._\n", shown.len(), rows.len());
        }
    }
    let sources = Tab::ALL
        .iter()
        .flat_map(|t| dash.tab(*t))
        .map(|e| e.record.source.label())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .map(upcase)
        .collect::<Vec<_>>()
        .join(", ");
    if !sources.is_empty() {
        let _ = writeln!(md, "---\n\nSources: {sources}");
    }
    md
}

/// Write the report to `path`, replacing any previous one.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn write_report(dash: &Dashboard, path: &Path, generated: &str) -> Result<(), PersistenceError> {
    let md = dashboard_to_markdown(dash, generated);
    write_atomic(path, md.as_bytes())?;
    info!(bytes = md.len(), "Wrote Markdown report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CanonicalRecord, Timestamp, TimeWindow};

    fn social(id: &str, favorite: bool) -> Entry {
        Entry {
            record: CanonicalRecord {
                id: id.into(),
                source: SourceKind::Social,
                category: None,
                title: "Chart of the year".into(),
                author: "ann".into(),
                url: "https://site.test/r/x/comments/abc/".into(),
                body_preview: "line one\nline two".into(),
                published_at: Timestamp::default(),
                engagement_score: 4521,
                comment_count: 88,
                scraped_at: None,
                origin: "dataisbeautiful".into(),
                time_window: Some(TimeWindow::Month),
            },
            read_key: id.into(),
            is_read: false,
            is_favorite: favorite,
        }
    }

    #[test]
    fn report_has_contents_sections_and_entries() {
        let dash = Dashboard {
            monthly: vec![social("abc", true)],
            warnings: vec!["could not decode news".into()],
            ..Dashboard::default()
        };
        let md = dashboard_to_markdown(&dash, "2024-05-06");

        assert!(md.starts_with("# Daily Digest\n"));
        assert!(md.contains("- [Top of the Month](#top-of-the-month) (1)"));
        assert!(md.contains("## Reading List\n\n_Nothing new here._"));
        assert!(md.contains("### ★ [Chart of the year](https://site.test/r/x/comments/abc/)"));
        assert!(md.contains("`abc` · 4521 points · 88 comments · r/dataisbeautiful · u/ann"));
        assert!(md.contains("> line one line two"));
        assert!(md.contains("> **Warning:** could not decode news"));
        assert!(md.ends_with("Sources: Social\n"));
    }

    #[test]
    fn long_tabs_are_cut_at_the_row_limit() {
        let dash = Dashboard {
            favorites: vec![social("a", true), social("b", true), social("c", true)],
            row_limit: 2,
            ..Dashboard::default()
        };
        let md = dashboard_to_markdown(&dash, "today");
        assert!(md.contains("- [Favorites](#favorites) (3)"));
        assert_eq!(md.matches("### ★ ").count(), 2);
        assert!(md.contains("_Showing 2 of 3._"));
    }

    #[test]
    fn report_is_written_to_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out").join("digest.md");
        write_report(&Dashboard::default(), &path, "today").unwrap();
        let md = std::fs::read_to_string(&path).unwrap();
        assert!(md.contains("## News"));
        assert!(!md.contains("Sources:"));
    }
}
