//! Command-line interface definitions for Daily Digest.
//!
//! This module defines the CLI arguments and subcommands using the `clap`
//! crate. Global options can also be provided via environment variables.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::dashboard::{DateOrder, SocialSort, View};
use crate::models::TimeWindow;

/// Command-line arguments for the Daily Digest application.
///
/// # Examples
///
/// ```sh
/// # Scrape every source into ./data
/// daily_digest -d ./data scrape all
///
/// # Only the yearly listing of two communities
/// daily_digest scrape social --window year --source bestof --source TrueReddit
///
/// # Browse, including read items, and export a report
/// daily_digest dashboard --show-read --markdown digest.md
///
/// # Most discussed posts of one community, oldest news first
/// daily_digest dashboard --source bestof --sort comments --order oldest
///
/// # Mark a news item as read
/// daily_digest read mark dsr_3912
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding the collections and the read-set
    #[arg(short, long, env = "DIGEST_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Optional path to a YAML config file (built-in defaults otherwise)
    #[arg(short, long, env = "DIGEST_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch sources and merge new items into the collections
    #[command(subcommand)]
    Scrape(ScrapeTarget),

    /// List collections, hiding items already read
    Dashboard(DashboardArgs),

    /// Change or inspect the read-set
    #[command(subcommand)]
    Read(MarkerCommand),

    /// Change or inspect favourites
    #[command(subcommand)]
    Fav(MarkerCommand),
}

#[derive(Subcommand, Debug)]
pub enum ScrapeTarget {
    /// Social communities, via the JSON/HTML/feed fallback chain
    Social(SocialArgs),
    /// RSS news feeds with keyword categories
    News,
    /// Today's blog reading list
    Blog,
    /// Everything, social first
    All(SocialArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SocialArgs {
    /// Listing window to fetch
    #[arg(short, long, value_enum, default_value_t = WindowArg::All)]
    pub window: WindowArg,

    /// Restrict to these communities (repeatable; default is every configured one)
    #[arg(short, long = "source")]
    pub sources: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowArg {
    Month,
    Year,
    All,
}

impl WindowArg {
    pub fn windows(self) -> &'static [TimeWindow] {
        match self {
            WindowArg::Month => &[TimeWindow::Month],
            WindowArg::Year => &[TimeWindow::Year],
            WindowArg::All => &TimeWindow::ALL,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DashboardArgs {
    /// Include items already marked as read
    #[arg(long)]
    pub show_read: bool,

    /// Also write a Markdown report to this path
    #[arg(long)]
    pub markdown: Option<PathBuf>,

    /// Also write a JSON snapshot to this path
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Rows shown per tab in the listing and exports (config value otherwise)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Only show this community in the social tabs
    #[arg(short, long)]
    pub source: Option<String>,

    /// Only show this category in the news tab
    #[arg(long)]
    pub category: Option<String>,

    /// Order of the social tabs
    #[arg(long, value_enum, default_value_t = SocialSort::Score)]
    pub sort: SocialSort,

    /// Order of the news and reading-list tabs
    #[arg(long, value_enum, default_value_t = DateOrder::Newest)]
    pub order: DateOrder,
}

impl DashboardArgs {
    pub fn view(&self, default_limit: usize) -> View {
        View {
            show_read: self.show_read,
            source: self.source.clone(),
            category: self.category.clone(),
            sort: self.sort,
            order: self.order,
            row_limit: self.limit.unwrap_or(default_limit),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum MarkerCommand {
    /// Add keys (e.g. `abc123`, `dsr_3912`, `rth_0a1b2c3d4e5f`)
    #[command(alias = "add")]
    Mark { keys: Vec<String> },
    /// Remove keys
    #[command(alias = "remove")]
    Unmark { keys: Vec<String> },
    /// Remove every key
    Clear,
    /// Print every key
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "daily_digest",
            "--data-dir",
            "./store",
            "scrape",
            "social",
            "--window",
            "year",
            "--source",
            "bestof",
            "--source",
            "TrueReddit",
        ]);

        assert_eq!(cli.data_dir, PathBuf::from("./store"));
        match cli.command {
            Command::Scrape(ScrapeTarget::Social(args)) => {
                assert_eq!(args.window, WindowArg::Year);
                assert_eq!(args.window.windows(), &[TimeWindow::Year]);
                assert_eq!(args.sources, vec!["bestof", "TrueReddit"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_short_flags_and_defaults() {
        let cli = Cli::parse_from(["daily_digest", "-d", "/tmp/d", "-c", "/tmp/c.yaml", "scrape", "all"]);

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.yaml")));
        match cli.command {
            Command::Scrape(ScrapeTarget::All(args)) => {
                assert_eq!(args.window.windows(), &TimeWindow::ALL);
                assert!(args.sources.is_empty());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_marker_commands() {
        let cli = Cli::parse_from(["daily_digest", "read", "mark", "abc", "dsr_1"]);
        assert!(matches!(
            cli.command,
            Command::Read(MarkerCommand::Mark { ref keys }) if keys == &["abc", "dsr_1"]
        ));

        let cli = Cli::parse_from(["daily_digest", "fav", "remove", "abc"]);
        assert!(matches!(cli.command, Command::Fav(MarkerCommand::Unmark { .. })));

        let cli = Cli::parse_from(["daily_digest", "dashboard", "--show-read", "--limit", "10"]);
        match cli.command {
            Command::Dashboard(args) => {
                assert!(args.show_read);
                assert_eq!(args.limit, Some(10));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_dashboard_view_options() {
        let cli = Cli::parse_from([
            "daily_digest",
            "dashboard",
            "-s",
            "bestof",
            "--category",
            "Good News",
            "--sort",
            "comments",
            "--order",
            "oldest",
        ]);
        let Command::Dashboard(args) = cli.command else {
            panic!("expected dashboard");
        };
        let view = args.view(50);
        assert_eq!(view.source.as_deref(), Some("bestof"));
        assert_eq!(view.category.as_deref(), Some("Good News"));
        assert_eq!(view.sort, SocialSort::Comments);
        assert_eq!(view.order, DateOrder::Oldest);
        assert_eq!(view.row_limit, 50);
        assert!(!view.show_read);

        let cli = Cli::parse_from(["daily_digest", "dashboard", "--limit", "5"]);
        let Command::Dashboard(args) = cli.command else {
            panic!("expected dashboard");
        };
        let view = args.view(50);
        assert_eq!(view.row_limit, 5);
        assert_eq!(view.sort, SocialSort::Score);
        assert_eq!(view.order, DateOrder::Newest);
    }
}
