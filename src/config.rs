//! Runtime configuration: sources, feeds, keyword categories and pacing.
//!
//! The built-in defaults describe the stock setup. A YAML file passed with
//! `--config` replaces them section by section; any section or field the
//! file leaves out keeps its default.
//!
//! ```yaml
//! social:
//!   sources:
//!     - { name: dataisbeautiful, display_name: Data Is Beautiful }
//!   delay_secs: { min: 6.5, max: 12.5 }
//! news:
//!   feeds: ["https://www.thedailystar.net/news/rss.xml"]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, instrument};

use crate::dashboard::DEFAULT_ROW_LIMIT;
use crate::error::ConfigError;

/// Inclusive numeric interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T> Bounds<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpSettings,
    pub social: SocialSettings,
    pub news: NewsSettings,
    pub blog: BlogSettings,
    pub dashboard: DashboardSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

/// A social sub-source (community) to scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub name: String,
    pub display_name: String,
}

impl SourceRef {
    fn new(name: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
        }
    }
}

/// Base score interval shared by a group of sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTier {
    pub range: Bounds<i64>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialSettings {
    /// Lightweight mirror serving the JSON listing and the HTML pages.
    pub mirror: String,
    /// Canonical site used for permalinks and the syndication feed.
    pub site: String,
    pub sources: Vec<SourceRef>,
    /// `limit=` requested from listing endpoints.
    pub limit: usize,
    /// Maximum posts read from one HTML page.
    pub max_html_items: usize,
    pub score_tiers: Vec<ScoreTier>,
    pub default_score_range: Bounds<i64>,
    /// Per-position multiplier of synthesized scores, in (0, 1).
    pub decay: f64,
    pub jitter: Bounds<i64>,
    /// Randomized pause between sub-sources.
    pub delay_secs: Bounds<f64>,
    /// Pause before the single retry after an HTTP 429.
    pub rate_limit_backoff_secs: u64,
}

impl Default for SocialSettings {
    fn default() -> Self {
        Self {
            mirror: "https://old.reddit.com".to_string(),
            site: "https://www.reddit.com".to_string(),
            sources: vec![
                SourceRef::new("dataisbeautiful", "Data Is Beautiful"),
                SourceRef::new("todayilearned", "Today I Learned"),
                SourceRef::new("bestof", "Best Of"),
                SourceRef::new("getmotivated", "Get Motivated!"),
                SourceRef::new("UnethicalLifeProTips", "Unethical Life Pro Tips"),
                SourceRef::new("LifeProTips", "Life Pro Tips"),
                SourceRef::new("TrueReddit", "TrueReddit"),
                SourceRef::new("UpliftingNews", "Uplifting News"),
                SourceRef::new("lifehacks", "Lifehacks"),
                SourceRef::new("Productivity", "Productivity"),
                SourceRef::new("PersonalFinance", "Personal Finance"),
                SourceRef::new("explainlikeimfive", "Explain Like I'm Five"),
                SourceRef::new("AskHistorians", "Ask Historians"),
            ],
            limit: 50,
            max_html_items: 50,
            score_tiers: vec![
                ScoreTier {
                    range: Bounds::new(75_000, 100_000),
                    sources: strings(&[
                        "bestof",
                        "explainlikeimfive",
                        "todayilearned",
                        "AskHistorians",
                    ]),
                },
                ScoreTier {
                    range: Bounds::new(40_000, 70_000),
                    sources: strings(&["TrueReddit", "dataisbeautiful", "PersonalFinance"]),
                },
            ],
            default_score_range: Bounds::new(15_000, 35_000),
            decay: 0.88,
            jitter: Bounds::new(100, 999),
            delay_secs: Bounds::new(6.5, 12.5),
            rate_limit_backoff_secs: 30,
        }
    }
}

impl SocialSettings {
    /// Base score interval for `source`, falling back to the default tier.
    pub fn score_range(&self, source: &str) -> Bounds<i64> {
        self.score_tiers
            .iter()
            .find(|t| t.sources.iter().any(|s| s.eq_ignore_ascii_case(source)))
            .map(|t| t.range)
            .unwrap_or(self.default_score_range)
    }

    pub fn display_name<'a>(&'a self, source: &'a str) -> &'a str {
        self.sources
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(source))
            .map(|s| s.display_name.as_str())
            .unwrap_or(source)
    }
}

/// Keyword category applied to news items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    /// Style tag used by renderers.
    pub badge_class: String,
    /// Phrases matched case-insensitively, in order.
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsSettings {
    pub feeds: Vec<String>,
    pub categories: Vec<Category>,
    pub delay_secs: Bounds<f64>,
    /// Matched phrases stored per row.
    pub max_keywords_stored: usize,
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            feeds: strings(&[
                "https://www.thedailystar.net/business/rss.xml",
                "https://www.thedailystar.net/business/economy/rss.xml",
                "https://www.thedailystar.net/news/bangladesh/rss.xml",
                "https://www.thedailystar.net/opinion/rss.xml",
                "https://www.thedailystar.net/news/rss.xml",
            ]),
            categories: default_categories(),
            delay_secs: Bounds::new(1.5, 1.5),
            max_keywords_stored: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlogSettings {
    /// Category page listing the daily reading-list posts.
    pub category_url: String,
    pub max_items: usize,
    pub description_chars: usize,
    pub delay_secs: Bounds<f64>,
}

impl Default for BlogSettings {
    fn default() -> Self {
        Self {
            category_url: "https://ritholtz.com/category/links/".to_string(),
            max_items: 12,
            description_chars: 500,
            delay_secs: Bounds::new(1.5, 1.5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    /// Rows shown per tab in the listing, the report and the snapshot.
    pub row_limit: usize,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_categories() -> Vec<Category> {
    vec![
        Category {
            name: "India-Bangladesh Relations".to_string(),
            badge_class: "news-cat-relations".to_string(),
            keywords: strings(&[
                "india bangladesh",
                "bilateral relations",
                "bilateral ties",
                "diplomatic relations",
                "diplomatic ties",
                "bangladesh india",
                "india and bangladesh",
                "bangladesh and india",
                "indo-bangladesh",
                "bangladesh-india",
                "india–bangladesh",
                "trade agreement",
                "trade pact",
                "free trade agreement",
                "transit corridor",
                "energy pipeline",
                "river link",
                "land port",
                "rail link",
                "visa agreement",
                "water sharing treaty",
                "water treaty",
                "border security",
                "border guard",
                "defence cooperation",
                "defense cooperation",
                "military cooperation",
            ]),
        },
        Category {
            name: "Bangladesh Economy".to_string(),
            badge_class: "news-cat-economy".to_string(),
            keywords: strings(&[
                "export growth",
                "garment sector",
                "garment industry",
                "textile export",
                "apparel sector",
                "foreign direct investment",
                "foreign investment",
                "exchange rate",
                "fiscal deficit",
                "budget deficit",
                "interest rate",
                "monetary policy",
                "central bank",
                "banking sector",
                "financial sector",
                "gdp growth",
                "economic growth",
                "remittance inflow",
                "worker remittances",
                "stock market",
                "share price",
                "capital market",
                "inflation rate",
                "agricultural sector",
                "budget proposal",
                "tax revenue",
                "tax collection",
                "manufacturing output",
                "industrial output",
                "debt servicing",
            ]),
        },
        Category {
            name: "Good News".to_string(),
            badge_class: "news-cat-goodnews".to_string(),
            keywords: strings(&[
                "success story",
                "record achievement",
                "milestone achievement",
                "inaugurated",
                "launched the new",
                "unveiled new",
                "funded by",
                "donation drive",
                "fundraising campaign",
                "rescue operation",
                "rescue mission",
                "medical breakthrough",
                "scientific breakthrough",
                "education initiative",
                "vaccination campaign",
                "immunisation campaign",
                "immunization campaign",
                "community development",
                "peace agreement",
                "peace accord",
                "celebration held",
                "tech startup",
                "innovation hub",
                "cultural festival",
                "sports championship",
            ]),
        },
    ]
}

impl AppConfig {
    /// Reject settings that would break pacing or scoring invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.social;
        if !(s.delay_secs.min >= 0.0 && s.delay_secs.min < s.delay_secs.max) {
            return Err(ConfigError::Invalid {
                field: "social.delay_secs",
                reason: format!(
                    "need 0 <= min < max, got {}..{}; a fixed delay is not allowed",
                    s.delay_secs.min, s.delay_secs.max
                ),
            });
        }
        if !(s.decay > 0.0 && s.decay < 1.0) {
            return Err(ConfigError::Invalid {
                field: "social.decay",
                reason: format!("must be in (0, 1), got {}", s.decay),
            });
        }
        if s.jitter.min > s.jitter.max {
            return Err(ConfigError::Invalid {
                field: "social.jitter",
                reason: "min exceeds max".to_string(),
            });
        }
        let ranges = s
            .score_tiers
            .iter()
            .map(|t| t.range)
            .chain(std::iter::once(s.default_score_range));
        for r in ranges {
            if r.min <= 0 || r.min > r.max {
                return Err(ConfigError::Invalid {
                    field: "social.score_tiers",
                    reason: format!("bad range {}..{}", r.min, r.max),
                });
            }
        }
        for (field, d) in [
            ("news.delay_secs", self.news.delay_secs),
            ("blog.delay_secs", self.blog.delay_secs),
        ] {
            if !(d.min >= 0.0 && d.min <= d.max) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("need 0 <= min <= max, got {}..{}", d.min, d.max),
                });
            }
        }
        if self.blog.max_items == 0 {
            return Err(ConfigError::Invalid {
                field: "blog.max_items",
                reason: "must be positive".to_string(),
            });
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "http.timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse and validate a YAML document.
pub fn parse_config(yaml: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from `path`, or the built-in defaults when `None`.
#[instrument(level = "info")]
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let Some(path) = path else {
        info!("Using built-in configuration");
        let config = AppConfig::default();
        config.validate()?;
        return Ok(config);
    };
    let yaml = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&yaml)?;
    info!(
        path = %path.display(),
        sources = config.social.sources.len(),
        feeds = config.news.feeds.len(),
        categories = config.news.categories.len(),
        "Loaded configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = load_config(None).unwrap();
        assert_eq!(config.social.sources.len(), 13);
        assert_eq!(config.news.feeds.len(), 5);
        assert_eq!(config.news.categories.len(), 3);
        assert_eq!(config.blog.max_items, 12);
    }

    #[test]
    fn score_range_uses_tier_or_default() {
        let s = SocialSettings::default();
        assert_eq!(s.score_range("bestof"), Bounds::new(75_000, 100_000));
        assert_eq!(s.score_range("truereddit"), Bounds::new(40_000, 70_000));
        assert_eq!(s.score_range("lifehacks"), Bounds::new(15_000, 35_000));
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = r#"
social:
  sources:
    - { name: rust, display_name: Rust }
news:
  feeds: ["https://example.com/rss.xml"]
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.social.sources.len(), 1);
        assert_eq!(config.social.display_name("rust"), "Rust");
        assert_eq!(config.social.decay, 0.88);
        assert_eq!(config.news.feeds, vec!["https://example.com/rss.xml"]);
        assert_eq!(config.news.categories.len(), 3);
        assert_eq!(config.dashboard.row_limit, 50);
    }

    #[test]
    fn fixed_social_delay_is_rejected() {
        let yaml = "social:\n  delay_secs: { min: 5.0, max: 5.0 }\n";
        let err = parse_config(yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "social.delay_secs",
                ..
            }
        ));
    }

    #[test]
    fn decay_must_be_below_one() {
        let yaml = "social:\n  decay: 1.0\n";
        assert!(parse_config(yaml).is_err());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_config(Some(&tmp.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn config_file_round_trips_through_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("digest.yaml");
        let yaml = serde_yaml::to_string(&AppConfig::default()).unwrap();
        fs::write(&path, yaml).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.social.sources, SocialSettings::default().sources);
    }
}
