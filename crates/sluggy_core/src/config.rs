use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FIELD_SEPARATOR: &str = "/";
pub const DEFAULT_FALLBACK_CHARACTER: &str = "-";
pub const DEFAULT_REDIRECT_TTL_DAYS: u32 = 30;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SluggyConfig {
    #[serde(default)]
    pub slug: SlugSection,
    #[serde(default)]
    pub redirects: RedirectSection,
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
}

/// Generator options for the `pages.slug` field.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SlugSection {
    pub fields: Vec<Vec<String>>,
    /// Comma-separated shorthand for a single fallback group; wins over `fields`.
    pub pages_slugfields: Option<String>,
    pub field_separator: String,
    pub fallback_character: String,
    pub slash_remove: bool,
    pub replacements: BTreeMap<String, String>,
}

impl Default for SlugSection {
    fn default() -> Self {
        Self {
            fields: vec![vec!["title".to_string()]],
            pages_slugfields: None,
            field_separator: DEFAULT_FIELD_SEPARATOR.to_string(),
            fallback_character: DEFAULT_FALLBACK_CHARACTER.to_string(),
            slash_remove: false,
            replacements: BTreeMap::new(),
        }
    }
}

impl SlugSection {
    pub fn effective_fields(&self) -> Vec<Vec<String>> {
        if let Some(shorthand) = self.pages_slugfields.as_deref() {
            let group = shorthand
                .split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>();
            if !group.is_empty() {
                return vec![group];
            }
        }
        let groups = self
            .fields
            .iter()
            .filter(|group| !group.is_empty())
            .cloned()
            .collect::<Vec<_>>();
        if groups.is_empty() {
            vec![vec!["title".to_string()]]
        } else {
            groups
        }
    }

    /// Configured replacements, plus `/` -> `` when `slash_remove` is on and `/` is not mapped.
    pub fn effective_replacements(&self) -> BTreeMap<String, String> {
        let mut out = self.replacements.clone();
        if self.slash_remove && !out.contains_key("/") {
            out.insert("/".to_string(), String::new());
        }
        out
    }

    /// Human-readable format such as `{ tx_cronsluggy_pathsegment // title } / { subtitle }`.
    pub fn slug_format(&self) -> String {
        self.effective_fields()
            .iter()
            .map(|group| format!("{{ {} }}", group.join(" // ")))
            .collect::<Vec<_>>()
            .join(&format!(" {} ", self.field_separator))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RedirectSection {
    pub default_ttl_days: u32,
}

impl Default for RedirectSection {
    fn default() -> Self {
        Self {
            default_ttl_days: DEFAULT_REDIRECT_TTL_DAYS,
        }
    }
}

impl RedirectSection {
    /// Resolve the TTL used by a bare `--redirects`: env SLUGGY_REDIRECT_TTL_DAYS > config.
    pub fn default_ttl_days_owned(&self) -> u32 {
        if let Ok(value) = env::var("SLUGGY_REDIRECT_TTL_DAYS")
            && let Ok(days) = value.trim().parse::<u32>()
        {
            return days;
        }
        self.default_ttl_days
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SiteEntry {
    pub identifier: String,
    pub base: String,
    pub root_page_id: i64,
}

/// Load and parse a SluggyConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SluggyConfig> {
    if !config_path.exists() {
        return Ok(SluggyConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SluggyConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}
