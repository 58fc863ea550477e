use anyhow::Result;
use thiserror::Error;
use url::{ParseError, Url};

use crate::config::SiteEntry;
use crate::pages::PageStore;

const RELATIVE_PLACEHOLDER: &str = "http://localhost/";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SiteError {
    #[error("no site configured for page {0}")]
    NotFound(i64),
    #[error("invalid base `{base}` for site `{identifier}`: {reason}")]
    InvalidBase {
        identifier: String,
        base: String,
        reason: String,
    },
}

/// Parsed site base URL, e.g. `https://www.example.org:8443/en/`. A base may
/// also be scheme-relative (`//example.org/`) or a bare path (`/de/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteBase {
    pub raw: String,
    pub scheme: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
}

impl SiteBase {
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let trimmed = raw.trim();
        let (url, scheme) = match Url::parse(trimmed) {
            Ok(url) => {
                let scheme = url.scheme().to_string();
                (url, Some(scheme))
            }
            Err(ParseError::RelativeUrlWithoutBase) => {
                let placeholder = Url::parse(RELATIVE_PLACEHOLDER).map_err(|err| err.to_string())?;
                let url = placeholder.join(trimmed).map_err(|err| err.to_string())?;
                (url, None)
            }
            Err(err) => return Err(err.to_string()),
        };

        let has_authority = scheme.is_some() || trimmed.starts_with("//");
        let (host, port) = if has_authority {
            let host = url
                .host_str()
                .filter(|host| !host.is_empty())
                .ok_or_else(|| "missing host".to_string())?;
            (host.to_string(), url.port())
        } else {
            (String::new(), None)
        };

        Ok(Self {
            raw: trimmed.to_string(),
            scheme,
            host,
            port,
            path: url.path().to_string(),
        })
    }

    /// Host as stored on redirects: `host` or `host:port`. Default ports are dropped.
    pub fn host_with_port(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        }
    }

    /// `scheme://host[:port]`, `//host[:port]` or empty for path-only bases.
    fn origin(&self) -> String {
        match (&self.scheme, self.host.is_empty()) {
            (_, true) => String::new(),
            (Some(scheme), false) => format!("{scheme}://{}", self.host_with_port()),
            (None, false) => format!("//{}", self.host_with_port()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub identifier: String,
    pub base: SiteBase,
    pub root_page_id: i64,
}

impl Site {
    pub fn from_entry(entry: &SiteEntry) -> std::result::Result<Self, SiteError> {
        let base = SiteBase::parse(&entry.base).map_err(|reason| SiteError::InvalidBase {
            identifier: entry.identifier.clone(),
            base: entry.base.clone(),
            reason,
        })?;
        Ok(Self {
            identifier: entry.identifier.clone(),
            base,
            root_page_id: entry.root_page_id,
        })
    }

    /// Absolute request path of `slug` under this site's base path.
    pub fn source_path(&self, slug: &str) -> String {
        let base_path = self.base.path.trim_matches('/');
        let slug = slug.trim_start_matches('/');
        if base_path.is_empty() {
            format!("/{slug}")
        } else {
            format!("/{base_path}/{slug}")
        }
    }

    /// Full URL of `slug` on this site.
    pub fn page_url(&self, slug: &str) -> String {
        format!("{}{}", self.base.origin(), self.source_path(slug))
    }
}

pub trait SiteResolver {
    /// The site whose root page is `page_id` or one of its ancestors.
    fn site_for_page(&self, page_id: i64) -> Result<Site>;
}

/// Sites from `[[sites]]` in config.toml, matched by walking the rootline.
pub struct ConfiguredSites<'a> {
    sites: Vec<Site>,
    pages: &'a dyn PageStore,
}

impl<'a> ConfiguredSites<'a> {
    pub fn new(entries: &[SiteEntry], pages: &'a dyn PageStore) -> Result<Self> {
        let sites = entries
            .iter()
            .map(Site::from_entry)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { sites, pages })
    }
}

impl SiteResolver for ConfiguredSites<'_> {
    fn site_for_page(&self, page_id: i64) -> Result<Site> {
        for page in self.pages.rootline(page_id)? {
            if let Some(site) = self.sites.iter().find(|site| site.root_page_id == page.uid) {
                return Ok(site.clone());
            }
        }
        Err(SiteError::NotFound(page_id).into())
    }
}
