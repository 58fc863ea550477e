use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::differ::{DiffToken, diff};
use crate::pages::{Doktype, Page, PageStore};
use crate::redirects::{RedirectStore, page_target};
use crate::sites::{Site, SiteResolver};
use crate::slugs::SlugGenerator;
use crate::walker::walk_page_tree;

/// Inheritable slug prefix per page uid, owned by exactly one run.
#[derive(Debug, Default, Clone)]
pub struct SlugCache {
    prefixes: HashMap<i64, String>,
}

impl SlugCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix_for(&self, uid: i64) -> Option<&str> {
        self.prefixes.get(&uid).map(String::as_str)
    }

    /// Prefix a child of `pid` inherits; empty when `pid` was never cached.
    pub fn inherited(&self, pid: i64) -> String {
        self.prefix_for(pid).unwrap_or_default().to_string()
    }

    /// Record the prefix `page` hands down to its children.
    pub fn remember(&mut self, page: &Page, slug: &str) {
        let prefix = if page.excludes_own_segment() {
            self.inherited(page.pid)
        } else if slug == "/" {
            String::new()
        } else {
            slug.to_string()
        };
        self.prefixes.insert(page.uid, prefix);
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegenerateOptions {
    pub dry_run: bool,
    /// `None` disables redirects.
    pub redirect_ttl_days: Option<u32>,
    pub include_diff: bool,
}

/// The services a run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub pages: &'a dyn PageStore,
    pub slugs: &'a dyn SlugGenerator,
    pub sites: &'a dyn SiteResolver,
    pub redirects: &'a dyn RedirectStore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRecord {
    pub source_host: String,
    pub source_path: String,
    pub source_url: String,
    pub target: String,
    pub ttl_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugChangeRecord {
    pub uid: i64,
    pub pid: i64,
    pub depth: usize,
    pub hidden: bool,
    pub doktype: Doktype,
    pub changed: bool,
    pub old_slug: String,
    pub new_slug: String,
    pub redirect: Option<RedirectRecord>,
    pub diff: Option<Vec<DiffToken>>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub site: Site,
    pub visited: Vec<i64>,
    pub changed: usize,
    pub redirects_created: usize,
    pub dry_run: bool,
}

pub struct SlugRegenerator<'a> {
    collaborators: Collaborators<'a>,
    options: RegenerateOptions,
}

impl<'a> SlugRegenerator<'a> {
    pub fn new(collaborators: Collaborators<'a>, options: RegenerateOptions) -> Self {
        Self {
            collaborators,
            options,
        }
    }

    /// Resolve the site of `root_page` and prepare a fresh cache. Fails before
    /// anything is read below the root when no site matches.
    pub fn start(&self, root_page: i64) -> Result<RegenerationRun<'a>> {
        let root_page = root_page.checked_abs().unwrap_or(0);
        let site = self.collaborators.sites.site_for_page(root_page)?;

        let mut cache = SlugCache::new();
        if root_page != site.root_page_id {
            let mut rootline = self.collaborators.pages.rootline(root_page)?;
            rootline.reverse();
            for page in &rootline {
                cache.remember(page, &page.slug);
            }
        }
        info!(
            root_page,
            site = %site.identifier,
            seeded = cache.len(),
            dry_run = self.options.dry_run,
            "starting slug regeneration"
        );

        Ok(RegenerationRun {
            collaborators: self.collaborators,
            options: self.options,
            site,
            cache,
            changed: 0,
            redirects_created: 0,
        })
    }

    /// Regenerate the whole tree below `root_page`, handing each record to `emit`.
    pub fn execute<F>(&self, root_page: i64, emit: F) -> Result<RunSummary>
    where
        F: FnMut(&SlugChangeRecord) -> Result<()>,
    {
        self.start(root_page)?.walk(root_page, emit)
    }
}

pub struct RegenerationRun<'a> {
    collaborators: Collaborators<'a>,
    options: RegenerateOptions,
    site: Site,
    cache: SlugCache,
    changed: usize,
    redirects_created: usize,
}

impl RegenerationRun<'_> {
    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn walk<F>(mut self, root_page: i64, mut emit: F) -> Result<RunSummary>
    where
        F: FnMut(&SlugChangeRecord) -> Result<()>,
    {
        let pages = self.collaborators.pages;
        let visited = walk_page_tree(pages, root_page, |page, depth, is_root| {
            let record = self.process_page(page, depth, is_root)?;
            emit(&record)
        })?;

        info!(
            visited = visited.len(),
            changed = self.changed,
            redirects = self.redirects_created,
            "slug regeneration finished"
        );
        Ok(RunSummary {
            site: self.site,
            visited,
            changed: self.changed,
            redirects_created: self.redirects_created,
            dry_run: self.options.dry_run,
        })
    }

    /// Derive, store and report the slug of one page. `use_parent_prefix` is
    /// only set for the root of the run; below it the cache supplies prefixes.
    pub fn process_page(
        &mut self,
        row: &Page,
        depth: usize,
        use_parent_prefix: bool,
    ) -> Result<SlugChangeRecord> {
        let slugs = self.collaborators.slugs;
        let mut page = row.clone();
        if !use_parent_prefix {
            page.is_siteroot = false;
        }

        let mut candidate = slugs
            .generate(&page, page.pid, use_parent_prefix)
            .with_context(|| format!("failed to generate slug for page {}", page.uid))?;
        if !use_parent_prefix && let Some(prefix) = self.cache.prefix_for(page.pid) {
            candidate = format!("{prefix}{candidate}");
        }
        self.cache.remember(&page, &candidate);

        let new_slug = slugs
            .build_unique_in_site(&candidate, &page)
            .with_context(|| format!("failed to make slug {candidate} unique for page {}", page.uid))?;
        let changed = new_slug != page.slug;
        debug!(uid = page.uid, depth, old = %page.slug, new = %new_slug, changed, "processed page");

        let mut redirect = None;
        if changed {
            self.changed += 1;
            if !self.options.dry_run {
                self.collaborators.pages.update_slug(page.uid, &new_slug)?;
                if let Some(ttl_days) = self.options.redirect_ttl_days
                    && !page.slug.is_empty()
                {
                    redirect = self.create_redirect(&page, ttl_days);
                }
            }
        }

        let diff = self
            .options
            .include_diff
            .then(|| diff(Some(page.slug.as_str()), Some(new_slug.as_str())));

        Ok(SlugChangeRecord {
            uid: page.uid,
            pid: page.pid,
            depth,
            hidden: page.hidden,
            doktype: page.doktype,
            changed,
            old_slug: page.slug,
            new_slug,
            redirect,
            diff,
        })
    }

    /// Best effort: a failed insert is logged and the slug update stays.
    fn create_redirect(&mut self, page: &Page, ttl_days: u32) -> Option<RedirectRecord> {
        let source_host = self.site.base.host_with_port();
        let source_path = self.site.source_path(&page.slug);
        let result = self.collaborators.redirects.create_redirect(
            &source_host,
            &source_path,
            page.uid,
            ttl_days,
        );
        match result {
            Ok(()) => {
                self.redirects_created += 1;
                Some(RedirectRecord {
                    source_url: self.site.page_url(&page.slug),
                    target: page_target(page.uid),
                    source_host,
                    source_path,
                    ttl_days,
                })
            }
            Err(err) => {
                warn!(uid = page.uid, source_path = %source_path, "redirect not created: {err:#}");
                None
            }
        }
    }
}
