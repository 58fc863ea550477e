use std::collections::BTreeMap;

use anyhow::{Result, bail};

use crate::config::SlugSection;
use crate::pages::{Page, PageStore};
use crate::sites::{SiteError, SiteResolver};

const MAX_UNIQUE_SUFFIX: u32 = 10_000;

/// Builds slugs from page fields and resolves collisions.
pub trait SlugGenerator {
    /// Raw candidate for `page` placed below `pid`. With `use_parent_prefix` the
    /// generator prefixes the stored slug of the nearest ancestor that does not
    /// exclude its segment from subpages.
    fn generate(&self, page: &Page, pid: i64, use_parent_prefix: bool) -> Result<String>;

    /// `candidate`, or the first `candidate-N` no other page of the same site uses.
    fn build_unique_in_site(&self, candidate: &str, page: &Page) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugOptions {
    pub fields: Vec<Vec<String>>,
    pub field_separator: String,
    pub fallback_character: char,
    pub replacements: BTreeMap<String, String>,
}

impl SlugOptions {
    pub fn from_section(section: &SlugSection) -> Self {
        Self {
            fields: section.effective_fields(),
            field_separator: section.field_separator.clone(),
            fallback_character: section.fallback_character.chars().next().unwrap_or('-'),
            replacements: section.effective_replacements(),
        }
    }
}

impl Default for SlugOptions {
    fn default() -> Self {
        Self::from_section(&SlugSection::default())
    }
}

pub struct TitleSlugGenerator<'a> {
    pages: &'a dyn PageStore,
    sites: &'a dyn SiteResolver,
    options: SlugOptions,
}

impl<'a> TitleSlugGenerator<'a> {
    pub fn new(
        pages: &'a dyn PageStore,
        sites: &'a dyn SiteResolver,
        options: SlugOptions,
    ) -> Self {
        Self {
            pages,
            sites,
            options,
        }
    }

    fn raw_value(&self, page: &Page) -> String {
        let mut parts = Vec::new();
        for group in &self.options.fields {
            let value = group
                .iter()
                .filter_map(|field| page.field(field))
                .map(str::trim)
                .find(|value| !value.is_empty());
            if let Some(value) = value {
                parts.push(value.to_string());
            }
        }
        parts.join(&self.options.field_separator)
    }

    fn parent_slug(&self, pid: i64) -> Result<Option<String>> {
        for ancestor in self.pages.rootline(pid)? {
            if ancestor.excludes_own_segment() {
                continue;
            }
            return Ok(Some(ancestor.slug));
        }
        Ok(None)
    }

    /// Root page of the configured site `uid` belongs to. Pages outside every
    /// configured site have none.
    fn site_root_of(&self, uid: i64) -> Result<Option<i64>> {
        match self.sites.site_for_page(uid) {
            Ok(site) => Ok(Some(site.root_page_id)),
            Err(err) if matches!(err.downcast_ref::<SiteError>(), Some(SiteError::NotFound(_))) => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn is_taken(&self, slug: &str, page: &Page, site_root: Option<i64>) -> Result<bool> {
        for other in self.pages.find_by_slug(slug)? {
            if other.uid == page.uid {
                continue;
            }
            if self.site_root_of(other.uid)? == site_root {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl SlugGenerator for TitleSlugGenerator<'_> {
    fn generate(&self, page: &Page, pid: i64, use_parent_prefix: bool) -> Result<String> {
        if pid == 0 || page.is_siteroot {
            return Ok("/".to_string());
        }

        let mut raw = self.raw_value(page);
        for (search, replace) in &self.options.replacements {
            if !search.is_empty() {
                raw = raw.replace(search.as_str(), replace);
            }
        }
        let mut slug = sanitize(&raw, self.options.fallback_character);
        if slug == "/" {
            slug = format!("/default-{}", page.uid);
        }

        if use_parent_prefix
            && let Some(parent_slug) = self.parent_slug(pid)?
        {
            let prefix = parent_slug.trim_end_matches('/');
            if !prefix.is_empty() {
                slug = format!("{prefix}{slug}");
            }
        }
        Ok(slug)
    }

    fn build_unique_in_site(&self, candidate: &str, page: &Page) -> Result<String> {
        let site_root = self.site_root_of(page.uid)?;
        if !self.is_taken(candidate, page, site_root)? {
            return Ok(candidate.to_string());
        }
        let base = candidate.trim_end_matches('/');
        for counter in 1..=MAX_UNIQUE_SUFFIX {
            let attempt = format!("{base}-{counter}");
            if !self.is_taken(&attempt, page, site_root)? {
                return Ok(attempt);
            }
        }
        bail!("no unique slug found for page {} based on {candidate}", page.uid);
    }
}

/// Lowercase, transliterate, map separators to `fallback`, drop everything that is
/// not a letter, digit, `/` or `fallback`, and collapse runs. Always starts with `/`.
pub fn sanitize(value: &str, fallback: char) -> String {
    let mut mapped = String::with_capacity(value.len());
    for ch in value.to_lowercase().chars() {
        match ch {
            c if c.is_whitespace() || c == '+' || c == '_' => mapped.push(fallback),
            c if c == fallback || c == '/' => mapped.push(c),
            c if c.is_ascii_alphanumeric() => mapped.push(c),
            c => match transliterate(c) {
                Some(ascii) => mapped.push_str(ascii),
                None if c.is_alphanumeric() => mapped.push(c),
                None => {}
            },
        }
    }

    let segments = mapped
        .split('/')
        .map(|segment| collapse(segment, fallback))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    format!("/{}", segments.join("/"))
}

fn collapse(segment: &str, fallback: char) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut previous_fallback = false;
    for ch in segment.chars() {
        if ch == fallback {
            if !previous_fallback {
                out.push(ch);
            }
            previous_fallback = true;
        } else {
            out.push(ch);
            previous_fallback = false;
        }
    }
    out.trim_matches(fallback).to_string()
}

fn transliterate(ch: char) -> Option<&'static str> {
    let ascii = match ch {
        'ä' | 'æ' => "ae",
        'ö' | 'œ' => "oe",
        'ü' => "ue",
        'ß' => "ss",
        'à' | 'á' | 'â' | 'ã' | 'å' | 'ā' | 'ą' => "a",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'ī' => "i",
        'ł' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ø' | 'ō' => "o",
        'ř' => "r",
        'ś' | 'š' => "s",
        'ť' => "t",
        'ù' | 'ú' | 'û' | 'ů' | 'ū' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        '&' => "and",
        _ => return None,
    };
    Some(ascii)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{SlugGenerator, SlugOptions, TitleSlugGenerator, sanitize};
    use crate::config::{SiteEntry, SlugSection};
    use crate::pages::tests::{memory_store, row};
    use crate::pages::{Doktype, Page, PageStore};
    use crate::sites::{ConfiguredSites, SiteResolver};

    fn site_entry(identifier: &str, root_page_id: i64) -> SiteEntry {
        SiteEntry {
            identifier: identifier.to_string(),
            base: format!("https://{identifier}.example.org/"),
            root_page_id,
        }
    }

    fn with_slug(mut page: Page, slug: &str) -> Page {
        page.slug = slug.to_string();
        page
    }

    fn site_root(uid: i64) -> Page {
        let mut page = with_slug(Page::new(uid, 0, "Home"), "/");
        page.is_siteroot = true;
        page
    }

    #[test]
    fn sanitize_lowercases_and_collapses() {
        assert_eq!(sanitize("Red  Shoes!", '-'), "/red-shoes");
        assert_eq!(sanitize("  Über uns ", '-'), "/ueber-uns");
        assert_eq!(sanitize("a__b++c", '-'), "/a-b-c");
        assert_eq!(sanitize("News/Archive", '-'), "/news/archive");
        assert_eq!(sanitize("Tom & Jerry", '-'), "/tom-and-jerry");
        assert_eq!(sanitize("???", '-'), "/");
        assert_eq!(sanitize("Straße", '_'), "/strasse");
    }

    #[test]
    fn site_root_and_top_level_generate_bare_slash() {
        let store = memory_store(&[]);
        let sites = ConfiguredSites::new(&[], &store).expect("sites");
        let generator = TitleSlugGenerator::new(&store, &sites, SlugOptions::default());
        assert_eq!(generator.generate(&site_root(1), 0, true).expect("slug"), "/");

        let mut nested_root = Page::new(5, 3, "Microsite");
        nested_root.is_siteroot = true;
        assert_eq!(generator.generate(&nested_root, 3, false).expect("slug"), "/");
        nested_root.is_siteroot = false;
        assert_eq!(
            generator.generate(&nested_root, 3, false).expect("slug"),
            "/microsite"
        );
    }

    #[test]
    fn fallback_groups_pick_first_non_empty_field() {
        let store = memory_store(&[]);
        let section = SlugSection {
            fields: vec![
                vec!["tx_cronsluggy_pathsegment".to_string(), "title".to_string()],
                vec!["subtitle".to_string()],
            ],
            ..SlugSection::default()
        };
        let sites = ConfiguredSites::new(&[], &store).expect("sites");
        let generator =
            TitleSlugGenerator::new(&store, &sites, SlugOptions::from_section(&section));

        let mut page = Page::new(2, 1, "About Us");
        assert_eq!(generator.generate(&page, 1, false).expect("slug"), "/about-us");

        page.path_segment = "company".to_string();
        page.subtitle = "History".to_string();
        assert_eq!(
            generator.generate(&page, 1, false).expect("slug"),
            "/company/history"
        );
    }

    #[test]
    fn replacements_apply_before_sanitizing() {
        let store = memory_store(&[]);
        let section = SlugSection {
            slash_remove: true,
            replacements: BTreeMap::from([("+".to_string(), "plus".to_string())]),
            ..SlugSection::default()
        };
        let sites = ConfiguredSites::new(&[], &store).expect("sites");
        let generator =
            TitleSlugGenerator::new(&store, &sites, SlugOptions::from_section(&section));
        let page = Page::new(2, 1, "C++ / Rust");
        assert_eq!(
            generator.generate(&page, 1, false).expect("slug"),
            "/cplusplus-rust"
        );
    }

    #[test]
    fn empty_fields_fall_back_to_uid() {
        let store = memory_store(&[]);
        let sites = ConfiguredSites::new(&[], &store).expect("sites");
        let generator = TitleSlugGenerator::new(&store, &sites, SlugOptions::default());
        let page = Page::new(17, 1, "");
        assert_eq!(generator.generate(&page, 1, false).expect("slug"), "/default-17");
    }

    #[test]
    fn parent_prefix_skips_excluded_ancestors() {
        let mut folder = with_slug(Page::new(3, 2, "Storage"), "/shop/storage");
        folder.doktype = Doktype::SysFolder;
        let store = memory_store(&[
            row(site_root(1)),
            row(with_slug(Page::new(2, 1, "Shop"), "/shop")),
            row(folder),
        ]);
        let sites = ConfiguredSites::new(&[site_entry("main", 1)], &store).expect("sites");
        let generator = TitleSlugGenerator::new(&store, &sites, SlugOptions::default());

        let page = Page::new(4, 3, "Red Shoes");
        assert_eq!(
            generator.generate(&page, 3, true).expect("slug"),
            "/shop/red-shoes"
        );
        assert_eq!(generator.generate(&page, 3, false).expect("slug"), "/red-shoes");

        let below_root = Page::new(5, 1, "About");
        assert_eq!(generator.generate(&below_root, 1, true).expect("slug"), "/about");
    }

    #[test]
    fn uniqueness_appends_counter_within_site() {
        let store = memory_store(&[
            row(site_root(1)),
            row(with_slug(Page::new(2, 1, "About"), "/about")),
            row(with_slug(Page::new(3, 1, "About"), "/about-1")),
            row(Page::new(4, 1, "About")),
        ]);
        let sites = ConfiguredSites::new(&[site_entry("main", 1)], &store).expect("sites");
        let generator = TitleSlugGenerator::new(&store, &sites, SlugOptions::default());
        let page = store.fetch_by_uid(4).expect("fetch").expect("page");
        assert_eq!(
            generator.build_unique_in_site("/about", &page).expect("unique"),
            "/about-2"
        );

        let owner = store.fetch_by_uid(2).expect("fetch").expect("page");
        assert_eq!(
            generator.build_unique_in_site("/about", &owner).expect("unique"),
            "/about"
        );
    }

    #[test]
    fn uniqueness_ignores_other_sites() {
        let store = memory_store(&[
            row(site_root(1)),
            row(with_slug(Page::new(2, 1, "About"), "/about")),
            row(site_root(10)),
            row(Page::new(11, 10, "About")),
        ]);
        let sites = ConfiguredSites::new(&[site_entry("main", 1), site_entry("other", 10)], &store)
            .expect("sites");
        let generator = TitleSlugGenerator::new(&store, &sites, SlugOptions::default());
        let page = store.fetch_by_uid(11).expect("fetch").expect("page");
        assert_eq!(
            generator.build_unique_in_site("/about", &page).expect("unique"),
            "/about"
        );
    }

    #[test]
    fn uniqueness_follows_configured_sites_not_root_flags() {
        // Page 2 is configured as its own site but carries no site root flag.
        let store = memory_store(&[
            row(site_root(1)),
            row(with_slug(Page::new(2, 1, "Microsite"), "/microsite")),
            row(with_slug(Page::new(3, 2, "About"), "/about")),
            row(Page::new(4, 1, "About")),
            row(Page::new(5, 2, "About")),
        ]);
        let sites = ConfiguredSites::new(&[site_entry("main", 1), site_entry("micro", 2)], &store)
            .expect("sites");
        let generator = TitleSlugGenerator::new(&store, &sites, SlugOptions::default());

        let page = store.fetch_by_uid(4).expect("fetch").expect("page");
        assert_eq!(
            generator.build_unique_in_site("/about", &page).expect("unique"),
            "/about"
        );

        let micro = sites.site_for_page(5).expect("site");
        assert_eq!(micro.identifier, "micro");
        let page = store.fetch_by_uid(5).expect("fetch").expect("page");
        assert_eq!(
            generator.build_unique_in_site("/about", &page).expect("unique"),
            "/about-1"
        );
    }

    #[test]
    fn pages_outside_configured_sites_do_not_collide() {
        let store = memory_store(&[
            row(site_root(1)),
            row(Page::new(2, 1, "About")),
            row(with_slug(Page::new(9, 0, "Stray"), "/about")),
        ]);
        let sites = ConfiguredSites::new(&[site_entry("main", 1)], &store).expect("sites");
        let generator = TitleSlugGenerator::new(&store, &sites, SlugOptions::default());
        let page = store.fetch_by_uid(2).expect("fetch").expect("page");
        assert_eq!(
            generator.build_unique_in_site("/about", &page).expect("unique"),
            "/about"
        );
    }
}
