//! Catalog parser for the Magento storefront
//!
//! Selectors are compiled once at construction; each call parses its own
//! document so the parser can be shared freely between tasks.

use std::collections::HashSet;

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::{CatalogParser, ParsingError, ParsingResult, SelectorConfig};
use crate::domain::{ItemRef, PageRef};

pub struct MagentoCatalogParser {
    base_url: Url,
    item_link: Selector,
    title: Selector,
    config_script: Selector,
    gallery_image: Selector,
    gallery_link: Selector,
    title_suffixes: Vec<String>,
}

impl MagentoCatalogParser {
    /// Create a parser resolving relative links against `base_url`
    pub fn new(selectors: &SelectorConfig, base_url: &str) -> ParsingResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| ParsingError::url_resolution_failed(base_url, e))?;

        Ok(Self {
            base_url,
            item_link: compile(&selectors.listing_item_link)?,
            title: compile(&selectors.title)?,
            config_script: compile(&selectors.config_script)?,
            gallery_image: compile(&selectors.gallery_image)?,
            gallery_link: compile(&selectors.gallery_link)?,
            title_suffixes: selectors.title_suffixes.clone(),
        })
    }

    fn resolve(&self, href: &str) -> Option<String> {
        match self.base_url.join(href.trim()) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                debug!("Skipping unresolvable link '{}': {}", href, e);
                None
            }
        }
    }

    fn clean_title(&self, raw: &str) -> String {
        let mut name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        for suffix in &self.title_suffixes {
            if let Some(stripped) = name.strip_suffix(suffix.as_str()) {
                name = stripped.trim_end().to_string();
            }
        }
        name
    }
}

fn compile(selector: &str) -> ParsingResult<Selector> {
    Selector::parse(selector).map_err(|e| ParsingError::invalid_selector(selector, e))
}

impl CatalogParser for MagentoCatalogParser {
    fn listing_items(&self, html: &str, page: &PageRef) -> Vec<ItemRef> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();

        document
            .select(&self.item_link)
            .filter_map(|link| link.value().attr("href"))
            .filter_map(|href| self.resolve(href))
            .filter(|url| seen.insert(url.clone()))
            .map(|url| ItemRef::new(url, Some(page.number)))
            .collect()
    }

    fn display_name(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let element = document.select(&self.title).next()?;
        let name = self.clean_title(&element.text().collect::<String>());
        (!name.is_empty()).then_some(name)
    }

    fn configuration_candidates(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        document
            .select(&self.config_script)
            .map(|script| script.text().collect::<String>())
            .filter(|text| !text.trim().is_empty())
            .collect()
    }

    fn gallery_image(&self, fragment: &str) -> Option<String> {
        let fragment = Html::parse_fragment(fragment);
        let image = fragment
            .select(&self.gallery_image)
            .find_map(|img| img.value().attr("src"));
        let link = || {
            fragment
                .select(&self.gallery_link)
                .find_map(|a| a.value().attr("href"))
        };

        image.or_else(link).and_then(|src| self.resolve(src))
    }
}
