//! Directory listings of the portal file browser
//!
//! The browser endpoint returns an HTML fragment per folder. Sub-folders
//! come as `a.infolist-link` anchors whose `id` is the folder path, and
//! files come as `cbSelect` checkboxes whose `value` is the download url.

use std::sync::LazyLock;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use scraper::{Html, Selector};

use super::errors::raise_for_status;
use super::{Portal, LISTING_PATH};

/// Fixed parameters identifying one browser tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingRoot {
    pub base_directory: &'static str,
    pub initial_link: &'static str,
}

/// "Programa Diario de Operación"
pub const PROGRAM_ROOT: ListingRoot = ListingRoot {
    base_directory: "Operación/Programa de Operación/Programa Diario/",
    initial_link: "Programa de Operación Diario",
};

/// "Reprograma Diario de Operación"
pub const REPROGRAM_ROOT: ListingRoot = ListingRoot {
    base_directory: "Operación/Programa de Operación/Reprograma Diario Operación/",
    initial_link: "Reprograma Diario de Operación",
};

/// Anything that can return the HTML listing of a folder
#[allow(async_fn_in_trait)]
pub trait ListingSource {
    async fn list(&self, root: &ListingRoot, path: &str) -> Result<String>;
}

impl ListingSource for Portal<'_> {
    async fn list(&self, root: &ListingRoot, path: &str) -> Result<String> {
        let url = self.endpoint(LISTING_PATH)?;
        let request = self.session().client().post(url).query(&[
            ("baseDirectory", root.base_directory),
            ("url", path),
            ("indicador", "S"),
            ("initialLink", root.initial_link),
            ("orderFolder", "D"),
        ]);

        tracing::debug!("Listing folder: {}", path);

        let response = self
            .session()
            .send(request)
            .await
            .with_context(|| format!("Failed to list folder {}", path))?;
        raise_for_status(&response)?;

        response
            .text()
            .await
            .with_context(|| format!("Failed to read listing of {}", path))
    }
}

/// A sub-folder anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLink {
    pub id: String,
    pub label: String,
}

/// A downloadable file checkbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLink {
    pub file_name: String,
    pub url: String,
}

static NON_ALPHA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z]").expect("valid letter filter"));

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {}: {}", css, e))
}

pub fn parse_folder_links(html: &str) -> Result<Vec<FolderLink>> {
    let fragment = Html::parse_document(html);
    let selector_link = selector("a.infolist-link")?;

    fragment
        .select(&selector_link)
        .map(|anchor| {
            let id = anchor
                .value()
                .attr("id")
                .ok_or_else(|| anyhow!("Folder link without id: {}", anchor.html()))?;
            Ok(FolderLink {
                id: id.to_string(),
                label: anchor.text().collect::<String>().trim().to_string(),
            })
        })
        .collect()
}

pub fn parse_file_inputs(html: &str) -> Result<Vec<FileLink>> {
    let fragment = Html::parse_document(html);
    let selector_input = selector(r#"input[name="cbSelect"]"#)?;

    fragment
        .select(&selector_input)
        .map(|input| {
            let url = input
                .value()
                .attr("value")
                .ok_or_else(|| anyhow!("File checkbox without value: {}", input.html()))?;
            Ok(FileLink {
                file_name: url.rsplit('/').next().unwrap_or_default().to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

/// Last path segment of a folder id, ignoring surrounding slashes
pub fn last_segment(id: &str) -> &str {
    id.trim_matches('/').rsplit('/').next().unwrap_or_default()
}

/// "…/2024/" -> 2024
pub fn year_of(id: &str) -> Result<i32> {
    let segment = last_segment(id);
    segment
        .trim()
        .parse()
        .with_context(|| format!("Year folder '{}' is not numeric", segment))
}

/// "…/2024/01_Enero/" -> 1
pub fn month_of(id: &str) -> Result<u32> {
    let segment = last_segment(id);
    let prefix = segment.split('_').next().unwrap_or_default();
    prefix
        .trim()
        .parse()
        .with_context(|| format!("Month folder '{}' has no numeric prefix", segment))
}

/// "…/01_Enero/Dia 15/" -> 15
pub fn day_of(id: &str) -> Result<u32> {
    let segment = last_segment(id);
    let suffix = segment.rsplit(' ').next().unwrap_or_default();
    suffix
        .trim()
        .parse()
        .with_context(|| format!("Day folder '{}' has no numeric suffix", segment))
}

/// "…/Dia 15/Reprograma 1B/" -> "B"; may be empty
pub fn version_of(id: &str) -> String {
    let suffix = last_segment(id).rsplit(' ').next().unwrap_or_default();
    NON_ALPHA.replace_all(suffix, "").into_owned()
}

/// Key every folder with `key` and sort newest first.
///
/// The sort is stable, so folders sharing a key keep the portal's order.
pub fn keyed_descending<K, F>(links: Vec<FolderLink>, key: F) -> Result<Vec<(K, String)>>
where
    K: Ord,
    F: Fn(&str) -> Result<K>,
{
    let mut keyed = links
        .into_iter()
        .map(|link| Ok((key(&link.id)?, link.id)))
        .collect::<Result<Vec<_>>>()?;
    keyed.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(keyed)
}
