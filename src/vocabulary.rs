use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;

const BUILTIN_BRANDS: &str = include_str!("../data/known_brands.txt");
const BUILTIN_ACRONYMS: &str = include_str!("../data/acronyms.txt");

/// Known brand spellings and acronyms that must stay uppercase.
///
/// Both lists are ordered sets (sorted, deduplicated, no blanks) and are fixed for a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceVocabulary {
    brands: Vec<String>,
    acronyms: Vec<String>,
}

impl ReferenceVocabulary {
    pub fn new(
        brands: impl IntoIterator<Item = String>,
        acronyms: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            brands: ordered_set(brands),
            acronyms: ordered_set(acronyms),
        }
    }

    #[must_use]
    pub fn builtin() -> Self {
        Self::new(parse_list(BUILTIN_BRANDS), parse_list(BUILTIN_ACRONYMS))
    }

    #[must_use]
    pub fn extended(
        self,
        brands: impl IntoIterator<Item = String>,
        acronyms: impl IntoIterator<Item = String>,
    ) -> Self {
        Self::new(
            self.brands.into_iter().chain(brands),
            self.acronyms.into_iter().chain(acronyms),
        )
    }

    #[must_use]
    pub fn brands(&self) -> &[String] {
        &self.brands
    }

    #[must_use]
    pub fn acronyms(&self) -> &[String] {
        &self.acronyms
    }

    /// `"A", "B", "C"`
    #[must_use]
    pub fn render_brands(&self) -> String {
        quoted_list(&self.brands)
    }

    #[must_use]
    pub fn render_acronyms(&self) -> String {
        quoted_list(&self.acronyms)
    }
}

impl Default for ReferenceVocabulary {
    fn default() -> Self {
        Self::builtin()
    }
}

/// One entry per line; blank lines and `#` comments are skipped.
pub fn load_list_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read vocabulary list: {}", path.display()))?;
    Ok(parse_list(&text))
}

fn parse_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn ordered_set(items: impl IntoIterator<Item = String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn quoted_list(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(", ")
}
