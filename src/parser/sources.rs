use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Labels that look like sources but are licenses or document repositories.
pub const PSEUDO_SOURCE_NAMES: &[&str] = &[
    "creative commons",
    "documents of the world bank",
    "document of the world bank",
    "documents of world bank",
    "document of world bank",
    "documents of the world bank group",
];

/// Known variants (lowercase, single-spaced) and their canonical names.
pub const SOURCE_ALIASES: &[(&str, &str)] = &[
    ("world bank", "world bank"),
    ("the world bank", "world bank"),
    ("world bank group", "world bank"),
    ("wdi", "world development indicators"),
    ("world development indicators", "world development indicators"),
    ("world development indicators (wdi)", "world development indicators"),
    ("pip", "poverty and inequality platform"),
    ("poverty and inequality platform", "poverty and inequality platform"),
    ("imf", "international monetary fund"),
    ("i.m.f.", "international monetary fund"),
    ("international monetary fund", "international monetary fund"),
];

static ALIAS_MAP: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| SOURCE_ALIASES.iter().copied().collect());

/// Clean a raw source mention and map it to its canonical name.
///
/// Returns `None` for absent or blank input and for pseudo-sources
/// (license boilerplate, document repositories). Unknown names are kept,
/// lowercased and single-spaced.
pub fn normalize_source_name(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    let unified = raw.replace('\r', "\n");
    let collapsed = WHITESPACE_RE.replace_all(&unified, " ");
    let cleaned = collapsed.trim().to_lowercase();
    if cleaned.is_empty() {
        return None;
    }

    if PSEUDO_SOURCE_NAMES.contains(&cleaned.as_str())
        || cleaned.contains("creative commons")
        || cleaned.contains("documents of the world bank")
    {
        return None;
    }

    match ALIAS_MAP.get(cleaned.as_str()) {
        Some(canonical) => Some(canonical.to_string()),
        None => Some(cleaned),
    }
}
