use std::sync::LazyLock;

use regex::Regex;

static HYPHEN_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-\n").unwrap());
static DASH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\u{2013}\u{2014}\u{2212}]").unwrap());
static TRAILING_WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+\n").unwrap());
static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Clean raw PDF text: unify line breaks, repair hyphenated wraps,
/// unify dashes, strip trailing blanks and collapse empty-line runs.
pub fn normalize_text(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let t = raw.replace('\r', "\n");
    let t = HYPHEN_BREAK_RE.replace_all(&t, "");
    let t = DASH_RE.replace_all(&t, "-");
    let t = TRAILING_WS_RE.replace_all(&t, "\n");
    BLANK_RUN_RE.replace_all(&t, "\n\n").into_owned()
}
