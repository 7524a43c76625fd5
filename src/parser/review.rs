use super::extract::extract_years;
use super::sources::normalize_source_name;
use super::{Record, MAX_VALID_YEAR};

/// Lowercase URL fragments that mark commercial pages, not data.
pub const GIFT_CARD_PHRASES: &[&str] = &["gift card", "giftcard", "gift-card"];

/// Hosts that look like citations but belong to software vendors,
/// licenses or document repositories.
pub const PSEUDO_DATA_DOMAINS: &[&str] = &[
    "stata.com",
    "www.stata.com",
    "documents.worldbank.org",
    "www.documents.worldbank.org",
    "creativecommons.org",
    "www.creativecommons.org",
];

pub fn is_pseudo_data_domain(domain: &str) -> bool {
    let d = domain.to_lowercase();
    PSEUDO_DATA_DOMAINS.contains(&d.as_str()) || d.contains("stata")
}

pub fn is_pseudo_data_url(url: &str) -> bool {
    let u = url.to_lowercase();
    GIFT_CARD_PHRASES.iter().any(|p| u.contains(p))
}

/// Lowercase host of `url`, or an empty string when it cannot be parsed.
pub fn domain_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_default()
}

/// Which review rules fired for a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewReasons {
    /// No mention survives source normalization.
    pub no_sources: bool,
    /// Neither URLs nor dataset candidates.
    pub no_evidence: bool,
    /// A year after `MAX_VALID_YEAR` is mentioned.
    pub future_year: bool,
    /// A URL points at a gift-card page or a deny-listed host.
    pub suspicious_url: bool,
}

impl ReviewReasons {
    pub fn evaluate(record: &Record) -> Self {
        let no_sources = !record
            .sources_mentions
            .iter()
            .any(|s| normalize_source_name(Some(s.as_str())).is_some());

        let no_evidence = record.urls.is_empty() && record.dataset_candidates.is_empty();

        let future_year = record
            .time_mentions
            .iter()
            .flat_map(|t| extract_years(t))
            .any(|y| y > MAX_VALID_YEAR);

        let suspicious_url = record.urls.iter().any(|u| {
            if is_pseudo_data_url(u) {
                return true;
            }
            let d = domain_of(u);
            !d.is_empty() && is_pseudo_data_domain(&d)
        });

        Self {
            no_sources,
            no_evidence,
            future_year,
            suspicious_url,
        }
    }

    pub fn any(&self) -> bool {
        self.no_sources || self.no_evidence || self.future_year || self.suspicious_url
    }

    pub fn labels(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.no_sources {
            out.push("no sources");
        }
        if self.no_evidence {
            out.push("no urls/datasets");
        }
        if self.future_year {
            out.push("future year");
        }
        if self.suspicious_url {
            out.push("suspicious url");
        }
        out
    }
}

/// Strict disjunction of the four review rules.
pub fn needs_review(record: &Record) -> bool {
    ReviewReasons::evaluate(record).any()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn clean_record() -> Record {
        Record {
            sources_mentions: strings(&["World Bank"]),
            time_mentions: strings(&["published in 2020"]),
            urls: strings(&["https://data.worldbank.org/x"]),
            ..Default::default()
        }
    }

    #[test]
    fn license_only_source_without_evidence() {
        let record = Record {
            sources_mentions: strings(&["Creative Commons"]),
            ..Default::default()
        };
        let reasons = ReviewReasons::evaluate(&record);
        assert!(reasons.no_sources);
        assert!(reasons.no_evidence);
        assert!(needs_review(&record));
    }

    #[test]
    fn clean_record_passes() {
        let record = clean_record();
        assert_eq!(ReviewReasons::evaluate(&record), ReviewReasons::default());
        assert!(!needs_review(&record));
    }

    #[test]
    fn future_year_alone_flags() {
        let record = Record {
            time_mentions: strings(&["forecast for 2099"]),
            ..clean_record()
        };
        let reasons = ReviewReasons::evaluate(&record);
        assert_eq!(
            reasons,
            ReviewReasons {
                future_year: true,
                ..Default::default()
            }
        );
        assert!(needs_review(&record));
    }

    #[test]
    fn boundary_year_is_not_future() {
        let record = Record {
            time_mentions: strings(&["through 2025"]),
            ..clean_record()
        };
        assert!(!needs_review(&record));
    }

    #[test]
    fn gift_card_url_flags_despite_evidence() {
        let record = Record {
            urls: strings(&["https://example.com/gift-card-special"]),
            dataset_candidates: strings(&["Household Survey 2018"]),
            ..clean_record()
        };
        let reasons = ReviewReasons::evaluate(&record);
        assert!(reasons.suspicious_url);
        assert!(!reasons.no_evidence);
        assert!(needs_review(&record));
    }

    #[test]
    fn deny_listed_and_stata_hosts() {
        for u in [
            "https://www.stata.com/features",
            "https://documents.worldbank.org/en/publication",
            "https://CreativeCommons.org/licenses/by/3.0/igo",
            "https://blog.stata-press.com/post",
        ] {
            let record = Record {
                urls: strings(&[u]),
                ..clean_record()
            };
            assert!(ReviewReasons::evaluate(&record).suspicious_url, "{}", u);
        }
    }

    #[test]
    fn malformed_url_fails_open() {
        assert_eq!(domain_of("https://[not-a-host/stata"), "");
        let record = Record {
            urls: strings(&["https://[not-a-host/stata"]),
            ..clean_record()
        };
        assert!(!ReviewReasons::evaluate(&record).suspicious_url);
    }

    #[test]
    fn sentinel_sources_do_not_count() {
        let record = Record {
            sources_mentions: strings(&["", "  ", "documents of the world bank"]),
            ..clean_record()
        };
        assert!(ReviewReasons::evaluate(&record).no_sources);
    }

    #[test]
    fn dataset_candidates_count_as_evidence() {
        let record = Record {
            urls: Vec::new(),
            dataset_candidates: strings(&["LSMS"]),
            ..clean_record()
        };
        assert!(!needs_review(&record));
    }

    #[test]
    fn rerun_is_stable() {
        let record = Record {
            time_mentions: strings(&["2030 target"]),
            ..clean_record()
        };
        let first = needs_review(&record);
        for _ in 0..5 {
            assert_eq!(needs_review(&record), first);
        }
    }

    #[test]
    fn labels_follow_rule_order() {
        let reasons = ReviewReasons {
            no_sources: true,
            suspicious_url: true,
            ..Default::default()
        };
        assert_eq!(reasons.labels(), vec!["no sources", "suspicious url"]);
    }
}
