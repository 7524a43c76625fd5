use std::collections::BTreeMap;

use serde::Serialize;

use crate::parser::extract::extract_years;
use crate::parser::review::{domain_of, is_pseudo_data_domain, is_pseudo_data_url};
use crate::parser::sources::normalize_source_name;
use crate::parser::{Record, MAX_VALID_YEAR, MIN_VALID_YEAR};

/// Multiset count with deterministic iteration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Counter<K: Ord>(BTreeMap<K, usize>);

impl<K: Ord> Default for Counter<K> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: Ord + Clone> Counter<K> {
    pub fn add(&mut self, key: K) {
        *self.0.entry(key).or_insert(0) += 1;
    }

    pub fn get(&self, key: &K) -> usize {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, usize)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }

    /// Top `k` entries by count, ties broken by key.
    pub fn most_common(&self, k: usize) -> Vec<(K, usize)> {
        let mut entries: Vec<(K, usize)> = self.0.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(k);
        entries
    }
}

impl<K: Ord + Clone> FromIterator<K> for Counter<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut c = Counter::default();
        for k in iter {
            c.add(k);
        }
        c
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewCounts {
    pub flagged: usize,
    pub clear: usize,
}

/// Canonical source names across all records.
pub fn summarize_sources(records: &[Record]) -> Counter<String> {
    records
        .iter()
        .flat_map(|r| &r.sources_mentions)
        .filter_map(|s| normalize_source_name(Some(s.as_str())))
        .collect()
}

/// Review outcome per record, recomputed rather than read from storage.
pub fn summarize_needs_review(records: &[Record]) -> ReviewCounts {
    let flagged = records.iter().filter(|r| r.needs_review()).count();
    ReviewCounts {
        flagged,
        clear: records.len() - flagged,
    }
}

/// Years mentioned in `time_mentions`, restricted to the valid range.
pub fn summarize_years(records: &[Record]) -> Counter<i32> {
    year_tokens(records)
        .filter(|y| (MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(y))
        .collect()
}

/// Years past `MAX_VALID_YEAR`, the ones that trigger the future-year rule.
pub fn summarize_future_years(records: &[Record]) -> Counter<i32> {
    year_tokens(records).filter(|y| *y > MAX_VALID_YEAR).collect()
}

pub fn summarize_datasets(records: &[Record]) -> Counter<String> {
    records
        .iter()
        .flat_map(|r| &r.dataset_candidates)
        .filter(|d| !d.is_empty())
        .cloned()
        .collect()
}

/// URL hosts, skipping gift-card URLs and pseudo-data domains.
pub fn summarize_domains(records: &[Record]) -> Counter<String> {
    records
        .iter()
        .flat_map(|r| &r.urls)
        .filter(|u| !is_pseudo_data_url(u))
        .map(|u| domain_of(u))
        .filter(|d| !d.is_empty() && !is_pseudo_data_domain(d))
        .collect()
}

/// How many files carry 0, 1, 2, … URLs.
pub fn url_count_histogram(records: &[Record]) -> Counter<usize> {
    records.iter().map(|r| r.urls.len()).collect()
}

fn year_tokens(records: &[Record]) -> impl Iterator<Item = i32> + '_ {
    records
        .iter()
        .flat_map(|r| &r.time_mentions)
        .flat_map(|t| extract_years(t))
}

/// Everything the report views need, computed in one place.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub total: usize,
    pub review: ReviewCounts,
    pub sources: Counter<String>,
    pub datasets: Counter<String>,
    pub domains: Counter<String>,
    pub years: Counter<i32>,
    pub future_years: Counter<i32>,
    pub urls_per_file: Counter<usize>,
    pub with_declaration: usize,
    pub with_availability_section: usize,
}

impl Summary {
    pub fn from_records(records: &[Record]) -> Self {
        Self {
            total: records.len(),
            review: summarize_needs_review(records),
            sources: summarize_sources(records),
            datasets: summarize_datasets(records),
            domains: summarize_domains(records),
            years: summarize_years(records),
            future_years: summarize_future_years(records),
            urls_per_file: url_count_histogram(records),
            with_declaration: records.iter().filter(|r| r.has_declaration).count(),
            with_availability_section: records
                .iter()
                .filter(|r| r.availability_section_found)
                .count(),
        }
    }
}
