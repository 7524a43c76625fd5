use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use globset::{Glob, GlobMatcher};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SampleMode {
    /// First N paths in sorted order
    First,
    /// Seeded random choice of N paths
    Random,
}

/// Compile a file-name glob (`*`, `?`, `[...]`, `{a,b}`).
pub fn file_name_matcher(pattern: &str) -> Result<GlobMatcher> {
    let glob = Glob::new(pattern).with_context(|| format!("invalid pattern {:?}", pattern))?;
    Ok(glob.compile_matcher())
}

/// Recursively collect files under `root` whose name matches `pattern`, sorted.
pub fn find_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        bail!("{} does not exist", root.display());
    }
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }

    let matcher = file_name_matcher(pattern)?;
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && matcher.is_match(entry.file_name()) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => warn!("Error accessing entry: {}", e),
        }
    }
    files.sort();
    debug!("{} files matching {:?} under {}", files.len(), pattern, root.display());
    Ok(files)
}

/// Subsample paths. `None`, zero or a size at least `paths.len()` keeps everything.
pub fn select_sample(
    paths: Vec<PathBuf>,
    max_samples: Option<usize>,
    mode: SampleMode,
    seed: u64,
) -> Vec<PathBuf> {
    let k = match max_samples {
        Some(k) if k > 0 && k < paths.len() => k,
        _ => return paths,
    };
    match mode {
        SampleMode::First => paths.into_iter().take(k).collect(),
        SampleMode::Random => {
            let mut rng = StdRng::seed_from_u64(seed);
            paths.choose_multiple(&mut rng, k).cloned().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("{:02}.pdf", i))).collect()
    }

    #[test]
    fn wildcard_matching() {
        let m = file_name_matcher("*.pdf").unwrap();
        assert!(m.is_match("12_README.pdf"));
        assert!(!m.is_match("README.pdf.part"));
        assert!(!m.is_match("READMEXpdf"));
        assert!(file_name_matcher("?_README.pdf").unwrap().is_match("1_README.pdf"));
        assert!(file_name_matcher("[ab].pdf").unwrap().is_match("b.pdf"));
        assert!(!file_name_matcher("[ab].pdf").unwrap().is_match("c.pdf"));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(file_name_matcher("[ab.pdf").is_err());
    }

    #[test]
    fn character_classes_select_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let found = find_files(dir.path(), "[ab].pdf").unwrap();
        assert_eq!(found, vec![dir.path().join("a.pdf"), dir.path().join("b.pdf")]);
    }

    #[test]
    fn finds_nested_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        for name in ["b.pdf", "a.pdf", "notes.txt", "sub/deeper/c.pdf", "sub/x.pdf.part"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let found = find_files(dir.path(), "*.pdf").unwrap();
        let rel: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("a.pdf"),
                PathBuf::from("b.pdf"),
                PathBuf::from("sub/deeper/c.pdf"),
            ]
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_files(&dir.path().join("nope"), "*.pdf").is_err());
    }

    #[test]
    fn sample_passthrough() {
        assert_eq!(select_sample(paths(5), None, SampleMode::First, 42).len(), 5);
        assert_eq!(select_sample(paths(5), Some(0), SampleMode::Random, 42).len(), 5);
        assert_eq!(select_sample(paths(5), Some(9), SampleMode::Random, 42).len(), 5);
    }

    #[test]
    fn sample_first() {
        assert_eq!(select_sample(paths(5), Some(2), SampleMode::First, 42), paths(2));
    }

    #[test]
    fn sample_random_is_seeded() {
        let a = select_sample(paths(20), Some(5), SampleMode::Random, 7);
        let b = select_sample(paths(20), Some(5), SampleMode::Random, 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        let all = paths(20);
        assert!(a.iter().all(|p| all.contains(p)));
    }
}
