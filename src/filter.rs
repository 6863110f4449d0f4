use regex::Regex;

use crate::source::ChangedFile;

/// Drops changed files whose path matches any configured pattern.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    patterns: Vec<Regex>,
}

impl ExclusionFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(path))
    }

    /// Keeps the input order.
    pub fn apply(&self, files: Vec<ChangedFile>) -> Vec<ChangedFile> {
        files
            .into_iter()
            .filter(|file| !self.is_excluded(&file.path))
            .collect()
    }
}
