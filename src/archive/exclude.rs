//! Exclusion rules for staged files
//!
//! Globs are matched against the archive-relative path (`/` separated).
//! There are no built-in excludes; everything under the staging root is
//! packaged unless a pattern says otherwise.

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Errors for exclusion rules
#[derive(Debug, thiserror::Error)]
pub enum ExcludeError {
    #[error("Invalid exclude pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Glob set error: {0}")]
    Build(#[from] globset::Error),
}

/// Compiled exclusion rules
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    glob_set: GlobSet,
    patterns: Vec<String>,
}

impl Default for ExcludeRules {
    fn default() -> Self {
        Self {
            glob_set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }
}

impl ExcludeRules {
    /// Compile `patterns`; an empty list excludes nothing
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ExcludeError> {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            let glob = Glob::new(pattern).map_err(|source| ExcludeError::Pattern {
                pattern: pattern.to_string(),
                source,
            })?;
            builder.add(glob);
            kept.push(pattern.to_string());
        }

        Ok(Self {
            glob_set: builder.build()?,
            patterns: kept,
        })
    }

    /// Whether an archive-relative path is excluded
    pub fn is_excluded(&self, member_path: &str) -> bool {
        self.glob_set.is_match(member_path)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
