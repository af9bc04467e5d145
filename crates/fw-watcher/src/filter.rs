//! Glob filtering for watch events and settle probes.
//!
//! A watch is configured with a filter string such as `*.cs` or
//! `*.cs;*.csproj`. Patterns are matched against the *file name* of a path,
//! never against its directories, so `*.cs` matches `src/app/Order.cs`.
//! Matching is case-insensitive on Windows and case-sensitive elsewhere.
//!
//! The same [`GlobFilter`] decides which notifications a watch acts on and
//! which files the settle probe inspects.
//!
//! # Examples
//!
//! ```
//! use fw_watcher::GlobFilter;
//! use camino::Utf8Path;
//!
//! let filter = GlobFilter::new("*.cs;*.csproj").unwrap();
//!
//! assert!(filter.matches(Utf8Path::new("src/app/Order.cs")));
//! assert!(filter.matches(Utf8Path::new("src/App.csproj")));
//! assert!(!filter.matches(Utf8Path::new("src/app/Order.puml")));
//! ```

use std::sync::Arc;

use camino::Utf8Path;
use fw_core::ConfigError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Separator between patterns in a filter string.
const PATTERN_SEPARATOR: char = ';';

/// A compiled, immutable set of file-name globs.
///
/// Cloning is cheap; the compiled set is shared.
#[derive(Debug, Clone)]
pub struct GlobFilter {
    /// The source patterns, as configured.
    patterns: Arc<[String]>,

    /// The compiled matcher.
    set: Arc<GlobSet>,
}

impl GlobFilter {
    /// Compiles a `;`-separated filter string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if the string contains no
    /// pattern or any pattern fails to compile.
    pub fn new(filter: &str) -> Result<Self, ConfigError> {
        let patterns: Vec<String> = filter
            .split(PATTERN_SEPARATOR)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect();

        if patterns.is_empty() {
            return Err(ConfigError::invalid_pattern(filter, "filter must not be empty"));
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(cfg!(windows))
                .literal_separator(true)
                .build()
                .map_err(|e| ConfigError::invalid_pattern(pattern.as_str(), e))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| ConfigError::invalid_pattern(filter, e))?;

        Ok(Self {
            patterns: patterns.into(),
            set: Arc::new(set),
        })
    }

    /// Returns `true` if the file name of `path` matches any pattern.
    #[inline]
    #[must_use]
    pub fn matches(&self, path: &Utf8Path) -> bool {
        path.file_name().is_some_and(|name| self.matches_name(name))
    }

    /// Returns `true` if a bare file name matches any pattern.
    #[inline]
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.set.is_match(name)
    }

    /// Returns the configured patterns.
    #[inline]
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
