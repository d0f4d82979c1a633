//! Include/exclude rules for directories and file extensions.
//!
//! A [`FilterSpec`] with no values is inactive: it lets every path through
//! and is never sent to the fetcher as a rule. The directory and extension
//! filters of a fetch combine with logical AND via [`FetchFilters`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Directory,
    Extension,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Include,
    Exclude,
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "include" => Ok(FilterMode::Include),
            "exclude" => Ok(FilterMode::Exclude),
            other => Err(format!(
                "invalid filter mode '{}': expected include or exclude",
                other
            )),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMode::Include => f.write_str("include"),
            FilterMode::Exclude => f.write_str("exclude"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub mode: FilterMode,
    pub values: BTreeSet<String>,
}

impl FilterSpec {
    /// Parse a comma-separated list of values.
    ///
    /// Tokens are trimmed and empty tokens dropped. Extension values lose a
    /// leading `.` and are lower-cased; directory values lose leading and
    /// trailing `/`.
    pub fn parse(kind: FilterKind, raw_csv: &str, mode: FilterMode) -> Self {
        let values = raw_csv
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| normalize(kind, token))
            .filter(|token| !token.is_empty())
            .collect();
        Self { kind, mode, values }
    }

    pub fn directories(raw_csv: &str, mode: FilterMode) -> Self {
        Self::parse(FilterKind::Directory, raw_csv, mode)
    }

    pub fn extensions(raw_csv: &str, mode: FilterMode) -> Self {
        Self::parse(FilterKind::Extension, raw_csv, mode)
    }

    /// An empty value set means "no filter of this kind".
    pub fn is_active(&self) -> bool {
        !self.values.is_empty()
    }

    /// Whether a repository-relative file path passes this filter.
    pub fn allows(&self, path: &str) -> bool {
        if !self.is_active() {
            return true;
        }
        let hit = match self.kind {
            FilterKind::Directory => self.values.iter().any(|dir| is_under(path, dir)),
            FilterKind::Extension => match extension_of(path) {
                Some(ext) => self.values.contains(&ext),
                None => false,
            },
        };
        match self.mode {
            FilterMode::Include => hit,
            FilterMode::Exclude => !hit,
        }
    }
}

fn normalize(kind: FilterKind, token: &str) -> String {
    match kind {
        FilterKind::Directory => token.trim_matches('/').to_string(),
        FilterKind::Extension => token.trim_start_matches('.').to_lowercase(),
    }
}

fn is_under(path: &str, dir: &str) -> bool {
    path == dir
        || path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Lower-cased extension of the last path component, without the dot.
fn extension_of(path: &str) -> Option<String> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        // Dotfiles such as `.gitignore` have no extension.
        return None;
    }
    Some(ext.to_lowercase())
}

/// The directory and extension filters of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFilters {
    pub directories: FilterSpec,
    pub extensions: FilterSpec,
}

impl FetchFilters {
    pub fn new(directories: FilterSpec, extensions: FilterSpec) -> Self {
        Self {
            directories,
            extensions,
        }
    }

    /// Filters that let every file through.
    pub fn none() -> Self {
        Self::new(
            FilterSpec::directories("", FilterMode::Include),
            FilterSpec::extensions("", FilterMode::Include),
        )
    }

    pub fn allows(&self, path: &str) -> bool {
        self.directories.allows(path) && self.extensions.allows(path)
    }

    /// Whether any file below directory `dir` could pass the directory filter.
    ///
    /// Used to prune a directory walk; always `true` when the directory
    /// filter is inactive.
    pub fn may_descend(&self, dir: &str) -> bool {
        let rules = &self.directories;
        if !rules.is_active() {
            return true;
        }
        let dir = dir.trim_matches('/');
        match rules.mode {
            FilterMode::Include => rules
                .values
                .iter()
                .any(|d| is_under(dir, d) || is_under(d, dir)),
            FilterMode::Exclude => !rules.values.iter().any(|d| is_under(dir, d)),
        }
    }

    /// Only the filters that carry values.
    pub fn active(&self) -> impl Iterator<Item = &FilterSpec> {
        [&self.directories, &self.extensions]
            .into_iter()
            .filter(|f| f.is_active())
    }
}
