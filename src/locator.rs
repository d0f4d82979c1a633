//! Repository URL parsing.
//!
//! Accepts `https://<host>/<owner>/<repo>` with anything after the second
//! path segment ignored. Matching is case-insensitive because the whole
//! input is lower-cased first.

use regex::Regex;

use crate::error::ParseError;
use crate::models::RepoRef;

/// Parses repository URLs for one host.
#[derive(Debug, Clone)]
pub struct RepoLocator {
    pattern: Regex,
}

impl RepoLocator {
    pub fn new(host: &str) -> Self {
        let host = regex::escape(&host.trim().to_lowercase());
        // Anchored at the start only; trailing segments such as `/tree/dev` are ignored.
        let pattern = Regex::new(&format!(r"^https://{}/([^/]+)/([^/]+)", host))
            .expect("escaped host forms a valid pattern");
        Self { pattern }
    }

    /// Parse `url` into a [`RepoRef`] on `branch` (blank means `main`).
    pub fn parse(&self, url: &str, branch: Option<&str>) -> Result<RepoRef, ParseError> {
        let normalized = url.trim().to_lowercase();
        let caps = self.pattern.captures(&normalized).ok_or_else(|| ParseError {
            input: url.to_string(),
        })?;
        Ok(RepoRef::new(&caps[1], &caps[2], branch))
    }
}

impl Default for RepoLocator {
    fn default() -> Self {
        Self::new("github.com")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_owner_and_name() {
        let repo = RepoLocator::default()
            .parse("https://github.com/acme/widgets", None)
            .unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widgets");
        assert_eq!(repo.branch, "main");
    }

    #[test]
    fn test_extra_segments_ignored() {
        let repo = RepoLocator::default()
            .parse("https://github.com/acme/widgets/tree/dev/src", Some("dev"))
            .unwrap();
        assert_eq!(repo.slug(), "acme/widgets");
        assert_eq!(repo.branch, "dev");
    }

    #[test]
    fn test_case_insensitive_and_trimmed() {
        let repo = RepoLocator::default()
            .parse("  HTTPS://GitHub.com/Acme/Widgets  ", Some(""))
            .unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widgets");
    }

    #[test]
    fn test_rejects_malformed() {
        let locator = RepoLocator::default();
        for bad in [
            "",
            "github.com/acme/widgets",
            "http://github.com/acme/widgets",
            "https://gitlab.com/acme/widgets",
            "https://github.com/acme",
            "https://github.com//widgets",
            "see https://github.com/acme/widgets",
        ] {
            let err = locator.parse(bad, None).unwrap_err();
            assert_eq!(err.input, bad);
        }
    }

    #[test]
    fn test_custom_host_is_escaped() {
        let locator = RepoLocator::new("git.example.com");
        assert!(locator.parse("https://git.example.com/a/b", None).is_ok());
        assert!(locator.parse("https://gitXexample.com/a/b", None).is_err());
    }
}
