//! GitHub repository locations

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::errors::DeployError;

static SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("segment regex"));

const GITHUB_HOSTS: &[&str] = &["github.com", "www.github.com"];

/// A GitHub repository reference (`github.com/<owner>/<repo>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    owner: String,
    repo: String,
}

impl RepoUrl {
    /// Parse a repository URL.
    ///
    /// Accepts an optional scheme, an optional `www.` prefix, a trailing `.git`
    /// and extra path segments (`/tree/main/...`), which are ignored.
    pub fn parse(input: &str) -> Result<Self, DeployError> {
        let trimmed = input.trim();
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };

        let invalid = || DeployError::InvalidSourceUrl(trimmed.to_string());

        let url = Url::parse(&with_scheme).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid());
        }
        let host = url.host_str().ok_or_else(invalid)?;
        if !GITHUB_HOSTS.contains(&host.to_ascii_lowercase().as_str()) {
            return Err(invalid());
        }

        let mut segments = url
            .path_segments()
            .ok_or_else(invalid)?
            .filter(|s| !s.is_empty());
        let owner = segments.next().ok_or_else(invalid)?;
        let repo = segments.next().ok_or_else(invalid)?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);

        if !SEGMENT_RE.is_match(owner) || !SEGMENT_RE.is_match(repo) || repo == "." || repo == ".." {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// `owner/repo`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// HTTPS clone URL
    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.repo)
    }

    /// Raw content URL for a file on a branch
    pub fn raw_url(&self, raw_base_url: &str, branch: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            raw_base_url.trim_end_matches('/'),
            self.owner,
            self.repo,
            branch,
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://github.com/{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoUrl {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RepoUrl::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_common_forms() {
        for input in [
            "https://github.com/acme/demo",
            "https://github.com/acme/demo.git",
            "http://www.github.com/acme/demo/tree/main/src",
            "github.com/acme/demo",
            "  https://github.com/acme/demo/  ",
        ] {
            let url = RepoUrl::parse(input).unwrap();
            assert_eq!(url.slug(), "acme/demo", "input: {input}");
        }
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for input in [
            "",
            "https://gitlab.com/acme/demo",
            "https://github.com/acme",
            "ftp://github.com/acme/demo",
            "not a url",
            "https://github.com/acme/..",
        ] {
            assert!(
                matches!(RepoUrl::parse(input), Err(DeployError::InvalidSourceUrl(_))),
                "input: {input}"
            );
        }
    }

    #[test]
    fn test_derived_urls() {
        let url = RepoUrl::parse("https://github.com/acme/demo").unwrap();
        assert_eq!(url.clone_url(), "https://github.com/acme/demo.git");
        assert_eq!(
            url.raw_url("https://raw.githubusercontent.com/", "main", "src/index.js"),
            "https://raw.githubusercontent.com/acme/demo/main/src/index.js"
        );
        assert_eq!(url.to_string(), "https://github.com/acme/demo");
    }
}
