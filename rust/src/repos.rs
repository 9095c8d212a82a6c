// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Repository definitions, as found in `repo.yaml`:
//!
//! ```yaml
//! repositories:
//! - arch: x86_64
//!   metalink: https://mirrors.fedoraproject.org/metalink?repo=fedora-40&arch=x86_64
//!   name: fedora
//!   gpgkey: https://src.fedoraproject.org/rpms/fedora-repos/raw/f40/f/RPM-GPG-KEY-fedora-40-primary
//! ```

use anyhow::Result;
use camino::Utf8Path;
use fn_error_context::context;
use serde_derive::Deserialize;

/// Repository configuration.
/// Not exhaustive and only includes the options needed to locate keys;
/// unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RepositoryDescriptor {
    #[serde(default)]
    pub name: String,
    pub arch: Option<String>,
    pub metalink: Option<String>,
    pub baseurl: Option<String>,
    /// Location of the armored public key(s) used to sign this repository's packages.
    pub gpgkey: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl RepositoryDescriptor {
    /// The key source to fetch, unless the repository is disabled or has none.
    pub fn key_source(&self) -> Option<&str> {
        if self.disabled {
            return None;
        }
        self.gpgkey
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
struct RepositoryList {
    #[serde(default)]
    repositories: Vec<RepositoryDescriptor>,
}

/// Parse the contents of a repository file.
pub fn parse_repositories(buf: &str) -> Result<Vec<RepositoryDescriptor>> {
    // An empty document is a valid, empty configuration.
    if buf.trim().is_empty() {
        return Ok(Vec::new());
    }
    let list: RepositoryList = serde_yaml::from_str(buf)?;
    Ok(list.repositories)
}

/// Read repository configuration from a file
#[context("Parsing repo file {}", path)]
pub fn load_repo_file(path: &Utf8Path) -> Result<Vec<RepositoryDescriptor>> {
    let buf = std::fs::read_to_string(path)?;
    parse_repositories(&buf)
}

#[cfg(test)]
mod test {
    use super::*;
    use indoc::indoc;
    use std::io::Write;

    static REPOS: &str = indoc! {"
        repositories:
        - arch: x86_64
          metalink: https://mirrors.fedoraproject.org/metalink?repo=fedora-40&arch=x86_64
          name: fedora
          gpgkey: https://example.com/RPM-GPG-KEY-fedora-40-primary
        - name: updates
          baseurl: https://example.com/updates/
          gpgkey: https://example.com/updates.asc
          disabled: true
        - name: local
          baseurl: file:///srv/repo
          gpgkey: '  '
          mirrors: [a, b]
    "};

    #[test]
    fn test_parse() -> Result<()> {
        let repos = parse_repositories(REPOS)?;
        assert_eq!(repos.len(), 3);
        assert_eq!(repos[0].name, "fedora");
        assert_eq!(repos[0].arch.as_deref(), Some("x86_64"));
        assert!(!repos[0].disabled);
        assert_eq!(
            repos[0].key_source(),
            Some("https://example.com/RPM-GPG-KEY-fedora-40-primary")
        );
        assert!(repos[1].disabled);
        assert_eq!(repos[1].key_source(), None);
        assert_eq!(repos[2].key_source(), None);
        Ok(())
    }

    #[test]
    fn test_empty() -> Result<()> {
        assert!(parse_repositories("")?.is_empty());
        assert!(parse_repositories("repositories: []\n")?.is_empty());
        assert!(parse_repositories("{}\n")?.is_empty());
        assert!(parse_repositories("repositories: 42\n").is_err());
        Ok(())
    }

    #[test]
    fn test_load_file() -> Result<()> {
        let mut tmpf = tempfile::NamedTempFile::new()?;
        tmpf.write_all(REPOS.as_bytes())?;
        let path = Utf8Path::from_path(tmpf.path()).unwrap();
        assert_eq!(load_repo_file(path)?.len(), 3);
        let e = load_repo_file(Utf8Path::new("/nonexistent/repo.yaml")).unwrap_err();
        assert!(format!("{:#}", e).starts_with("Parsing repo file /nonexistent/repo.yaml"));
        Ok(())
    }
}
