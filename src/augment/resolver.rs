use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No resolution rule matches")]
    NoMatchingRule,

    #[error("Invalid percent-encoding")]
    InvalidEncoding,

    #[error("Unsafe or empty relative path")]
    UnsafePath,
}

/// Maps URLs containing `prefix` to files under `directory`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionRule {
    pub prefix: String,
    pub directory: PathBuf,
}

impl ResolutionRule {
    pub fn new(prefix: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            directory: directory.into(),
        }
    }
}

/// Resolves asset URLs found in documents to local paths.
#[derive(Debug, Clone, Default)]
pub struct UrlResolver {
    rules: Vec<ResolutionRule>,
}

impl UrlResolver {
    pub fn new(rules: Vec<ResolutionRule>) -> Self {
        Self { rules }
    }

    /// `/data/` maps to the data directory, `/assets/` to the assets one.
    pub fn with_defaults(data_dir: impl Into<PathBuf>, assets_dir: impl Into<PathBuf>) -> Self {
        Self::new(vec![
            ResolutionRule::new("/data/", data_dir),
            ResolutionRule::new("/assets/", assets_dir),
        ])
    }

    pub fn rules(&self) -> &[ResolutionRule] {
        &self.rules
    }

    /// Candidate local path for `url`, without checking that it exists.
    ///
    /// The first rule whose prefix occurs anywhere in the URL decides. The
    /// remainder after the prefix loses its query and fragment, is
    /// percent-decoded, and must be a plain relative path.
    pub fn resolve(&self, url: &str) -> Result<PathBuf, ResolveError> {
        let (rule, remainder) = self
            .rules
            .iter()
            .find_map(|rule| {
                url.find(&rule.prefix)
                    .map(|pos| (rule, &url[pos + rule.prefix.len()..]))
            })
            .ok_or(ResolveError::NoMatchingRule)?;

        let remainder = remainder
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or_default();
        let decoded = urlencoding::decode(remainder).map_err(|_| ResolveError::InvalidEncoding)?;
        let relative = safe_relative_path(&decoded).ok_or(ResolveError::UnsafePath)?;
        Ok(rule.directory.join(relative))
    }
}

/// Normalizes a client-supplied relative path.
///
/// Returns `None` for empty paths, absolute paths and anything that tries to
/// climb with `..`.
pub fn safe_relative_path(raw: &str) -> Option<PathBuf> {
    if raw.split(['/', '\\']).any(|part| part == "..") {
        return None;
    }

    let mut relative = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative)
    }
}
