//! The versioned asset manifest.
//!
//! Changing the version string (or the path list) is the deployment
//! mechanism: a new version installs into a fresh bucket and activation
//! deletes every other bucket wholesale. No diffing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

const fn default_concurrent_fetches() -> usize {
    4
}

const fn default_skip_waiting() -> bool {
    true
}

/// The fixed, versioned list of assets pre-fetched during install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetList {
    /// Cache generation version string, e.g. `"shell-v22"`. Doubles as the
    /// bucket name.
    pub version: String,
    /// Origin the site is served from, e.g. `"https://example.com"`.
    pub origin: String,
    /// Path prefix for sub-path deployments, e.g. `"/shop/"`. Use `"/"`
    /// when the site is served from the domain root.
    #[serde(default = "AssetList::root_prefix")]
    pub prefix: String,
    /// Origin-relative asset paths, resolved against `origin` + `prefix`.
    pub paths: Vec<String>,
    /// Number of asset fetches in flight during install.
    #[serde(default = "default_concurrent_fetches")]
    pub concurrent_fetches: usize,
    /// Whether a freshly installed generation activates immediately instead
    /// of waiting for an explicit skip-waiting message.
    #[serde(default = "default_skip_waiting")]
    pub skip_waiting: bool,
}

impl AssetList {
    fn root_prefix() -> String {
        "/".to_string()
    }

    /// Creates a manifest with default install knobs.
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        origin: impl Into<String>,
        prefix: impl Into<String>,
        paths: Vec<String>,
    ) -> Self {
        Self {
            version: version.into(),
            origin: origin.into(),
            prefix: normalize_prefix(&prefix.into()),
            paths,
            concurrent_fetches: default_concurrent_fetches(),
            skip_waiting: default_skip_waiting(),
        }
    }

    /// Sets the number of concurrent install fetches.
    #[must_use]
    pub const fn with_concurrent_fetches(mut self, n: usize) -> Self {
        self.concurrent_fetches = n;
        self
    }

    /// Sets whether install activates immediately.
    #[must_use]
    pub const fn with_skip_waiting(mut self, skip: bool) -> Self {
        self.skip_waiting = skip;
        self
    }

    /// Parses a manifest from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or missing required keys.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let mut list: Self = toml::from_str(input)?;
        list.prefix = normalize_prefix(&list.prefix);
        Ok(list)
    }

    /// Loads a manifest from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Registration scope for this deployment (the path prefix).
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.prefix
    }

    /// Resolves every path against the origin and prefix, in manifest order.
    #[must_use]
    pub fn resolved_urls(&self) -> Vec<String> {
        let origin = self.origin.trim_end_matches('/');
        self.paths
            .iter()
            .map(|path| {
                let path = path.strip_prefix("./").unwrap_or(path);
                let path = path.strip_prefix('/').unwrap_or(path);
                format!("{origin}{}{path}", self.prefix)
            })
            .collect()
    }
}

/// Ensures a prefix has the `/like/this/` shape.
fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix == "/" {
        return "/".to_string();
    }
    let trimmed = prefix.trim_matches('/');
    format!("/{trimmed}/")
}
