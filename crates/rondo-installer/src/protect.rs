//! Config-protect policy.
//!
//! Files whose path falls under a protected prefix are never overwritten in
//! place: removals leave them alone and upgrades write the incoming version
//! to a `<path>.new` sibling instead.

use std::path::{Component, Path, PathBuf};

/// Protected path prefixes, compared component-wise against paths relative
/// to the target root.
#[derive(Debug, Clone, Default)]
pub struct ConfigProtect {
    prefixes: Vec<PathBuf>,
}

impl ConfigProtect {
    /// Build from configured prefixes (absolute or root-relative).
    #[must_use]
    pub fn new(prefixes: &[PathBuf]) -> Self {
        Self {
            prefixes: prefixes
                .iter()
                .map(|p| normalize(p))
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
        }
    }

    /// Whether a root-relative path is protected.
    #[must_use]
    pub fn is_protected(&self, rel_path: &str) -> bool {
        let path = normalize(Path::new(rel_path));
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }

    /// Whether any prefixes are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

/// Strip root and current-dir components so `/etc`, `etc` and `./etc`
/// compare equal.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// The sibling path an incoming protected file is written to.
#[must_use]
pub fn protected_sibling(rel_path: &str) -> String {
    format!("{rel_path}.new")
}
