//! Mirror configuration read from the agent's mounted state file
//!
//! The package manager writes the mirror coordinates into a Secret that is
//! mounted into the agent pod as a JSON file. The file is re-read at the
//! start of every hook invocation rather than cached: a stale mirror address
//! must never be used to rewrite a reference.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default name of the secret the rewritten `secretRef` points at
pub const DEFAULT_MIRROR_SECRET_NAME: &str = "airlift-git-credentials";

/// Mirror coordinates for the cluster-local git server and registry
///
/// Immutable within one request's lifetime; request-scoped, never shared
/// across invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    /// Base URL of the git mirror, e.g. `https://gitea.mirror.local`
    pub git_address: String,

    /// Username all mirrored repositories are pushed under
    pub git_push_username: String,

    /// Host (and optional port) of the image registry mirror
    pub registry_address: String,

    /// Name of the credentials secret rewritten `secretRef`s point at
    #[serde(default = "default_mirror_secret_name")]
    pub mirror_secret_name: String,
}

fn default_mirror_secret_name() -> String {
    DEFAULT_MIRROR_SECRET_NAME.to_string()
}

impl MirrorConfig {
    /// Load the mirror configuration from the state file at `path`.
    ///
    /// Called once per hook invocation. Any read or parse failure is a
    /// [`Error::ConfigLoad`], which denies the admission request - a
    /// misconfigured mirror must never silently pass unmutated resources.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::config_load(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::config_load(format!("{}: {e}", path.display())))
    }
}
