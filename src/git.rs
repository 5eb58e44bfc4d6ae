//! Git reference parsing, deterministic renaming, and mirror rewriting
//!
//! Repository basenames collide across source hosts and orgs, so the mirror
//! cannot store `app.git` from two different upstreams under one name. The
//! renamer appends the CRC32 checksum of the canonical reference to the
//! repository name, which disambiguates statelessly: no lookup table, no
//! side effects, and downstream consumers can recompute the exact mirrored
//! name from the original URL alone.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Anchored pattern for a single git URL: `proto://hostPath/repo[.git][@ref]`.
///
/// The host-path capture is non-greedy so multi-segment paths
/// (`org/suborg/repo`) keep everything up to the final element, which is
/// taken as the repository name.
static GIT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<proto>[a-z]+://)(?P<host_path>.+?)/(?P<repo>[\w.-]+?)(?P<git>\.git)?(?P<at_ref>@(?P<ref>[\w.-]+))?$",
    )
    .expect("git URL pattern is valid")
});

/// Pattern for locating git URLs embedded in arbitrary text.
///
/// The greedy `.*` selects the longest `.git`-terminated span starting at
/// the earliest position on a line, which fixes how much of a path with
/// multiple `.git`-like segments belongs to the matched reference.
static GIT_URL_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^/]+/(.*\.git)").expect("text scan pattern is valid"));

/// Structural parts of a git URL
///
/// Produced by [`parse_git_url`]; invalid input yields an error, never a
/// partially populated value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedGitUrl {
    /// Scheme including the `://` separator, e.g. `https://`
    pub protocol: String,
    /// Host plus any intermediate path segments, e.g. `github.com/org`
    pub host_path: String,
    /// Final path element, without the `.git` suffix
    pub repo_name: String,
    /// Whether the URL carried a `.git` suffix
    pub has_git_suffix: bool,
    /// Trailing `@ref` target, without the `@`
    pub at_ref: Option<String>,
}

impl ParsedGitUrl {
    /// Canonical hash input for the deterministic renamer.
    ///
    /// Excludes the protocol and `.git` suffix so that
    /// `https://zarf.dev/repo.git` and `http://zarf.dev/repo` resolve to the
    /// same mirrored repository, as they would upstream.
    fn sanitized_key(&self) -> String {
        let at_ref = self
            .at_ref
            .as_deref()
            .map(|r| format!("@{r}"))
            .unwrap_or_default();
        format!("{}/{}{}", self.host_path, self.repo_name, at_ref)
    }
}

/// Decompose a git URL into its structural parts.
///
/// Fails with [`Error::ReferenceParse`] when the URL does not match the
/// anchored pattern (malformed scheme, missing path, scp-style ssh
/// shorthand). Callers decide whether that is fatal.
pub fn parse_git_url(url: &str) -> Result<ParsedGitUrl> {
    let caps = GIT_URL.captures(url).ok_or_else(|| {
        Error::reference_parse(format!("unable to extract the repo name from the url {url}"))
    })?;

    Ok(ParsedGitUrl {
        protocol: caps["proto"].to_string(),
        host_path: caps["host_path"].to_string(),
        repo_name: caps["repo"].to_string(),
        has_git_suffix: caps.name("git").is_some(),
        at_ref: caps.name("ref").map(|m| m.as_str().to_string()),
    })
}

/// Compute the collision-resistant name a repository is mirrored under.
///
/// The name is `repo-<checksum>` where the checksum is the unsigned decimal
/// CRC32 (standard IEEE polynomial) of the sanitized `hostPath/repo[@ref]`
/// key. Identical key, identical name - always, with no external state.
/// Bit-exact stability matters: downstream systems locate mirrored
/// repositories by this exact name.
pub fn mirror_repo_name(url: &str) -> Result<String> {
    let parsed = parse_git_url(url)?;
    let checksum = crc32fast::hash(parsed.sanitized_key().as_bytes());
    Ok(format!("{}-{}", parsed.repo_name, checksum))
}

/// Rewrite one git URL to its mirrored location.
///
/// The result is `gitAddress/pushUsername/<renamed repo>`; the original
/// protocol, host, and path are discarded - the mirror is the sole new
/// authority. Any `@ref` is excluded from the returned URL. A parse failure
/// propagates to the caller (fail-closed at this boundary).
pub fn rewrite_git_url(git_address: &str, push_username: &str, url: &str) -> Result<String> {
    let repo_name = mirror_repo_name(url)?;
    let output = format!("{git_address}/{push_username}/{repo_name}");
    debug!(original = %url, mutated = %output, "Rewrote git URL");
    Ok(output)
}

/// Rewrite every git URL found in a text blob to its mirrored location.
///
/// Scans for `https?://host/....git` spans and rewrites each through
/// [`rewrite_git_url`]. A span that fails to transform is kept unchanged and
/// only logged (fail-open): document text may legitimately contain non-git
/// URLs that happen to end in something matchable, and one bad match must
/// not abort processing of the whole document.
pub fn rewrite_git_urls_in_text(git_address: &str, push_username: &str, text: &str) -> String {
    GIT_URL_IN_TEXT
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let matched = &caps[0];
            match rewrite_git_url(git_address, push_username, matched) {
                Ok(output) => output,
                Err(_) => {
                    warn!(url = matched, "Unable to transform the git url, keeping the original");
                    matched.to_string()
                }
            }
        })
        .into_owned()
}
