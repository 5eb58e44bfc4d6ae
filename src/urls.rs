//! Hostname comparison used as the mutation idempotency guard
//!
//! On update events the hooks must not rewrite a URL that already points at
//! the mirror - the repository name in it is already hashed, and hashing it
//! again would produce a double-mirrored identifier. The guard compares
//! hostnames only; paths and ports are irrelevant to "is this ours".

use url::Url;

use crate::{Error, Result};

/// Compare the hostname components of two URLs case-insensitively.
///
/// A URL that cannot be parsed, or that has no host, is an error - never
/// "not matched". Treating it as a mismatch would send the URL back through
/// the rewriter.
pub fn hostnames_match(expected: &str, candidate: &str) -> Result<bool> {
    let expected_host = hostname(expected)?;
    let candidate_host = hostname(candidate)?;
    Ok(expected_host.eq_ignore_ascii_case(&candidate_host))
}

fn hostname(raw: &str) -> Result<String> {
    let parsed =
        Url::parse(raw).map_err(|e| Error::hostname_compare(format!("{raw}: {e}")))?;
    parsed
        .host_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::hostname_compare(format!("{raw}: no hostname")))
}
