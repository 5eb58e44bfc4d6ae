//! Container image reference renaming for the registry mirror
//!
//! The mirror registry is flat, so the original registry host has to be
//! folded into the mirrored name to keep two same-named images from
//! different registries apart. [`swap_host`] does that with a SHA-1 digest
//! of the tag-stripped reference, dash-joined in front of the re-attached
//! tag. [`swap_host_without_sha`] skips the digest for call sites where
//! display fidelity matters more than collision safety.
//!
//! Image reference syntax is a superset of what the trailing-anchored
//! pattern enforces, so malformed-looking strings may still match; the
//! pattern tolerates a missing registry and a missing tag.

use std::sync::LazyLock;

use regex::Regex;
use sha1::{Digest, Sha1};

use crate::{Error, Result};

/// Trailing-anchored captures: optional host segment, optional single path
/// segment, optional `:tag`. Deeper paths shift the match right, dropping
/// the leading segments from the reassembled name.
static HOST_PARSER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)([a-z0-9_.-]+)?(/[a-z0-9.-]+)?(:[\w.-]+)?$")
        .expect("image reference pattern is valid")
});

/// Matches a trailing `:tag` for stripping before hashing
static TAG_MATCHER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)(:[\w.-]+)?$").expect("tag pattern is valid"));

/// Swap an image reference onto the mirror host, with a SHA-1 disambiguator.
///
/// The digest is computed over the reference with any tag stripped and
/// inserted immediately before the re-attached tag, or appended when the
/// reference is untagged. Both the digest input and its placement are
/// stable contracts: previously mirrored names are located by recomputing
/// this exact output.
pub fn swap_host(src: &str, target_host: &str) -> Result<String> {
    let target_image = target_image_from(src)?;
    Ok(format!("{target_host}/{target_image}"))
}

/// Swap an image reference onto the mirror host without a digest.
pub fn swap_host_without_sha(src: &str, target_host: &str) -> Result<String> {
    let caps = HOST_PARSER.captures(src).ok_or_else(|| {
        Error::reference_parse(format!(
            "unable to get the target image from the provided source: {src}"
        ))
    })?;
    Ok(format!("{target_host}/{}", &caps[0]))
}

fn target_image_from(src: &str) -> Result<String> {
    let caps = HOST_PARSER.captures(src).ok_or_else(|| {
        Error::reference_parse(format!(
            "unable to get the target image from the provided source: {src}"
        ))
    })?;

    // Reassemble every capture except the trailing tag
    let last_index = caps.len() - 1;
    let mut target_image = String::new();
    for group in 1..last_index {
        if let Some(m) = caps.get(group) {
            target_image.push_str(m.as_str());
        }
    }

    let src_without_tag = TAG_MATCHER.replace_all(src, "");
    let sha1_hash = hex::encode(Sha1::digest(src_without_tag.as_bytes()));

    // The digest goes before the tag so the tag stays the visible suffix
    let tag = caps.get(last_index).map(|m| m.as_str()).unwrap_or("");
    if tag.starts_with(':') {
        target_image.push('-');
        target_image.push_str(&sha1_hash);
        target_image.push_str(tag);
    } else {
        target_image.push_str(tag);
        target_image.push('-');
        target_image.push_str(&sha1_hash);
    }

    Ok(target_image)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: &str = "127.0.0.1:31999";

    #[test]
    fn swap_host_inserts_digest_before_tag() {
        // SHA1("nginx") == 58a3ed6f2965252c6ac4957d95f7a3bdfca47101
        assert_eq!(
            swap_host("nginx:latest", TARGET).unwrap(),
            "127.0.0.1:31999/nginx-58a3ed6f2965252c6ac4957d95f7a3bdfca47101:latest"
        );
    }

    #[test]
    fn swap_host_appends_digest_when_untagged() {
        // SHA1("ghcr.io/stefanprodan/podinfo") == fde68284f960b126cd59af72cf18250f9d42d987
        assert_eq!(
            swap_host("ghcr.io/stefanprodan/podinfo", TARGET).unwrap(),
            "127.0.0.1:31999/stefanprodan/podinfo-fde68284f960b126cd59af72cf18250f9d42d987"
        );
    }

    #[test]
    fn swap_host_keeps_single_segment_registry() {
        // SHA1("library/registry") == be33866f5a1373b2b2830a7266df9fee3b8f568c
        assert_eq!(
            swap_host("library/registry:2.7.1", TARGET).unwrap(),
            "127.0.0.1:31999/library/registry-be33866f5a1373b2b2830a7266df9fee3b8f568c:2.7.1"
        );
    }

    /// Story: deep repository paths keep only the trailing two segments
    ///
    /// The trailing-anchored pattern captures at most one host segment and
    /// one path segment; everything further left only contributes to the
    /// digest. The digest input is the full original reference, so the
    /// dropped segments still disambiguate.
    #[test]
    fn story_deep_paths_disambiguate_through_the_digest() {
        let src = "registry1.dso.mil/ironbank/opensource/defenseunicorns/zarf/zarf-agent:v0.21.3";
        assert_eq!(
            swap_host(src, TARGET).unwrap(),
            "127.0.0.1:31999/zarf/zarf-agent-a8775e1a3617c586b8ab8b130d1370315da8013a:v0.21.3"
        );
    }

    #[test]
    fn swap_host_is_deterministic() {
        let first = swap_host("alpine:3.18", TARGET).unwrap();
        for _ in 0..10 {
            assert_eq!(swap_host("alpine:3.18", TARGET).unwrap(), first);
        }
        // SHA1("alpine") == 0d34076fc15db1b7c7a0943045699eba6f186ec1
        assert_eq!(
            first,
            "127.0.0.1:31999/alpine-0d34076fc15db1b7c7a0943045699eba6f186ec1:3.18"
        );
    }

    #[test]
    fn swap_host_without_sha_keeps_reference_verbatim() {
        assert_eq!(
            swap_host_without_sha("library/registry:2.7.1", TARGET).unwrap(),
            "127.0.0.1:31999/library/registry:2.7.1"
        );
        assert_eq!(
            swap_host_without_sha("nginx", TARGET).unwrap(),
            "127.0.0.1:31999/nginx"
        );
    }

    #[test]
    fn swap_host_without_sha_drops_deep_path_prefix() {
        assert_eq!(
            swap_host_without_sha("ghcr.io/stefanprodan/podinfo:6.0.0", TARGET).unwrap(),
            "127.0.0.1:31999/stefanprodan/podinfo:6.0.0"
        );
    }
}
