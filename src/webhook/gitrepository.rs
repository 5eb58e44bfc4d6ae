//! GitRepository mutation webhook
//!
//! Handles AdmissionReview requests for Flux GitRepository custom
//! resources, rewriting `spec.url` to the git mirror and re-pointing
//! `spec.secretRef` at the mirror credentials secret.
//!
//! The mutation state machine, in order: load mirror state, decode the
//! minimal spec shape, hostname-guard updates against double mutation,
//! rewrite, build patches. A failure at any step denies the request; once
//! all steps pass the request is always allowed - the hook mutates, it
//! never rejects a syntactically valid resource because mutation wasn't
//! needed.

use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use super::{admission_response, AgentState, MutationResult};
use crate::state::MirrorConfig;
use crate::{git, urls, Error, Result};

/// Reference to the secret holding git credentials
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct SecretRef {
    #[serde(default)]
    name: String,
}

/// Minimal view of a GitRepository spec - only the fields this hook mutates
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GitRepositorySpec {
    url: String,
    secret_ref: Option<SecretRef>,
}

/// Handle mutating admission review for GitRepository resources
pub async fn mutate_handler(
    State(state): State<Arc<AgentState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = match mutate(&state.state_path, &request) {
        Ok(result) => admission_response(&request, result),
        Err(e) => {
            error!(uid = %request.uid, error = %e, "GitRepository mutation failed, denying");
            AdmissionResponse::from(&request).deny(e.to_string())
        }
    };
    Json(response.into_review())
}

/// Mutate one GitRepository admission request.
///
/// On update the URL is rewritten only when its hostname differs from the
/// configured mirror: a URL that already points at the mirror carries an
/// already-hashed repository name, and rewriting it again would hash the
/// hash.
pub fn mutate(
    state_path: &Path,
    request: &AdmissionRequest<DynamicObject>,
) -> Result<MutationResult> {
    let is_create = matches!(request.operation, Operation::Create);
    let is_update = matches!(request.operation, Operation::Update);
    if !is_create && !is_update {
        debug!(uid = %request.uid, operation = ?request.operation, "Nothing to mutate for this operation, allowing unchanged");
        return Ok(MutationResult::unchanged());
    }

    let config = MirrorConfig::load(state_path)?;
    debug!(git_address = %config.git_address, "Using the mirror url to mutate the GitRepository");

    let Some(object) = &request.object else {
        debug!(uid = %request.uid, "No object in request, allowing unchanged");
        return Ok(MutationResult::unchanged());
    };
    let spec = decode_spec(object)?;

    let already_mirrored = if is_update {
        urls::hostnames_match(&config.git_address, &spec.url)?
    } else {
        false
    };

    let patched_url = if is_create || !already_mirrored {
        let mutated = git::rewrite_git_urls_in_text(
            &config.git_address,
            &config.git_push_username,
            &spec.url,
        );
        debug!(original = %spec.url, mutated = %mutated, "Mutated the GitRepository url");
        mutated
    } else {
        spec.url.clone()
    };

    let existing_secret_name = spec.secret_ref.map(|r| r.name).unwrap_or_default();
    Ok(MutationResult::patched(patch_operations(
        patched_url,
        &existing_secret_name,
        &config.mirror_secret_name,
    )))
}

fn decode_spec(object: &DynamicObject) -> Result<GitRepositorySpec> {
    match object.data.get("spec") {
        Some(spec) => serde_json::from_value(spec.clone())
            .map_err(|e| Error::request_decode(e.to_string())),
        None => Ok(GitRepositorySpec::default()),
    }
}

/// Build the patch operations for the repo spec.
///
/// The URL field is always replaced, even when the decided value is the
/// original one, so that patch application stays deterministic and total.
/// The secret reference is `replace`d only when it already exists; a
/// `replace` on a non-existent path is invalid RFC 6902, so an absent
/// reference is `add`ed instead.
fn patch_operations(
    repo_url: String,
    existing_secret_name: &str,
    mirror_secret_name: &str,
) -> Vec<PatchOperation> {
    let mut patches = vec![PatchOperation::Replace(ReplaceOperation {
        path: PointerBuf::from_tokens(["spec", "url"]),
        value: Value::String(repo_url),
    })];

    if !existing_secret_name.is_empty() {
        patches.push(PatchOperation::Replace(ReplaceOperation {
            path: PointerBuf::from_tokens(["spec", "secretRef", "name"]),
            value: Value::String(mirror_secret_name.to_string()),
        }));
    } else {
        patches.push(PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["spec", "secretRef"]),
            value: serde_json::json!(SecretRef {
                name: mirror_secret_name.to_string()
            }),
        }));
    }

    patches
}
