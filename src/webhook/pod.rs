//! Pod mutation webhook
//!
//! Handles AdmissionReview requests for Pods, swapping every container
//! image onto the registry mirror with its SHA-1 disambiguator (see
//! [`crate::image`]).
//!
//! Image references carry no scheme, so the update idempotency guard here
//! is a leading-segment comparison instead of the URL hostname check the
//! git hook uses: an image already under `registryAddress/` is left
//! untouched. The comparison is exact, which makes re-runs no-ops on both
//! create and update.

use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use json_patch::{PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::{admission_response, AgentState, MutationResult};
use crate::state::MirrorConfig;
use crate::{image, Error, Result};

/// Minimal view of a Pod spec - only the image fields this hook mutates
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PodSpec {
    containers: Vec<ContainerImage>,
    init_containers: Vec<ContainerImage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContainerImage {
    image: String,
}

/// Handle mutating admission review for Pods
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
            error!(uid = %request.uid, error = %e, "Pod mutation failed, denying");
            AdmissionResponse::from(&request).deny(e.to_string())
        }
    };
    Json(response.into_review())
}

/// Mutate one Pod admission request.
pub fn mutate(
    state_path: &Path,
    request: &AdmissionRequest<DynamicObject>,
) -> Result<MutationResult> {
    if !matches!(request.operation, Operation::Create | Operation::Update) {
        debug!(uid = %request.uid, operation = ?request.operation, "Nothing to mutate for this operation, allowing unchanged");
        return Ok(MutationResult::unchanged());
    }

    let config = MirrorConfig::load(state_path)?;
    debug!(registry_address = %config.registry_address, "Using the mirror registry to mutate the pod");

    let Some(object) = &request.object else {
        debug!(uid = %request.uid, "No object in request, allowing unchanged");
        return Ok(MutationResult::unchanged());
    };
    let spec = decode_spec(object)?;

    let mut patches = Vec::new();
    collect_image_patches(
        "containers",
        &spec.containers,
        &config.registry_address,
        &mut patches,
    );
    collect_image_patches(
        "initContainers",
        &spec.init_containers,
        &config.registry_address,
        &mut patches,
    );

    Ok(MutationResult::patched(patches))
}

fn decode_spec(object: &DynamicObject) -> Result<PodSpec> {
    match object.data.get("spec") {
        Some(spec) => serde_json::from_value(spec.clone())
            .map_err(|e| Error::request_decode(e.to_string())),
        None => Ok(PodSpec::default()),
    }
}

/// Emit one replace per image that is not already under the mirror.
///
/// Per-image failures keep the original image (fail-open, as in the bulk
/// git text scan): one unmatchable image must not abort the whole pod.
fn collect_image_patches(
    field: &str,
    containers: &[ContainerImage],
    registry_address: &str,
    patches: &mut Vec<PatchOperation>,
) {
    let mirrored_prefix = format!("{registry_address}/");
    for (index, container) in containers.iter().enumerate() {
        // An empty image has nothing to swap; an already-mirrored one must
        // not be swapped twice.
        if container.image.is_empty() || container.image.starts_with(&mirrored_prefix) {
            continue;
        }
        match image::swap_host(&container.image, registry_address) {
            Ok(mutated) => {
                debug!(original = %container.image, mutated = %mutated, "Mutated the container image");
                let index = index.to_string();
                patches.push(PatchOperation::Replace(ReplaceOperation {
                    path: PointerBuf::from_tokens(["spec", field, index.as_str(), "image"]),
                    value: Value::String(mutated),
                }));
            }
            Err(e) => {
                warn!(image = %container.image, error = %e, "Unable to swap the image host, keeping the original image");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn mirror_state() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"{
                "gitAddress": "https://gitea.mirror.local",
                "gitPushUsername": "airlift-git-user",
                "registryAddress": "127.0.0.1:31999"
            }"#,
        )
        .unwrap();
        file
    }

    fn admission_request(
        operation: &str,
        object: serde_json::Value,
    ) -> AdmissionRequest<DynamicObject> {
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(serde_json::json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "9f3f83b4-4321-11ee-a206-42010a800002",
                "kind": {"group": "", "version": "v1", "kind": "Pod"},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "name": "test-pod",
                "namespace": "default",
                "operation": operation,
                "userInfo": {"username": "kubelet"},
                "object": object,
                "dryRun": false
            }
        }))
        .unwrap();
        review.try_into().unwrap()
    }

    fn pod(spec: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "test-pod", "namespace": "default"},
            "spec": spec
        })
    }

    fn replace_op(patch: &PatchOperation) -> &ReplaceOperation {
        match patch {
            PatchOperation::Replace(op) => op,
            other => panic!("expected replace, got {other:?}"),
        }
    }

    #[test]
    fn create_swaps_all_container_images() {
        let state = mirror_state();
        let request = admission_request(
            "CREATE",
            pod(serde_json::json!({
                "containers": [
                    {"name": "app", "image": "nginx:latest"},
                    {"name": "sidecar", "image": "ghcr.io/stefanprodan/podinfo"}
                ],
                "initContainers": [
                    {"name": "init", "image": "alpine:3.18"}
                ]
            })),
        );

        let result = mutate(state.path(), &request).unwrap();
        assert!(result.allowed);
        assert_eq!(result.patches.len(), 3);

        let first = replace_op(&result.patches[0]);
        assert_eq!(
            first.path,
            PointerBuf::from_tokens(["spec", "containers", "0", "image"])
        );
        assert_eq!(
            first.value,
            serde_json::json!(
                "127.0.0.1:31999/nginx-58a3ed6f2965252c6ac4957d95f7a3bdfca47101:latest"
            )
        );

        let init = replace_op(&result.patches[2]);
        assert_eq!(
            init.path,
            PointerBuf::from_tokens(["spec", "initContainers", "0", "image"])
        );
        assert_eq!(
            init.value,
            serde_json::json!(
                "127.0.0.1:31999/alpine-0d34076fc15db1b7c7a0943045699eba6f186ec1:3.18"
            )
        );
    }

    #[test]
    fn pod_without_spec_is_allowed_unchanged() {
        let state = mirror_state();
        let request = admission_request(
            "CREATE",
            serde_json::json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "test-pod"}
            }),
        );

        let result = mutate(state.path(), &request).unwrap();
        assert!(result.allowed);
        assert!(result.patches.is_empty());
    }

    #[test]
    fn missing_state_file_is_fatal() {
        let request = admission_request(
            "CREATE",
            pod(serde_json::json!({"containers": [{"image": "nginx:latest"}]})),
        );

        let err = mutate(Path::new("/nonexistent/state"), &request).unwrap_err();
        assert!(matches!(err, Error::ConfigLoad(_)));
    }

    /// Story: updates never swap an image that is already mirrored
    ///
    /// The swapped image starts with the registry address, so the prefix
    /// guard recognizes it on re-delivery and the pod passes through with
    /// no patch at all.
    #[test]
    fn story_already_mirrored_images_pass_through() {
        let state = mirror_state();
        let request = admission_request(
            "UPDATE",
            pod(serde_json::json!({
                "containers": [{
                    "name": "app",
                    "image": "127.0.0.1:31999/nginx-58a3ed6f2965252c6ac4957d95f7a3bdfca47101:latest"
                }]
            })),
        );

        let result = mutate(state.path(), &request).unwrap();
        assert!(result.allowed);
        assert!(result.patches.is_empty());
    }

    /// Story: mixed pods only patch the foreign images
    #[test]
    fn story_only_foreign_images_are_patched() {
        let state = mirror_state();
        let request = admission_request(
            "UPDATE",
            pod(serde_json::json!({
                "containers": [
                    {"name": "mirrored", "image": "127.0.0.1:31999/alpine-0d34076fc15db1b7c7a0943045699eba6f186ec1:3.18"},
                    {"name": "foreign", "image": "library/registry:2.7.1"}
                ]
            })),
        );

        let result = mutate(state.path(), &request).unwrap();
        assert_eq!(result.patches.len(), 1);

        let op = replace_op(&result.patches[0]);
        assert_eq!(
            op.path,
            PointerBuf::from_tokens(["spec", "containers", "1", "image"])
        );
        assert_eq!(
            op.value,
            serde_json::json!(
                "127.0.0.1:31999/library/registry-be33866f5a1373b2b2830a7266df9fee3b8f568c:2.7.1"
            )
        );
    }
}
