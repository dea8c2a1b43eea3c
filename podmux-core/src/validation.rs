//! Structural pod admission.

use k8s_openapi::api::core::v1::Pod;
use thiserror::Error;

const IMAGE_PULL_POLICIES: [&str; 3] = ["Always", "IfNotPresent", "Never"];
const RESTART_POLICIES: [&str; 3] = ["Always", "OnFailure", "Never"];
const DNS_POLICIES: [&str; 4] = ["ClusterFirst", "ClusterFirstWithHostNet", "Default", "None"];

/// Why a pod was refused at ingress.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("pod has no name")]
    MissingName,
    #[error("pod has no containers")]
    NoContainers,
    #[error("container has no name")]
    UnnamedContainer,
    #[error("container {0:?} has no image")]
    MissingImage(String),
    #[error("container {container:?} has unrecognized image pull policy {policy:?}")]
    UnrecognizedImagePullPolicy { container: String, policy: String },
    #[error("container {0:?} has no security context")]
    MissingSecurityContext(String),
    #[error("unrecognized restart policy {0:?}")]
    UnrecognizedRestartPolicy(String),
    #[error("unrecognized dns policy {0:?}")]
    UnrecognizedDnsPolicy(String),
}

/// Checks the structure of a pod entering the multiplexer.
///
/// Expects the namespace to have been normalized already. Policy fields are
/// checked against the recognized value sets when present; filling in absent
/// ones is the sources' job. Rejection drops the pod from the operation it
/// arrived in, leaving sibling pods and the stores untouched.
pub fn validate_pod(pod: &Pod) -> Result<(), ValidationError> {
    if pod.metadata.name.as_deref().unwrap_or("").is_empty() {
        return Err(ValidationError::MissingName);
    }
    let spec = pod.spec.as_ref().ok_or(ValidationError::NoContainers)?;
    if spec.containers.is_empty() {
        return Err(ValidationError::NoContainers);
    }
    if let Some(policy) = spec.restart_policy.as_deref() {
        if !RESTART_POLICIES.contains(&policy) {
            return Err(ValidationError::UnrecognizedRestartPolicy(policy.to_string()));
        }
    }
    if let Some(policy) = spec.dns_policy.as_deref() {
        if !DNS_POLICIES.contains(&policy) {
            return Err(ValidationError::UnrecognizedDnsPolicy(policy.to_string()));
        }
    }
    for container in &spec.containers {
        if container.name.is_empty() {
            return Err(ValidationError::UnnamedContainer);
        }
        if container.image.as_deref().unwrap_or("").is_empty() {
            return Err(ValidationError::MissingImage(container.name.clone()));
        }
        if let Some(policy) = container.image_pull_policy.as_deref() {
            if !IMAGE_PULL_POLICIES.contains(&policy) {
                return Err(ValidationError::UnrecognizedImagePullPolicy {
                    container: container.name.clone(),
                    policy: policy.to_string(),
                });
            }
        }
        if container.security_context.is_none() {
            return Err(ValidationError::MissingSecurityContext(container.name.clone()));
        }
    }
    Ok(())
}
