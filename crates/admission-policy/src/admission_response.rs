use crate::errors::PatchError;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// This models the admission/v1/AdmissionResponse object of Kubernetes
/// See https://pkg.go.dev/k8s.io/kubernetes/pkg/apis/admission#AdmissionResponse
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// UID is an identifier for the individual request/response.
    /// This must be copied over from the corresponding AdmissionRequest.
    pub uid: String,

    /// Allowed indicates whether or not the admission request was permitted.
    pub allowed: bool,

    /// The type of Patch. Currently we only allow "JSONPatch".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,

    /// The patch body, a base64 encoded JSONPatch document (RFC 6902).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,

    /// Status contains extra details into why an admission request was denied.
    /// This field IS NOT consulted in any way if "Allowed" is "true".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionResponseStatus>,

    /// AuditAnnotations is an unstructured key value map set by remote admission controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_annotations: Option<HashMap<String, String>>,

    /// warnings is a list of warning messages to return to the requesting API client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

/// PatchType is the type of patch being used to represent the mutated object
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    #[default]
    JSONPatch,
}

/// Values that Status.Status of an AdmissionResponse can have
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub enum AdmissionResponseStatusValue {
    Success,
    Failure,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct AdmissionResponseStatus {
    /// Status of the operation.
    /// One of: "Success" or "Failure".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionResponseStatusValue>,

    /// A human-readable description of the status of this operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// A machine-readable description of why this operation is in the
    /// "Failure" status. A Reason clarifies an HTTP status code but does
    /// not override it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<StatusReason>,

    /// Suggested HTTP return code for this status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

/// The subset of the Kubernetes StatusReason values the webhook can return.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub enum StatusReason {
    /// The server has declined to indicate a specific reason.
    #[serde(rename = "")]
    Unknown,

    /// Status code 400.
    BadRequest,

    /// Status code 406.
    NotAcceptable,

    /// Status code 500.
    InternalError,
}

impl StatusReason {
    pub fn from_code(code: u16) -> StatusReason {
        match code {
            400 => StatusReason::BadRequest,
            406 => StatusReason::NotAcceptable,
            500 => StatusReason::InternalError,
            _ => StatusReason::Unknown,
        }
    }
}

impl AdmissionResponse {
    pub fn allow(uid: String) -> AdmissionResponse {
        AdmissionResponse {
            uid,
            allowed: true,
            ..Default::default()
        }
    }

    pub fn reject(uid: String, message: String, code: u16) -> AdmissionResponse {
        AdmissionResponse {
            uid,
            allowed: false,
            status: Some(AdmissionResponseStatus {
                status: Some(AdmissionResponseStatusValue::Failure),
                message: Some(message),
                reason: Some(StatusReason::from_code(code)),
                code: Some(code),
            }),
            ..Default::default()
        }
    }

    pub fn reject_internal_server_error(uid: String, message: String) -> AdmissionResponse {
        AdmissionResponse::reject(uid, message, 500)
    }

    /// Mark the response as successful and attach the given patch.
    /// An empty patch is never attached.
    pub fn with_patch(mut self, patch: &json_patch::Patch) -> Result<AdmissionResponse, PatchError> {
        self.status = Some(AdmissionResponseStatus {
            status: Some(AdmissionResponseStatusValue::Success),
            ..Default::default()
        });

        if patch.0.is_empty() {
            return Ok(self);
        }

        let patch = serde_json::to_string(patch)?;
        self.patch = Some(general_purpose::STANDARD.encode(patch));
        self.patch_type = Some(PatchType::JSONPatch);

        Ok(self)
    }

    pub fn is_mutated(&self) -> bool {
        self.patch.is_some()
    }
}
