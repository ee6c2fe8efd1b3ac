use std::collections::BTreeSet;

use admission_policy::admission_request::AdmissionRequest;
use admission_policy::admission_response::AdmissionResponse;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";
pub const ADMISSION_V1: &str = "admission.k8s.io/v1";
pub const ADMISSION_V1BETA1: &str = "admission.k8s.io/v1beta1";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    pub response: AdmissionResponse,
}

impl AdmissionReviewResponse {
    pub fn with_api_version(api_version: &str, response: AdmissionResponse) -> Self {
        AdmissionReviewResponse {
            api_version: Some(api_version.to_owned()),
            kind: Some(String::from(ADMISSION_REVIEW_KIND)),
            response,
        }
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("cannot parse AdmissionReview: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected kind {0:?}, expected \"AdmissionReview\"")]
    Kind(Option<String>),

    #[error("unsupported apiVersion {0:?}")]
    ApiVersion(Option<String>),

    #[error("AdmissionReview does not contain a request")]
    MissingRequest,
}

/// A review that passed envelope validation.
#[derive(Debug)]
pub struct DecodedReview {
    pub api_version: String,
    pub request: AdmissionRequest,
}

/// A review that could not be decoded. `uid` and `api_version` hold what
/// could be recovered from the payload, so the answer can still be matched
/// with the request.
#[derive(Debug)]
pub struct DecodeFailure {
    pub uid: String,
    pub api_version: String,
    pub error: DecodeError,
}

impl DecodeFailure {
    pub fn into_review(self, code: u16) -> AdmissionReviewResponse {
        AdmissionReviewResponse::with_api_version(
            &self.api_version,
            AdmissionResponse::reject(self.uid, self.error.to_string(), code),
        )
    }
}

/// Decodes AdmissionReview envelopes.
///
/// Built once at startup and shared, read-only, by all the requests.
#[derive(Debug, Clone)]
pub struct ReviewDecoder {
    api_versions: BTreeSet<String>,
}

impl Default for ReviewDecoder {
    fn default() -> Self {
        Self::new([ADMISSION_V1, ADMISSION_V1BETA1])
    }
}

impl ReviewDecoder {
    pub fn new<I, S>(api_versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            api_versions: api_versions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn decode(&self, body: &[u8]) -> Result<DecodedReview, DecodeFailure> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| DecodeFailure {
                uid: String::new(),
                api_version: ADMISSION_V1.to_owned(),
                error: e.into(),
            })?;

        let uid = value
            .pointer("/request/uid")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let api_version = value
            .get("apiVersion")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        let kind = value
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);

        let api_version = match api_version {
            Some(v) if self.api_versions.contains(&v) => v,
            other => {
                return Err(DecodeFailure {
                    uid,
                    api_version: ADMISSION_V1.to_owned(),
                    error: DecodeError::ApiVersion(other),
                })
            }
        };
        let fail = |error| DecodeFailure {
            uid: uid.clone(),
            api_version: api_version.clone(),
            error,
        };

        if kind.as_deref() != Some(ADMISSION_REVIEW_KIND) {
            return Err(fail(DecodeError::Kind(kind)));
        }

        let review: AdmissionReviewRequest =
            serde_json::from_value(value).map_err(|e| fail(e.into()))?;
        let request = review.request.ok_or_else(|| fail(DecodeError::MissingRequest))?;

        Ok(DecodedReview {
            api_version,
            request,
        })
    }
}
