use admission_policy::{
    admission_request::AdmissionRequest, admission_response::AdmissionResponse,
    evaluator::NOT_ACCEPTABLE,
};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, warn, Span};

use crate::api::{
    admission_review::AdmissionReviewResponse, api_error::ApiError, state::ApiServerState,
};

const INVALID_CONTENT_TYPE: &str = "invalid Content-Type, expect application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReviewOperation {
    Validate,
    Mutate,
}

#[tracing::instrument(
    name = "validation",
    fields(
        request_uid=tracing::field::Empty,
        host=crate::config::HOSTNAME.as_str(),
        name=tracing::field::Empty,
        namespace=tracing::field::Empty,
        operation=tracing::field::Empty,
        kind_group=tracing::field::Empty,
        kind_version=tracing::field::Empty,
        kind=tracing::field::Empty,
        allowed=tracing::field::Empty,
        mutated=tracing::field::Empty,
        response_code=tracing::field::Empty,
        response_message=tracing::field::Empty,
    ),
    skip_all)]
/// Allow or deny an AdmissionReview.
pub(crate) async fn validate_handler(
    State(state): State<Arc<ApiServerState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<AdmissionReviewResponse>, Response> {
    review(&state, &headers, body, ReviewOperation::Validate)
}

#[tracing::instrument(
    name = "mutation",
    fields(
        request_uid=tracing::field::Empty,
        host=crate::config::HOSTNAME.as_str(),
        name=tracing::field::Empty,
        namespace=tracing::field::Empty,
        operation=tracing::field::Empty,
        kind_group=tracing::field::Empty,
        kind_version=tracing::field::Empty,
        kind=tracing::field::Empty,
        allowed=tracing::field::Empty,
        mutated=tracing::field::Empty,
        response_code=tracing::field::Empty,
        response_message=tracing::field::Empty,
    ),
    skip_all)]
/// Answer an AdmissionReview, patching the object when needed.
pub(crate) async fn mutate_handler(
    State(state): State<Arc<ApiServerState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<AdmissionReviewResponse>, Response> {
    review(&state, &headers, body, ReviewOperation::Mutate)
}

pub(crate) async fn health_handler() -> &'static str {
    "ok"
}

fn review(
    state: &ApiServerState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
    operation: ReviewOperation,
) -> Result<Json<AdmissionReviewResponse>, Response> {
    check_content_type(headers).map_err(IntoResponse::into_response)?;

    let body = body.map_err(|rejection| {
        warn!(error = %rejection, "cannot read request body");
        ApiError::from(rejection).into_response()
    })?;
    debug!(admission_review = %String::from_utf8_lossy(&body));

    let review = match state.decoder.decode(&body) {
        Ok(review) => review,
        Err(failure) => {
            warn!(error = %failure.error, "cannot decode AdmissionReview");
            Span::current().record("request_uid", failure.uid.as_str());
            let review = failure.into_review(NOT_ACCEPTABLE);
            populate_span_with_admission_response(&review.response);

            return Ok(Json(review));
        }
    };

    populate_span_with_admission_request_data(&review.request);

    let response = match operation {
        ReviewOperation::Validate => state.evaluator.validate(&review.request),
        ReviewOperation::Mutate => state.evaluator.mutate(&review.request),
    };
    debug!(response =? &response, "admission request evaluated");

    populate_span_with_admission_response(&response);

    Ok(Json(AdmissionReviewResponse::with_api_version(
        &review.api_version,
        response,
    )))
}

fn check_content_type(headers: &HeaderMap) -> Result<(), (StatusCode, &'static str)> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    if content_type == Some(mime::APPLICATION_JSON.essence_str()) {
        Ok(())
    } else {
        warn!(content_type = ?content_type, "unsupported content type");
        Err((StatusCode::UNSUPPORTED_MEDIA_TYPE, INVALID_CONTENT_TYPE))
    }
}

fn populate_span_with_admission_request_data(adm_req: &AdmissionRequest) {
    Span::current().record("kind", adm_req.kind.kind.as_str());
    Span::current().record("kind_group", adm_req.kind.group.as_str());
    Span::current().record("kind_version", adm_req.kind.version.as_str());
    Span::current().record("name", adm_req.name.clone().unwrap_or_default().as_str());
    Span::current().record(
        "namespace",
        adm_req.namespace.clone().unwrap_or_default().as_str(),
    );
    Span::current().record("operation", adm_req.operation.as_str());
    Span::current().record("request_uid", adm_req.uid.as_str());
}

fn populate_span_with_admission_response(response: &AdmissionResponse) {
    Span::current().record("allowed", response.allowed);
    Span::current().record("mutated", response.is_mutated());
    if let Some(status) = &response.status {
        if let Some(code) = &status.code {
            Span::current().record("response_code", code);
        }
        if let Some(message) = &status.message {
            Span::current().record("response_message", message.as_str());
        }
    }
}
