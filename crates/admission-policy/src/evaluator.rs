use tracing::{debug, error, info, warn};

use crate::admission_request::AdmissionRequest;
use crate::admission_response::AdmissionResponse;
use crate::patch::PatchBuilder;
use crate::policy::Policy;
use crate::target::{ObjectKind, TargetObject};

/// HTTP code set when the object name does not satisfy the name policy.
pub const NOT_ACCEPTABLE: u16 = 406;
/// HTTP code set when the mutating webhook receives a kind it cannot patch.
pub const BAD_REQUEST: u16 = 400;

/// Takes admission decisions for a single request, according to the
/// rule table it has been built with.
#[derive(Debug, Clone, Default)]
pub struct PolicyEvaluator {
    policy: Policy,
}

impl PolicyEvaluator {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }

    /// Allow or deny the request.
    ///
    /// Kinds without a name policy are always allowed, without even looking
    /// at the object.
    pub fn validate(&self, request: &AdmissionRequest) -> AdmissionResponse {
        let uid = request.uid.clone();

        let Some((kind, name_policy)) = ObjectKind::from_kind(&request.kind.kind)
            .and_then(|kind| self.policy.rules_for(kind).map(|rules| (kind, rules)))
            .and_then(|(kind, rules)| rules.name.as_ref().map(|name| (kind, name)))
        else {
            debug!(kind = request.kind.kind.as_str(), "no name policy for kind, allowing");
            return AdmissionResponse::allow(uid);
        };

        let object = match TargetObject::decode(kind, request) {
            Ok(object) => object,
            Err(e) => {
                error!(error = %e, "cannot decode object under validation");
                return AdmissionResponse::reject_internal_server_error(uid, e.to_string());
            }
        };

        if name_policy.matches(object.name()) {
            AdmissionResponse::allow(uid)
        } else {
            info!(name = object.name(), %kind, "name rejected by policy");
            AdmissionResponse::reject(uid, name_policy.rejection_message(), NOT_ACCEPTABLE)
        }
    }

    /// Allow the request, attaching a patch when the object misses some of
    /// the labels or environment variables required for its kind.
    pub fn mutate(&self, request: &AdmissionRequest) -> AdmissionResponse {
        let uid = request.uid.clone();

        let Some((kind, rules)) = ObjectKind::from_kind(&request.kind.kind)
            .and_then(|kind| self.policy.rules_for(kind).map(|rules| (kind, rules)))
        else {
            warn!(kind = request.kind.kind.as_str(), "mutation requested for unsupported kind");
            return AdmissionResponse::reject(
                uid,
                format!("mutation of kind {} is not supported", request.kind.kind),
                BAD_REQUEST,
            );
        };

        let object = match TargetObject::decode(kind, request) {
            Ok(object) => object,
            Err(e) => {
                error!(error = %e, "cannot decode object under mutation");
                return AdmissionResponse::reject_internal_server_error(uid, e.to_string());
            }
        };

        let patch = PatchBuilder::for_object(&object, rules);
        debug!(operations = patch.0.len(), %kind, "patch built");

        AdmissionResponse::allow(uid.clone())
            .with_patch(&patch)
            .unwrap_or_else(|e| {
                error!(error = %e, "cannot encode patch");
                AdmissionResponse::reject_internal_server_error(uid, e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission_request::GroupVersionKind;
    use crate::admission_response::AdmissionResponseStatusValue;
    use crate::policy::{KindPolicy, NamePattern, NamePolicy};
    use base64::{engine::general_purpose, Engine as _};
    use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
    use rstest::rstest;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn request(kind: &str, object: Value) -> AdmissionRequest {
        AdmissionRequest {
            uid: String::from("705ab4f5-6393-11e8-b7cc-42010a800002"),
            kind: GroupVersionKind {
                group: String::from("apps"),
                version: String::from("v1"),
                kind: kind.to_owned(),
            },
            operation: String::from("CREATE"),
            object: Some(RawExtension(object)),
            ..Default::default()
        }
    }

    fn deployment(name: &str, labels: Value, containers: Value) -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": name, "labels": labels},
            "spec": {
                "selector": {},
                "template": {"spec": {"containers": containers}}
            }
        })
    }

    fn decoded_patch(response: &AdmissionResponse) -> Value {
        let raw = general_purpose::STANDARD
            .decode(response.patch.as_ref().expect("patch should be set"))
            .unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    #[rstest]
    #[case::byt("byt-frontend", true)]
    #[case::bayantu("bayantu-api", true)]
    #[case::other("frontend", false)]
    #[case::suffix("frontend-bayantu", false)]
    fn validate_deployment_name(#[case] name: &str, #[case] allowed: bool) {
        let evaluator = PolicyEvaluator::default();
        let request = request("Deployment", deployment(name, json!({}), json!([])));

        let response = evaluator.validate(&request);

        assert_eq!(response.uid, request.uid);
        assert_eq!(response.allowed, allowed);
        if allowed {
            assert!(response.status.is_none());
        } else {
            let status = response.status.unwrap();
            assert_eq!(status.code, Some(406));
            assert_eq!(
                status.message.as_deref(),
                Some("app name must start with byt or bayantu")
            );
        }
    }

    #[test]
    fn validate_with_suffix_policy() {
        let policy = Policy {
            kinds: BTreeMap::from([(
                ObjectKind::Deployment,
                KindPolicy {
                    name: Some(NamePolicy {
                        patterns: vec![
                            NamePattern::Prefix(String::from("byt")),
                            NamePattern::Suffix(String::from("bayantu")),
                        ],
                        message: None,
                    }),
                    ..Default::default()
                },
            )]),
        };
        let evaluator = PolicyEvaluator::new(policy);

        let allowed = evaluator.validate(&request(
            "Deployment",
            deployment("frontend-bayantu", json!({}), json!([])),
        ));
        let rejected = evaluator.validate(&request(
            "Deployment",
            deployment("bayantu-frontend", json!({}), json!([])),
        ));

        assert!(allowed.allowed);
        assert!(!rejected.allowed);
    }

    #[rstest]
    #[case::service("Service")]
    #[case::pod("Pod")]
    #[case::config_map("ConfigMap")]
    fn validate_other_kinds_fail_open(#[case] kind: &str) {
        let evaluator = PolicyEvaluator::default();
        // the object is not even decoded
        let request = request(kind, json!({"metadata": "garbage"}));

        let response = evaluator.validate(&request);

        assert!(response.allowed);
        assert_eq!(response.uid, request.uid);
    }

    #[test]
    fn validate_malformed_deployment_is_internal_error() {
        let evaluator = PolicyEvaluator::default();
        let request = request("Deployment", json!({"metadata": {"name": ["not", "a", "string"]}}));

        let response = evaluator.validate(&request);

        assert!(!response.allowed);
        let status = response.status.unwrap();
        assert_eq!(status.code, Some(500));
        assert!(!status.message.unwrap().is_empty());
    }

    #[test]
    fn mutate_adds_label_and_env() {
        let evaluator = PolicyEvaluator::default();
        let request = request(
            "Deployment",
            deployment("foo", json!(null), json!([{"name": "web", "env": [{"name": "PORT", "value": "80"}]}])),
        );

        let response = evaluator.mutate(&request);

        assert!(response.allowed);
        assert_eq!(response.uid, request.uid);
        assert_eq!(
            response.status.as_ref().and_then(|s| s.status.clone()),
            Some(AdmissionResponseStatusValue::Success)
        );
        assert_eq!(
            decoded_patch(&response),
            json!([
                {"op": "add", "path": "/metadata/labels", "value": {"app": "foo"}},
                {
                    "op": "add",
                    "path": "/spec/template/spec/containers/0/env/0",
                    "value": {"name": "ASPNETCORE_SRV_REGISTER", "value": "k8s"}
                }
            ])
        );
    }

    #[test]
    fn mutate_deployment_without_containers_only_adds_label() {
        let evaluator = PolicyEvaluator::default();
        let request = request("Deployment", deployment("foo", json!(null), json!([])));

        let response = evaluator.mutate(&request);

        assert!(response.allowed);
        assert_eq!(
            decoded_patch(&response),
            json!([{"op": "add", "path": "/metadata/labels", "value": {"app": "foo"}}])
        );
    }

    #[test]
    fn mutate_is_idempotent() {
        let evaluator = PolicyEvaluator::default();
        let request = request(
            "Deployment",
            deployment(
                "foo",
                json!({"app": "foo"}),
                json!([{"name": "web", "env": [{"name": "ASPNETCORE_SRV_REGISTER", "value": "k8s"}]}]),
            ),
        );

        let response = evaluator.mutate(&request);

        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert!(response.patch_type.is_none());
    }

    #[test]
    fn mutate_service_only_adds_label() {
        let evaluator = PolicyEvaluator::default();
        let request = request(
            "Service",
            json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": {"name": "frontend", "labels": {"tier": "web"}}
            }),
        );

        let response = evaluator.mutate(&request);

        assert!(response.allowed);
        assert_eq!(
            decoded_patch(&response),
            json!([{"op": "add", "path": "/metadata/labels/app", "value": "frontend"}])
        );
    }

    #[test]
    fn mutate_unsupported_kind_is_denied() {
        let evaluator = PolicyEvaluator::default();
        let request = request("Pod", json!({"metadata": {"name": "foo"}}));

        let response = evaluator.mutate(&request);

        assert!(!response.allowed);
        assert_eq!(response.uid, request.uid);
        let status = response.status.unwrap();
        assert_eq!(status.code, Some(400));
        assert_eq!(
            status.message.as_deref(),
            Some("mutation of kind Pod is not supported")
        );
    }

    #[test]
    fn mutate_malformed_object_is_internal_error() {
        let evaluator = PolicyEvaluator::default();
        let request = request("Service", json!({"spec": "not-an-object"}));

        let response = evaluator.mutate(&request);

        assert!(!response.allowed);
        assert_eq!(response.status.unwrap().code, Some(500));
    }
}
