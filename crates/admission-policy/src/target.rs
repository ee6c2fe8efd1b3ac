use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::{apps::v1::Deployment, core::v1::EnvVar, core::v1::Service};
use serde::{Deserialize, Serialize};

use crate::admission_request::AdmissionRequest;
use crate::errors::ObjectDecodeError;

/// The kinds of objects the webhook knows how to inspect.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    Deployment,
    Service,
}

impl ObjectKind {
    pub fn from_kind(kind: &str) -> Option<ObjectKind> {
        match kind {
            "Deployment" => Some(ObjectKind::Deployment),
            "Service" => Some(ObjectKind::Service),
            _ => None,
        }
    }

    pub fn has_containers(&self) -> bool {
        matches!(self, ObjectKind::Deployment)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Deployment => f.write_str("Deployment"),
            ObjectKind::Service => f.write_str("Service"),
        }
    }
}

/// The object under review, decoded from the raw object of the request.
#[derive(Debug, Clone)]
pub enum TargetObject {
    Deployment(Box<Deployment>),
    Service(Box<Service>),
}

impl TargetObject {
    pub fn decode(kind: ObjectKind, request: &AdmissionRequest) -> Result<Self, ObjectDecodeError> {
        let raw = request
            .raw_object()
            .ok_or(ObjectDecodeError::MissingObject)?
            .clone();
        let into_error = |source| ObjectDecodeError::Deserialize { kind, source };

        match kind {
            ObjectKind::Deployment => serde_json::from_value::<Deployment>(raw)
                .map(|d| TargetObject::Deployment(Box::new(d)))
                .map_err(into_error),
            ObjectKind::Service => serde_json::from_value::<Service>(raw)
                .map(|s| TargetObject::Service(Box::new(s)))
                .map_err(into_error),
        }
    }

    pub fn name(&self) -> &str {
        let name = match self {
            TargetObject::Deployment(d) => d.metadata.name.as_deref(),
            TargetObject::Service(s) => s.metadata.name.as_deref(),
        };
        name.unwrap_or_default()
    }

    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            TargetObject::Deployment(d) => d.metadata.labels.as_ref(),
            TargetObject::Service(s) => s.metadata.labels.as_ref(),
        }
    }

    /// The environment of the first container of the pod template.
    ///
    /// The outer `None` means there is no container at all, the inner one
    /// that the first container has no `env` list.
    pub fn first_container_env(&self) -> Option<Option<&[EnvVar]>> {
        match self {
            TargetObject::Deployment(d) => d
                .spec
                .as_ref()
                .and_then(|spec| spec.template.spec.as_ref())
                .and_then(|pod_spec| pod_spec.containers.first())
                .map(|container| container.env.as_deref()),
            TargetObject::Service(_) => None,
        }
    }
}
