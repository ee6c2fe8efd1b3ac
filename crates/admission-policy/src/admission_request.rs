use k8s_openapi::apimachinery::pkg::runtime::RawExtension;

/// This models the admission/v1/AdmissionRequest object of Kubernetes.
///
/// Only `uid` and `kind` are mandatory, the webhook does not need the
/// remaining attributes to take a decision and must not fail when a
/// trimmed-down review is sent.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    pub kind: GroupVersionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<GroupVersionResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<k8s_openapi::api::authentication::v1::UserInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<RawExtension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_object: Option<RawExtension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RawExtension>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    pub kind: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GroupVersionResource {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    pub resource: String,
}

impl AdmissionRequest {
    /// The raw object under review, `null` is treated as absent.
    pub fn raw_object(&self) -> Option<&serde_json::Value> {
        self.object
            .as_ref()
            .map(|raw| &raw.0)
            .filter(|value| !value.is_null())
    }
}
