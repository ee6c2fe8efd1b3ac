use json_patch::{jsonptr::PointerBuf, AddOperation, Patch, PatchOperation};
use serde_json::{json, Value};

use crate::policy::{EnvVarDefault, KindPolicy};
use crate::target::TargetObject;

const FIRST_CONTAINER_ENV: [&str; 6] = ["spec", "template", "spec", "containers", "0", "env"];

/// Accumulates the JSON Patch operations required to bring an object
/// in line with the rules of its kind.
#[derive(Debug, Default)]
pub struct PatchBuilder {
    operations: Vec<PatchOperation>,
}

impl PatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the whole patch for the given object.
    pub fn for_object(object: &TargetObject, rules: &KindPolicy) -> Patch {
        let mut builder = PatchBuilder::new();
        if let Some(label) = &rules.name_label {
            builder.ensure_label(object, label);
        }
        builder.ensure_container_env(object, &rules.container_env);
        builder.build()
    }

    /// Default the `label` label to the object name.
    ///
    /// When the object has no labels at all the whole map is added, otherwise
    /// only the missing key is added so existing labels are preserved.
    pub fn ensure_label(&mut self, object: &TargetObject, label: &str) -> &mut Self {
        let name = object.name();

        match object.labels() {
            Some(labels) if labels.contains_key(label) => {}
            Some(labels) if !labels.is_empty() => {
                self.add(
                    PointerBuf::from_tokens(["metadata", "labels", label]),
                    json!(name),
                );
            }
            _ => {
                self.add(
                    PointerBuf::from_tokens(["metadata", "labels"]),
                    json!({ label: name }),
                );
            }
        }

        self
    }

    /// Make sure every entry of `defaults` is defined inside of the first container.
    ///
    /// Missing variables are inserted at the head of the list, preserving the
    /// declaration order. Objects without containers are left untouched.
    pub fn ensure_container_env(
        &mut self,
        object: &TargetObject,
        defaults: &[EnvVarDefault],
    ) -> &mut Self {
        let Some(env) = object.first_container_env() else {
            return self;
        };

        let missing: Vec<&EnvVarDefault> = defaults
            .iter()
            .filter(|default| {
                !env.is_some_and(|vars| vars.iter().any(|var| var.name == default.name))
            })
            .collect();
        if missing.is_empty() {
            return self;
        }

        match env {
            Some(vars) if !vars.is_empty() => {
                for default in missing.iter().rev() {
                    self.add(
                        PointerBuf::from_tokens(FIRST_CONTAINER_ENV.into_iter().chain(["0"])),
                        env_var(default),
                    );
                }
            }
            _ => {
                let vars: Vec<Value> = missing.iter().map(|default| env_var(default)).collect();
                self.add(PointerBuf::from_tokens(FIRST_CONTAINER_ENV), Value::Array(vars));
            }
        }

        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn build(self) -> Patch {
        Patch(self.operations)
    }

    fn add(&mut self, path: PointerBuf, value: Value) {
        self.operations
            .push(PatchOperation::Add(AddOperation { path, value }));
    }
}

fn env_var(default: &EnvVarDefault) -> Value {
    json!({"name": default.name, "value": default.value})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission_request::{AdmissionRequest, GroupVersionKind};
    use crate::policy::Policy;
    use crate::target::ObjectKind;
    use k8s_openapi::apimachinery::pkg::runtime::RawExtension;

    fn deployment(metadata: Value, containers: Value) -> TargetObject {
        let request = AdmissionRequest {
            uid: String::from("uid"),
            kind: GroupVersionKind {
                kind: String::from("Deployment"),
                ..Default::default()
            },
            object: Some(RawExtension(json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": metadata,
                "spec": {
                    "selector": {},
                    "template": {"spec": {"containers": containers}}
                }
            }))),
            ..Default::default()
        };
        TargetObject::decode(ObjectKind::Deployment, &request).unwrap()
    }

    fn patch_json(patch: &Patch) -> Value {
        serde_json::to_value(patch).unwrap()
    }

    fn deployment_rules() -> KindPolicy {
        Policy::default()
            .rules_for(ObjectKind::Deployment)
            .cloned()
            .unwrap()
    }

    #[test]
    fn add_whole_label_map_when_there_are_no_labels() {
        let object = deployment(json!({"name": "foo"}), json!([]));

        let mut builder = PatchBuilder::new();
        builder.ensure_label(&object, "app");

        assert_eq!(
            patch_json(&builder.build()),
            json!([{"op": "add", "path": "/metadata/labels", "value": {"app": "foo"}}])
        );
    }

    #[test]
    fn add_only_missing_label_when_other_labels_exist() {
        let object = deployment(json!({"name": "foo", "labels": {"tier": "web"}}), json!([]));

        let mut builder = PatchBuilder::new();
        builder.ensure_label(&object, "app");

        assert_eq!(
            patch_json(&builder.build()),
            json!([{"op": "add", "path": "/metadata/labels/app", "value": "foo"}])
        );
    }

    #[test]
    fn label_key_is_escaped() {
        let object = deployment(json!({"name": "foo", "labels": {"tier": "web"}}), json!([]));

        let mut builder = PatchBuilder::new();
        builder.ensure_label(&object, "app.kubernetes.io/name");

        assert_eq!(
            patch_json(&builder.build()),
            json!([{"op": "add", "path": "/metadata/labels/app.kubernetes.io~1name", "value": "foo"}])
        );
    }

    #[test]
    fn existing_label_is_left_alone() {
        let object = deployment(json!({"name": "foo", "labels": {"app": "bar"}}), json!([]));

        let mut builder = PatchBuilder::new();
        builder.ensure_label(&object, "app");

        assert!(builder.is_empty());
    }

    #[test]
    fn env_var_is_prepended() {
        let object = deployment(
            json!({"name": "foo", "labels": {"app": "foo"}}),
            json!([{"name": "web", "env": [{"name": "PORT", "value": "80"}]}]),
        );

        let patch = PatchBuilder::for_object(&object, &deployment_rules());

        assert_eq!(
            patch_json(&patch),
            json!([{
                "op": "add",
                "path": "/spec/template/spec/containers/0/env/0",
                "value": {"name": "ASPNETCORE_SRV_REGISTER", "value": "k8s"}
            }])
        );
    }

    #[test]
    fn env_list_is_created_when_missing() {
        let object = deployment(
            json!({"name": "foo", "labels": {"app": "foo"}}),
            json!([{"name": "web"}]),
        );

        let patch = PatchBuilder::for_object(&object, &deployment_rules());

        assert_eq!(
            patch_json(&patch),
            json!([{
                "op": "add",
                "path": "/spec/template/spec/containers/0/env",
                "value": [{"name": "ASPNETCORE_SRV_REGISTER", "value": "k8s"}]
            }])
        );
    }

    #[test]
    fn several_env_vars_keep_declaration_order() {
        let object = deployment(
            json!({"name": "foo", "labels": {"app": "foo"}}),
            json!([{"name": "web", "env": [{"name": "PORT", "value": "80"}]}]),
        );
        let defaults = vec![
            EnvVarDefault {
                name: String::from("FIRST"),
                value: String::from("1"),
            },
            EnvVarDefault {
                name: String::from("SECOND"),
                value: String::from("2"),
            },
        ];

        let mut builder = PatchBuilder::new();
        builder.ensure_container_env(&object, &defaults);

        // applying the operations in order leaves FIRST at index 0
        assert_eq!(
            patch_json(&builder.build()),
            json!([
                {"op": "add", "path": "/spec/template/spec/containers/0/env/0", "value": {"name": "SECOND", "value": "2"}},
                {"op": "add", "path": "/spec/template/spec/containers/0/env/0", "value": {"name": "FIRST", "value": "1"}}
            ])
        );
    }

    #[test]
    fn zero_containers_never_produce_env_operations() {
        let object = deployment(json!({"name": "foo"}), json!([]));

        let patch = PatchBuilder::for_object(&object, &deployment_rules());

        assert_eq!(
            patch_json(&patch),
            json!([{"op": "add", "path": "/metadata/labels", "value": {"app": "foo"}}])
        );
    }

    #[test]
    fn compliant_object_needs_no_patch() {
        let object = deployment(
            json!({"name": "foo", "labels": {"app": "foo"}}),
            json!([{"name": "web", "env": [{"name": "ASPNETCORE_SRV_REGISTER", "value": "consul"}]}]),
        );

        let patch = PatchBuilder::for_object(&object, &deployment_rules());

        assert!(patch.0.is_empty());
    }

    #[test]
    fn patch_applies_cleanly() {
        let raw = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "foo", "labels": {"tier": "web"}},
            "spec": {
                "selector": {},
                "template": {"spec": {"containers": [{"name": "web", "env": [{"name": "PORT", "value": "80"}]}]}}
            }
        });
        let request = AdmissionRequest {
            uid: String::from("uid"),
            object: Some(RawExtension(raw.clone())),
            ..Default::default()
        };
        let object = TargetObject::decode(ObjectKind::Deployment, &request).unwrap();

        let patch = PatchBuilder::for_object(&object, &deployment_rules());
        let mut patched = raw;
        json_patch::patch(&mut patched, &patch.0).unwrap();

        assert_eq!(patched["metadata"]["labels"], json!({"tier": "web", "app": "foo"}));
        assert_eq!(
            patched["spec"]["template"]["spec"]["containers"][0]["env"],
            json!([
                {"name": "ASPNETCORE_SRV_REGISTER", "value": "k8s"},
                {"name": "PORT", "value": "80"}
            ])
        );
    }
}
