use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::errors::PolicyError;
use crate::target::ObjectKind;

pub const DEFAULT_NAME_LABEL: &str = "app";
pub const SERVICE_REGISTRATION_ENV_VAR: &str = "ASPNETCORE_SRV_REGISTER";
pub const SERVICE_REGISTRATION_ENV_VALUE: &str = "k8s";

/// Rule table driving both validation and mutation, keyed by object kind.
///
/// ```yaml
/// Deployment:
///   name:
///     patterns:
///       - type: prefix
///         value: byt
///       - type: suffix
///         value: bayantu
///   nameLabel: app
///   containerEnv:
///     - name: ASPNETCORE_SRV_REGISTER
///       value: k8s
/// Service:
///   nameLabel: app
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct Policy {
    pub kinds: BTreeMap<ObjectKind, KindPolicy>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KindPolicy {
    /// Names accepted by the validating webhook. No policy means every name is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<NamePolicy>,

    /// Label that must be present, the mutating webhook defaults it to the object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_label: Option<String>,

    /// Environment variables injected into the first container when missing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_env: Vec<EnvVarDefault>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NamePolicy {
    pub patterns: Vec<NamePattern>,

    /// Rejection message, derived from the patterns when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum NamePattern {
    Prefix(String),
    Suffix(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvVarDefault {
    pub name: String,
    pub value: String,
}

impl NamePattern {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Prefix(prefix) => name.starts_with(prefix.as_str()),
            NamePattern::Suffix(suffix) => name.ends_with(suffix.as_str()),
        }
    }

    fn value(&self) -> &str {
        match self {
            NamePattern::Prefix(v) | NamePattern::Suffix(v) => v,
        }
    }
}

impl NamePolicy {
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(name))
    }

    /// Message returned when a name is rejected, e.g.
    /// "app name must start with byt or bayantu".
    pub fn rejection_message(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }

        let prefixes = self
            .patterns
            .iter()
            .filter(|p| matches!(p, NamePattern::Prefix(_)))
            .map(NamePattern::value)
            .join(" or ");
        let suffixes = self
            .patterns
            .iter()
            .filter(|p| matches!(p, NamePattern::Suffix(_)))
            .map(NamePattern::value)
            .join(" or ");

        let conditions = [("start with", prefixes), ("end with", suffixes)]
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(verb, values)| format!("{verb} {values}"))
            .join(" or ");

        format!("app name must {conditions}")
    }
}

impl Default for Policy {
    fn default() -> Self {
        let deployment = KindPolicy {
            name: Some(NamePolicy {
                patterns: vec![
                    NamePattern::Prefix(String::from("byt")),
                    NamePattern::Prefix(String::from("bayantu")),
                ],
                message: None,
            }),
            name_label: Some(DEFAULT_NAME_LABEL.to_owned()),
            container_env: vec![EnvVarDefault {
                name: SERVICE_REGISTRATION_ENV_VAR.to_owned(),
                value: SERVICE_REGISTRATION_ENV_VALUE.to_owned(),
            }],
        };
        let service = KindPolicy {
            name_label: Some(DEFAULT_NAME_LABEL.to_owned()),
            ..Default::default()
        };

        Policy {
            kinds: BTreeMap::from([
                (ObjectKind::Deployment, deployment),
                (ObjectKind::Service, service),
            ]),
        }
    }
}

impl Policy {
    pub fn from_file(path: &Path) -> Result<Self, PolicyError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, PolicyError> {
        let policy: Policy = serde_yaml::from_str(contents)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn rules_for(&self, kind: ObjectKind) -> Option<&KindPolicy> {
        self.kinds.get(&kind)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        for (&kind, rules) in &self.kinds {
            if let Some(name) = &rules.name {
                if name.patterns.is_empty() {
                    return Err(PolicyError::NoNamePatterns { kind });
                }
                if name.patterns.iter().any(|p| p.value().is_empty()) {
                    return Err(PolicyError::EmptyNamePattern { kind });
                }
            }

            if rules.name_label.as_deref().is_some_and(str::is_empty) {
                return Err(PolicyError::EmptyLabelKey { kind });
            }

            if !rules.container_env.is_empty() && !kind.has_containers() {
                return Err(PolicyError::EnvVarsWithoutContainers { kind });
            }

            let mut seen = HashSet::new();
            for env in &rules.container_env {
                if env.name.is_empty() {
                    return Err(PolicyError::EmptyEnvVarName { kind });
                }
                if !seen.insert(env.name.as_str()) {
                    return Err(PolicyError::DuplicatedEnvVar {
                        kind,
                        name: env.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
