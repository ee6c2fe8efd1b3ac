use thiserror::Error;

use crate::target::ObjectKind;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("cannot read policy file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse policy: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{kind}: name pattern cannot be empty")]
    EmptyNamePattern { kind: ObjectKind },

    #[error("{kind}: name policy must define at least one pattern")]
    NoNamePatterns { kind: ObjectKind },

    #[error("{kind}: label key cannot be empty")]
    EmptyLabelKey { kind: ObjectKind },

    #[error("{kind}: environment variable name cannot be empty")]
    EmptyEnvVarName { kind: ObjectKind },

    #[error("{kind}: environment variable \"{name}\" is defined more than once")]
    DuplicatedEnvVar { kind: ObjectKind, name: String },

    #[error("{kind}: objects of this kind have no containers, environment rules cannot apply")]
    EnvVarsWithoutContainers { kind: ObjectKind },
}

/// Errors raised while decoding the object embedded into an admission request.
#[derive(Error, Debug)]
pub enum ObjectDecodeError {
    #[error("admission request has no object to review")]
    MissingObject,

    #[error("cannot decode {kind} object: {source}")]
    Deserialize {
        kind: ObjectKind,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("cannot serialize JSON patch: {0}")]
    Serialize(#[from] serde_json::Error),
}
