use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("object is missing {0}")]
    MissingObjectKey(&'static str),
}

/// Failures talking to the object store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },
    #[error(transparent)]
    Kube(#[from] kube::Error),
    #[error("encoding request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// A declared spec that can never converge as written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("replicas must be between 1 and 4, got {0}")]
    Replicas(i32),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("dataStoragePath must be absolute, got {0:?}")]
    RelativeStoragePath(String),
    #[error("port must be between 1 and 65535, got {0}")]
    Port(i32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error("object has no name or uid yet")]
    NoOwnerReference,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoleError {
    #[error("pod name {0:?} has no numeric ordinal suffix")]
    UnparsableOrdinal(String),
    #[error("ordinal {0} is too large for a server id")]
    ServerIdOverflow(u32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a whole number of seconds, got {value:?}")]
    Seconds { var: &'static str, value: String },
}
