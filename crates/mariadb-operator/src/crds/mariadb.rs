use std::fmt;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SpecError;

pub const DEFAULT_REPLICAS: i32 = 1;
pub const MAX_REPLICAS: i32 = 4;
pub const DEFAULT_PORT: i32 = 3306;
pub const DEFAULT_IMAGE_VERSION: &str = "10.6";
pub const DEFAULT_STORAGE_SIZE: &str = "1Gi";

#[derive(CustomResource, Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "mariak8g.mariadb.org",
    version = "v1alpha1",
    kind = "MariaDB",
    plural = "mariadbs",
    namespaced,
    status = "MariaDBStatus",
    shortname = "mdb",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.showState","description":"State of the MariaDB instance"}"#,
    printcolumn = r#"{"name":"Port","type":"string","jsonPath":".spec.port","description":"Port of the MariaDB instance"}"#,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image","priority":1,"description":"Image of the MariaDB instance"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MariaDBSpec {
    /// Number of pods; ordinal 0 is the primary, every other ordinal a replica
    #[schemars(range(min = 1, max = 4))]
    pub replicas: Option<i32>,
    /// Additional database user
    pub username: String,
    /// Password of the additional user
    pub password: String,
    /// Database created on first start
    pub database: String,
    /// Root password. Only read when the root secret is first created;
    /// a random one is generated when absent.
    pub root_password: Option<String>,
    /// Full image reference. Overrides `imageVersion`.
    pub image: Option<String>,
    /// Tag of the default image
    #[serde(default = "default_image_version")]
    pub image_version: String,
    /// Data directory inside the container
    pub data_storage_path: String,
    /// Volume size, e.g. "1Gi" or "100Mi"
    pub data_storage_size: Option<String>,
    /// Port exposed by the database, default 3306
    #[schemars(range(min = 1, max = 65535))]
    pub port: Option<i32>,
}

fn default_image_version() -> String {
    DEFAULT_IMAGE_VERSION.into()
}

impl MariaDBSpec {
    pub fn validate(&self) -> Result<(), SpecError> {
        if let Some(r) = self.replicas
            && !(1..=MAX_REPLICAS).contains(&r)
        {
            return Err(SpecError::Replicas(r));
        }
        for (field, value) in [
            ("username", &self.username),
            ("password", &self.password),
            ("database", &self.database),
        ] {
            if value.trim().is_empty() {
                return Err(SpecError::Empty(field));
            }
        }
        let image_set = self.image.as_deref().is_some_and(|i| !i.is_empty());
        if !image_set && self.image_version.trim().is_empty() {
            return Err(SpecError::Empty("imageVersion"));
        }
        if !self.data_storage_path.starts_with('/') {
            return Err(SpecError::RelativeStoragePath(
                self.data_storage_path.clone(),
            ));
        }
        if let Some(p) = self.port
            && !(1..=65535).contains(&p)
        {
            return Err(SpecError::Port(p));
        }
        Ok(())
    }
}

/// Coarse lifecycle phase written on every pass.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
pub enum Phase {
    #[default]
    Bootstrapping,
    Running,
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Bootstrapping => "Bootstrapping",
            Phase::Running => "Running",
            Phase::Error => "Error",
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MariaDBStatus {
    /// Replicas reported by the StatefulSet; null until first observed
    pub current_replicas: Option<i32>,
    pub desired_replicas: i32,
    pub last_message: String,
    pub phase: Phase,
    pub show_state: String,
    /// 1 once the root secret exists
    pub secret_set: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> MariaDBSpec {
        MariaDBSpec {
            replicas: None,
            username: "app".into(),
            password: "app-pass".into(),
            database: "appdb".into(),
            root_password: None,
            image: None,
            image_version: DEFAULT_IMAGE_VERSION.into(),
            data_storage_path: "/var/lib/mysql".into(),
            data_storage_size: None,
            port: None,
        }
    }

    #[test]
    fn minimal_manifest_applies_defaults() {
        let spec: MariaDBSpec = serde_json::from_value(serde_json::json!({
            "username": "app",
            "password": "app-pass",
            "database": "appdb",
            "dataStoragePath": "/var/lib/mysql"
        }))
        .unwrap();
        assert_eq!(spec.replicas, None);
        assert_eq!(spec.port, None);
        assert_eq!(spec.image_version, "10.6");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn validate_rejects_malformed_specs() {
        let mut s = spec();
        s.replicas = Some(5);
        assert!(matches!(s.validate(), Err(SpecError::Replicas(5))));

        let mut s = spec();
        s.replicas = Some(0);
        assert!(matches!(s.validate(), Err(SpecError::Replicas(0))));

        let mut s = spec();
        s.database = " ".into();
        assert!(matches!(s.validate(), Err(SpecError::Empty("database"))));

        let mut s = spec();
        s.data_storage_path = "data".into();
        assert!(matches!(s.validate(), Err(SpecError::RelativeStoragePath(_))));

        let mut s = spec();
        s.port = Some(70000);
        assert!(matches!(s.validate(), Err(SpecError::Port(70000))));
    }

    #[test]
    fn empty_image_version_needs_an_explicit_image() {
        let mut s = spec();
        s.image_version = String::new();
        assert_eq!(s.validate(), Err(SpecError::Empty("imageVersion")));

        s.image = Some(String::new());
        assert_eq!(s.validate(), Err(SpecError::Empty("imageVersion")));

        s.image = Some("mariadb:11.4".into());
        assert_eq!(s.validate(), Ok(()));
    }

    #[test]
    fn status_serializes_camel_case_with_null_current() {
        let status = MariaDBStatus {
            current_replicas: None,
            desired_replicas: 2,
            last_message: "ok".into(),
            phase: Phase::Running,
            show_state: Phase::Running.to_string(),
            secret_set: 1,
        };
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["currentReplicas"], serde_json::Value::Null);
        assert_eq!(v["desiredReplicas"], 2);
        assert_eq!(v["phase"], "Running");
        assert_eq!(v["showState"], "Running");
    }
}
