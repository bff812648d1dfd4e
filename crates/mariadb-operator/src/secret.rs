use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use rand::{Rng, distr::Alphanumeric};
use tracing::{debug, info};

use crate::{
    error::StoreError,
    resources::{build_root_secret, secret_name},
    store::ObjectStore,
};

const GENERATED_PASSWORD_LEN: usize = 32;

/// Outcome of [`ensure_root_secret`].
#[derive(Debug, Clone)]
pub enum RootSecret {
    /// Already present, possibly created by a concurrent pass. Left untouched.
    Existing(Secret),
    /// Created by this call. It may not be visible to every reader yet.
    Created(Secret),
}

impl RootSecret {
    pub fn existed(&self) -> bool {
        matches!(self, RootSecret::Existing(_))
    }

    pub fn secret(&self) -> &Secret {
        match self {
            RootSecret::Existing(s) | RootSecret::Created(s) => s,
        }
    }
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Makes sure `<cluster>-secret` exists, creating it at most once.
///
/// An existing secret is never modified, whatever `rootPassword` says now.
/// Losing a create race is not an error: the winner's secret is re-read and
/// reported as existing.
pub async fn ensure_root_secret<S: ObjectStore>(
    store: &S,
    ns: &str,
    cluster: &str,
    root_password: Option<&str>,
    owner: &OwnerReference,
) -> Result<RootSecret, StoreError> {
    let name = secret_name(cluster);
    if let Some(existing) = store.get_opt::<Secret>(ns, &name).await? {
        debug!(secret = %name, "root secret present");
        return Ok(RootSecret::Existing(existing));
    }

    let password = match root_password {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => generate_password(),
    };
    let desired = build_root_secret(cluster, &password, owner);
    match store.create(ns, &desired).await {
        Ok(created) => {
            info!(secret = %name, namespace = %ns, "created root secret");
            Ok(RootSecret::Created(created))
        }
        Err(e) if e.is_conflict() => {
            debug!(secret = %name, "root secret created concurrently, re-reading");
            match store.get_opt::<Secret>(ns, &name).await? {
                Some(existing) => Ok(RootSecret::Existing(existing)),
                None => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}
