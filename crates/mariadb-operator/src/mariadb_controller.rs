use std::sync::Arc;

use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::{
    Api, Client, Resource, ResourceExt,
    runtime::{
        controller::{Action, Controller},
        watcher,
    },
};
use tracing::{debug, error, info, warn};

use crate::{
    config::OperatorConfig,
    crds::mariadb::{MariaDB, MariaDBStatus, Phase},
    error::{BuildError, ReconcileError, StoreError},
    resources::{PatchView, desired_children, owner_ref, resolve_replicas, secret_name},
    secret::ensure_root_secret,
    status::{self, ChildFailure},
    store::{KubeStore, Object, ObjectStore},
};

pub struct Ctx<S = KubeStore> {
    pub store: S,
    pub config: OperatorConfig,
}

fn api<K>(client: &Client, ns: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    match ns {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Watches `MariaDB` objects and every child kind they own.
///
/// The runtime never runs two passes for the same object at once; the
/// reconciler relies on that instead of locking.
pub fn controller(client: Client, config: &OperatorConfig) -> Controller<MariaDB> {
    let ns = config.watch_namespace.as_deref();
    let wc = watcher::Config::default();
    Controller::new(api::<MariaDB>(&client, ns), wc.clone())
        .owns(api::<StatefulSet>(&client, ns), wc.clone())
        .owns(api::<Service>(&client, ns), wc.clone())
        .owns(api::<ConfigMap>(&client, ns), wc.clone())
        .owns(api::<Secret>(&client, ns), wc)
        .shutdown_on_signal()
}

/// One reconciliation pass.
pub async fn reconcile<S: ObjectStore>(
    obj: Arc<MariaDB>,
    ctx: Arc<Ctx<S>>,
) -> Result<Action, ReconcileError> {
    let ns = obj
        .namespace()
        .ok_or(ReconcileError::MissingObjectKey("metadata.namespace"))?;
    let name = obj.name_any();

    let Some(cluster) = ctx.store.get_opt::<MariaDB>(&ns, &name).await? else {
        info!(cluster = %name, namespace = %ns, "MariaDB no longer exists");
        return Ok(Action::await_change());
    };
    let desired = resolve_replicas(&cluster.spec);
    let secret_set = cluster.status.as_ref().map_or(0, |s| s.secret_set);

    let children = match desired_children(&cluster) {
        Ok(children) => children,
        Err(BuildError::Spec(e)) => {
            warn!(cluster = %name, namespace = %ns, error = %e, "invalid spec");
            write_status(
                &ctx.store,
                &ns,
                &name,
                &status::aborted(desired, secret_set, e.to_string()),
            )
            .await?;
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e.into()),
    };

    let owner = owner_ref(&cluster)?;
    let root = match ensure_root_secret(
        &ctx.store,
        &ns,
        &name,
        cluster.spec.root_password.as_deref(),
        &owner,
    )
    .await
    {
        Ok(root) => root,
        Err(e) => {
            // Best effort: the pass fails either way.
            let message = format!("Secret {}: {e}", secret_name(&name));
            let aborted = status::aborted(desired, secret_set, message);
            if let Err(status_err) = write_status(&ctx.store, &ns, &name, &aborted).await {
                warn!(
                    cluster = %name,
                    namespace = %ns,
                    error = %status_err,
                    "status write failed"
                );
            }
            return Err(e.into());
        }
    };
    if !root.existed() {
        // Pods referencing the secret are created on the next pass, once it
        // is readable everywhere.
        write_status(&ctx.store, &ns, &name, &status::bootstrapping(desired)).await?;
        return Ok(Action::requeue(ctx.config.bootstrap_requeue));
    }

    let mut failures = Vec::new();
    record(
        &mut failures,
        apply_child(&ctx.store, &ns, &children.config_map).await,
        &children.config_map,
    );
    record(
        &mut failures,
        apply_child(&ctx.store, &ns, &children.service).await,
        &children.service,
    );
    let stateful_set = record(
        &mut failures,
        apply_child(&ctx.store, &ns, &children.stateful_set).await,
        &children.stateful_set,
    );

    let observed = status::converged(desired, stateful_set.as_ref(), &failures);
    write_status(&ctx.store, &ns, &name, &observed).await?;
    info!(
        cluster = %name,
        namespace = %ns,
        phase = %observed.phase,
        current = ?observed.current_replicas,
        desired = observed.desired_replicas,
        "reconciled"
    );

    Ok(match observed.phase {
        Phase::Running => Action::requeue(ctx.config.resync),
        _ => Action::requeue(ctx.config.error_requeue),
    })
}

pub fn error_policy<S>(obj: Arc<MariaDB>, err: &ReconcileError, ctx: Arc<Ctx<S>>) -> Action {
    error!(cluster = %obj.name_any(), error = ?err, "reconcile failed");
    Action::requeue(ctx.config.error_requeue)
}

/// Creates `desired` if absent, otherwise applies its patch view.
async fn apply_child<S, K>(store: &S, ns: &str, desired: &K) -> Result<K, StoreError>
where
    S: ObjectStore,
    K: Object + PatchView,
{
    let name = desired.name_any();
    if store.get_opt::<K>(ns, &name).await?.is_none() {
        match store.create(ns, desired).await {
            Ok(created) => {
                info!(child = %K::kind(&()), name = %name, "created");
                return Ok(created);
            }
            Err(e) if e.is_conflict() => {
                debug!(child = %K::kind(&()), name = %name, "created concurrently, patching");
            }
            Err(e) => return Err(e),
        }
    }
    let body = desired.patch_view()?;
    store.patch(ns, &name, &body).await
}

fn record<K: Object>(
    failures: &mut Vec<ChildFailure>,
    result: Result<K, StoreError>,
    desired: &K,
) -> Option<K> {
    match result {
        Ok(applied) => Some(applied),
        Err(e) => {
            let child = K::kind(&()).into_owned();
            warn!(child = %child, name = %desired.name_any(), error = %e, "apply failed");
            failures.push(ChildFailure {
                message: format!("{child} {}: {e}", desired.name_any()),
                child,
            });
            None
        }
    }
}

async fn write_status<S: ObjectStore>(
    store: &S,
    ns: &str,
    name: &str,
    status: &MariaDBStatus,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(status)?;
    store.patch_status::<MariaDB>(ns, name, &value).await
}
