use k8s_openapi::api::apps::v1::StatefulSet;

use crate::crds::mariadb::{MariaDBStatus, Phase};

/// A child that could not be created or patched during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildFailure {
    pub child: String,
    pub message: String,
}

fn status(phase: Phase, desired: i32, current: Option<i32>, message: String) -> MariaDBStatus {
    MariaDBStatus {
        current_replicas: current,
        desired_replicas: desired,
        last_message: message,
        phase,
        show_state: phase.to_string(),
        secret_set: 1,
    }
}

pub fn bootstrapping(desired: i32) -> MariaDBStatus {
    status(
        Phase::Bootstrapping,
        desired,
        None,
        "root secret created, waiting before creating dependents".into(),
    )
}

/// The pass stopped before any child was applied, either on a spec that can
/// never converge or on a failed secret bootstrap. The secret marker is
/// carried over from the previous pass.
pub fn aborted(desired: i32, secret_set: i32, message: String) -> MariaDBStatus {
    MariaDBStatus {
        secret_set,
        ..status(Phase::Error, desired, None, message)
    }
}

/// Outcome of a pass that attempted every child. Replica counts come from
/// the applied StatefulSet when it was applied.
pub fn converged(
    desired: i32,
    stateful_set: Option<&StatefulSet>,
    failures: &[ChildFailure],
) -> MariaDBStatus {
    let current = stateful_set
        .and_then(|s| s.status.as_ref())
        .and_then(|s| s.current_replicas);
    let desired = stateful_set
        .and_then(|s| s.spec.as_ref())
        .and_then(|s| s.replicas)
        .unwrap_or(desired);
    match failures.last() {
        Some(last) => status(Phase::Error, desired, current, last.message.clone()),
        None => status(
            Phase::Running,
            desired,
            current,
            format!("{desired} replica(s) converged"),
        ),
    }
}
