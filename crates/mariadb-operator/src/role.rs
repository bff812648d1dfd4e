//! Ordinal-to-role assignment.
//!
//! A StatefulSet pod keeps its ordinal for its whole life, including after
//! being rescheduled, so the role is a pure function of that ordinal: ordinal
//! 0 is the primary and every other ordinal is a replica. There is no
//! election and no failover; a persistently unhealthy ordinal 0 leaves the
//! group without a working primary.
//!
//! The assignment runs inside the pod's init container as a bash script
//! rendered by [`startup_script`] from the same constants used here.

use std::fmt;

use crate::error::RoleError;

/// Added to the ordinal so that no member uses the reserved `server-id=0`.
pub const SERVER_ID_BASE: u32 = 3000;
/// The only ordinal that runs as primary.
pub const PRIMARY_ORDINAL: u32 = 0;

/// Projected ConfigMap volume holding every fragment.
pub const CONFIG_MAP_MOUNT: &str = "/mnt/config-map";
/// Directory read by the server at startup.
pub const CONF_D_MOUNT: &str = "/etc/mysql/conf.d";
/// Scripts run by the image entrypoint on an empty data directory.
pub const INITDB_MOUNT: &str = "/docker-entrypoint-initdb.d";
/// File the selected fragment is copied to.
pub const SERVER_ID_FILE: &str = "server-id.cnf";

pub const PRIMARY_CNF: &str = "primary.cnf";
pub const REPLICA_CNF: &str = "replica.cnf";
pub const PRIMARY_SQL: &str = "primary.sql";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Primary,
    Replica,
}

impl Role {
    pub fn for_ordinal(ordinal: u32) -> Self {
        if ordinal == PRIMARY_ORDINAL {
            Role::Primary
        } else {
            Role::Replica
        }
    }

    /// ConfigMap key of the server configuration for this role.
    pub fn config_fragment(self) -> &'static str {
        match self {
            Role::Primary => PRIMARY_CNF,
            Role::Replica => REPLICA_CNF,
        }
    }

    /// ConfigMap key of the SQL run on first boot, if any. Replicas get none:
    /// the primary's address is not known when the template is rendered.
    pub fn bootstrap_sql(self) -> Option<&'static str> {
        match self {
            Role::Primary => Some(PRIMARY_SQL),
            Role::Replica => None,
        }
    }

    fn install_commands(self) -> Vec<String> {
        let mut cmds = vec![format!(
            "cp {CONFIG_MAP_MOUNT}/{} {CONF_D_MOUNT}/{SERVER_ID_FILE}",
            self.config_fragment()
        )];
        if let Some(sql) = self.bootstrap_sql() {
            cmds.push(format!("cp {CONFIG_MAP_MOUNT}/{sql} {INITDB_MOUNT}/"));
        }
        cmds
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Primary => "primary",
            Role::Replica => "replica",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleAssignment {
    pub ordinal: u32,
    pub role: Role,
    pub server_id: u32,
}

impl RoleAssignment {
    pub fn for_ordinal(ordinal: u32) -> Result<Self, RoleError> {
        let server_id = SERVER_ID_BASE
            .checked_add(ordinal)
            .ok_or(RoleError::ServerIdOverflow(ordinal))?;
        Ok(Self {
            ordinal,
            role: Role::for_ordinal(ordinal),
            server_id,
        })
    }

    pub fn for_pod(pod_name: &str) -> Result<Self, RoleError> {
        Self::for_ordinal(parse_ordinal(pod_name)?)
    }

    /// Line appended to the copied fragment.
    pub fn server_id_line(&self) -> String {
        format!("server-id={}", self.server_id)
    }
}

/// Extracts the trailing `-<digits>` ordinal from a StatefulSet pod name.
pub fn parse_ordinal(pod_name: &str) -> Result<u32, RoleError> {
    let err = || RoleError::UnparsableOrdinal(pod_name.to_string());
    let (_, suffix) = pod_name.rsplit_once('-').ok_or_else(err)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    suffix.parse().map_err(|_| err())
}

/// Bash run once per pod start by the init container.
///
/// Performs [`RoleAssignment::for_pod`] on the pod's hostname: exits non-zero
/// when the hostname has no ordinal, copies the role's fragment and bootstrap
/// SQL, then appends [`RoleAssignment::server_id_line`].
pub fn startup_script() -> String {
    let indent = |role: Role| {
        role.install_commands()
            .into_iter()
            .map(|c| format!("  {c}\n"))
            .collect::<String>()
    };
    format!(
        "set -ex\n\
         [[ $(hostname) =~ -([0-9]+)$ ]] || exit 1\n\
         ordinal=${{BASH_REMATCH[1]}}\n\
         if [[ $ordinal -eq {PRIMARY_ORDINAL} ]]; then\n\
         {primary}\
         else\n\
         {replica}\
         fi\n\
         echo server-id=$(({SERVER_ID_BASE} + ordinal)) >> {CONF_D_MOUNT}/{SERVER_ID_FILE}\n",
        primary = indent(Role::for_ordinal(PRIMARY_ORDINAL)),
        replica = indent(Role::for_ordinal(PRIMARY_ORDINAL + 1)),
    )
}
