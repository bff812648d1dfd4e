//! In-memory object store and fixtures shared by the unit tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::{
    crds::mariadb::{DEFAULT_IMAGE_VERSION, MariaDB, MariaDBSpec},
    error::StoreError,
    store::{Object, ObjectStore},
};

pub(crate) const NS: &str = "ns";

pub(crate) fn cluster(name: &str, replicas: Option<i32>) -> MariaDB {
    let mut c = MariaDB::new(
        name,
        MariaDBSpec {
            replicas,
            username: "app".into(),
            password: "app-pass".into(),
            database: "appdb".into(),
            root_password: None,
            image: None,
            image_version: DEFAULT_IMAGE_VERSION.into(),
            data_storage_path: "/var/lib/mysql".into(),
            data_storage_size: None,
            port: None,
        },
    );
    c.metadata.namespace = Some(NS.into());
    c.metadata.uid = Some(format!("uid-{name}"));
    c
}

type Key = (String, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    failing: BTreeMap<String, String>,
    failing_status: Option<String>,
    creates: BTreeMap<String, usize>,
    conflicts: BTreeMap<String, usize>,
    patches: BTreeMap<String, usize>,
}

/// Behaves like the API server for the calls a pass makes: create conflicts
/// on an existing name, apply and status patches merge into what is stored.
#[derive(Default)]
pub(crate) struct FakeStore {
    state: Mutex<State>,
    yield_after_reads: bool,
}

fn kind<K: Object>() -> String {
    K::kind(&()).into_owned()
}

fn key<K: Object>(ns: &str, name: &str) -> Key {
    (kind::<K>(), ns.to_string(), name.to_string())
}

fn merge(target: &mut Value, patch: &Value) {
    let Some(patch) = patch.as_object() else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    if let Some(t) = target.as_object_mut() {
        for (k, v) in patch {
            if v.is_null() {
                t.remove(k);
            } else {
                merge(t.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

impl FakeStore {
    /// Suspends every read once, so concurrent callers all observe the state
    /// before any of them writes.
    pub(crate) fn yield_after_reads(mut self) -> Self {
        self.yield_after_reads = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn insert<K: Object>(&self, ns: &str, obj: &K) {
        let value = serde_json::to_value(obj).unwrap();
        self.lock()
            .objects
            .insert(key::<K>(ns, &obj.meta().name.clone().unwrap()), value);
    }

    pub(crate) fn get<K: Object>(&self, ns: &str, name: &str) -> Option<K> {
        self.lock()
            .objects
            .get(&key::<K>(ns, name))
            .cloned()
            .map(|v| serde_json::from_value(v).unwrap())
    }

    pub(crate) fn remove<K: Object>(&self, ns: &str, name: &str) {
        self.lock().objects.remove(&key::<K>(ns, name));
    }

    /// Every create and patch of `K` fails with a transport error.
    pub(crate) fn fail_writes<K: Object>(&self, message: &str) {
        self.lock().failing.insert(kind::<K>(), message.into());
    }

    pub(crate) fn heal_writes<K: Object>(&self) {
        self.lock().failing.remove(&kind::<K>());
    }

    /// Every status patch fails with a transport error.
    pub(crate) fn fail_status_writes(&self, message: &str) {
        self.lock().failing_status = Some(message.into());
    }

    pub(crate) fn creates<K: Object>(&self) -> usize {
        self.lock()
            .creates
            .get(&kind::<K>())
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn conflicts<K: Object>(&self) -> usize {
        self.lock()
            .conflicts
            .get(&kind::<K>())
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn patches<K: Object>(&self) -> usize {
        self.lock()
            .patches
            .get(&kind::<K>())
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn count<K: Object>(&self) -> usize {
        let kind = kind::<K>();
        self.lock()
            .objects
            .keys()
            .filter(|(k, _, _)| *k == kind)
            .count()
    }

    fn check_failing<K: Object>(state: &State) -> Result<(), StoreError> {
        match state.failing.get(&kind::<K>()) {
            Some(msg) => Err(StoreError::Kube(kube::Error::Service(msg.clone().into()))),
            None => Ok(()),
        }
    }
}

impl ObjectStore for FakeStore {
    async fn get_opt<K: Object>(&self, ns: &str, name: &str) -> Result<Option<K>, StoreError> {
        let found = self.lock().objects.get(&key::<K>(ns, name)).cloned();
        if self.yield_after_reads {
            tokio::task::yield_now().await;
        }
        Ok(found.map(serde_json::from_value).transpose()?)
    }

    async fn create<K: Object>(&self, ns: &str, obj: &K) -> Result<K, StoreError> {
        let name = obj.meta().name.clone().unwrap_or_default();
        let mut state = self.lock();
        Self::check_failing::<K>(&state)?;
        let k = key::<K>(ns, &name);
        if state.objects.contains_key(&k) {
            *state.conflicts.entry(kind::<K>()).or_default() += 1;
            return Err(StoreError::AlreadyExists {
                kind: kind::<K>(),
                name,
            });
        }
        let value = serde_json::to_value(obj)?;
        state.objects.insert(k, value.clone());
        *state.creates.entry(kind::<K>()).or_default() += 1;
        Ok(serde_json::from_value(value)?)
    }

    async fn patch<K: Object>(&self, ns: &str, name: &str, body: &Value) -> Result<K, StoreError> {
        let mut state = self.lock();
        Self::check_failing::<K>(&state)?;
        let stored = state
            .objects
            .entry(key::<K>(ns, name))
            .or_insert_with(|| Value::Object(Default::default()));
        merge(stored, body);
        let merged = stored.clone();
        *state.patches.entry(kind::<K>()).or_default() += 1;
        Ok(serde_json::from_value(merged)?)
    }

    async fn patch_status<K: Object>(
        &self,
        ns: &str,
        name: &str,
        status: &Value,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(msg) = &state.failing_status {
            return Err(StoreError::Kube(kube::Error::Service(msg.clone().into())));
        }
        match state.objects.get_mut(&key::<K>(ns, name)) {
            Some(stored) => {
                merge(stored, &serde_json::json!({ "status": status }));
                Ok(())
            }
            None => Err(StoreError::Kube(kube::Error::Service(
                format!("{} {name} not found", kind::<K>()).into(),
            ))),
        }
    }
}
