use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use kube::{
    Api, Client, Resource, ResourceExt,
    api::{Patch, PatchParams, PostParams},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{config::FIELD_MANAGER, error::StoreError};

/// Any namespaced object the operator reads or writes.
pub trait Object:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> Object for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// The slice of the API server a reconciliation pass needs.
///
/// Reads are eventually consistent with writes. Calls for one object are
/// never issued concurrently by the controller runtime.
pub trait ObjectStore: Send + Sync {
    fn get_opt<K: Object>(
        &self,
        ns: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<K>, StoreError>> + Send;

    /// Fails with [`StoreError::AlreadyExists`] when the name is taken.
    fn create<K: Object>(
        &self,
        ns: &str,
        obj: &K,
    ) -> impl Future<Output = Result<K, StoreError>> + Send;

    /// Server-side apply of `body`; fields it omits keep their current owner.
    fn patch<K: Object>(
        &self,
        ns: &str,
        name: &str,
        body: &serde_json::Value,
    ) -> impl Future<Output = Result<K, StoreError>> + Send;

    fn patch_status<K: Object>(
        &self,
        ns: &str,
        name: &str,
        status: &serde_json::Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ObjectStore for KubeStore {
    async fn get_opt<K: Object>(&self, ns: &str, name: &str) -> Result<Option<K>, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), ns);
        Ok(api.get_opt(name).await?)
    }

    async fn create<K: Object>(&self, ns: &str, obj: &K) -> Result<K, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), ns);
        match api.create(&PostParams::default(), obj).await {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(StoreError::AlreadyExists {
                kind: K::kind(&()).into_owned(),
                name: obj.name_any(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch<K: Object>(
        &self,
        ns: &str,
        name: &str,
        body: &serde_json::Value,
    ) -> Result<K, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), ns);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        Ok(api.patch(name, &params, &Patch::Apply(body)).await?)
    }

    async fn patch_status<K: Object>(
        &self,
        ns: &str,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), ns);
        let params = PatchParams::apply(FIELD_MANAGER);
        let _ = api
            .patch_status(
                name,
                &params,
                &Patch::Merge(serde_json::json!({ "status": status })),
            )
            .await?;
        Ok(())
    }
}
