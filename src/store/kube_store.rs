//! Kubernetes-backed object store

use async_trait::async_trait;
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, ResourceExt};

use super::{kind_of, ObjectStore, StoreResource};
use crate::error::StoreError;

/// Object store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoreResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_get_error<K: StoreResource>(err: kube::Error, name: &str) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound {
            kind: kind_of::<K>(),
            name: name.to_string(),
        },
        other => StoreError::Api(other.to_string()),
    }
}

fn map_write_error<K: StoreResource>(err: kube::Error, name: &str, create: bool) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 && create => StoreError::AlreadyExists {
            kind: kind_of::<K>(),
            name: name.to_string(),
        },
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict {
            kind: kind_of::<K>(),
            name: name.to_string(),
        },
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound {
            kind: kind_of::<K>(),
            name: name.to_string(),
        },
        other => StoreError::Api(other.to_string()),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreResource>(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(|e| map_get_error::<K>(e, name))
    }

    async fn create<K: StoreResource>(&self, obj: &K) -> Result<(), StoreError> {
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        self.api::<K>(&namespace)
            .create(&PostParams::default(), obj)
            .await
            .map(|_| ())
            .map_err(|e| map_write_error::<K>(e, &name, true))
    }

    async fn update<K: StoreResource>(&self, obj: &K) -> Result<(), StoreError> {
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        self.api::<K>(&namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map(|_| ())
            .map_err(|e| map_write_error::<K>(e, &name, false))
    }

    async fn delete<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        self.api::<K>(namespace)
            .delete(name, &Default::default())
            .await
            .map(|_| ())
            .map_err(|e| map_get_error::<K>(e, name))
    }

    async fn list<K: StoreResource>(&self, namespace: &str) -> Result<Vec<K>, StoreError> {
        self.api::<K>(namespace)
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| StoreError::Api(e.to_string()))
    }

    async fn kind_registered<K: StoreResource>(&self) -> Result<bool, StoreError> {
        // A list against an uninstalled custom resource kind comes back 404.
        let api: Api<K> = Api::all(self.client.clone());
        match api.list(&ListParams::default().limit(1)).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(StoreError::Api(e.to_string())),
        }
    }
}
