// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fixtures for unit tests.

use crate::config::OperatorConfig;
use crate::context::{Context, Stores};
use crate::crd::{KubernetesSpec, TenantControlPlane, TenantControlPlaneSpec};
use crate::metrics::Metrics;
use crate::reconcilers::status::KubeStatusWriter;
use crate::reconcilers::upsert::ObjectStore;
use crate::resources::TenantClientFactory;
use crate::trigger::Trigger;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, Service, ServiceSpec, ServiceStatus,
};
use kube::api::ObjectMeta;
use kube::runtime::reflector::store::Writer;
use kube::runtime::watcher::Event;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// A minimal tenant control plane in namespace `tenants`.
pub fn tcp(name: &str) -> TenantControlPlane {
    let mut tcp = TenantControlPlane::new(
        name,
        TenantControlPlaneSpec {
            kubernetes: KubernetesSpec {
                version: "v1.31.2".to_string(),
            },
            ..Default::default()
        },
    );
    tcp.metadata.namespace = Some("tenants".to_string());
    tcp.metadata.uid = Some(format!("uid-{name}"));
    tcp.metadata.generation = Some(1);
    tcp
}

/// Client pointing at a port nothing listens on.
pub fn offline_client() -> Client {
    Client::try_from(kube::Config::new("http://127.0.0.1:1".parse().unwrap())).unwrap()
}

/// Context with the given tenant client source and tenant control planes in its store.
pub fn context(tenants: Arc<dyn TenantClientFactory>, objects: Vec<TenantControlPlane>) -> Arc<Context> {
    let mut writer = Writer::<TenantControlPlane>::default();
    for obj in objects {
        writer.apply_watcher_event(&Event::Apply(obj));
    }
    let client = offline_client();
    Arc::new(Context {
        status: Arc::new(KubeStatusWriter::new(client.clone())),
        client,
        config: Arc::new(OperatorConfig::default()),
        metrics: Arc::new(Metrics::new().unwrap()),
        tenants,
        trigger: Trigger::channel().0,
        stores: Stores {
            tenant_control_planes: writer.as_reader(),
        },
    })
}

/// A Service of the given type with a cluster IP.
pub fn service(name: &str, service_type: &str, cluster_ip: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("tenants".to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(service_type.to_string()),
            cluster_ip: Some(cluster_ip.to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

/// A LoadBalancer Service with the given ingress entries `(ip, hostname)`.
pub fn load_balancer_service(name: &str, ingress: &[(Option<&str>, Option<&str>)]) -> Service {
    let mut svc = service(name, "LoadBalancer", "10.96.0.10");
    svc.status = Some(ServiceStatus {
        load_balancer: Some(LoadBalancerStatus {
            ingress: Some(
                ingress
                    .iter()
                    .map(|(ip, host)| LoadBalancerIngress {
                        ip: ip.map(str::to_string),
                        hostname: host.map(str::to_string),
                        ..Default::default()
                    })
                    .collect(),
            ),
        }),
        ..Default::default()
    });
    svc
}

/// API error as returned by the server, e.g. `api_error(409, "Conflict")`.
pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(
        kube::core::Status::failure(&format!("{reason} ({code})"), reason)
            .with_code(code)
            .boxed(),
    )
}

pub fn conflict_error() -> kube::Error {
    api_error(409, "Conflict")
}

/// In-memory object store bumping `resourceVersion` on every write.
pub(crate) struct MemoryStore<K> {
    pub objects: Mutex<BTreeMap<String, K>>,
    pub conflicts_left: AtomicU32,
    pub writes: AtomicU32,
    /// Object a concurrent writer creates right before our next create.
    pub racing_create: Mutex<Option<K>>,
}

impl<K> MemoryStore<K> {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            conflicts_left: AtomicU32::new(0),
            writes: AtomicU32::new(0),
            racing_create: Mutex::new(None),
        }
    }

    pub fn with_racing_create(self, obj: K) -> Self {
        *self.racing_create.lock().unwrap() = Some(obj);
        self
    }

    pub fn with_conflicts(self, n: u32) -> Self {
        self.conflicts_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.conflicts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<K: Clone> MemoryStore<K> {
    pub fn get(&self, name: &str) -> Option<K> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    pub fn insert(&self, name: &str, obj: K) {
        self.objects.lock().unwrap().insert(name.to_string(), obj);
    }
}

fn bump<K: Resource>(obj: &mut K, writes: u32) {
    obj.meta_mut().resource_version = Some(writes.to_string());
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    async fn get_opt(&self, name: &str) -> Result<Option<K>, kube::Error> {
        Ok(self.get(name))
    }

    async fn create(&self, obj: &K) -> Result<K, kube::Error> {
        if self.take_conflict() {
            return Err(conflict_error());
        }
        let racing = self.racing_create.lock().unwrap().take();
        if let Some(mut winner) = racing {
            let writes = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
            bump(&mut winner, writes);
            let name = winner.meta().name.clone().unwrap_or_default();
            self.insert(&name, winner);
            return Err(api_error(409, "AlreadyExists"));
        }
        let writes = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stored = obj.clone();
        bump(&mut stored, writes);
        let name = stored.meta().name.clone().unwrap_or_default();
        self.insert(&name, stored.clone());
        Ok(stored)
    }

    async fn replace(&self, name: &str, obj: &K) -> Result<K, kube::Error> {
        if self.take_conflict() {
            return Err(conflict_error());
        }
        let writes = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stored = obj.clone();
        bump(&mut stored, writes);
        self.insert(name, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, name: &str) -> Result<bool, kube::Error> {
        Ok(self.objects.lock().unwrap().remove(name).is_some())
    }
}
