// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for context.rs

#[cfg(test)]
mod tests {
    use crate::context::Stores;
    use crate::crd::{CsrApprovalSpec, TenantControlPlane, WorkerBootstrapSpec};
    use crate::test_support::tcp;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::runtime::reflector::store::Writer;
    use kube::runtime::watcher::Event;
    use kube::ResourceExt;

    fn with_bootstrap(name: &str, auto_approve: bool) -> TenantControlPlane {
        let mut tcp = tcp(name);
        tcp.spec.addons.worker_bootstrap = Some(WorkerBootstrapSpec {
            csr_approval: CsrApprovalSpec { auto_approve },
            ..Default::default()
        });
        tcp
    }

    fn stores(objects: Vec<TenantControlPlane>) -> Stores {
        let mut writer = Writer::<TenantControlPlane>::default();
        for obj in objects {
            writer.apply_watcher_event(&Event::Apply(obj));
        }
        Stores {
            tenant_control_planes: writer.as_reader(),
        }
    }

    #[test]
    fn test_worker_bootstrap_targets() {
        let mut deleting = with_bootstrap("gamma", true);
        deleting.metadata.deletion_timestamp = Some(Time(jiff::Timestamp::now()));

        let stores = stores(vec![
            with_bootstrap("beta", true),
            with_bootstrap("alpha", true),
            with_bootstrap("manual", false),
            tcp("plain"),
            deleting,
        ]);

        let names: Vec<_> = stores
            .worker_bootstrap_targets()
            .iter()
            .map(|t| t.name_any())
            .collect();
        assert_eq!(names, vec!["alpha", "beta", "manual"]);
    }

    #[test]
    fn test_get_tenant_control_plane() {
        let stores = stores(vec![tcp("alpha")]);
        assert!(stores.get_tenant_control_plane("alpha", "tenants").is_some());
        assert!(stores.get_tenant_control_plane("alpha", "other").is_none());
        assert!(stores.get_tenant_control_plane("beta", "tenants").is_none());
    }
}
