// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `readiness.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{KubernetesVersionStatus, TenantControlPlane};
    use crate::readiness::{apply_version_status, compute_version_status, is_progressing};
    use crate::test_support::tcp;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
    use kube::api::ObjectMeta;

    fn deployment(desired: i32, replicas: i32, ready: i32, updated: i32) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                generation: Some(3),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(desired),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                observed_generation: Some(3),
                replicas: Some(replicas),
                ready_replicas: Some(ready),
                updated_replicas: Some(updated),
                unavailable_replicas: None,
                ..Default::default()
            }),
        }
    }

    fn with_recorded(mut tcp: TenantControlPlane, version: &str) -> TenantControlPlane {
        tcp.status_mut().kubernetes.version.version = version.to_string();
        tcp
    }

    #[test]
    fn test_ready_when_converged() {
        let mut tcp = tcp("tenant-a");
        let status = compute_version_status(&tcp, &deployment(2, 2, 2, 2));
        assert_eq!(status, KubernetesVersionStatus::Ready);

        apply_version_status(&mut tcp, status);
        let recorded = &tcp.status.unwrap().kubernetes.version;
        assert_eq!(recorded.version, "v1.31.2");
        assert_eq!(recorded.status, Some(KubernetesVersionStatus::Ready));
    }

    #[test]
    fn test_sleeping_regardless_of_deployment() {
        let mut tcp = tcp("tenant-a");
        tcp.spec.control_plane.deployment.replicas = Some(0);
        let status = compute_version_status(&tcp, &deployment(0, 0, 0, 0));
        assert_eq!(status, KubernetesVersionStatus::Sleeping);

        apply_version_status(&mut tcp, status);
        assert_eq!(tcp.status.unwrap().kubernetes.version.version, "v1.31.2");
    }

    #[test]
    fn test_not_ready_without_ready_replicas() {
        let tcp = tcp("tenant-a");
        assert_eq!(
            compute_version_status(&tcp, &deployment(2, 2, 0, 2)),
            KubernetesVersionStatus::NotReady
        );
    }

    #[test]
    fn test_write_limited_beats_ready() {
        let mut tcp = tcp("tenant-a");
        tcp.spec.write_permissions.block_delete = true;
        assert_eq!(
            compute_version_status(&tcp, &deployment(2, 2, 2, 2)),
            KubernetesVersionStatus::WriteLimited
        );
    }

    #[test]
    fn test_upgrading_keeps_recorded_version() {
        let mut tcp = with_recorded(tcp("tenant-a"), "v1.30.4");
        let status = compute_version_status(&tcp, &deployment(2, 3, 2, 1));
        assert_eq!(status, KubernetesVersionStatus::Upgrading);

        apply_version_status(&mut tcp, status);
        assert_eq!(tcp.status.unwrap().kubernetes.version.version, "v1.30.4");
    }

    #[test]
    fn test_provisioning_without_recorded_version() {
        let tcp = tcp("tenant-a");
        assert_eq!(
            compute_version_status(&tcp, &deployment(2, 2, 1, 2)),
            KubernetesVersionStatus::Provisioning
        );
    }

    #[test]
    fn test_unknown_when_progressing_on_same_version() {
        let tcp = with_recorded(tcp("tenant-a"), "v1.31.2");
        assert_eq!(
            compute_version_status(&tcp, &deployment(2, 2, 1, 2)),
            KubernetesVersionStatus::Unknown
        );
    }

    #[test]
    fn test_progressing_on_generation_lag() {
        let mut d = deployment(2, 2, 2, 2);
        assert!(!is_progressing(&d));
        d.metadata.generation = Some(4);
        assert!(is_progressing(&d));
    }

    #[test]
    fn test_progressing_on_unavailable_replicas() {
        let mut d = deployment(2, 2, 2, 2);
        if let Some(status) = d.status.as_mut() {
            status.unavailable_replicas = Some(1);
        }
        assert!(is_progressing(&d));
    }
}
