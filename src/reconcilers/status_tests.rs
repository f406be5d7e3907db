// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status.rs`

#[cfg(test)]
mod tests {
    use crate::constants::{API_GROUP_VERSION, KIND_TENANT_CONTROL_PLANE, TCP_PROXY_NAME};
    use crate::crd::{Condition, KubernetesVersionStatus, TcpProxySpec, TenantControlPlaneStatus};
    use crate::reconcilers::status::{
        conditions_equal, create_condition, find_condition, is_ready, refresh_ready_condition,
        status_apply_patch, update_condition_in_memory, CONDITION_TYPE_READY,
    };
    use crate::resources::tcp_proxy::agent::AgentKind;
    use crate::resources::tcp_proxy::service_account::ServiceAccountKind;
    use crate::resources::tcp_proxy::{apply_status, build_template, status_is_stale};
    use crate::test_support::tcp;

    const STATUS_TRUE: &str = "True";
    const STATUS_FALSE: &str = "False";

    #[test]
    fn test_create_condition_basic() {
        let condition = create_condition(
            CONDITION_TYPE_READY,
            STATUS_TRUE,
            "ControlPlaneReady",
            "All replicas ready",
        );

        assert_eq!(condition.r#type, CONDITION_TYPE_READY);
        assert_eq!(condition.status, STATUS_TRUE);
        assert_eq!(condition.reason.as_deref(), Some("ControlPlaneReady"));
        assert!(condition.last_transition_time.is_some());
    }

    #[test]
    fn test_update_preserves_transition_time_when_status_unchanged() {
        let mut conditions = vec![Condition {
            r#type: CONDITION_TYPE_READY.to_string(),
            status: STATUS_FALSE.to_string(),
            reason: Some("NotReady".to_string()),
            message: Some("old".to_string()),
            last_transition_time: Some("2025-01-01T00:00:00+00:00".to_string()),
        }];

        update_condition_in_memory(&mut conditions, CONDITION_TYPE_READY, STATUS_FALSE, "Provisioning", "new");
        assert_eq!(conditions.len(), 1);
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2025-01-01T00:00:00+00:00")
        );
        assert_eq!(conditions[0].message.as_deref(), Some("new"));

        update_condition_in_memory(&mut conditions, CONDITION_TYPE_READY, STATUS_TRUE, "ControlPlaneReady", "ok");
        assert_ne!(
            conditions[0].last_transition_time.as_deref(),
            Some("2025-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_update_appends_new_type() {
        let mut conditions = vec![];
        update_condition_in_memory(&mut conditions, "Degraded", STATUS_FALSE, "Healthy", "");
        update_condition_in_memory(&mut conditions, CONDITION_TYPE_READY, STATUS_TRUE, "Ready", "");
        assert_eq!(conditions.len(), 2);
        assert!(find_condition(&conditions, "Degraded").is_some());
        assert!(find_condition(&conditions, "Missing").is_none());
    }

    #[test]
    fn test_conditions_equal_ignores_timestamps() {
        let a = vec![create_condition(CONDITION_TYPE_READY, STATUS_TRUE, "Ready", "ok")];
        let mut b = a.clone();
        b[0].last_transition_time = Some("2020-01-01T00:00:00+00:00".to_string());
        assert!(conditions_equal(&a, &b));

        b[0].status = STATUS_FALSE.to_string();
        assert!(!conditions_equal(&a, &b));
        assert!(!conditions_equal(&a, &[]));
    }

    #[test]
    fn test_refresh_ready_condition_follows_version_status() {
        let mut tcp = tcp("alpha");
        tcp.metadata.generation = Some(4);
        tcp.status_mut().kubernetes.version.status = Some(KubernetesVersionStatus::Provisioning);

        refresh_ready_condition(&mut tcp);
        assert!(!is_ready(&tcp));
        assert_eq!(tcp.status_or_default().observed_generation, Some(4));

        tcp.status_mut().kubernetes.version.status = Some(KubernetesVersionStatus::Ready);
        refresh_ready_condition(&mut tcp);
        assert!(is_ready(&tcp));

        tcp.status_mut().kubernetes.version.status = Some(KubernetesVersionStatus::Sleeping);
        refresh_ready_condition(&mut tcp);
        assert!(is_ready(&tcp));
        assert_eq!(tcp.status_or_default().conditions.len(), 1);
    }

    #[test]
    fn test_status_patch_is_an_apply_configuration() {
        let patch = status_apply_patch(&tcp("alpha"));
        assert_eq!(patch["apiVersion"], API_GROUP_VERSION);
        assert_eq!(patch["kind"], KIND_TENANT_CONTROL_PLANE);
        assert!(patch.get("spec").is_none());
        assert!(patch.get("metadata").is_none());
    }

    #[test]
    fn test_disabled_addon_status_is_dropped_from_the_patch() {
        let mut tcp = tcp("alpha");
        tcp.spec.addons.tcp_proxy = Some(TcpProxySpec::default());
        apply_status::<ServiceAccountKind>(&mut tcp, Some(&build_template::<ServiceAccountKind>()));
        apply_status::<AgentKind>(&mut tcp, Some(&build_template::<AgentKind>()));

        let enabled = status_apply_patch(&tcp);
        let proxy = &enabled["status"]["addons"]["tcpProxy"];
        assert_eq!(proxy["enabled"], true);
        assert_eq!(proxy["serviceAccount"]["name"], TCP_PROXY_NAME);

        tcp.spec.addons.tcp_proxy = None;
        apply_status::<ServiceAccountKind>(&mut tcp, None);
        apply_status::<AgentKind>(&mut tcp, None);

        // Every previously applied field that is now omitted gets removed by the server.
        let disabled = status_apply_patch(&tcp);
        let proxy = &disabled["status"]["addons"]["tcpProxy"];
        assert_eq!(proxy["enabled"], false);
        assert!(proxy["serviceAccount"].get("name").is_none());
        assert!(proxy["serviceAccount"].get("lastUpdate").is_none());
        assert!(proxy["deployment"].get("name").is_none());

        let mut persisted = tcp.clone();
        persisted.status = Some(
            serde_json::from_value::<TenantControlPlaneStatus>(disabled["status"].clone()).unwrap(),
        );
        assert!(!status_is_stale::<ServiceAccountKind>(&persisted, ""));
        assert!(!status_is_stale::<AgentKind>(&persisted, ""));
    }
}
