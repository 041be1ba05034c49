//! Unit tests for the instance installer

#[cfg(test)]
mod tests {
    use crate::installer::InstanceInstaller;
    use crate::test_utils::{clusters, instance_configuration, issue_tokens, mark_deployment_ready};
    use cluster_client::{MockClusterClient, Verb};
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::Namespace;
    use k8s_openapi::api::rbac::v1::ClusterRole;

    struct Env {
        mcp: MockClusterClient,
        workload: MockClusterClient,
        installer: InstanceInstaller,
    }

    fn env() -> Env {
        let platform = MockClusterClient::new("platform");
        let mcp = MockClusterClient::new("mcp");
        let workload = MockClusterClient::new("workload");
        issue_tokens(&mcp);
        let installer = InstanceInstaller::new(instance_configuration(), &clusters(&platform, &mcp, &workload));
        Env { mcp, workload, installer }
    }

    #[tokio::test]
    async fn test_install_twice_produces_no_second_write() {
        let env = env();
        env.installer.install().await.unwrap();
        env.mcp.clear_writes();
        env.workload.clear_writes();

        env.installer.install().await.unwrap();
        assert!(env.mcp.writes().is_empty());
        assert!(env.workload.writes().is_empty());
    }

    #[tokio::test]
    async fn test_install_stops_at_first_failure() {
        let env = env();
        env.workload.fail_on(Verb::Create, "HorizontalPodAutoscaler");

        assert!(env.installer.install().await.is_err());
        assert!(env.workload.contains::<Deployment>(Some("ls-abc123"), "manifest-deployer"));
        assert!(!env.workload.contains::<Deployment>(Some("ls-abc123"), "helm-deployer"));
    }

    #[tokio::test]
    async fn test_readiness_lists_components_in_install_order() {
        let env = env();
        env.installer.install().await.unwrap();

        let result = env.installer.check_readiness().await;
        let reasons = result.reasons();
        assert_eq!(reasons.len(), 4);
        assert!(reasons[0].contains("manifest-deployer"));
        assert!(reasons[1].contains("helm-deployer"));
        assert!(reasons[2].contains("landscaper-controller"));
        assert!(reasons[3].contains("landscaper-webhooks"));

        for name in ["manifest-deployer", "helm-deployer", "landscaper-controller", "landscaper-webhooks"] {
            mark_deployment_ready(&env.workload, "ls-abc123", name);
        }
        assert!(env.installer.check_readiness().await.is_ready());
    }

    #[tokio::test]
    async fn test_uninstall_order() {
        let env = env();
        env.installer.install().await.unwrap();
        env.workload.clear_writes();
        env.mcp.clear_writes();

        env.installer.uninstall().await.unwrap();

        let deployments: Vec<String> = env
            .workload
            .writes()
            .into_iter()
            .filter(|w| w.is(Verb::Delete, "Deployment"))
            .map(|w| w.name)
            .collect();
        assert_eq!(
            deployments,
            vec!["landscaper-webhooks", "landscaper-controller", "helm-deployer", "manifest-deployer"]
        );
        let last = env.workload.writes().pop().unwrap();
        assert!(last.is(Verb::Delete, "Namespace"));
        assert!(!env.workload.contains::<Namespace>(None, "ls-abc123"));
        assert!(!env.mcp.contains::<ClusterRole>(None, "landscaper:abc123"));
    }

    #[tokio::test]
    async fn test_uninstall_failure_keeps_rbac() {
        let env = env();
        env.installer.install().await.unwrap();
        env.workload.fail_on(Verb::Delete, "Namespace");

        assert!(env.installer.uninstall().await.is_err());
        assert!(env.mcp.contains::<ClusterRole>(None, "landscaper:abc123"));
    }
}
