//! Building blocks shared by the workload components
//!
//! Namespaces, pulled-in image pull secrets, config secrets, Deployments,
//! HorizontalPodAutoscalers and Services, each expressed as an idempotent
//! mutation for [`create_or_update`].

use crate::apply::{OperationResult, create_or_update, delete_if_exists};
use crate::error::InstallError;
use crate::labels::{CONFIG_HASH_ANNOTATION, KUBECONFIG_HASH_ANNOTATION, PULL_SECRET_LABEL, merge_into, selector_labels};
use crate::values::{AutoscalingConfig, ResourceConfig, ResourceList, content_hash};
use cluster_client::{ClusterClient, ClusterError, typed};
use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec, MetricSpec,
    MetricTarget, ResourceMetricSource,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, LocalObjectReference, Namespace, PodSpec, PodTemplateSpec,
    ResourceRequirements, Secret, SecretVolumeSource, Service, ServicePort, ServiceSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Key of the marshaled component configuration inside the config secret
pub const CONFIG_KEY: &str = "config.yaml";

/// Key of the control plane kubeconfig inside the config secret
pub const KUBECONFIG_KEY: &str = "kubeconfig";

/// Mount path of the config secret
pub const CONFIG_MOUNT_PATH: &str = "/etc/landscaper/config";

const CONFIG_VOLUME: &str = "config";

fn meta(namespace: Option<&str>, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..Default::default()
    }
}

/// Name of the config secret of a component
pub fn config_secret_name(component: &str) -> String {
    format!("{}-config", component)
}

/// Name under which a platform image pull secret is copied for a component
pub fn pull_secret_name(component: &str, secret: &str) -> String {
    format!("{}-{}", component, secret)
}

/// Ensures a namespace exists and carries `labels`.
pub async fn ensure_namespace(
    client: &dyn ClusterClient,
    name: &str,
    labels: &BTreeMap<String, String>,
) -> Result<OperationResult, InstallError> {
    let namespace = Namespace {
        metadata: meta(None, name),
        ..Default::default()
    };
    create_or_update(client, namespace, |ns| {
        merge_into(&mut ns.metadata.labels, labels);
        Ok(())
    })
    .await
}

/// Deletes a namespace; a missing namespace counts as success.
pub async fn delete_namespace(client: &dyn ClusterClient, name: &str) -> Result<(), InstallError> {
    delete_if_exists::<Namespace>(client, None, name).await?;
    info!("Deleted namespace {} on cluster {}", name, client.cluster_name());
    Ok(())
}

/// Copies image pull secrets from the platform namespace into `target_namespace`.
///
/// Copies are named `<component>-<secret>` and labeled with `labels` plus
/// [`PULL_SECRET_LABEL`]; the local names are returned in the order given.
pub async fn sync_pull_secrets(
    platform: &dyn ClusterClient,
    workload: &dyn ClusterClient,
    platform_namespace: &str,
    target_namespace: &str,
    component: &str,
    secrets: &[String],
    labels: &BTreeMap<String, String>,
) -> Result<Vec<String>, InstallError> {
    let mut local_names = Vec::with_capacity(secrets.len());
    for secret_name in secrets {
        let source = typed::get::<Secret>(platform, Some(platform_namespace), secret_name)
            .await?
            .ok_or_else(|| {
                ClusterError::NotFound(format!(
                    "image pull secret {}/{} not found on cluster {}",
                    platform_namespace,
                    secret_name,
                    platform.cluster_name()
                ))
            })?;

        let local_name = pull_secret_name(component, secret_name);
        let copy = Secret {
            metadata: meta(Some(target_namespace), &local_name),
            ..Default::default()
        };
        create_or_update(workload, copy, |secret| {
            merge_into(&mut secret.metadata.labels, labels);
            merge_into(
                &mut secret.metadata.labels,
                &BTreeMap::from([(PULL_SECRET_LABEL.to_string(), secret_name.clone())]),
            );
            secret.type_ = source.type_.clone();
            secret.data = source.data.clone();
            Ok(())
        })
        .await?;
        local_names.push(local_name);
    }
    Ok(local_names)
}

/// Removes every pull secret copy of `component` in `namespace`.
///
/// Copies are found by label, so secrets dropped from the configuration
/// since they were copied are removed as well.
pub async fn delete_pull_secrets(
    workload: &dyn ClusterClient,
    namespace: &str,
    instance_id: &str,
    component: &str,
) -> Result<(), InstallError> {
    let selector = selector_labels(instance_id, component);
    let copies = typed::list::<Secret>(workload, Some(namespace), &selector).await?;
    for copy in copies {
        let is_copy = copy
            .metadata
            .labels
            .as_ref()
            .is_some_and(|l| l.contains_key(PULL_SECRET_LABEL));
        let Some(name) = copy.metadata.name.filter(|_| is_copy) else {
            continue;
        };
        delete_if_exists::<Secret>(workload, Some(namespace), &name).await?;
        debug!("Deleted image pull secret {}/{} on cluster {}", namespace, name, workload.cluster_name());
    }
    Ok(())
}

/// Applies the config secret of a component.
///
/// Returns the pod template annotations that make pods roll when the
/// configuration or the kubeconfig changes.
pub async fn apply_config_secret(
    client: &dyn ClusterClient,
    namespace: &str,
    name: &str,
    labels: &BTreeMap<String, String>,
    config: (&str, &str),
    kubeconfig: Option<&[u8]>,
) -> Result<BTreeMap<String, String>, InstallError> {
    let (config_yaml, config_hash) = config;
    let mut data = BTreeMap::from([(
        CONFIG_KEY.to_string(),
        ByteString(config_yaml.as_bytes().to_vec()),
    )]);
    let mut annotations = BTreeMap::from([(CONFIG_HASH_ANNOTATION.to_string(), config_hash.to_string())]);
    if let Some(kubeconfig) = kubeconfig {
        data.insert(KUBECONFIG_KEY.to_string(), ByteString(kubeconfig.to_vec()));
        annotations.insert(KUBECONFIG_HASH_ANNOTATION.to_string(), content_hash(kubeconfig));
    }

    let secret = Secret {
        metadata: meta(Some(namespace), name),
        ..Default::default()
    };
    create_or_update(client, secret, |secret| {
        merge_into(&mut secret.metadata.labels, labels);
        secret.type_ = Some("Opaque".to_string());
        secret.data = Some(data);
        Ok(())
    })
    .await?;
    Ok(annotations)
}

/// Desired state of one component Deployment
#[derive(Debug, Clone)]
pub struct WorkloadDeployment<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub labels: &'a BTreeMap<String, String>,
    pub selector: &'a BTreeMap<String, String>,
    pub image: String,
    pub args: Vec<String>,
    pub resources: &'a ResourceConfig,
    pub initial_replicas: i32,
    pub config_secret: &'a str,
    pub pod_annotations: &'a BTreeMap<String, String>,
    pub image_pull_secrets: &'a [String],
    pub ports: Vec<(String, i32)>,
}

fn quantities(list: &ResourceList) -> Option<BTreeMap<String, Quantity>> {
    let mut map = BTreeMap::new();
    if let Some(cpu) = &list.cpu {
        map.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &list.memory {
        map.insert("memory".to_string(), Quantity(memory.clone()));
    }
    if map.is_empty() { None } else { Some(map) }
}

/// Applies a component Deployment.
///
/// `spec.replicas` is only set when the Deployment is created; afterwards
/// the autoscaler owns it. The selector is only set on creation since it is
/// immutable.
pub async fn apply_deployment(
    client: &dyn ClusterClient,
    desired: &WorkloadDeployment<'_>,
) -> Result<OperationResult, InstallError> {
    let deployment = Deployment {
        metadata: meta(Some(desired.namespace), desired.name),
        ..Default::default()
    };
    create_or_update(client, deployment, |deployment| {
        merge_into(&mut deployment.metadata.labels, desired.labels);

        let spec = deployment.spec.get_or_insert_with(DeploymentSpec::default);
        spec.replicas.get_or_insert(desired.initial_replicas);
        if spec.selector.match_labels.is_none() && spec.selector.match_expressions.is_none() {
            spec.selector = LabelSelector {
                match_labels: Some(desired.selector.clone()),
                match_expressions: None,
            };
        }

        let template = &mut spec.template;
        let template_meta = template.metadata.get_or_insert_with(ObjectMeta::default);
        merge_into(&mut template_meta.labels, desired.labels);
        merge_into(&mut template_meta.annotations, desired.pod_annotations);
        mutate_pod_spec(template, desired);
        Ok(())
    })
    .await
}

fn mutate_pod_spec(template: &mut PodTemplateSpec, desired: &WorkloadDeployment<'_>) {
    let pod = template.spec.get_or_insert_with(PodSpec::default);

    pod.image_pull_secrets = if desired.image_pull_secrets.is_empty() {
        None
    } else {
        Some(
            desired
                .image_pull_secrets
                .iter()
                .map(|name| LocalObjectReference { name: name.clone() })
                .collect(),
        )
    };

    let volume = Volume {
        name: CONFIG_VOLUME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(desired.config_secret.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let volumes = pod.volumes.get_or_insert_with(Vec::new);
    match volumes.iter_mut().find(|v| v.name == CONFIG_VOLUME) {
        Some(existing) => existing.secret = volume.secret,
        None => volumes.push(volume),
    }

    let index = match pod.containers.iter().position(|c| c.name == desired.name) {
        Some(index) => index,
        None => {
            pod.containers.push(Container {
                name: desired.name.to_string(),
                ..Default::default()
            });
            pod.containers.len() - 1
        }
    };
    let container = &mut pod.containers[index];
    container.image = Some(desired.image.clone());
    container.args = Some(desired.args.clone());
    container.resources = Some(ResourceRequirements {
        requests: quantities(&desired.resources.requests),
        limits: quantities(&desired.resources.limits),
        ..Default::default()
    });
    container.ports = if desired.ports.is_empty() {
        None
    } else {
        Some(
            desired
                .ports
                .iter()
                .map(|(name, port)| ContainerPort {
                    name: Some(name.clone()),
                    container_port: *port,
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                })
                .collect(),
        )
    };

    let mount = VolumeMount {
        name: CONFIG_VOLUME.to_string(),
        mount_path: CONFIG_MOUNT_PATH.to_string(),
        read_only: Some(true),
        ..Default::default()
    };
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    match mounts.iter_mut().find(|m| m.name == CONFIG_VOLUME) {
        Some(existing) => {
            existing.mount_path = mount.mount_path;
            existing.read_only = mount.read_only;
        }
        None => mounts.push(mount),
    }
}

/// Applies the autoscaler of a Deployment (autoscaling/v2, CPU utilization).
pub async fn apply_hpa(
    client: &dyn ClusterClient,
    namespace: &str,
    name: &str,
    labels: &BTreeMap<String, String>,
    autoscaling: &AutoscalingConfig,
) -> Result<OperationResult, InstallError> {
    let hpa = HorizontalPodAutoscaler {
        metadata: meta(Some(namespace), name),
        ..Default::default()
    };
    create_or_update(client, hpa, |hpa| {
        merge_into(&mut hpa.metadata.labels, labels);
        let spec = hpa.spec.get_or_insert_with(HorizontalPodAutoscalerSpec::default);
        spec.scale_target_ref = CrossVersionObjectReference {
            api_version: Some("apps/v1".to_string()),
            kind: "Deployment".to_string(),
            name: name.to_string(),
        };
        spec.min_replicas = Some(autoscaling.min());
        spec.max_replicas = autoscaling.max();
        spec.metrics = Some(vec![MetricSpec {
            type_: "Resource".to_string(),
            resource: Some(ResourceMetricSource {
                name: "cpu".to_string(),
                target: MetricTarget {
                    type_: "Utilization".to_string(),
                    average_utilization: Some(autoscaling.target_cpu()),
                    ..Default::default()
                },
            }),
            ..Default::default()
        }]);
        Ok(())
    })
    .await
}

/// Applies a ClusterIP Service exposing `port` of the selected pods.
pub async fn apply_service(
    client: &dyn ClusterClient,
    namespace: &str,
    name: &str,
    labels: &BTreeMap<String, String>,
    selector: &BTreeMap<String, String>,
    port: i32,
) -> Result<OperationResult, InstallError> {
    let service = Service {
        metadata: meta(Some(namespace), name),
        ..Default::default()
    };
    create_or_update(client, service, |service| {
        merge_into(&mut service.metadata.labels, labels);
        let spec = service.spec.get_or_insert_with(ServiceSpec::default);
        spec.selector = Some(selector.clone());
        spec.ports = Some(vec![ServicePort {
            name: Some("https".to_string()),
            port,
            target_port: Some(IntOrString::Int(port)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]);
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{labels, selector_labels};
    use cluster_client::{MockClusterClient, Verb};

    fn desired<'a>(
        labels: &'a BTreeMap<String, String>,
        selector: &'a BTreeMap<String, String>,
        resources: &'a ResourceConfig,
        annotations: &'a BTreeMap<String, String>,
    ) -> WorkloadDeployment<'a> {
        WorkloadDeployment {
            name: "helm-deployer",
            namespace: "ls-abc",
            labels,
            selector,
            image: "registry.example/helm:v1".to_string(),
            args: vec!["--config=/etc/landscaper/config/config.yaml".to_string()],
            resources,
            initial_replicas: 1,
            config_secret: "helm-deployer-config",
            pod_annotations: annotations,
            image_pull_secrets: &[],
            ports: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_replicas_only_set_on_create() {
        let mock = MockClusterClient::new("workload");
        let labels = labels("abc", "v1", "helm-deployer");
        let selector = selector_labels("abc", "helm-deployer");
        let resources = ResourceConfig::default();
        let annotations = BTreeMap::new();
        let desired = desired(&labels, &selector, &resources, &annotations);

        apply_deployment(&mock, &desired).await.unwrap();

        // the autoscaler scales up
        mock.update_object::<Deployment, _>(Some("ls-abc"), "helm-deployer", |d| {
            d["spec"]["replicas"] = serde_json::json!(3);
        });

        let result = apply_deployment(&mock, &desired).await.unwrap();
        assert_eq!(result, OperationResult::Unchanged);
        let live: Deployment = mock.object(Some("ls-abc"), "helm-deployer").unwrap();
        assert_eq!(live.spec.unwrap().replicas, Some(3));
    }

    #[tokio::test]
    async fn test_config_secret_annotations() {
        let mock = MockClusterClient::new("workload");
        let labels = labels("abc", "v1", "helm-deployer");

        let annotations = apply_config_secret(
            &mock,
            "ls-abc",
            "helm-deployer-config",
            &labels,
            ("verbosity: info\n", "hash-1"),
            Some(b"kubeconfig-bytes"),
        )
        .await
        .unwrap();

        assert_eq!(annotations[CONFIG_HASH_ANNOTATION], "hash-1");
        assert_eq!(annotations[KUBECONFIG_HASH_ANNOTATION], content_hash(b"kubeconfig-bytes"));
        let secret: Secret = mock.object(Some("ls-abc"), "helm-deployer-config").unwrap();
        let data = secret.data.unwrap();
        assert_eq!(data[CONFIG_KEY].0, b"verbosity: info\n");
        assert_eq!(data[KUBECONFIG_KEY].0, b"kubeconfig-bytes");
    }

    #[tokio::test]
    async fn test_sync_pull_secrets_copies_data() {
        let platform = MockClusterClient::new("platform");
        let workload = MockClusterClient::new("workload");
        platform.insert(&Secret {
            metadata: meta(Some("provider-system"), "registry"),
            type_: Some("kubernetes.io/dockerconfigjson".to_string()),
            data: Some(BTreeMap::from([(
                ".dockerconfigjson".to_string(),
                ByteString(b"{}".to_vec()),
            )])),
            ..Default::default()
        });

        let names = sync_pull_secrets(
            &platform,
            &workload,
            "provider-system",
            "ls-abc",
            "helm-deployer",
            &["registry".to_string()],
            &BTreeMap::new(),
        )
        .await
        .unwrap();

        assert_eq!(names, vec!["helm-deployer-registry".to_string()]);
        let copy: Secret = workload.object(Some("ls-abc"), "helm-deployer-registry").unwrap();
        assert_eq!(copy.type_.as_deref(), Some("kubernetes.io/dockerconfigjson"));
    }

    #[tokio::test]
    async fn test_sync_pull_secrets_missing_source() {
        let platform = MockClusterClient::new("platform");
        let workload = MockClusterClient::new("workload");

        let err = sync_pull_secrets(
            &platform,
            &workload,
            "provider-system",
            "ls-abc",
            "helm-deployer",
            &["registry".to_string()],
            &BTreeMap::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("provider-system/registry"));
    }

    #[tokio::test]
    async fn test_delete_pull_secrets_removes_copies_no_longer_configured() {
        let platform = MockClusterClient::new("platform");
        let workload = MockClusterClient::new("workload");
        for name in ["old-registry", "registry"] {
            platform.insert(&Secret {
                metadata: meta(Some("provider-system"), name),
                ..Default::default()
            });
        }
        let labels = labels("abc", "v1", "helm-deployer");
        for secrets in [vec!["old-registry".to_string()], vec!["registry".to_string()]] {
            sync_pull_secrets(&platform, &workload, "provider-system", "ls-abc", "helm-deployer", &secrets, &labels)
                .await
                .unwrap();
        }
        apply_config_secret(&workload, "ls-abc", "helm-deployer-config", &labels, ("", "h"), None)
            .await
            .unwrap();
        sync_pull_secrets(
            &platform,
            &workload,
            "provider-system",
            "ls-abc",
            "manifest-deployer",
            &["registry".to_string()],
            &crate::labels::labels("abc", "v1", "manifest-deployer"),
        )
        .await
        .unwrap();

        delete_pull_secrets(&workload, "ls-abc", "abc", "helm-deployer").await.unwrap();

        assert!(!workload.contains::<Secret>(Some("ls-abc"), "helm-deployer-old-registry"));
        assert!(!workload.contains::<Secret>(Some("ls-abc"), "helm-deployer-registry"));
        assert!(workload.contains::<Secret>(Some("ls-abc"), "helm-deployer-config"));
        assert!(workload.contains::<Secret>(Some("ls-abc"), "manifest-deployer-registry"));
    }

    #[tokio::test]
    async fn test_hpa_targets_deployment() {
        let mock = MockClusterClient::new("workload");
        let mut autoscaling = AutoscalingConfig::default();
        autoscaling.max_replicas = Some(5);

        apply_hpa(&mock, "ls-abc", "helm-deployer", &BTreeMap::new(), &autoscaling)
            .await
            .unwrap();
        apply_hpa(&mock, "ls-abc", "helm-deployer", &BTreeMap::new(), &autoscaling)
            .await
            .unwrap();

        let hpa: HorizontalPodAutoscaler = mock.object(Some("ls-abc"), "helm-deployer").unwrap();
        let spec = hpa.spec.unwrap();
        assert_eq!(spec.scale_target_ref.name, "helm-deployer");
        assert_eq!(spec.max_replicas, 5);
        assert_eq!(mock.writes().len(), 1);
        assert!(mock.writes()[0].is(Verb::Create, "HorizontalPodAutoscaler"));
    }
}
