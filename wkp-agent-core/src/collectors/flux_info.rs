//! FluxInfo collector.
//!
//! Flux deployments are recognized by a `name=flux` selector label. For each
//! one, the logs of its first pod over the last hour are scanned for git
//! refreshes. Failing to read logs only leaves that deployment's syncs empty.

use crate::collectors::CollectError;
use crate::processors::Collector;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, LogParams};
use kube::{Api, Client};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};
use wkp_agent_sdk::objects::{FluxDeploymentInfo, FluxInfo, FluxLogInfo};

/// Selector label value identifying a Flux deployment.
pub const FLUX_DEPLOYMENT_LABEL: &str = "flux";

/// How far back pod logs are read.
const LOG_WINDOW_SECONDS: i64 = 3600;

const REFRESHED_EVENT: &str = "refreshed";

/// Collects Flux deployments and their recent syncs.
pub struct FluxInfoCollector {
    token: String,
    client: Client,
}

impl FluxInfoCollector {
    pub fn new(token: impl Into<String>, client: Client) -> Self {
        Self {
            token: token.into(),
            client,
        }
    }

    async fn sync_logs(&self, deployment: &Deployment) -> Result<Vec<FluxLogInfo>, CollectError> {
        let namespace = deployment.metadata.namespace.as_deref().unwrap_or_default();
        let name = deployment.metadata.name.as_deref().unwrap_or_default();
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let selector = match_labels(deployment)
            .map(|labels| {
                labels
                    .iter()
                    .map(|(key, value)| format!("{key}={value}"))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();
        let pod_list = pods.list(&ListParams::default().labels(&selector)).await?;
        let pod_name = pod_list
            .items
            .first()
            .and_then(|pod| pod.metadata.name.clone())
            .ok_or_else(|| CollectError::NoPods(format!("{namespace}/{name}")))?;

        let logs = pods
            .logs(
                &pod_name,
                &LogParams {
                    since_seconds: Some(LOG_WINDOW_SECONDS),
                    ..Default::default()
                },
            )
            .await?;

        let syncs = parse_sync_logs(&logs);
        debug!(deployment = %name, pod = %pod_name, syncs = syncs.len(), "Parsed flux sync logs");
        Ok(syncs)
    }
}

#[async_trait]
impl Collector for FluxInfoCollector {
    type Payload = FluxInfo;
    type Error = CollectError;

    async fn collect(&self) -> Result<FluxInfo, CollectError> {
        let deployments = Api::<Deployment>::all(self.client.clone())
            .list(&ListParams::default())
            .await?;
        let flux_deployments: Vec<Deployment> = deployments
            .items
            .into_iter()
            .filter(is_flux_deployment)
            .collect();

        let mut logs = HashMap::new();
        for deployment in &flux_deployments {
            match self.sync_logs(deployment).await {
                Ok(syncs) => {
                    logs.insert(deployment_key(deployment), syncs);
                }
                Err(e) => warn!(
                    deployment = deployment.metadata.name.as_deref().unwrap_or_default(),
                    error = %e,
                    "Failed to query flux logs"
                ),
            }
        }

        build_flux_info(&self.token, &flux_deployments, &logs)
    }
}

fn match_labels(deployment: &Deployment) -> Option<&BTreeMap<String, String>> {
    deployment.spec.as_ref()?.selector.match_labels.as_ref()
}

fn is_flux_deployment(deployment: &Deployment) -> bool {
    match_labels(deployment)
        .and_then(|labels| labels.get("name"))
        .is_some_and(|name| name == FLUX_DEPLOYMENT_LABEL)
}

fn deployment_key(deployment: &Deployment) -> String {
    format!(
        "{}/{}",
        deployment.metadata.namespace.as_deref().unwrap_or_default(),
        deployment.metadata.name.as_deref().unwrap_or_default()
    )
}

/// Build the snapshot from flux deployments and the syncs found per deployment.
pub fn build_flux_info(
    token: &str,
    deployments: &[Deployment],
    logs: &HashMap<String, Vec<FluxLogInfo>>,
) -> Result<FluxInfo, CollectError> {
    if deployments.is_empty() {
        return Err(CollectError::NoFluxDeployments);
    }

    let deployments = deployments
        .iter()
        .map(|deployment| {
            let container = deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.template.spec.as_ref())
                .and_then(|pod_spec| pod_spec.containers.first());

            FluxDeploymentInfo {
                name: deployment.metadata.name.clone().unwrap_or_default(),
                namespace: deployment.metadata.namespace.clone().unwrap_or_default(),
                args: container
                    .and_then(|container| container.args.clone())
                    .unwrap_or_default(),
                image: container
                    .and_then(|container| container.image.clone())
                    .unwrap_or_default(),
                syncs: logs.get(&deployment_key(deployment)).cloned().unwrap_or_default(),
            }
        })
        .collect();

    Ok(FluxInfo {
        token: token.to_string(),
        deployments,
    })
}

/// Extract unique git refreshes from Flux's logfmt output, oldest first.
///
/// A record counts when it has `event=refreshed`, a timestamp and a HEAD.
/// The first record seen for a HEAD wins.
pub fn parse_sync_logs(logs: &str) -> Vec<FluxLogInfo> {
    let mut by_head: HashMap<String, FluxLogInfo> = HashMap::new();

    for line in logs.lines() {
        let mut info = FluxLogInfo {
            timestamp: String::new(),
            url: String::new(),
            branch: String::new(),
            head: String::new(),
            event: String::new(),
        };
        for (key, value) in logfmt_pairs(line) {
            let field = match key.as_str() {
                "ts" => &mut info.timestamp,
                "url" => &mut info.url,
                "branch" => &mut info.branch,
                "HEAD" => &mut info.head,
                "event" => &mut info.event,
                _ => continue,
            };
            *field = value;
        }

        if info.event == REFRESHED_EVENT && !info.timestamp.is_empty() && !info.head.is_empty() {
            by_head.entry(info.head.clone()).or_insert(info);
        }
    }

    let mut syncs: Vec<FluxLogInfo> = by_head.into_values().collect();
    syncs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    syncs
}

/// Split one logfmt line into key/value pairs.
///
/// Values may be double-quoted with backslash escapes; a bare key has an
/// empty value.
fn logfmt_pairs(line: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }

        let mut value = String::new();
        if chars.next_if_eq(&'=').is_some() {
            if chars.next_if_eq(&'"').is_some() {
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(match escaped {
                                    'n' => '\n',
                                    't' => '\t',
                                    other => other,
                                });
                            }
                        }
                        other => value.push(other),
                    }
                }
            } else {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    value.push(c);
                }
            }
        }

        if !key.is_empty() {
            pairs.push((key, value));
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use kube::api::ObjectMeta;

    const LOGS: &str = r#"
ts=2021-03-02T12:59:05.544496465Z caller=loop.go:127 component=sync-loop event=refreshed url=ssh://git@github.com/foot/wk-simon.git branch=master HEAD=abc
ts=2021-03-02T13:59:05.544496465Z caller=loop.go:127 component=sync-loop event=refreshed url=ssh://git@github.com/foot/wk-simon.git branch=master HEAD=abc
ts=2021-03-02T14:59:05.544496465Z caller=loop.go:127 component=sync-loop event=refreshed url=ssh://git@github.com/foot/wk-simon.git branch=master HEAD=def
"#;

    fn flux_deployment(selector_name: &str) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("flux".to_string()),
                namespace: Some("wkp-flux".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(BTreeMap::from([(
                        "name".to_string(),
                        selector_name.to_string(),
                    )])),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "flux".to_string(),
                            image: Some(
                                "docker.io/weaveworks/wkp-jk-init:v2.0.3-RC.1-2-gd677dc0a"
                                    .to_string(),
                            ),
                            args: Some(vec![
                                "--git-url=git@github.com:dinosk/fluxes-1.git".to_string(),
                                "--git-branch=master".to_string(),
                            ]),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_logs_keeps_first_refresh_per_head() {
        let syncs = parse_sync_logs(LOGS);

        assert_eq!(syncs.len(), 2);
        assert_eq!(syncs[0].branch, "master");
        assert_eq!(syncs[0].head, "abc");
        assert_eq!(syncs[0].timestamp, "2021-03-02T12:59:05.544496465Z");
        assert_eq!(syncs[0].url, "ssh://git@github.com/foot/wk-simon.git");
        assert_eq!(syncs[1].head, "def");
    }

    #[test]
    fn test_parse_logs_ignores_other_events() {
        let logs = "ts=2021-03-02T12:59:05Z event=\"sync started\" HEAD=abc\n\
                    ts=2021-03-02T12:59:06Z event=refreshed\n\
                    garbage without pairs";
        assert!(parse_sync_logs(logs).is_empty());
    }

    #[test]
    fn test_logfmt_quoted_values() {
        let pairs = logfmt_pairs(r#"msg="hello \"world\"" flag level=info"#);
        assert_eq!(
            pairs,
            vec![
                ("msg".to_string(), "hello \"world\"".to_string()),
                ("flag".to_string(), String::new()),
                ("level".to_string(), "info".to_string()),
            ]
        );
    }

    #[test]
    fn test_logfmt_empty_values() {
        let pairs = logfmt_pairs("HEAD= branch=master =orphan url=");
        assert_eq!(
            pairs,
            vec![
                ("HEAD".to_string(), String::new()),
                ("branch".to_string(), "master".to_string()),
                ("url".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_logfmt_unterminated_quote_runs_to_end_of_line() {
        let pairs = logfmt_pairs(r#"event=refreshed msg="half open HEAD=abc"#);
        assert_eq!(
            pairs,
            vec![
                ("event".to_string(), "refreshed".to_string()),
                ("msg".to_string(), "half open HEAD=abc".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_logs_skips_refresh_without_head() {
        let logs = "ts=2021-03-02T12:59:05Z event=refreshed url=ssh://git@host/repo.git HEAD=\n\
                    ts=2021-03-02T12:59:06Z event=refreshed url=\"ssh://git@host/repo.git HEAD=abc";
        assert!(parse_sync_logs(logs).is_empty());
    }

    #[test]
    fn test_flux_deployment_detection() {
        assert!(is_flux_deployment(&flux_deployment("flux")));
        assert!(!is_flux_deployment(&flux_deployment("memcached")));
        assert!(!is_flux_deployment(&Deployment::default()));
    }

    #[test]
    fn test_no_flux_deployments() {
        let result = build_flux_info("derp", &[], &HashMap::new());
        assert!(matches!(result, Err(CollectError::NoFluxDeployments)));
    }

    #[test]
    fn test_deployment_without_logs_has_no_syncs() {
        let info = build_flux_info("derp", &[flux_deployment("flux")], &HashMap::new()).unwrap();

        assert_eq!(
            info,
            FluxInfo {
                token: "derp".to_string(),
                deployments: vec![FluxDeploymentInfo {
                    name: "flux".to_string(),
                    namespace: "wkp-flux".to_string(),
                    args: vec![
                        "--git-url=git@github.com:dinosk/fluxes-1.git".to_string(),
                        "--git-branch=master".to_string(),
                    ],
                    image: "docker.io/weaveworks/wkp-jk-init:v2.0.3-RC.1-2-gd677dc0a"
                        .to_string(),
                    syncs: Vec::new(),
                }],
            }
        );
    }

    #[test]
    fn test_syncs_are_attached_by_deployment() {
        let deployment = flux_deployment("flux");
        let logs = HashMap::from([(deployment_key(&deployment), parse_sync_logs(LOGS))]);

        let info = build_flux_info("derp", &[deployment], &logs).unwrap();
        assert_eq!(info.deployments[0].syncs.len(), 2);
    }
}
