//! Argo CD `Application` resource descriptor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::preview::ports::ApplicationRequest;

const CONTROL_NAMESPACE: &str = "argocd";
const PROJECT: &str = "snapenv";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const PR_NUMBER_LABEL: &str = "snapenv/pr-number";
const IN_CLUSTER_SERVER: &str = "https://kubernetes.default.svc";
const TARGET_REVISION: &str = "HEAD";

/// Argo CD application body sent on create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDescriptor {
    /// Resource metadata.
    pub metadata: DescriptorMetadata,
    /// Application spec.
    pub spec: DescriptorSpec,
}

/// Resource metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorMetadata {
    /// Application name.
    pub name: String,
    /// Namespace the `Application` resource lives in.
    pub namespace: String,
    /// Labels, ordered for stable output.
    pub labels: BTreeMap<String, String>,
}

/// Application spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorSpec {
    /// Argo CD project.
    pub project: String,
    /// Chart source.
    pub source: DescriptorSource,
    /// Deployment target.
    pub destination: DescriptorDestination,
    /// Sync behaviour.
    pub sync_policy: DescriptorSyncPolicy,
}

/// Chart source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorSource {
    /// Git clone URL.
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    /// Git revision to track.
    pub target_revision: String,
    /// Chart path inside the repository.
    pub path: String,
    /// Helm overrides.
    pub helm: HelmOverrides,
}

/// Helm overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmOverrides {
    /// Value overrides, in order.
    pub parameters: Vec<HelmParameter>,
}

/// One Helm value override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmParameter {
    /// Dotted value path.
    pub name: String,
    /// Override value.
    pub value: String,
}

/// Deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorDestination {
    /// Cluster API server.
    pub server: String,
    /// Target namespace.
    pub namespace: String,
}

/// Sync behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorSyncPolicy {
    /// Automated sync switches.
    pub automated: AutomatedSync,
    /// Extra sync options.
    pub sync_options: Vec<String>,
}

/// Automated sync switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomatedSync {
    /// Delete resources no longer in the chart.
    pub prune: bool,
    /// Revert out-of-band cluster changes.
    pub self_heal: bool,
}

impl ApplicationDescriptor {
    /// Builds the descriptor for a request. Identical requests produce
    /// identical descriptors.
    #[must_use]
    pub fn from_request(request: &ApplicationRequest) -> Self {
        let labels = BTreeMap::from([
            (MANAGED_BY_LABEL.to_owned(), PROJECT.to_owned()),
            (PR_NUMBER_LABEL.to_owned(), request.pr_number.to_string()),
        ]);
        Self {
            metadata: DescriptorMetadata {
                name: request.app_name.as_str().to_owned(),
                namespace: CONTROL_NAMESPACE.to_owned(),
                labels,
            },
            spec: DescriptorSpec {
                project: PROJECT.to_owned(),
                source: DescriptorSource {
                    repo_url: request.repo_url.clone(),
                    target_revision: TARGET_REVISION.to_owned(),
                    path: request.chart_path.clone(),
                    helm: HelmOverrides {
                        parameters: vec![
                            HelmParameter {
                                name: "image.tag".to_owned(),
                                value: request.image_tag.clone(),
                            },
                            HelmParameter {
                                name: "ingress.host".to_owned(),
                                value: request.host.clone(),
                            },
                        ],
                    },
                },
                destination: DescriptorDestination {
                    server: IN_CLUSTER_SERVER.to_owned(),
                    namespace: request.namespace.as_str().to_owned(),
                },
                sync_policy: DescriptorSyncPolicy {
                    automated: AutomatedSync {
                        prune: true,
                        self_heal: true,
                    },
                    sync_options: vec!["CreateNamespace=true".to_owned()],
                },
            },
        }
    }
}

/// Subset of the application resource read back on status checks.
#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct ApplicationStatusBody {
    #[serde(default)]
    pub status: Option<StatusSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct StatusSection {
    #[serde(default)]
    pub health: Option<StatusField>,
    #[serde(default)]
    pub sync: Option<StatusField>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct StatusField {
    #[serde(default)]
    pub status: Option<String>,
}

impl ApplicationStatusBody {
    pub(super) fn health(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|status| status.health.as_ref())
            .and_then(|field| field.status.as_deref())
    }

    pub(super) fn sync(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|status| status.sync.as_ref())
            .and_then(|field| field.status.as_deref())
    }
}
