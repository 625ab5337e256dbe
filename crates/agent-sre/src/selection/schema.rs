//! The closed set of remediation functions and the selection result.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Remediation functions the selector is allowed to emit. Anything
/// outside this set is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LambdaFunction {
    #[serde(rename = "flux-reconcile-kustomization")]
    FluxReconcileKustomization,
    #[serde(rename = "flux-reconcile-gitrepository")]
    FluxReconcileGitRepository,
    #[serde(rename = "flux-reconcile-helmrelease")]
    FluxReconcileHelmRelease,
    #[serde(rename = "pod-restart")]
    PodRestart,
    #[serde(rename = "pod-check-status")]
    PodCheckStatus,
    #[serde(rename = "scale-deployment")]
    ScaleDeployment,
    #[serde(rename = "check-pvc-status")]
    CheckPvcStatus,
}

impl LambdaFunction {
    pub const ALL: [Self; 7] = [
        Self::FluxReconcileKustomization,
        Self::FluxReconcileGitRepository,
        Self::FluxReconcileHelmRelease,
        Self::PodRestart,
        Self::PodCheckStatus,
        Self::ScaleDeployment,
        Self::CheckPvcStatus,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FluxReconcileKustomization => "flux-reconcile-kustomization",
            Self::FluxReconcileGitRepository => "flux-reconcile-gitrepository",
            Self::FluxReconcileHelmRelease => "flux-reconcile-helmrelease",
            Self::PodRestart => "pod-restart",
            Self::PodCheckStatus => "pod-check-status",
            Self::ScaleDeployment => "scale-deployment",
            Self::CheckPvcStatus => "check-pvc-status",
        }
    }

    /// Parse a function name, rejecting anything outside the allowed set.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    /// One-line usage description for prompts.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::FluxReconcileKustomization => {
                "Reconcile Flux Kustomization. Use when: Kustomization is out of sync or failing"
            }
            Self::FluxReconcileGitRepository => {
                "Reconcile Flux GitRepository. Use when: GitRepository sync is failing"
            }
            Self::FluxReconcileHelmRelease => {
                "Reconcile Flux HelmRelease. Use when: HelmRelease reconciliation is failing"
            }
            Self::PodRestart => {
                "Restart a pod or deployment. Use when: Pod is crashing, stuck, or needs restart"
            }
            Self::PodCheckStatus => {
                "Check pod status. Use when: Need to verify pod health before remediation"
            }
            Self::ScaleDeployment => {
                "Scale deployment to specific replicas. Use when: Need to scale up/down a deployment"
            }
            Self::CheckPvcStatus => {
                "Check PVC status and usage. Use when: Storage issues suspected"
            }
        }
    }
}

impl fmt::Display for LambdaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which selector layer produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    StaticAnnotation,
    TrmRecursiveReasoning,
    AiFunctionCalling,
    RuleBased,
}

impl SelectionMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StaticAnnotation => "static_annotation",
            Self::TrmRecursiveReasoning => "trm_recursive_reasoning",
            Self::AiFunctionCalling => "ai_function_calling",
            Self::RuleBased => "rule_based",
        }
    }
}

/// Result of the selection pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaSelection {
    pub lambda_function: LambdaFunction,
    pub parameters: HashMap<String, Value>,
    pub method: SelectionMethod,
    /// Calibrated confidence in [0, 1]. 1.0 iff the method is
    /// `static_annotation`.
    pub confidence: f64,
    pub reasoning: String,
    pub similar_incidents: usize,
    pub few_shot_examples: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip_over_allowed_set() {
        for function in LambdaFunction::ALL {
            assert_eq!(LambdaFunction::parse(function.as_str()), Some(function));
        }
        assert_eq!(LambdaFunction::parse("delete-cluster"), None);
        assert_eq!(LambdaFunction::parse(""), None);
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let function = LambdaFunction::FluxReconcileKustomization;
        assert_eq!(
            serde_json::to_string(&function).unwrap(),
            "\"flux-reconcile-kustomization\""
        );
        let parsed: LambdaFunction = serde_json::from_str("\"pod-restart\"").unwrap();
        assert_eq!(parsed, LambdaFunction::PodRestart);
    }

    #[test]
    fn test_method_labels() {
        assert_eq!(
            SelectionMethod::StaticAnnotation.as_str(),
            "static_annotation"
        );
        assert_eq!(
            SelectionMethod::TrmRecursiveReasoning.as_str(),
            "trm_recursive_reasoning"
        );
    }
}
