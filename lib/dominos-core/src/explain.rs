//! Incident explanations.
//!
//! An [`Explainer`] turns an incident into a short root-cause narrative. Explanations are strictly best-effort: a
//! missing explainer, a failing one, or one that takes too long all produce placeholder text in the incident record,
//! and never stop the simulation.
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::GenericError;

/// Reason used when the root service of an incident declares no failure cause.
pub const UNKNOWN_REASON: &str = "Unknown technical failure";

/// Explanation used when no explainer is configured.
pub const EXPLANATION_UNAVAILABLE: &str = "Explanation unavailable: no explainer configured";

/// Explanation used when the explainer returns nothing.
pub const EXPLANATION_EMPTY: &str = "No specific explanation generated.";

/// What an explainer gets to work with.
#[derive(Clone, Copy, Debug)]
pub struct ExplainRequest<'a> {
    /// The service whose degradation triggered the incident.
    pub root: &'a str,

    /// Declared failure cause of the root service.
    pub reason: &'a str,

    /// Distinct impacted dependents, in discovery order.
    pub impacted: &'a [String],
}

impl<'a> ExplainRequest<'a> {
    /// Creates a new `ExplainRequest`.
    ///
    /// Falls back to [`UNKNOWN_REASON`] when `reason` is `None`.
    pub fn new(root: &'a str, reason: Option<&'a str>, impacted: &'a [String]) -> Self {
        Self {
            root,
            reason: reason.unwrap_or(UNKNOWN_REASON),
            impacted,
        }
    }
}

/// Generates root-cause narratives for incidents.
#[async_trait]
pub trait Explainer: Send + Sync {
    /// Explains the given incident.
    ///
    /// # Errors
    ///
    /// If no explanation can be produced, an error is returned. Callers substitute placeholder text rather than
    /// propagating it.
    async fn explain(&self, request: &ExplainRequest<'_>) -> Result<String, GenericError>;
}

/// Explains an incident, never failing.
///
/// Runs `explainer` for at most `timeout`, and substitutes placeholder text when there is no explainer, when it fails,
/// when it times out, or when it returns an empty explanation.
pub async fn explain_incident(
    explainer: Option<&dyn Explainer>, request: &ExplainRequest<'_>, timeout: Duration,
) -> String {
    let Some(explainer) = explainer else {
        return EXPLANATION_UNAVAILABLE.to_owned();
    };

    let result = match tokio::time::timeout(timeout, explainer.explain(request)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("timed out after {:?}", timeout)),
    };

    match result {
        Ok(explanation) if explanation.trim().is_empty() => EXPLANATION_EMPTY.to_owned(),
        Ok(explanation) => explanation,
        Err(e) => {
            warn!(root = request.root, error = %e, "Failed to explain incident.");
            format!("Explanation error: {} (check: {})", e, request.reason)
        }
    }
}

/// A local, deterministic explainer.
///
/// Produces a templated SRE-style narrative from the incident itself: which service failed, its declared failure
/// cause, which dependents the failure cascaded to, and a severity band derived from the blast radius.
#[derive(Clone, Copy, Debug, Default)]
pub struct NarrativeExplainer;

impl NarrativeExplainer {
    fn severity(blast_radius: usize) -> &'static str {
        match blast_radius {
            0 => "contained",
            1..=2 => "low",
            3..=5 => "elevated",
            _ => "critical",
        }
    }
}

#[async_trait]
impl Explainer for NarrativeExplainer {
    async fn explain(&self, request: &ExplainRequest<'_>) -> Result<String, GenericError> {
        let blast_radius = request.impacted.len();
        let plural = if blast_radius == 1 { "" } else { "s" };

        Ok(format!(
            "Service '{}' failed. Root cause: {}. Cascading impact reached {} dependent service{}: {}. Severity: {}. \
             Restore '{}' first; its dependents should recover once their upstream calls succeed again.",
            request.root,
            request.reason,
            blast_radius,
            plural,
            request.impacted.join(", "),
            Self::severity(blast_radius),
            request.root,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingExplainer;

    #[async_trait]
    impl Explainer for FailingExplainer {
        async fn explain(&self, _request: &ExplainRequest<'_>) -> Result<String, GenericError> {
            Err(anyhow::anyhow!("quota exceeded"))
        }
    }

    struct SilentExplainer;

    #[async_trait]
    impl Explainer for SilentExplainer {
        async fn explain(&self, _request: &ExplainRequest<'_>) -> Result<String, GenericError> {
            Ok("   ".to_owned())
        }
    }

    struct StuckExplainer;

    #[async_trait]
    impl Explainer for StuckExplainer {
        async fn explain(&self, _request: &ExplainRequest<'_>) -> Result<String, GenericError> {
            std::future::pending().await
        }
    }

    fn impacted() -> Vec<String> {
        vec!["api".to_owned(), "web".to_owned()]
    }

    #[tokio::test]
    async fn missing_explainer_yields_placeholder() {
        let impacted = impacted();
        let request = ExplainRequest::new("db", None, &impacted);

        let explanation = explain_incident(None, &request, Duration::from_secs(1)).await;
        assert_eq!(explanation, EXPLANATION_UNAVAILABLE);
    }

    #[tokio::test]
    async fn failure_is_substituted() {
        let impacted = impacted();
        let request = ExplainRequest::new("db", Some("disk full"), &impacted);

        let explainer: &dyn Explainer = &FailingExplainer;
        let explanation = explain_incident(Some(explainer), &request, Duration::from_secs(1)).await;
        assert_eq!(explanation, "Explanation error: quota exceeded (check: disk full)");
    }

    #[tokio::test]
    async fn empty_explanation_is_substituted() {
        let impacted = impacted();
        let request = ExplainRequest::new("db", None, &impacted);

        let explainer: &dyn Explainer = &SilentExplainer;
        let explanation = explain_incident(Some(explainer), &request, Duration::from_secs(1)).await;
        assert_eq!(explanation, EXPLANATION_EMPTY);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_explainer_times_out() {
        let impacted = impacted();
        let request = ExplainRequest::new("db", None, &impacted);

        let explainer: &dyn Explainer = &StuckExplainer;
        let explanation = explain_incident(Some(explainer), &request, Duration::from_secs(5)).await;
        assert!(explanation.starts_with("Explanation error: timed out"));
        assert!(explanation.ends_with(&format!("(check: {})", UNKNOWN_REASON)));
    }

    #[tokio::test]
    async fn narrative_mentions_root_reason_and_impact() {
        let impacted = impacted();
        let request = ExplainRequest::new("db", Some("replication lag"), &impacted);

        let explanation = NarrativeExplainer.explain(&request).await.expect("narrative never fails");
        assert!(explanation.contains("Service 'db' failed."));
        assert!(explanation.contains("Root cause: replication lag."));
        assert!(explanation.contains("2 dependent services: api, web."));
        assert!(explanation.contains("Severity: low."));
    }
}
