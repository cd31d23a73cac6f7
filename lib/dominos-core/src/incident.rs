use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A detected incident: one glitched service and everything that broke because of it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    /// Unique identifier of the incident.
    pub incident_id: String,

    /// The service whose degradation triggered the incident.
    pub root: String,

    /// Impacted dependents, without duplicates, in the order they were discovered.
    pub failed_nodes: Vec<String>,

    /// When the incident was detected.
    pub time: DateTime<Utc>,

    /// Number of distinct services impacted.
    pub blast_radius: usize,

    /// Health of the root service right after it glitched.
    pub root_health: f64,

    /// Free-text narrative of the incident, if one was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl IncidentRecord {
    /// Creates a new `IncidentRecord` detected now.
    ///
    /// The blast radius is derived from `failed_nodes`.
    pub fn new<I, R>(incident_id: I, root: R, failed_nodes: Vec<String>, root_health: f64) -> Self
    where
        I: Into<String>,
        R: Into<String>,
    {
        Self {
            incident_id: incident_id.into(),
            root: root.into(),
            blast_radius: failed_nodes.len(),
            failed_nodes,
            time: Utc::now(),
            root_health,
            explanation: None,
        }
    }

    /// Attaches an explanation to the incident.
    pub fn with_explanation<E: Into<String>>(mut self, explanation: E) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}
