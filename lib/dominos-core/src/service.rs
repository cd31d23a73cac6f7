use serde::{Deserialize, Serialize};

const fn default_health() -> f64 {
    1.0
}

/// A service in the dependency graph.
///
/// Field names on the wire follow the service definition files the simulator is usually fed: `depends_on` for the
/// dependency list and `failure_check_reason` for the human-readable failure cause. Camel-cased and shortened aliases
/// are accepted as well.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Service {
    /// Unique name of the service.
    pub name: String,

    /// Current health, conceptually within `[0, 1]`.
    ///
    /// Defaults to `1.0` (fully healthy) when omitted.
    #[serde(default = "default_health")]
    pub health: f64,

    /// Names of the services this service depends on, in declaration order.
    #[serde(default, rename = "depends_on", alias = "dependsOn")]
    pub depends_on: Vec<String>,

    /// Predefined failure cause, used only when explaining incidents rooted at this service.
    #[serde(
        default,
        rename = "failure_check_reason",
        alias = "reason",
        skip_serializing_if = "Option::is_none"
    )]
    pub reason: Option<String>,
}

impl Service {
    /// Creates a new `Service` with the given name and health, and no dependencies.
    pub fn new<N: Into<String>>(name: N, health: f64) -> Self {
        Self {
            name: name.into(),
            health,
            depends_on: Vec::new(),
            reason: None,
        }
    }

    /// Sets the services this service depends on.
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the predefined failure cause of this service.
    pub fn with_reason<R: Into<String>>(mut self, reason: R) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
