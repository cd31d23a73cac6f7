use std::sync::Arc;

use dominos_core::{ConfigurationError, Explainer, ReverseDependencyIndex, Service, Simulation, SimulationConfig};
use tokio_util::sync::CancellationToken;

/// State shared by every connection to the server.
#[derive(Clone)]
pub struct AppState {
    services: Arc<[Service]>,
    index: Arc<ReverseDependencyIndex>,
    config: SimulationConfig,
    explainer: Option<Arc<dyn Explainer>>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Creates a new `AppState` for the given services.
    ///
    /// Every simulation started from this state stops once `shutdown` is cancelled.
    pub fn new(
        services: Vec<Service>, config: SimulationConfig, explainer: Option<Arc<dyn Explainer>>,
        shutdown: CancellationToken,
    ) -> Self {
        let index = ReverseDependencyIndex::build(&services);

        Self {
            services: services.into(),
            index: Arc::new(index),
            config,
            explainer,
            shutdown,
        }
    }

    /// Returns the reverse dependency index of the served services.
    pub fn topology(&self) -> &ReverseDependencyIndex {
        &self.index
    }

    /// Creates a new simulation over a fresh copy of the served services.
    pub fn new_simulation(&self) -> Result<Simulation, ConfigurationError> {
        let simulation = Simulation::new(self.services.to_vec(), self.config.clone())?;

        Ok(match &self.explainer {
            Some(explainer) => simulation.with_explainer(Arc::clone(explainer)),
            None => simulation,
        })
    }

    /// Creates the cancellation token for a single connection.
    ///
    /// The token is cancelled when the server shuts down, and can be cancelled on its own when the connection goes away.
    pub fn connection_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}
