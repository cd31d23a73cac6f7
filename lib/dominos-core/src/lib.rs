//! Cascading-failure simulation engine.
//!
//! Given a set of services and the services they depend on, this crate builds a reverse dependency index, injects
//! random health degradation into services one tick at a time, walks the index to find every dependent that is
//! transitively impacted, and streams one [`IncidentRecord`] per detected incident to a consumer.
//!
//! The engine is transport-agnostic: callers hand it an already-parsed list of [`Service`] definitions and receive an
//! [`IncidentStream`] back. Whatever sits on the other end of the stream (a terminal, an SSE connection, a test) decides
//! when to stop listening, and cancellation is cooperative via [`CancellationToken`][tokio_util::sync::CancellationToken].
//!
//! ## Example
//!
//! ```rust,no_run
//! use dominos_core::{Service, Simulation, SimulationConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let services = vec![
//!     Service::new("db", 0.9),
//!     Service::new("api", 0.9).with_dependencies(["db"]),
//!     Service::new("web", 0.9).with_dependencies(["api"]),
//! ];
//!
//! let simulation = Simulation::new(services, SimulationConfig::default())?;
//! let mut handle = simulation.spawn(CancellationToken::new());
//! while let Some(incident) = handle.next().await {
//!     println!("{} took down {} dependents", incident.root, incident.blast_radius);
//! }
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]

mod config;
pub use self::config::SimulationConfig;

mod error;
pub use self::error::{ConfigurationError, GenericError};

pub mod explain;
pub use self::explain::{ExplainRequest, Explainer, NarrativeExplainer};

pub mod glitch;
pub use self::glitch::{GlitchSource, RandomGlitches, ScriptedGlitches};

mod graph;
pub use self::graph::ReverseDependencyIndex;

mod health;
pub use self::health::HealthModel;

mod incident;
pub use self::incident::IncidentRecord;

pub mod propagate;
pub use self::propagate::{ImpactMap, VisitedSet};

mod service;
pub use self::service::Service;

mod simulation;
pub use self::simulation::{Impact, Simulation, SimulationHandle, SimulationReport, Termination, TickOutcome};

mod stream;
pub use self::stream::{incident_channel, IncidentSink, IncidentStream, SendError};
