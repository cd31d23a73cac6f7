use std::sync::Arc;

use indexmap::IndexMap;
use metrics::{counter, histogram};
use snafu::ensure;
use tokio::{select, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, Instrument as _};

use crate::{
    error::{EmptyPopulation, InvalidHealth},
    explain::{explain_incident, ExplainRequest},
    incident_channel,
    propagate::{distinct, propagate, ImpactMap, VisitedSet},
    ConfigurationError, Explainer, GlitchSource, HealthModel, IncidentRecord, IncidentSink, IncidentStream,
    RandomGlitches, ReverseDependencyIndex, SendError, Service, SimulationConfig,
};

/// How a simulation run ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Termination {
    /// Every tick ran, and the stream was closed after the grace period.
    Completed,

    /// Cancellation was signalled before every tick ran.
    Cancelled,

    /// The consumer stopped listening before every tick ran.
    Disconnected,
}

/// Summary of a simulation run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SimulationReport {
    /// Number of ticks executed.
    pub ticks: usize,

    /// Number of ticks where the glitched service crossed the glitch threshold.
    pub glitches: usize,

    /// Number of incidents delivered to the stream.
    pub incidents: usize,

    /// How the run ended.
    pub termination: Termination,
}

impl SimulationReport {
    fn new() -> Self {
        Self {
            ticks: 0,
            glitches: 0,
            incidents: 0,
            termination: Termination::Completed,
        }
    }

    fn terminated(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }
}

/// The computed impact of a glitch on one root service.
#[derive(Clone, Debug, PartialEq)]
pub struct Impact {
    /// The glitched service.
    pub root: String,

    /// Distinct impacted dependents, in discovery order.
    pub failed_nodes: Vec<String>,

    /// Health of the root right after it glitched.
    pub root_health: f64,

    /// Degradation applied to the first impacted dependent.
    ///
    /// Later dependents take a larger hit when the root itself was impacted through a cycle.
    pub knock_on: f64,
}

/// What happened during a single tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickOutcome {
    /// The service picked for degradation.
    pub target: String,

    /// Magnitude of the degradation.
    pub magnitude: f64,

    /// Health of the target after degradation.
    pub health: f64,

    /// Whether the target crossed the glitch threshold.
    pub glitched: bool,

    /// Impacts to report, one per root with at least one impacted dependent, in discovery order.
    pub impacts: Vec<Impact>,
}

/// A cascading-failure simulation.
///
/// Owns the reverse dependency index and the health of every service for the duration of a run. Each tick picks a
/// service at random, degrades it, and when the service starts glitching, propagates the glitch to everything that
/// depends on it, dampens the health of the impacted dependents, and emits an incident.
pub struct Simulation {
    config: SimulationConfig,
    index: ReverseDependencyIndex,
    health: HealthModel,
    population: Vec<String>,
    reasons: IndexMap<String, String>,
    glitches: Box<dyn GlitchSource>,
    explainer: Option<Arc<dyn Explainer>>,
    incidents_created: u64,
}

impl Simulation {
    /// Creates a new `Simulation` over the given services.
    ///
    /// Glitch decisions are seeded from `config.seed` when set, or from the operating system otherwise. Use
    /// [`with_glitch_source`][Self::with_glitch_source] to take full control over them.
    ///
    /// # Errors
    ///
    /// If `services` is empty, a service declares a non-finite health, or the configuration is invalid, an error is
    /// returned.
    pub fn new(services: Vec<Service>, config: SimulationConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        ensure!(!services.is_empty(), EmptyPopulation);
        if let Some(service) = services.iter().find(|service| !service.health.is_finite()) {
            return InvalidHealth {
                name: service.name.clone(),
                health: service.health,
            }
            .fail();
        }

        let index = ReverseDependencyIndex::build(&services);
        let health = HealthModel::from_services(&services, config.glitch_threshold, config.dampening_alpha);

        let mut population = Vec::with_capacity(services.len());
        let mut reasons = IndexMap::new();
        for service in services {
            if population.contains(&service.name) {
                debug!(service = %service.name, "Service declared more than once; last declaration wins.");
            } else {
                population.push(service.name.clone());
            }

            if let Some(reason) = service.reason {
                reasons.insert(service.name, reason);
            }
        }

        let glitches: Box<dyn GlitchSource> = match config.seed {
            Some(seed) => Box::new(RandomGlitches::seeded(seed)),
            None => Box::new(RandomGlitches::from_entropy()),
        };

        Ok(Self {
            config,
            index,
            health,
            population,
            reasons,
            glitches,
            explainer: None,
            incidents_created: 0,
        })
    }

    /// Replaces the source of glitch decisions.
    pub fn with_glitch_source<G>(mut self, glitches: G) -> Self
    where
        G: GlitchSource + 'static,
    {
        self.glitches = Box::new(glitches);
        self
    }

    /// Sets the explainer used to narrate incidents.
    pub fn with_explainer(mut self, explainer: Arc<dyn Explainer>) -> Self {
        self.explainer = Some(explainer);
        self
    }

    /// Returns the configuration of this simulation.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Returns the reverse dependency index.
    pub fn index(&self) -> &ReverseDependencyIndex {
        &self.index
    }

    /// Returns the current health of every service.
    pub fn health(&self) -> &HealthModel {
        &self.health
    }

    /// Returns the services that can be picked for degradation, in declaration order.
    pub fn population(&self) -> &[String] {
        &self.population
    }

    /// Runs the synchronous part of a single tick.
    ///
    /// Picks a service, degrades it, and if it starts glitching, propagates the glitch and dampens the health of every
    /// impacted dependent.
    pub fn step(&mut self) -> TickOutcome {
        let picked = self.glitches.pick(self.population.len()) % self.population.len();
        let target = self.population[picked].clone();
        let magnitude = self.glitches.magnitude(self.config.degradation_range());
        let health = self.health.degrade(&target, magnitude);
        let glitched = self.health.is_glitch(health);

        debug!(service = %target, magnitude, health, glitched, "Service degraded.");

        let mut impacts = Vec::new();
        if glitched {
            let mut visited = VisitedSet::new();
            let mut impact = ImpactMap::new();
            let expanded = propagate(&target, &target, &self.index, &mut visited, &mut impact);
            trace!(service = %target, expanded, "Propagated glitch.");

            for (root, reached) in impact {
                let failed_nodes = distinct(&reached);
                if failed_nodes.is_empty() {
                    continue;
                }

                let root_health = self.health.get(&root);
                let knock_on = self.health.dampen_impacted(&root, &failed_nodes);
                impacts.push(Impact {
                    root,
                    failed_nodes,
                    root_health,
                    knock_on,
                });
            }
        }

        TickOutcome {
            target,
            magnitude,
            health,
            glitched,
            impacts,
        }
    }

    /// Runs the simulation to completion, sending every incident to `sink`.
    ///
    /// Runs up to `max_ticks` ticks, waiting `tick_interval` (plus jitter) between them. Once the last tick has run, the
    /// stream is held open for `grace_period` before `sink` is dropped, which closes it.
    ///
    /// The run stops early, dropping `sink`, as soon as `cancel` fires or the consumer goes away. Every wait observes
    /// both.
    pub async fn run(mut self, sink: IncidentSink, cancel: CancellationToken) -> SimulationReport {
        let mut report = SimulationReport::new();

        info!(
            services = self.population.len(),
            max_ticks = self.config.max_ticks,
            "Simulation starting."
        );

        for tick in 1..=self.config.max_ticks {
            if cancel.is_cancelled() {
                info!(tick, "Simulation cancelled.");
                return report.terminated(Termination::Cancelled);
            }

            let outcome = self.step();
            report.ticks += 1;
            counter!("dominos_ticks_total").increment(1);

            if outcome.glitched {
                report.glitches += 1;
                counter!("dominos_glitches_total").increment(1);
            }

            for impact in outcome.impacts {
                let Some(incident) = self.create_incident(impact, &cancel).await else {
                    info!(tick, "Simulation cancelled while explaining incident.");
                    return report.terminated(Termination::Cancelled);
                };

                debug!(
                    tick,
                    root = %incident.root,
                    blast_radius = incident.blast_radius,
                    failed_nodes = ?incident.failed_nodes,
                    "Sending incident."
                );
                histogram!("dominos_blast_radius").record(incident.blast_radius as f64);

                match sink.send(incident, &cancel).await {
                    Ok(()) => {
                        report.incidents += 1;
                        counter!("dominos_incidents_emitted_total").increment(1);
                    }
                    Err(SendError::Cancelled) => {
                        info!(tick, "Simulation cancelled while sending incident.");
                        return report.terminated(Termination::Cancelled);
                    }
                    Err(SendError::Disconnected) => {
                        info!(tick, "Incident consumer disconnected. Stopping simulation.");
                        return report.terminated(Termination::Disconnected);
                    }
                }
            }

            if tick < self.config.max_ticks {
                let delay = self.config.tick_interval + self.glitches.jitter(self.config.tick_jitter);
                select! {
                    biased;

                    _ = cancel.cancelled() => {
                        info!(tick, "Simulation cancelled.");
                        return report.terminated(Termination::Cancelled);
                    },
                    _ = sink.closed() => {
                        info!(tick, "Incident consumer disconnected. Stopping simulation.");
                        return report.terminated(Termination::Disconnected);
                    },
                    _ = sleep(delay) => {},
                }
            }
        }

        info!(
            ticks = report.ticks,
            incidents = report.incidents,
            grace_period = ?self.config.grace_period,
            "Simulation completed. Holding incident stream open for grace period."
        );

        select! {
            biased;

            _ = cancel.cancelled() => debug!("Grace period cut short by cancellation."),
            _ = sink.closed() => debug!("Grace period cut short by consumer disconnecting."),
            _ = sleep(self.config.grace_period) => {},
        }

        info!("Incident stream closed.");
        report
    }

    /// Spawns the simulation on the current Tokio runtime, returning a handle to its incident stream.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn(self, cancel: CancellationToken) -> SimulationHandle {
        let (sink, stream) = incident_channel(self.config.buffer_capacity);
        let task = tokio::spawn(self.run(sink, cancel.clone()).in_current_span());

        SimulationHandle { stream, task, cancel }
    }

    async fn create_incident(&mut self, impact: Impact, cancel: &CancellationToken) -> Option<IncidentRecord> {
        self.incidents_created += 1;
        let incident_id = self.glitches.incident_id(self.incidents_created).to_string();

        let explanation = {
            let request = ExplainRequest::new(
                &impact.root,
                self.reasons.get(&impact.root).map(String::as_str),
                &impact.failed_nodes,
            );

            select! {
                biased;

                _ = cancel.cancelled() => return None,
                explanation = explain_incident(self.explainer.as_deref(), &request, self.config.explain_timeout) => explanation,
            }
        };

        Some(
            IncidentRecord::new(incident_id, impact.root, impact.failed_nodes, impact.root_health)
                .with_explanation(explanation),
        )
    }
}

/// A handle to a running simulation.
pub struct SimulationHandle {
    stream: IncidentStream,
    task: JoinHandle<SimulationReport>,
    cancel: CancellationToken,
}

impl SimulationHandle {
    /// Receives the next incident.
    ///
    /// Returns `None` once the simulation has finished (or was stopped) and every buffered incident has been received.
    pub async fn next(&mut self) -> Option<IncidentRecord> {
        self.stream.next().await
    }

    /// Signals the simulation to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns the cancellation token observed by the simulation.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Splits the handle into the incident stream and the task running the simulation.
    pub fn into_parts(self) -> (IncidentStream, JoinHandle<SimulationReport>) {
        (self.stream, self.task)
    }
}
