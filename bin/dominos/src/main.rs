//! Cascading-failure simulator.
//!
//! Loads a set of service definitions, injects random health degradation into them one tick at a time, and reports
//! every service that breaks as a result, either as JSON lines on standard output or as Server-Sent Events over HTTP.
#![deny(missing_docs)]

use std::io::Write;

use anyhow::Context as _;
use clap::Parser as _;
use dominos_app::prelude::*;
use dominos_core::{GenericError, IncidentRecord, ReverseDependencyIndex, Simulation, Termination};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod config;
use self::config::{Cli, Command, Config, Overrides, RunArgs, ServeArgs, TopologyArgs};

mod handlers;

mod server;

mod services;
use self::services::load_services;

mod state;
use self::state::AppState;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(None) {
        fatal_and_exit(format!("failed to initialize logging: {}", e));
    }

    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Serve(args) => serve(args).await,
        Command::Topology(args) => topology(args),
    };

    if let Err(e) = result {
        error!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run(args: RunArgs) -> Result<(), GenericError> {
    let overrides = Overrides {
        seed: args.seed,
        max_ticks: args.max_ticks,
        explainer: args.explainer,
        ..Default::default()
    };
    let config = Config::load(args.source.config.as_deref(), overrides)?;
    let services = load_services(&args.source.services)?;

    let mut simulation = Simulation::new(services, config.simulation).context("Failed to create simulation.")?;
    if let Some(explainer) = config.explainer.build() {
        simulation = simulation.with_explainer(explainer);
    }

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let (mut incidents, task) = simulation.spawn(cancel).into_parts();

    while let Some(incident) = incidents.next().await {
        // The lock is held for a single line, never across an await point.
        write_incident(&mut std::io::stdout().lock(), &incident)?;
    }

    let report = task.await.context("Simulation task failed.")?;
    info!(
        ticks = report.ticks,
        glitches = report.glitches,
        incidents = report.incidents,
        "Simulation finished."
    );
    if report.termination == Termination::Cancelled {
        warn!("Simulation was interrupted before running every tick.");
    }

    Ok(())
}

/// Writes `incident` as a single line of JSON, and flushes it out.
fn write_incident<W: Write>(writer: &mut W, incident: &IncidentRecord) -> Result<(), GenericError> {
    let line = serde_json::to_string(incident).context("Failed to serialize incident.")?;
    writeln!(writer, "{}", line).context("Failed to write incident to standard output.")?;
    writer.flush().context("Failed to flush standard output.")?;
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<(), GenericError> {
    let overrides = Overrides {
        listen_address: args.listen,
        explainer: args.explainer,
        ..Default::default()
    };
    let config = Config::load(args.source.config.as_deref(), overrides)?;
    let services = load_services(&args.source.services)?;

    // Fail fast on definitions that could never run, rather than on the first connection.
    Simulation::new(services.clone(), config.simulation.clone()).context("Invalid service definitions.")?;

    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone());

    let state = AppState::new(services, config.simulation, config.explainer.build(), shutdown.clone());
    let listener = TcpListener::bind(config.listen_address)
        .await
        .with_context(|| format!("Failed to bind to {}.", config.listen_address))?;

    server::serve(listener, server::router(state), shutdown).await?;
    info!("dominos server stopped.");

    Ok(())
}

fn topology(args: TopologyArgs) -> Result<(), GenericError> {
    let services = load_services(&args.services)?;
    let index = ReverseDependencyIndex::build(&services);

    let rendered = serde_json::to_string_pretty(&index).context("Failed to serialize topology.")?;
    println!("{}", rendered);

    Ok(())
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C. Interrupting with Ctrl-C will not shut down cleanly.");
            return;
        }

        info!("Received Ctrl-C. Shutting down...");
        cancel.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incidents_are_written_one_per_line() {
        let first = IncidentRecord::new("1", "db", vec!["auth".to_owned(), "api".to_owned()], 0.4);
        let second = IncidentRecord::new("2", "cache", vec!["api".to_owned()], 0.1);

        let mut output = Vec::new();
        write_incident(&mut output, &first).expect("write should succeed");
        write_incident(&mut output, &second).expect("write should succeed");

        let output = String::from_utf8(output).expect("output should be UTF-8");
        let lines = output.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);

        let parsed = serde_json::from_str::<IncidentRecord>(lines[0]).expect("line should be an incident");
        assert_eq!(parsed.root, "db");
        assert_eq!(parsed.failed_nodes, ["auth", "api"]);
        assert_eq!(parsed.blast_radius, 2);

        let parsed = serde_json::from_str::<IncidentRecord>(lines[1]).expect("line should be an incident");
        assert_eq!(parsed.incident_id, "2");
    }
}
