use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use dominos_core::{incident_channel, ReverseDependencyIndex};
use futures::{
    future,
    stream::{self, Stream, StreamExt as _},
};
use serde::Serialize;
use tracing::{debug, error, info, Instrument as _};

use crate::state::AppState;

/// First message of every incident stream, describing who depends on whom.
#[derive(Serialize)]
struct TopologySnapshot<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a ReverseDependencyIndex,
}

impl<'a> TopologySnapshot<'a> {
    fn new(index: &'a ReverseDependencyIndex) -> Self {
        Self {
            kind: "reverse_dependency",
            data: index,
        }
    }
}

pub async fn handle_topology(State(state): State<AppState>) -> Json<ReverseDependencyIndex> {
    Json(state.topology().clone())
}

/// Runs a dedicated simulation for the connection, streaming the topology snapshot and then every incident as
/// Server-Sent Events.
///
/// The simulation is cancelled as soon as the client goes away.
pub async fn handle_service_stream(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, (StatusCode, String)> {
    let simulation = state.new_simulation().map_err(|e| {
        error!(error = %e, "Failed to create simulation.");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let snapshot = Event::default().json_data(TopologySnapshot::new(state.topology()));

    let cancel = state.connection_token();
    let disconnect_guard = cancel.clone().drop_guard();
    let (sink, incidents) = incident_channel(simulation.config().buffer_capacity);

    info!("Client connected. Starting simulation.");
    tokio::spawn(
        async move {
            let report = simulation.run(sink, cancel).await;
            info!(
                ticks = report.ticks,
                glitches = report.glitches,
                incidents = report.incidents,
                termination = ?report.termination,
                "Simulation finished."
            );
        }
        .in_current_span(),
    );

    let incidents = incidents.map(move |incident| {
        // Dropped along with the response stream, which cancels the simulation.
        let _ = &disconnect_guard;

        debug!(incident_id = %incident.incident_id, root = %incident.root, "Streaming incident.");
        Event::default().id(&incident.incident_id).json_data(&incident)
    });

    Ok(Sse::new(stream::once(future::ready(snapshot)).chain(incidents)).keep_alive(KeepAlive::default()))
}
