use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use snafu::Snafu;
use tokio::{select, sync::mpsc};
use tokio_util::sync::CancellationToken;

use crate::IncidentRecord;

/// Why an incident could not be sent.
#[derive(Debug, Eq, PartialEq, Snafu)]
pub enum SendError {
    /// Cancellation was signalled before the incident could be sent.
    #[snafu(display("cancelled before the incident could be sent"))]
    Cancelled,

    /// The consumer is no longer accepting incidents.
    #[snafu(display("incident consumer disconnected"))]
    Disconnected,
}

/// Creates a bounded incident channel, returning the producer and consumer halves.
///
/// At most `capacity` incidents can be buffered. Once the buffer is full, sends wait for the consumer to catch up.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn incident_channel(capacity: usize) -> (IncidentSink, IncidentStream) {
    let (tx, rx) = mpsc::channel(capacity);
    (IncidentSink { inner: tx }, IncidentStream { inner: rx })
}

/// The producing half of an incident channel.
///
/// Dropping the sink closes the channel: the consumer receives every incident already buffered, and then observes the
/// end of the stream.
#[derive(Debug)]
pub struct IncidentSink {
    inner: mpsc::Sender<IncidentRecord>,
}

impl IncidentSink {
    /// Sends an incident, waiting for buffer space if necessary.
    ///
    /// # Errors
    ///
    /// If `cancel` fires before the incident is accepted, [`SendError::Cancelled`] is returned. Cancellation wins even
    /// when buffer space is available. If the consumer has gone away, [`SendError::Disconnected`] is returned.
    pub async fn send(&self, incident: IncidentRecord, cancel: &CancellationToken) -> Result<(), SendError> {
        select! {
            biased;

            _ = cancel.cancelled() => Err(SendError::Cancelled),
            result = self.inner.send(incident) => result.map_err(|_| SendError::Disconnected),
        }
    }

    /// Returns `true` if the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Waits until the consumer has gone away.
    pub async fn closed(&self) {
        self.inner.closed().await
    }
}

/// The consuming half of an incident channel.
///
/// Yields incidents in the exact order they were sent. Once the producer is done and the buffer is drained, every
/// subsequent read returns `None`.
#[derive(Debug)]
pub struct IncidentStream {
    inner: mpsc::Receiver<IncidentRecord>,
}

impl IncidentStream {
    /// Receives the next incident.
    ///
    /// Returns `None` once the producer has finished and all buffered incidents have been received.
    pub async fn next(&mut self) -> Option<IncidentRecord> {
        self.inner.recv().await
    }

    /// Stops accepting incidents.
    ///
    /// Incidents already buffered can still be received, but any further send fails, which the producer treats as the
    /// consumer disconnecting.
    pub fn close(&mut self) {
        self.inner.close();
    }
}

impl Stream for IncidentStream {
    type Item = IncidentRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_recv(cx)
    }
}
