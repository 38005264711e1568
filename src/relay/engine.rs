//! Bidirectional relay between a framed stream and a message transport
//!
//! Two tasks run per session. Upstream reads lines from the stream and sends
//! them as messages; downstream receives messages and writes them as lines.
//! The first task to stop decides the outcome of the whole session.

use log::{debug, warn};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::transport::{
    MessageSink, MessageSource, MessageTransport, TransportError, CLOSE_GOING_AWAY, CLOSE_NORMAL,
};
use crate::common::TunnelError;
use crate::protocol::{FrameError, FrameReader, FrameWriter, FramedConnection};

/// Bound on closing the far side once a direction has stopped
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Direction of a forwarding task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Stream to transport
    Upstream,
    /// Transport to stream
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => f.write_str("upstream"),
            Direction::Downstream => f.write_str("downstream"),
        }
    }
}

/// How a forwarding task ended
#[derive(Debug)]
pub enum Outcome {
    /// The peer closed cleanly
    Graceful,
    /// Any other reason
    Failed(TunnelError),
}

impl Outcome {
    /// Close code announcing this outcome to the transport peer
    fn close_code(&self) -> u16 {
        match self {
            Outcome::Graceful => CLOSE_NORMAL,
            Outcome::Failed(_) => CLOSE_GOING_AWAY,
        }
    }

    fn from_transport(err: TransportError) -> Self {
        if err.is_graceful_close() {
            Outcome::Graceful
        } else {
            Outcome::Failed(err.into())
        }
    }

    fn from_stream(err: FrameError) -> Self {
        match err {
            FrameError::Closed => Outcome::Graceful,
            other => Outcome::Failed(other.into()),
        }
    }
}

/// Result of a relay session: the first direction to stop and why
#[derive(Debug)]
pub struct RelayReport {
    /// Direction that stopped first
    pub direction: Direction,
    /// Why it stopped
    pub outcome: Outcome,
}

impl RelayReport {
    /// Whether the session ended cleanly
    pub fn is_graceful(&self) -> bool {
        matches!(self.outcome, Outcome::Graceful)
    }

    /// `Ok(())` for a clean end, the failure otherwise
    pub fn into_result(self) -> Result<(), TunnelError> {
        match self.outcome {
            Outcome::Graceful => Ok(()),
            Outcome::Failed(e) => Err(e),
        }
    }
}

/// Relay frames between `conn` and `transport` until either side stops
///
/// Returns once the first direction has stopped and both connections have
/// been closed and dropped. Neither task is left running.
pub async fn relay<S, T>(conn: FramedConnection<S>, transport: T) -> RelayReport
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    T: MessageTransport,
{
    let (reader, writer) = conn.into_split();
    let (sink, source) = transport.split();

    // Room for both reports, so the losing task never blocks on send
    let (reports, mut first) = mpsc::channel(2);

    let upstream = tokio::spawn(forward_upstream(reader, sink, reports.clone()));
    let downstream = tokio::spawn(forward_downstream(source, writer, reports));

    let report = match first.recv().await {
        Some(report) => report,
        None => RelayReport {
            direction: Direction::Upstream,
            outcome: Outcome::Failed(TunnelError::Other("relay tasks ended without a report".to_string())),
        },
    };

    upstream.abort();
    downstream.abort();
    let _ = upstream.await;
    let _ = downstream.await;

    debug!("Relay stopped ({}): {:?}", report.direction, report.outcome);
    report
}

async fn forward_upstream<R, K>(mut reader: FrameReader<R>, mut sink: K, reports: mpsc::Sender<RelayReport>)
where
    R: AsyncRead + Unpin + Send,
    K: MessageSink,
{
    let mut buf = reader.buffers().acquire();

    let outcome = loop {
        let len = match reader.read_into(&mut buf).await {
            Ok(len) => len,
            Err(e) => break Outcome::from_stream(e),
        };
        if len == 0 {
            continue;
        }

        let payload = &buf[..len];
        debug!("--> {}", String::from_utf8_lossy(payload));
        if let Err(e) = sink.send(payload).await {
            break Outcome::from_transport(e);
        }
    };

    drop(buf);
    if let Ok(Err(e)) = timeout(CLOSE_TIMEOUT, sink.close(outcome.close_code())).await {
        debug!("Closing transport failed: {}", e);
    }

    let _ = reports
        .send(RelayReport {
            direction: Direction::Upstream,
            outcome,
        })
        .await;
}

async fn forward_downstream<M, W>(mut source: M, mut writer: FrameWriter<W>, reports: mpsc::Sender<RelayReport>)
where
    M: MessageSource,
    W: AsyncWrite + Unpin + Send,
{
    let outcome = loop {
        let message = match source.recv().await {
            Ok(message) => message,
            Err(e) => break Outcome::from_transport(e),
        };
        if message.is_empty() {
            continue;
        }

        debug!("<-- {}", String::from_utf8_lossy(&message));
        if let Err(e) = writer.write(&message).await {
            break Outcome::from_stream(e);
        }
    };

    match timeout(CLOSE_TIMEOUT, writer.close()).await {
        Ok(Err(e)) => debug!("Closing stream failed: {}", e),
        Err(_) => warn!("Closing stream timed out"),
        Ok(Ok(())) => {}
    }

    let _ = reports
        .send(RelayReport {
            direction: Direction::Downstream,
            outcome,
        })
        .await;
}
