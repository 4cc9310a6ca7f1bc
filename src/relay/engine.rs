//! Bidirectional copy with idle deadlines and coordinated teardown.
//!
//! Each direction runs as its own task. Before every read the direction arms
//! an idle deadline; after a successful read it arms the same deadline on the
//! write. The first direction to stop (EOF, error or deadline) fires the
//! [`CloseBarrier`], which cancels the other direction. Once both tasks have
//! returned, the two streams are shut down exactly once and dropped.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::relay::barrier::CloseBarrier;
use crate::resilience::timeouts::{is_timeout, with_deadline};

/// Copy buffer per direction.
const BUFFER_SIZE: usize = 32 * 1024;

/// Upper bound on flushing a stream during teardown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Which leg of the relay a direction copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client side to target side.
    Outbound,
    /// Target side to client side.
    Inbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outbound => "outbound",
            Direction::Inbound => "inbound",
        }
    }
}

/// Why a direction stopped copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Source reached end of stream.
    Eof,
    /// No traffic within the idle timeout.
    IdleTimeout,
    /// Read or write failed.
    Error(io::ErrorKind),
    /// The other direction fired the close barrier first.
    Cancelled,
}

/// Summary of one finished relay.
#[derive(Debug, Clone)]
pub struct RelayReport {
    /// Bytes copied client → target.
    pub outbound_bytes: u64,
    /// Bytes copied target → client.
    pub inbound_bytes: u64,
    /// Direction that fired the close barrier.
    pub initiator: Direction,
    /// Why the initiating direction stopped.
    pub cause: Termination,
}

struct Pump<R, W> {
    reader: ReadHalf<R>,
    writer: WriteHalf<W>,
    bytes: u64,
    end: Termination,
    fired: bool,
}

/// Relay bytes between `client` and `target` until either side stops.
///
/// Returns only after both directions have ended and both streams have been
/// shut down.
pub async fn relay<A, B>(client: A, target: B, idle_timeout: Duration) -> io::Result<RelayReport>
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let barrier = Arc::new(CloseBarrier::new());
    let (client_read, client_write) = split(client);
    let (target_read, target_write) = split(target);

    let outbound = tokio::spawn(pump(
        client_read,
        target_write,
        idle_timeout,
        barrier.clone(),
        Direction::Outbound,
    ));
    let inbound = tokio::spawn(pump(
        target_read,
        client_write,
        idle_timeout,
        barrier.clone(),
        Direction::Inbound,
    ));

    let (outbound, inbound) = tokio::join!(outbound, inbound);
    let outbound = outbound.map_err(io::Error::other)?;
    let inbound = inbound.map_err(io::Error::other)?;

    let (initiator, cause) = if outbound.fired {
        (Direction::Outbound, outbound.end.clone())
    } else {
        (Direction::Inbound, inbound.end.clone())
    };

    let report = RelayReport {
        outbound_bytes: outbound.bytes,
        inbound_bytes: inbound.bytes,
        initiator,
        cause,
    };

    let mut client = outbound.reader.unsplit(inbound.writer);
    let mut target = inbound.reader.unsplit(outbound.writer);
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, client.shutdown()).await;
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, target.shutdown()).await;

    tracing::trace!(
        initiator = initiator.as_str(),
        cause = ?report.cause,
        outbound_bytes = report.outbound_bytes,
        inbound_bytes = report.inbound_bytes,
        "Relay closed"
    );
    Ok(report)
}

async fn pump<R, W>(
    mut reader: ReadHalf<R>,
    mut writer: WriteHalf<W>,
    idle_timeout: Duration,
    barrier: Arc<CloseBarrier>,
    direction: Direction,
) -> Pump<R, W>
where
    R: AsyncRead,
    W: AsyncWrite,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut bytes = 0u64;

    let end = loop {
        let read = tokio::select! {
            biased;
            _ = barrier.closed() => break Termination::Cancelled,
            read = with_deadline(idle_timeout, reader.read(&mut buf)) => read,
        };
        let n = match read {
            Ok(0) => break Termination::Eof,
            Ok(n) => n,
            Err(e) => break classify(&e),
        };

        let written = tokio::select! {
            biased;
            _ = barrier.closed() => break Termination::Cancelled,
            written = with_deadline(idle_timeout, async {
                writer.write_all(&buf[..n]).await?;
                writer.flush().await
            }) => written,
        };
        if let Err(e) = written {
            break classify(&e);
        }
        bytes += n as u64;
    };

    let fired = end != Termination::Cancelled && barrier.fire();
    if fired {
        tracing::trace!(direction = direction.as_str(), cause = ?end, "Direction ended, closing relay");
    }

    Pump {
        reader,
        writer,
        bytes,
        end,
        fired,
    }
}

fn classify(err: &io::Error) -> Termination {
    if is_timeout(err) {
        Termination::IdleTimeout
    } else {
        Termination::Error(err.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_bytes_flow_in_order_both_ways() {
        let (mut client, client_side) = duplex(64);
        let (target_side, mut target) = duplex(64);

        let relay = tokio::spawn(relay(client_side, target_side, Duration::from_secs(5)));

        let chunks: Vec<Vec<u8>> = (0u8..20).map(|i| vec![i; 100]).collect();
        let expected: Vec<u8> = chunks.concat();

        let writer = tokio::spawn(async move {
            for chunk in chunks {
                client.write_all(&chunk).await.unwrap();
            }
            client
        });
        let mut received = vec![0u8; expected.len()];
        target.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected);

        let mut client = writer.await.unwrap();
        target.write_all(b"pong").await.unwrap();
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"pong");

        drop(target);
        let report = relay.await.unwrap().unwrap();
        assert_eq!(report.outbound_bytes, expected.len() as u64);
        assert_eq!(report.inbound_bytes, 4);
        assert_eq!(report.initiator, Direction::Inbound);
        assert_eq!(report.cause, Termination::Eof);

        // Client leg was shut down by the relay.
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_tears_down_both_sides() {
        let (mut client, client_side) = duplex(64);
        let (target_side, mut target) = duplex(64);
        let idle = Duration::from_secs(30);

        let started = Instant::now();
        let report = relay(client_side, target_side, idle).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(report.cause, Termination::IdleTimeout);
        assert!(elapsed >= idle);
        assert!(elapsed < idle + Duration::from_secs(1));

        let mut buf = Vec::new();
        assert_eq!(client.read_to_end(&mut buf).await.unwrap(), 0);
        assert_eq!(target.read_to_end(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_traffic_resets_idle_deadline() {
        let (mut client, client_side) = duplex(64);
        let (target_side, mut target) = duplex(64);
        let idle = Duration::from_secs(10);

        let relay = tokio::spawn(relay(client_side, target_side, idle));

        // Each direction carries its own deadline, so both must see traffic.
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(6)).await;
            let mut byte = [0u8; 1];
            client.write_all(b"x").await.unwrap();
            target.read_exact(&mut byte).await.unwrap();
            target.write_all(b"y").await.unwrap();
            client.read_exact(&mut byte).await.unwrap();
        }
        assert!(!relay.is_finished());

        let report = relay.await.unwrap().unwrap();
        assert_eq!(report.cause, Termination::IdleTimeout);
        assert_eq!(report.outbound_bytes, 5);
        assert_eq!(report.inbound_bytes, 5);
    }

    #[tokio::test]
    async fn test_client_close_cancels_other_direction() {
        let (client, client_side) = duplex(64);
        let (target_side, mut target) = duplex(64);

        let relay = tokio::spawn(relay(client_side, target_side, Duration::from_secs(60)));
        drop(client);

        let report = tokio::time::timeout(Duration::from_secs(5), relay)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(report.initiator, Direction::Outbound);
        assert_eq!(report.cause, Termination::Eof);

        let mut buf = Vec::new();
        assert_eq!(target.read_to_end(&mut buf).await.unwrap(), 0);
    }
}
