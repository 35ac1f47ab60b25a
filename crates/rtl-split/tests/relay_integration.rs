//! End-to-end tests: a fake rtl_tcp server, a real splitter, and real TCP
//! clients, all on 127.0.0.1.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use rtl_core::{CommandFrame, COMMAND_SIZE, HEADER_SIZE};
use rtl_split::domain::SplitterConfig;
use rtl_split::infrastructure::{Splitter, StopReason};
use rtl_split::SplitterError;

const WAIT: Duration = Duration::from_secs(5);

// ── Helpers ───────────────────────────────────────────────────────────────────

/// A single-connection stand-in for rtl_tcp.
///
/// Sends `header` on connect, then writes whatever is pushed into `chunks`.
/// Dropping `chunks` closes the connection.  Bytes the splitter sends are
/// delivered on `received`.
struct FakeUpstream {
    port: u16,
    chunks: mpsc::UnboundedSender<Vec<u8>>,
    received: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl FakeUpstream {
    async fn start(header: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (received_tx, received_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (mut read_half, mut write_half) = socket.into_split();
            write_half.write_all(&header).await.unwrap();

            tokio::spawn(async move {
                let mut buf = [0u8; 256];
                loop {
                    match read_half.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if received_tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                    }
                }
            });

            while let Some(chunk) = chunk_rx.recv().await {
                if write_half.write_all(&chunk).await.is_err() {
                    break;
                }
            }
            // Dropping the write half sends FIN.
        });

        Self {
            port,
            chunks: chunk_tx,
            received: received_rx,
        }
    }

    fn send(&self, chunk: Vec<u8>) {
        self.chunks.send(chunk).unwrap();
    }

    /// Collects exactly `len` bytes of command traffic.
    async fn expect_commands(&mut self, len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        while out.len() < len {
            let bytes = timeout(WAIT, self.received.recv())
                .await
                .expect("timed out waiting for commands")
                .expect("upstream reader stopped");
            out.extend_from_slice(&bytes);
        }
        assert_eq!(out.len(), len, "more command bytes than expected");
        out
    }
}

fn config(upstream_port: u16) -> SplitterConfig {
    SplitterConfig {
        upstream_host: "127.0.0.1".to_string(),
        upstream_port,
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..Default::default()
    }
}

struct Running {
    addr: SocketAddr,
    registry: std::sync::Arc<rtl_split::application::ClientRegistry>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<StopReason, SplitterError>>,
}

async fn start_splitter(upstream_port: u16) -> Running {
    let splitter = Splitter::connect(config(upstream_port)).await.unwrap();
    let listener = splitter.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = splitter.registry();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(splitter.serve(listener, async move {
        let _ = stop_rx.await;
    }));

    Running {
        addr,
        registry,
        stop: Some(stop_tx),
        task,
    }
}

/// Connects a client and consumes its header.
async fn connect_client(addr: SocketAddr) -> (TcpStream, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut header = vec![0u8; HEADER_SIZE];
    timeout(WAIT, stream.read_exact(&mut header))
        .await
        .expect("timed out waiting for header")
        .unwrap();
    (stream, header)
}

async fn read_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    timeout(WAIT, stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for data")
        .unwrap();
    buf
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(WAIT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_two_clients_get_identical_header_then_identical_chunk() {
    // Arrange
    let upstream = FakeUpstream::start(vec![0u8; HEADER_SIZE]).await;
    let running = start_splitter(upstream.port).await;

    // Act
    let (mut first, first_header) = connect_client(running.addr).await;
    let (mut second, second_header) = connect_client(running.addr).await;
    upstream.send(vec![0xAA; 1024]);

    // Assert
    assert_eq!(first_header, vec![0u8; HEADER_SIZE]);
    assert_eq!(second_header, first_header);
    assert_eq!(read_n(&mut first, 1024).await, vec![0xAA; 1024]);
    assert_eq!(read_n(&mut second, 1024).await, vec![0xAA; 1024]);
}

#[tokio::test]
async fn test_real_header_is_replayed_verbatim() {
    let mut header = b"RTL0".to_vec();
    header.extend_from_slice(&[0, 0, 0, 5, 0, 0, 0, 29]);
    let upstream = FakeUpstream::start(header.clone()).await;
    let running = start_splitter(upstream.port).await;

    let (_client, received) = connect_client(running.addr).await;

    assert_eq!(received, header);
}

#[tokio::test]
async fn test_late_client_sees_only_data_after_it_joined() {
    // Arrange: chunk A is fully delivered before the late client connects
    let upstream = FakeUpstream::start(vec![0u8; HEADER_SIZE]).await;
    let running = start_splitter(upstream.port).await;
    let (mut early, _) = connect_client(running.addr).await;
    upstream.send(vec![0x11; 256]);
    assert_eq!(read_n(&mut early, 256).await, vec![0x11; 256]);

    // Act
    let (mut late, late_header) = connect_client(running.addr).await;
    upstream.send(vec![0x22; 256]);

    // Assert: header, then chunk B, and nothing from chunk A
    assert_eq!(late_header, vec![0u8; HEADER_SIZE]);
    assert_eq!(read_n(&mut late, 256).await, vec![0x22; 256]);
    assert_eq!(read_n(&mut early, 256).await, vec![0x22; 256]);
    let mut extra = [0u8; 1];
    let idle = timeout(Duration::from_millis(100), late.read(&mut extra)).await;
    assert!(idle.is_err(), "late client received unexpected bytes");
}

#[tokio::test]
async fn test_splitter_exposes_captured_header() {
    let mut header = b"RTL0".to_vec();
    header.extend_from_slice(&[0, 0, 0, 6, 0, 0, 0, 16]);
    let upstream = FakeUpstream::start(header.clone()).await;

    let splitter = Splitter::connect(config(upstream.port)).await.unwrap();

    assert_eq!(splitter.header().as_bytes(), header.as_slice());
    assert!(splitter.header().is_complete());
}

#[tokio::test]
async fn test_client_command_reaches_upstream_unchanged() {
    let mut upstream = FakeUpstream::start(vec![0u8; HEADER_SIZE]).await;
    let running = start_splitter(upstream.port).await;
    let (mut client, _) = connect_client(running.addr).await;

    client.write_all(&[0x01, 0x00, 0x00, 0x00, 0x64]).await.unwrap();

    assert_eq!(
        upstream.expect_commands(COMMAND_SIZE).await,
        vec![0x01, 0x00, 0x00, 0x00, 0x64]
    );
}

#[tokio::test]
async fn test_disconnected_client_is_dropped_from_broadcast() {
    // Arrange
    let upstream = FakeUpstream::start(vec![0u8; HEADER_SIZE]).await;
    let running = start_splitter(upstream.port).await;
    let (mut staying, _) = connect_client(running.addr).await;
    let (leaving, _) = connect_client(running.addr).await;
    assert_eq!(running.registry.len(), 2);

    // Act
    drop(leaving);
    let registry = running.registry.clone();
    eventually(|| {
        let registry = registry.clone();
        async move { registry.len() == 1 }
    })
    .await;
    upstream.send(vec![0x55; 512]);

    // Assert
    assert_eq!(read_n(&mut staying, 512).await, vec![0x55; 512]);
    assert_eq!(running.registry.len(), 1);
}

#[tokio::test]
async fn test_concurrent_commands_arrive_whole_and_in_order() {
    let mut upstream = FakeUpstream::start(vec![0u8; HEADER_SIZE]).await;
    let running = start_splitter(upstream.port).await;
    let (mut a, _) = connect_client(running.addr).await;
    let (mut b, _) = connect_client(running.addr).await;

    let frames_for = |opcode: u8| -> Vec<u8> {
        (0u32..20)
            .flat_map(|v| *CommandFrame::new(opcode, v).as_bytes())
            .collect()
    };
    let (sent_a, sent_b) = (frames_for(0x05), frames_for(0x08));
    let (ra, rb) = tokio::join!(a.write_all(&sent_a), b.write_all(&sent_b));
    ra.unwrap();
    rb.unwrap();

    let received = upstream.expect_commands(2 * 20 * COMMAND_SIZE).await;
    let mut by_opcode: HashMap<u8, Vec<u32>> = HashMap::new();
    for chunk in received.chunks(COMMAND_SIZE) {
        let frame = CommandFrame::from_bytes([chunk[0], chunk[1], chunk[2], chunk[3], chunk[4]]);
        by_opcode
            .entry(frame.opcode_byte())
            .or_default()
            .push(frame.value());
    }
    let expected: Vec<u32> = (0..20).collect();
    assert_eq!(by_opcode.len(), 2, "torn frames: {by_opcode:?}");
    assert_eq!(by_opcode[&0x05], expected);
    assert_eq!(by_opcode[&0x08], expected);
}

#[tokio::test]
async fn test_upstream_eof_stops_with_upstream_closed_and_closes_clients() {
    // Arrange
    let upstream = FakeUpstream::start(vec![0u8; HEADER_SIZE]).await;
    let running = start_splitter(upstream.port).await;
    let (mut client, _) = connect_client(running.addr).await;

    // Act: dropping the chunk sender closes the upstream connection
    drop(upstream);
    let reason = timeout(WAIT, running.task)
        .await
        .expect("splitter did not stop")
        .unwrap();

    // Assert
    assert_eq!(reason.unwrap(), StopReason::UpstreamClosed);
    let mut buf = [0u8; 16];
    let read = timeout(WAIT, client.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)), "client still open: {read:?}");
}

#[tokio::test]
async fn test_shutdown_future_stops_with_shutdown() {
    let upstream = FakeUpstream::start(vec![0u8; HEADER_SIZE]).await;
    let mut running = start_splitter(upstream.port).await;
    let (mut client, _) = connect_client(running.addr).await;

    running.stop.take().unwrap().send(()).unwrap();
    let reason = timeout(WAIT, running.task)
        .await
        .expect("splitter did not stop")
        .unwrap();

    assert_eq!(reason.unwrap(), StopReason::Shutdown);
    let mut buf = [0u8; 16];
    let read = timeout(WAIT, client.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)), "client still open: {read:?}");
}

#[tokio::test]
async fn test_connect_to_closed_port_fails_with_upstream_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = Splitter::connect(config(port)).await;

    assert!(matches!(
        result,
        Err(SplitterError::UpstreamConnect { .. })
    ));
}

#[tokio::test]
async fn test_bind_conflict_fails_with_bind_error() {
    let upstream = FakeUpstream::start(vec![0u8; HEADER_SIZE]).await;
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut cfg = config(upstream.port);
    cfg.listen_addr = taken.local_addr().unwrap();

    let splitter = Splitter::connect(cfg).await.unwrap();
    let result = splitter.run_until(std::future::pending()).await;

    assert!(matches!(result, Err(SplitterError::Bind { .. })));
}
