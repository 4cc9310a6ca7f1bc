//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use relay_gateway::config::{GatewayConfig, ProxyMode};
use relay_gateway::lifecycle::{Gateway, Shutdown};

/// Start a TCP server that echoes everything it reads.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let (mut rd, mut wr) = socket.split();
                        let _ = tokio::io::copy(&mut rd, &mut wr).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Start a TCP server that accepts and then never reads or writes.
pub async fn start_blackhole() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// First of `count` consecutive loopback ports that were free a moment ago.
pub async fn free_port_range(count: usize) -> u16 {
    for _ in 0..64 {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let start = first.local_addr().unwrap().port();
        if start as usize + count > u16::MAX as usize {
            continue;
        }

        let mut held = vec![first];
        for offset in 1..count as u16 {
            match TcpListener::bind(("127.0.0.1", start + offset)).await {
                Ok(listener) => held.push(listener),
                Err(_) => break,
            }
        }
        if held.len() == count {
            return start;
        }
    }
    panic!("no run of {} free ports on loopback", count);
}

/// Gateway config for tests: loopback only, publish port picked by the OS,
/// renewal off, credentials under `dir`.
pub fn test_config(start_port: u16, users: usize, mode: ProxyMode, dir: &Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.proxy.bind_host = "127.0.0.1".into();
    config.proxy.start_port = start_port;
    config.proxy.users = users;
    config.proxy.mode = mode;
    config.proxy.credentials_path = dir.join("credentials.json").display().to_string();
    config.publish.bind_address = "127.0.0.1:0".into();
    config.publish.advertise_host = "127.0.0.1".into();
    config.renewal.enabled = false;
    config.timeouts.handshake_secs = 2;
    config.timeouts.connect_secs = 2;
    config.timeouts.idle_secs = 5;
    config
}

/// A gateway serving in the background.
pub struct RunningGateway {
    pub proxy_addrs: Vec<SocketAddr>,
    pub publish_addr: SocketAddr,
    pub store: Arc<relay_gateway::SubscriptionStore>,
    pub shutdown: Arc<Shutdown>,
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.publish_addr, path)
    }
}

impl Drop for RunningGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn spawn_gateway(config: GatewayConfig) -> RunningGateway {
    let gateway = Gateway::bind(config).await.expect("gateway should bind");
    let running = RunningGateway {
        proxy_addrs: gateway.proxy_addrs(),
        publish_addr: gateway.publish_addr().unwrap(),
        store: gateway.store(),
        shutdown: Arc::new(Shutdown::new()),
    };

    let shutdown = Arc::clone(&running.shutdown);
    tokio::spawn(async move {
        let _ = gateway.run(shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    running
}

/// Greet a SOCKS5 port and expect the "no authentication" choice.
pub async fn socks_greet(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await.unwrap();
    assert_eq!(choice, [0x05, 0x00]);
    stream
}

/// CONNECT request for an IPv4 target.
pub fn connect_request(target: SocketAddr) -> Vec<u8> {
    let SocketAddr::V4(v4) = target else {
        panic!("tests only use IPv4 targets");
    };
    let mut request = vec![0x05, 0x01, 0x00, 0x01];
    request.extend_from_slice(&v4.ip().octets());
    request.extend_from_slice(&v4.port().to_be_bytes());
    request
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
