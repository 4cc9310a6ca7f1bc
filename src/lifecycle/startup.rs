//! Startup orchestration.
//!
//! # Responsibilities
//! - Load credentials and build the subscription store
//! - Bind every user port and the publish port
//! - Start port servers, the renewal scheduler and the publish server
//!
//! # Design Decisions
//! - Fail fast: any bind failure is fatal
//! - Everything binds before anything serves

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{GatewayConfig, ProxyMode};
use crate::crypto::{CipherError, CipherKind, MasterKey};
use crate::http::{ClientEndpoint, PublishServer, PublishState};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::{Dialer, ListenerError, TcpDialer};
use crate::proxy::{PortServer, SessionHandler, SessionMode};
use crate::subscription::{
    build_provisioner, load_or_generate, ProvisionError, Provisioner, RenewalPolicy,
    RenewalScheduler, SubscriptionStore,
};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid bind host '{0}'")]
    BindHost(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("publish server on {addr}: {source}")]
    Publish {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("provisioner setup failed: {0}")]
    Provisioner(#[from] ProvisionError),
}

/// A fully bound gateway, ready to serve.
pub struct Gateway {
    config: GatewayConfig,
    cipher: Option<CipherKind>,
    store: Arc<SubscriptionStore>,
    servers: Vec<PortServer>,
    publish_listener: TcpListener,
    provisioner: Arc<dyn Provisioner>,
}

impl Gateway {
    /// Bind all ports using the TCP dialer and the configured provisioner.
    pub async fn bind(config: GatewayConfig) -> Result<Self, StartupError> {
        let provisioner = build_provisioner(&config)?;
        let dialer: Arc<dyn Dialer> = Arc::new(TcpDialer::new(config.timeouts.connect()));
        Self::bind_with(config, dialer, provisioner).await
    }

    /// Bind all ports with explicit collaborators.
    pub async fn bind_with(
        config: GatewayConfig,
        dialer: Arc<dyn Dialer>,
        provisioner: Arc<dyn Provisioner>,
    ) -> Result<Self, StartupError> {
        let cipher = match config.proxy.mode {
            ProxyMode::Encrypted => Some(config.proxy.cipher.parse::<CipherKind>()?),
            ProxyMode::Socks5 => None,
        };
        let host: IpAddr = config
            .proxy
            .bind_host
            .parse()
            .map_err(|_| StartupError::BindHost(config.proxy.bind_host.clone()))?;

        let credentials = load_or_generate(
            Path::new(&config.proxy.credentials_path),
            config.proxy.users,
        );
        let store = Arc::new(SubscriptionStore::with_credentials(
            config.proxy.start_port,
            credentials,
        ));

        let mut servers = Vec::with_capacity(store.len());
        for slot in store.slots() {
            let mode = match cipher {
                Some(kind) => SessionMode::Encrypted(MasterKey::derive(kind, slot.credential())),
                None => SessionMode::Socks5,
            };
            let handler =
                SessionHandler::new(slot.label(), mode, &config.timeouts, Arc::clone(&dialer));
            let addr = SocketAddr::new(host, slot.listen_port());
            servers.push(
                PortServer::bind(slot.index(), addr, config.proxy.max_connections, handler).await?,
            );
        }

        let publish_listener = TcpListener::bind(&config.publish.bind_address)
            .await
            .map_err(|source| StartupError::Publish {
                addr: config.publish.bind_address.clone(),
                source,
            })?;

        Ok(Self {
            config,
            cipher,
            store,
            servers,
            publish_listener,
            provisioner,
        })
    }

    pub fn store(&self) -> Arc<SubscriptionStore> {
        Arc::clone(&self.store)
    }

    /// Bound proxy addresses, in slot order.
    pub fn proxy_addrs(&self) -> Vec<SocketAddr> {
        self.servers
            .iter()
            .filter_map(|server| server.local_addr().ok())
            .collect()
    }

    pub fn publish_addr(&self) -> io::Result<SocketAddr> {
        self.publish_listener.local_addr()
    }

    /// Log how to reach each user.
    pub fn announce(&self) {
        let host = &self.config.publish.advertise_host;
        let http_port = self.publish_addr().map(|a| a.port()).unwrap_or_default();

        for slot in self.store.slots() {
            let subscription = format!("http://{}:{}/{}/sub.yaml", host, http_port, slot.user_id());
            match self.cipher {
                Some(cipher) => {
                    let endpoint = ClientEndpoint {
                        user_id: slot.user_id(),
                        host,
                        port: slot.listen_port(),
                        cipher,
                        credential: slot.credential(),
                    };
                    tracing::info!(
                        user = slot.user_id(),
                        url = %endpoint.ss_uri(),
                        clash = %format!("http://{}:{}/{}/clash.yaml", host, http_port, slot.user_id()),
                        subscription = %subscription,
                        "Encrypted endpoint ready"
                    );
                }
                None => {
                    tracing::info!(
                        user = slot.user_id(),
                        endpoint = %format!("{}:{}", host, slot.listen_port()),
                        subscription = %subscription,
                        "SOCKS5 endpoint ready"
                    );
                }
            }
        }
    }

    /// Serve until `shutdown` fires and the publish server has drained.
    pub async fn run(self, shutdown: Arc<Shutdown>) -> Result<(), StartupError> {
        let Gateway {
            config,
            cipher,
            store,
            servers,
            publish_listener,
            provisioner,
        } = self;

        let trackers = servers.iter().map(PortServer::tracker).collect();
        for server in servers {
            tokio::spawn(server.run(shutdown.subscribe()));
        }

        if config.renewal.enabled {
            let scheduler = RenewalScheduler::new(
                Arc::clone(&store),
                provisioner,
                RenewalPolicy::from_config(&config.renewal),
            );
            tokio::spawn(scheduler.run());
        } else {
            tracing::info!("Renewal scheduler disabled");
        }

        let state = PublishState::new(store, &config.publish.advertise_host, cipher, trackers);
        let server = PublishServer::new(
            state,
            Duration::from_secs(config.publish.request_timeout_secs),
        );
        server
            .run(publish_listener, shutdown.subscribe())
            .await
            .map_err(|source| StartupError::Publish {
                addr: config.publish.bind_address.clone(),
                source,
            })
    }
}
