//! # Bridge coordinator
//!
//! [`Bridge`] wires the transport, protocol engine, router, and gRPC
//! service together and owns the process lifecycle: parse the connection
//! URL, `start`, `wait`, `stop`.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::consts::SHUTDOWN_GRACE;
use crate::core::io::{SerialTransport, Transport, UdpTransport};
use crate::grpc::proto::mavlink_bridge_server::MavlinkBridgeServer;
use crate::grpc::{convert, BridgeService};
use crate::link::LinkEngine;
use crate::prelude::*;
use crate::router::Router;

/// Parsed MAVLink connection URL.
///
/// Three grammars are accepted:
///
/// * `udp://:PORT`: listen for MAVLink over UDP on all interfaces.
/// * `udp://HOST:PORT`: talk to a known UDP peer.
/// * `serial://DEVICE:BAUD`: serial device at the given baud rate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionUrl {
    /// UDP listener on the given port.
    UdpListen {
        /// Local port to bind.
        port: u16,
    },
    /// Outbound UDP peer.
    UdpPeer {
        /// Remote host name or address.
        host: String,
        /// Remote port.
        port: u16,
    },
    /// Serial device.
    Serial {
        /// Device path, e.g. `/dev/ttyUSB0`.
        path: String,
        /// Baud rate, validated against the standard rates on open.
        baud_rate: u32,
    },
}

impl ConnectionUrl {
    /// Builds the transport this URL describes.
    fn connect(&self) -> Result<Box<dyn Transport>> {
        match self {
            ConnectionUrl::UdpListen { port } => Ok(Box::new(UdpTransport::new(*port))),
            ConnectionUrl::UdpPeer { host, port } => {
                // Bind an ephemeral local port and seed the peer as the only
                // remote endpoint.
                let mut transport = UdpTransport::new(0);
                transport.add_remote_endpoint(host, *port)?;
                Ok(Box::new(transport))
            }
            ConnectionUrl::Serial { path, baud_rate } => {
                Ok(Box::new(SerialTransport::new(path.clone(), *baud_rate)))
            }
        }
    }
}

impl FromStr for ConnectionUrl {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self> {
        let invalid = || Error::InvalidUrl(url.to_string());

        if let Some(rest) = url.strip_prefix("udp://") {
            let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
            let port: u16 = port.parse().map_err(|_| invalid())?;

            return Ok(if host.is_empty() {
                ConnectionUrl::UdpListen { port }
            } else {
                ConnectionUrl::UdpPeer {
                    host: host.to_string(),
                    port,
                }
            });
        }

        if let Some(rest) = url.strip_prefix("serial://") {
            let (path, baud_rate) = rest.rsplit_once(':').ok_or_else(invalid)?;
            if path.is_empty() {
                return Err(invalid());
            }
            let baud_rate: u32 = baud_rate.parse().map_err(|_| invalid())?;

            return Ok(ConnectionUrl::Serial {
                path: path.to_string(),
                baud_rate,
            });
        }

        Err(invalid())
    }
}

impl fmt::Display for ConnectionUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionUrl::UdpListen { port } => write!(f, "udp://:{port}"),
            ConnectionUrl::UdpPeer { host, port } => write!(f, "udp://{host}:{port}"),
            ConnectionUrl::Serial { path, baud_rate } => {
                write!(f, "serial://{path}:{baud_rate}")
            }
        }
    }
}

/// Bridge configuration.
#[derive(Clone, Debug)]
pub struct BridgeConf {
    /// MAVLink connection URL, one of the [`ConnectionUrl`] grammars.
    pub connection_url: String,
    /// Address the gRPC server binds to.
    pub grpc_addr: SocketAddr,
    /// MAVLink system id of the bridge itself.
    pub system_id: u8,
    /// MAVLink component id of the bridge itself.
    pub component_id: u8,
}

/// The bridge: MAVLink link on one side, gRPC service on the other.
///
/// Inbound frames flow engine → converter → router → client streams;
/// outbound messages flow service → converter → engine. `start` and `stop`
/// are idempotent; [`wait`](Bridge::wait) blocks until the gRPC server has
/// finished (bounded by a grace period once `stop` was requested).
pub struct Bridge {
    engine: Arc<LinkEngine>,
    router: Arc<Router>,
    grpc_addr: SocketAddr,
    service: Mutex<Option<BridgeService>>,
    server: Mutex<Option<JoinHandle<Result<()>>>>,
    shutdown_tx: watch::Sender<bool>,
    running: AtomicBool,
}

impl Bridge {
    /// Parses the connection URL and wires all components.
    ///
    /// No I/O happens yet; the transport is opened by
    /// [`start`](Bridge::start).
    pub fn new(conf: BridgeConf) -> Result<Self> {
        let url: ConnectionUrl = conf.connection_url.parse()?;
        log::info!("bridge: MAVLink connection: {url}");

        let transport = url.connect()?;
        let engine = Arc::new(LinkEngine::new(
            transport,
            conf.system_id,
            conf.component_id,
        ));
        let router = Arc::new(Router::new());

        let inbound_router = router.clone();
        engine.set_frame_callback(move |frame| match convert::to_proto(&frame) {
            Ok(Some(message)) => {
                let delivered = inbound_router.route_message(&message);
                log::trace!(
                    "bridge: message {} routed to {delivered} subscribers",
                    message.message_id
                );
            }
            // Valid frame outside the build-time dialect subset.
            Ok(None) => {}
            Err(err) => log::debug!("bridge: dropped inbound frame: {err}"),
        });

        let send_engine = engine.clone();
        let service = BridgeService::new(
            router.clone(),
            Arc::new(move |message| {
                let decoded = convert::from_proto(message)?;
                send_engine.send(&decoded)
            }),
        );

        let (shutdown_tx, _) = watch::channel(false);

        log::info!("bridge: initialized");
        Ok(Self {
            engine,
            router,
            grpc_addr: conf.grpc_addr,
            service: Mutex::new(Some(service)),
            server: Mutex::new(None),
            shutdown_tx,
            running: AtomicBool::new(false),
        })
    }

    /// Starts the protocol engine and the gRPC server.
    ///
    /// Idempotent: calling `start` on a running bridge is a no-op. Must be
    /// called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            log::warn!("bridge: already running");
            return Ok(());
        }

        let service = self
            .service
            .lock()
            .take()
            .ok_or_else(|| Error::Link("bridge cannot be restarted".to_string()))?;

        if let Err(err) = self.engine.start() {
            self.running.store(false, Ordering::SeqCst);
            return Err(err);
        }

        let addr = self.grpc_addr;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            log::info!("grpc: server listening on {addr}");
            let result = tonic::transport::Server::builder()
                .add_service(MavlinkBridgeServer::new(service))
                .serve_with_shutdown(addr, async move {
                    let _ = shutdown_rx.wait_for(|stopped| *stopped).await;
                })
                .await;

            if let Err(err) = &result {
                log::error!("grpc: server error: {err}");
            }
            result.map_err(Error::from)
        });

        *self.server.lock() = Some(handle);
        log::info!("bridge: started");
        Ok(())
    }

    /// Stops the engine, ends all client streams, and asks the gRPC server
    /// to shut down. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            log::warn!("bridge: not running");
            return;
        }

        log::info!("bridge: stopping");
        self.engine.stop();
        let stats = self.engine.stats();
        log::info!(
            "bridge: link totals: {} received, {} sent, {} CRC errors, {} parse errors, {} sequence gaps",
            stats.messages_received,
            stats.messages_sent,
            stats.crc_errors,
            stats.parse_errors,
            stats.sequence_gaps
        );

        // Dropping the subscriptions closes their channels and ends every
        // outstanding stream, so the server can drain.
        self.router.clear();
        let _ = self.shutdown_tx.send(true);
    }

    /// Blocks until the gRPC server finishes.
    ///
    /// Once [`stop`](Bridge::stop) has been requested the server gets a
    /// bounded grace period to drain; after that the task is aborted.
    pub async fn wait(&self) -> Result<()> {
        let mut handle = match self.server.lock().take() {
            Some(handle) => handle,
            None => {
                log::warn!("bridge: server is not running");
                return Ok(());
            }
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let grace_expired = async move {
            let _ = shutdown_rx.wait_for(|stopped| *stopped).await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        };

        tokio::select! {
            result = &mut handle => match result {
                Ok(server_result) => server_result,
                Err(err) => Err(Error::Link(format!("gRPC server task failed: {err}"))),
            },
            _ = grace_expired => {
                log::warn!("grpc: server did not drain in time, aborting");
                handle.abort();
                Ok(())
            }
        }
    }

    /// Returns `true` between a successful `start` and the next `stop`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The protocol engine driving the MAVLink side.
    pub fn engine(&self) -> &LinkEngine {
        &self.engine
    }

    /// The subscription router feeding the gRPC streams.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }
}
