use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::core::io::Transport;
use crate::prelude::*;

/// UDP datagram transport.
///
/// Binds a local port and talks to a dynamic set of remote endpoints.
/// Whenever a datagram arrives from an unknown `(addr, port)` pair, that
/// pair is learned and subsequent writes go to it ("learn on receive").
/// Endpoints may also be seeded up front with
/// [`UdpTransport::add_remote_endpoint`], which is how the outbound peer
/// mode works.
///
/// The socket is opened with `SO_REUSEADDR` so multiple local listeners can
/// share the port, and is always non-blocking.
#[derive(Debug)]
pub struct UdpTransport {
    bind_addr: IpAddr,
    local_port: u16,
    broadcast_enabled: bool,
    socket: Option<UdpSocket>,
    remote_endpoints: Vec<SocketAddr>,
}

impl UdpTransport {
    /// Creates a UDP transport listening on `local_port` on all interfaces.
    pub fn new(local_port: u16) -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            local_port,
            broadcast_enabled: false,
            socket: None,
            remote_endpoints: Vec::new(),
        }
    }

    /// Overrides the local bind address.
    pub fn with_bind_addr(mut self, bind_addr: IpAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Enables sending to the limited broadcast address when no remote
    /// endpoint has been learned yet.
    pub fn with_broadcast(mut self, enabled: bool) -> Self {
        self.broadcast_enabled = enabled;
        self
    }

    /// Resolves `host` and seeds the remote endpoint set with `host:port`.
    ///
    /// May be called before or after [`open`](Transport::open); the endpoint
    /// set survives reopening.
    pub fn add_remote_endpoint(&mut self, host: &str, port: u16) -> Result<()> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|err| Error::Transport(format!("cannot resolve {host}: {err}")))?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| Error::Transport(format!("no IPv4 address for {host}")))?;

        self.add_endpoint_if_new(addr);
        Ok(())
    }

    /// Currently known remote endpoints, in learn order.
    pub fn remote_endpoints(&self) -> &[SocketAddr] {
        &self.remote_endpoints
    }

    fn add_endpoint_if_new(&mut self, addr: SocketAddr) {
        if !self.remote_endpoints.contains(&addr) {
            log::debug!("udp: learned remote endpoint {addr}");
            self.remote_endpoints.push(addr);
        }
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| Error::Transport("UDP socket is not open".to_string()))
    }
}

impl Transport for UdpTransport {
    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        if self.broadcast_enabled {
            socket.set_broadcast(true)?;
        }
        socket.set_nonblocking(true)?;

        let local_addr = SocketAddr::new(self.bind_addr, self.local_port);
        socket.bind(&local_addr.into())?;

        self.socket = Some(socket.into());
        Ok(())
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            self.remote_endpoints.clear();
        }
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let (bytes_read, sender) = match self.socket()?.recv_from(buf) {
            Ok(received) => received,
            Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        self.add_endpoint_if_new(sender);
        Ok(bytes_read)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let socket = self.socket()?;

        if self.remote_endpoints.is_empty() {
            if !self.broadcast_enabled {
                return Err(Error::Transport(
                    "no remote endpoints to send UDP datagram".to_string(),
                ));
            }

            let broadcast_addr =
                SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), self.local_port);
            return Ok(socket.send_to(buf, broadcast_addr)?);
        }

        let mut bytes_sent = 0;
        for endpoint in &self.remote_endpoints {
            bytes_sent = socket.send_to(buf, endpoint)?;
        }
        Ok(bytes_sent)
    }
}
