//! Raw SCPI socket adapter.
//!
//! LXI instruments accept SCPI on a plain TCP socket, conventionally port 5025.

use super::{Adapter, AdapterOptions, Framing, LineStream, TransportError};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::info;

/// Conventional raw SCPI port.
pub const DEFAULT_SCPI_PORT: u16 = 5025;

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Resolve `host[:port]`, an IP literal or a bracketed IPv6 literal with port.
/// The default SCPI port is used when none is given.
fn resolve(address: &str) -> Result<SocketAddr, TransportError> {
    if let Ok(peer) = address.parse::<SocketAddr>() {
        return Ok(peer);
    }
    let bare = address.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_SCPI_PORT));
    }

    let with_port = if address.contains(':') {
        address.to_string()
    } else {
        format!("{}:{}", address, DEFAULT_SCPI_PORT)
    };
    with_port
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| TransportError::InvalidConfig(format!("cannot resolve '{}'", address)))
}

/// TCP adapter.
pub struct TcpAdapter {
    peer: SocketAddr,
    session: LineStream<TcpStream>,
}

impl TcpAdapter {
    /// Connect to `address`, adding the default SCPI port when none is given.
    pub fn connect(address: &str, timeout: Duration) -> Result<Self, TransportError> {
        let peer = resolve(address)?;

        let stream = TcpStream::connect_timeout(&peer, timeout)
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", peer, e)))?;
        stream.set_read_timeout(Some(POLL_TIMEOUT))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        info!(%peer, "TCP connection opened");
        let framing = Framing {
            timeout,
            ..Framing::default()
        };
        Ok(Self {
            peer,
            session: LineStream::new("tcp", stream, framing),
        })
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Adapter for TcpAdapter {
    fn name(&self) -> &str {
        "tcp"
    }

    fn configure(&mut self, options: &AdapterOptions) -> Result<(), TransportError> {
        self.session.configure(options)?;
        let timeout = self.session.framing().timeout;
        if let Some(stream) = self.session.stream_mut() {
            stream.set_write_timeout(Some(timeout))?;
        }
        Ok(())
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        self.session.write(command)
    }

    fn read(&mut self) -> Result<String, TransportError> {
        self.session.read()
    }

    fn ask(&mut self, command: &str) -> Result<String, TransportError> {
        self.session.ask(command)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.session.is_closed() {
            if let Some(stream) = self.session.stream_mut() {
                // peer may already be gone
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
            self.session.close()?;
            info!(peer = %self.peer, "TCP connection closed");
        }
        Ok(())
    }
}
