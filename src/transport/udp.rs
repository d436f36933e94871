//! UDP transport driver.
//!
//! One socket serves all unicast control traffic; discovery uses the
//! link-local all-nodes multicast group `ff02::1`, the same group the
//! protocol has always used for neighbor discovery. Listener loops push
//! received payloads onto the node's ingestion channel and keep running
//! through transient I/O errors.

use std::ffi::CString;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::Arc;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{PayloadTx, ReceivedPayload, Transport, TransportError};

/// All-nodes link-local multicast group used for discovery.
const MULTICAST_GROUP: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

/// Receive buffer size, one Ethernet frame.
const RECV_BUF_SIZE: usize = 1500;

/// UDP control transport.
///
/// Unicast sends and replies go out through the bound control socket, so
/// peers see a stable source port.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind the unicast control socket.
    pub async fn bind(bind_addr: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| TransportError::Bind {
                addr: bind_addr.to_string(),
                source: e,
            })?;
        let local_addr = socket.local_addr()?;

        info!(local_addr = %local_addr, "control socket bound");

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawn the unicast receive loop, tagging payloads with `interface`.
    pub fn spawn_unicast_listener(&self, interface: &str, payload_tx: PayloadTx) -> JoinHandle<()> {
        let socket = self.socket.clone();
        let interface = interface.to_string();
        tokio::spawn(async move {
            recv_loop(socket, interface, payload_tx).await;
        })
    }

    /// Bind the multicast discovery socket on `interface` and spawn its
    /// receive loop.
    ///
    /// The socket binds with SO_REUSEADDR so several nodes can share one
    /// host during testing.
    pub fn spawn_multicast_listener(
        interface: &str,
        port: u16,
        payload_tx: PayloadTx,
    ) -> Result<JoinHandle<()>, TransportError> {
        let index = interface_index(interface)?;

        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_only_v6(true)?;
        socket.set_nonblocking(true)?;
        let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0);
        socket
            .bind(&bind_addr.into())
            .map_err(|e| TransportError::Bind {
                addr: bind_addr.to_string(),
                source: e,
            })?;
        socket.join_multicast_v6(&MULTICAST_GROUP, index)?;

        let socket = UdpSocket::from_std(socket.into())?;

        info!(
            interface = %interface,
            group = %MULTICAST_GROUP,
            port = port,
            "joined discovery multicast group"
        );

        let interface = interface.to_string();
        Ok(tokio::spawn(async move {
            recv_loop(Arc::new(socket), interface, payload_tx).await;
        }))
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_unicast(&self, dest: &str, payload: &[u8]) -> Result<(), TransportError> {
        let addr = resolve(dest).await?;
        self.socket
            .send_to(payload, addr)
            .await
            .map_err(|e| TransportError::SendFailed(format!("{} -> {}", e, addr)))?;

        debug!(dest = %addr, bytes = payload.len(), "sent unicast");
        Ok(())
    }

    async fn send_multicast(
        &self,
        interface: &str,
        port: u16,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let index = interface_index(interface)?;
        let dest = SocketAddrV6::new(MULTICAST_GROUP, port, 0, index);
        self.socket
            .send_to(payload, dest)
            .await
            .map_err(|e| TransportError::SendFailed(format!("{} -> {}", e, dest)))?;

        debug!(interface = %interface, port = port, bytes = payload.len(), "sent multicast");
        Ok(())
    }
}

/// Resolve a "host:port" destination, taking the first address.
async fn resolve(dest: &str) -> Result<SocketAddr, TransportError> {
    tokio::net::lookup_host(dest)
        .await
        .map_err(|e| TransportError::InvalidAddress {
            addr: dest.to_string(),
            reason: e.to_string(),
        })?
        .next()
        .ok_or_else(|| TransportError::InvalidAddress {
            addr: dest.to_string(),
            reason: "no addresses resolved".to_string(),
        })
}

/// Look up the OS interface index for a name.
fn interface_index(interface: &str) -> Result<u32, TransportError> {
    let name = CString::new(interface)
        .map_err(|_| TransportError::UnknownInterface(interface.to_string()))?;
    // SAFETY: name is a valid null-terminated string.
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(TransportError::UnknownInterface(interface.to_string()));
    }
    Ok(index)
}

/// Receive loop shared by the unicast and multicast listeners.
///
/// I/O errors are logged and the loop continues; it exits only when the
/// payload channel is closed.
async fn recv_loop(socket: Arc<UdpSocket>, interface: String, payload_tx: PayloadTx) {
    let mut buf = vec![0u8; RECV_BUF_SIZE];

    debug!(interface = %interface, "receive loop starting");

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, remote_addr)) => {
                debug!(
                    interface = %interface,
                    remote_addr = %remote_addr,
                    bytes = len,
                    "payload received"
                );

                let payload = ReceivedPayload {
                    data: buf[..len].to_vec(),
                    interface: interface.clone(),
                };
                if payload_tx.send(payload).await.is_err() {
                    info!(interface = %interface, "ingestion channel closed, stopping listener");
                    break;
                }
            }
            Err(e) => {
                warn!(interface = %interface, error = %e, "receive error");
            }
        }
    }
}
