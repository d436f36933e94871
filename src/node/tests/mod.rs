use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::*;
use crate::config::Config;
use crate::protocol::{HelloMessage, Message, TunnelMessage};
use crate::transport::Transport;
use crate::tunnel::{ProvisionRequest, WgDeviceConfig};

mod hello;

/// Interface name used throughout engine tests.
pub(super) const IFACE: &str = "eth0";

/// Transport double that records what the engine sends.
pub(super) struct MockTransport {
    unicast: Mutex<Vec<(String, Vec<u8>)>>,
    multicast: Mutex<Vec<(String, u16, Vec<u8>)>>,
}

impl MockTransport {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self {
            unicast: Mutex::new(Vec::new()),
            multicast: Mutex::new(Vec::new()),
        })
    }

    /// Remove and return all recorded unicast sends.
    pub(super) fn take_unicast(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut self.unicast.lock().unwrap())
    }

    /// Remove and return all recorded multicast sends.
    pub(super) fn take_multicast(&self) -> Vec<(String, u16, Vec<u8>)> {
        std::mem::take(&mut self.multicast.lock().unwrap())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_unicast(&self, dest: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.unicast
            .lock()
            .unwrap()
            .push((dest.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn send_multicast(
        &self,
        interface: &str,
        port: u16,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.multicast
            .lock()
            .unwrap()
            .push((interface.to_string(), port, payload.to_vec()));
        Ok(())
    }
}

/// Provisioner double recording invocations.
pub(super) struct MockProvisioner {
    calls: Mutex<Vec<ProvisionRequest>>,
    fail: AtomicBool,
}

impl MockProvisioner {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    pub(super) fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(super) fn calls(&self) -> Vec<ProvisionRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TunnelProvisioner for MockProvisioner {
    async fn provision(&self, request: &ProvisionRequest) -> Result<WgDeviceConfig, TunnelError> {
        self.calls.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(TunnelError::ProvisioningVerificationFailed);
        }
        Ok(WgDeviceConfig {
            private_key: request.private_key.clone(),
            listen_port: request.listen_port,
            peer: None,
        })
    }
}

/// An engine wired to mock collaborators.
pub(super) struct TestNode {
    pub node: Node,
    pub transport: Arc<MockTransport>,
    pub provisioner: Arc<MockProvisioner>,
}

impl TestNode {
    pub(super) fn key(&self) -> NodeKey {
        self.node.identity().public_key()
    }

    /// The single unicast payload sent since the last take, if any.
    pub(super) fn sent_unicast(&self) -> Option<(String, Vec<u8>)> {
        let mut sends = self.transport.take_unicast();
        assert!(sends.len() <= 1, "expected at most one unicast send");
        sends.pop()
    }
}

/// Build a node with a tunnel identity derived from `name`.
pub(super) fn make_node(name: &str, control_addr: &str) -> TestNode {
    let identity = Identity::generate().with_control_address(IFACE, control_addr);
    make_node_with(identity, test_config(name))
}

/// Build a node without any tunnel identity configured.
pub(super) fn make_node_bare(control_addr: &str) -> TestNode {
    let identity = Identity::generate().with_control_address(IFACE, control_addr);
    make_node_with(identity, Config::new())
}

pub(super) fn make_node_with(identity: Identity, config: Config) -> TestNode {
    let transport = MockTransport::new();
    let provisioner = MockProvisioner::new();
    let node = Node::new(
        identity,
        transport.clone(),
        provisioner.clone(),
        config,
    );
    TestNode {
        node,
        transport,
        provisioner,
    }
}

pub(super) fn test_config(name: &str) -> Config {
    let mut config = Config::new();
    config.tunnel.public_key = Some(format!("{}-wg-pub", name));
    config.tunnel.private_key = Some(format!("{}-wg-priv", name));
    config.tunnel.endpoint = Some(format!("{}.example.net:51820", name));
    config
}

/// Encode a Hello as a peer under test would send it.
pub(super) fn hello_wire(
    peer: &Identity,
    control_address: &str,
    seqnum: u64,
    confirm: bool,
) -> Vec<u8> {
    let msg = HelloMessage {
        metadata: crate::protocol::MessageMetadata::new(peer.public_key(), seqnum, confirm),
        control_address: control_address.to_string(),
    };
    msg.encode(peer).unwrap().into_bytes()
}

/// Encode a Tunnel message as a peer under test would send it.
pub(super) fn tunnel_wire(
    peer: &Identity,
    tunnel_public_key: &str,
    tunnel_endpoint: &str,
    seqnum: u64,
    confirm: bool,
) -> Vec<u8> {
    let msg = TunnelMessage {
        metadata: crate::protocol::MessageMetadata::new(peer.public_key(), seqnum, confirm),
        tunnel_public_key: tunnel_public_key.to_string(),
        tunnel_endpoint: tunnel_endpoint.to_string(),
    };
    msg.encode(peer).unwrap().into_bytes()
}

/// Decode a captured payload back into a typed message.
pub(super) fn decode(payload: &[u8]) -> Message {
    Message::decode(std::str::from_utf8(payload).unwrap()).unwrap()
}

/// Drive the discovery handshake both ways so `a` and `b` know each
/// other's control addresses and `a` sees `b` as mutual.
pub(super) async fn make_acquainted(a: &TestNode, b: &TestNode) {
    a.node.send_hello(IFACE).await.unwrap();
    let (_, _, hello) = a.transport.take_multicast().pop().unwrap();

    b.node.handle_payload(&hello, IFACE).await.unwrap();
    let (dest, confirm) = b.sent_unicast().unwrap();
    assert_eq!(dest, a.node.identity().control_address(IFACE).unwrap());

    a.node.handle_payload(&confirm, IFACE).await.unwrap();
    assert!(a.sent_unicast().is_none());
}
