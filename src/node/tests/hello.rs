//! Discovery handshake scenarios.

use super::*;
use crate::neighbor::NeighborState;
use crate::protocol::ProtocolError;

const PEER_ADDR: &str = "10.1.1.2:8481";

#[tokio::test]
async fn test_unsolicited_hello_is_confirmed() {
    let node = make_node("a", "10.1.1.1:8481");
    let peer = Identity::generate();

    node.node
        .handle_payload(&hello_wire(&peer, PEER_ADDR, 7, false), IFACE)
        .await
        .unwrap();

    // Neighbor recorded with the advertised address and replay baseline.
    let neighbor = node.node.neighbors().lookup(&peer.public_key()).unwrap();
    assert_eq!(neighbor.state, NeighborState::Greeted);
    assert_eq!(neighbor.control_address, PEER_ADDR);
    assert_eq!(neighbor.last_accepted_seqnum, Some(7));

    // The confirmation goes to the peer's control address and carries our
    // own identity and interface address.
    let (dest, payload) = node.sent_unicast().unwrap();
    assert_eq!(dest, PEER_ADDR);

    let reply = match decode(&payload) {
        Message::Hello(h) => h,
        other => panic!("expected hello reply, got {:?}", other),
    };
    assert!(reply.metadata.confirm);
    assert_eq!(reply.metadata.source_public_key, node.key());
    assert_eq!(reply.metadata.seqnum, 1);
    assert_eq!(
        reply.control_address,
        node.node.identity().control_address(IFACE).unwrap()
    );
}

#[tokio::test]
async fn test_confirming_hello_gets_no_reply() {
    let node = make_node("a", "10.1.1.1:8481");
    let peer = Identity::generate();

    node.node
        .handle_payload(&hello_wire(&peer, PEER_ADDR, 3, true), IFACE)
        .await
        .unwrap();

    assert!(node.sent_unicast().is_none());
    let neighbor = node.node.neighbors().lookup(&peer.public_key()).unwrap();
    assert_eq!(neighbor.state, NeighborState::Mutual);
}

#[tokio::test]
async fn test_handshake_symmetry() {
    let a = make_node("a", "10.1.1.1:8481");
    let b = make_node("b", "10.1.1.2:8481");

    // A announces itself; B must confirm; A must not respond again.
    make_acquainted(&a, &b).await;

    let b_in_a = a.node.neighbors().lookup(&b.key()).unwrap();
    assert_eq!(b_in_a.state, NeighborState::Mutual);
    assert_eq!(b_in_a.control_address, "10.1.1.2:8481");

    let a_in_b = b.node.neighbors().lookup(&a.key()).unwrap();
    assert_eq!(a_in_b.state, NeighborState::Greeted);
    assert_eq!(a_in_b.control_address, "10.1.1.1:8481");
}

#[tokio::test]
async fn test_replayed_hello_is_dropped() {
    let node = make_node("a", "10.1.1.1:8481");
    let peer = Identity::generate();
    let wire = hello_wire(&peer, PEER_ADDR, 9, false);

    node.node.handle_payload(&wire, IFACE).await.unwrap();
    node.transport.take_unicast();

    let result = node.node.handle_payload(&wire, IFACE).await;
    assert!(matches!(
        result,
        Err(NodeError::Protocol(ProtocolError::ReplaySequenceNumber {
            got: 9,
            last: 9
        }))
    ));
    assert!(node.sent_unicast().is_none());
}

#[tokio::test]
async fn test_out_of_order_hello_is_dropped() {
    let node = make_node("a", "10.1.1.1:8481");
    let peer = Identity::generate();

    node.node
        .handle_payload(&hello_wire(&peer, PEER_ADDR, 5, false), IFACE)
        .await
        .unwrap();
    node.transport.take_unicast();

    let result = node.node
        .handle_payload(&hello_wire(&peer, PEER_ADDR, 3, false), IFACE)
        .await;
    assert!(matches!(
        result,
        Err(NodeError::Protocol(ProtocolError::ReplaySequenceNumber {
            got: 3,
            last: 5
        }))
    ));

    // Forward progress still works.
    node.node
        .handle_payload(&hello_wire(&peer, PEER_ADDR, 6, false), IFACE)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_first_contact_accepts_any_seqnum() {
    let node = make_node("a", "10.1.1.1:8481");
    let peer = Identity::generate();

    node.node
        .handle_payload(&hello_wire(&peer, PEER_ADDR, 0, false), IFACE)
        .await
        .unwrap();

    let neighbor = node.node.neighbors().lookup(&peer.public_key()).unwrap();
    assert_eq!(neighbor.last_accepted_seqnum, Some(0));
}

#[tokio::test]
async fn test_hello_refreshes_control_address() {
    let node = make_node("a", "10.1.1.1:8481");
    let peer = Identity::generate();

    node.node
        .handle_payload(&hello_wire(&peer, PEER_ADDR, 1, false), IFACE)
        .await
        .unwrap();
    node.transport.take_unicast();

    node.node
        .handle_payload(&hello_wire(&peer, "10.9.9.9:8481", 2, false), IFACE)
        .await
        .unwrap();

    let neighbor = node.node.neighbors().lookup(&peer.public_key()).unwrap();
    assert_eq!(neighbor.control_address, "10.9.9.9:8481");
}

#[tokio::test]
async fn test_unrecognized_message_type_is_dropped() {
    let node = make_node("a", "10.1.1.1:8481");

    let result = node.node
        .handle_payload(b"announce key addr 1 sig", IFACE)
        .await;
    assert!(matches!(
        result,
        Err(NodeError::Protocol(ProtocolError::UnrecognizedMessageType(_)))
    ));
    assert!(node.node.neighbors().is_empty());
}

#[tokio::test]
async fn test_tampered_hello_creates_no_neighbor() {
    let node = make_node("a", "10.1.1.1:8481");
    let peer = Identity::generate();

    let mut wire = hello_wire(&peer, PEER_ADDR, 1, false);
    let dot = wire.iter().position(|&b| b == b'.').unwrap();
    wire[dot] = b'9';

    let result = node.node.handle_payload(&wire, IFACE).await;
    assert!(matches!(
        result,
        Err(NodeError::Protocol(ProtocolError::SignatureInvalid))
    ));
    assert!(node.node.neighbors().is_empty());
    assert!(node.sent_unicast().is_none());
}

#[tokio::test]
async fn test_non_utf8_payload_is_dropped() {
    let node = make_node("a", "10.1.1.1:8481");

    let result = node.node.handle_payload(&[0xff, 0xfe, 0x20], IFACE).await;
    assert!(matches!(
        result,
        Err(NodeError::Protocol(ProtocolError::MalformedMessage(_)))
    ));
}

#[tokio::test]
async fn test_reply_fails_without_own_control_address() {
    // Node has no control address configured for the receiving interface;
    // the inbound hello is accepted but the confirmation cannot be built.
    let node = make_node_with(Identity::generate(), test_config("a"));
    let peer = Identity::generate();

    let result = node.node
        .handle_payload(&hello_wire(&peer, PEER_ADDR, 1, false), IFACE)
        .await;
    assert!(matches!(
        result,
        Err(NodeError::Protocol(ProtocolError::InvalidMessage(_)))
    ));

    // The accepted neighbor state is kept; only the send was aborted.
    let neighbor = node.node.neighbors().lookup(&peer.public_key()).unwrap();
    assert_eq!(neighbor.state, NeighborState::Greeted);
    assert!(node.sent_unicast().is_none());
}

#[tokio::test]
async fn test_send_hello_multicasts_discovery() {
    let node = make_node("a", "10.1.1.1:8481");

    node.node.send_hello(IFACE).await.unwrap();

    let mut sends = node.transport.take_multicast();
    let (interface, port, payload) = sends.pop().unwrap();
    assert!(sends.is_empty());
    assert_eq!(interface, IFACE);
    assert_eq!(port, 8481);

    let msg = match decode(&payload) {
        Message::Hello(h) => h,
        other => panic!("expected hello, got {:?}", other),
    };
    assert!(!msg.metadata.confirm);
    assert_eq!(msg.metadata.seqnum, 1);
    assert_eq!(msg.control_address, "10.1.1.1:8481");
}

#[tokio::test]
async fn test_send_hello_to_unicasts() {
    let node = make_node("a", "10.1.1.1:8481");

    node.node.send_hello_to(PEER_ADDR, IFACE).await.unwrap();

    let (dest, payload) = node.sent_unicast().unwrap();
    assert_eq!(dest, PEER_ADDR);
    let msg = match decode(&payload) {
        Message::Hello(h) => h,
        other => panic!("expected hello, got {:?}", other),
    };
    assert!(!msg.metadata.confirm);
}

#[tokio::test]
async fn test_each_send_claims_fresh_seqnum() {
    let node = make_node("a", "10.1.1.1:8481");

    node.node.send_hello(IFACE).await.unwrap();
    node.node.send_hello(IFACE).await.unwrap();

    let sends = node.transport.take_multicast();
    let seqs: Vec<u64> = sends
        .iter()
        .map(|(_, _, payload)| decode(payload).metadata().seqnum)
        .collect();
    assert_eq!(seqs, vec![1, 2]);
}

#[tokio::test]
async fn test_send_hello_without_control_address_fails() {
    let node = make_node_with(Identity::generate(), Config::new());

    let result = node.node.send_hello(IFACE).await;
    assert!(matches!(
        result,
        Err(NodeError::Protocol(ProtocolError::InvalidMessage(_)))
    ));
    assert!(node.transport.take_multicast().is_empty());
}

#[tokio::test]
async fn test_drain_consumes_queued_payloads() {
    let node = make_node("a", "10.1.1.1:8481");
    let peer = Identity::generate();

    let (tx, mut rx) = crate::transport::payload_channel(8);
    for seq in 1..=3u64 {
        tx.send(crate::transport::ReceivedPayload {
            data: hello_wire(&peer, PEER_ADDR, seq, true),
            interface: IFACE.to_string(),
        })
        .await
        .unwrap();
    }

    let handled = node.node.drain(&mut rx).await;
    assert_eq!(handled, 3);

    let neighbor = node.node.neighbors().lookup(&peer.public_key()).unwrap();
    assert_eq!(neighbor.last_accepted_seqnum, Some(3));
}
