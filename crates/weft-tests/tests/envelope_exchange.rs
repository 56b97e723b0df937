//! Envelope exchange tests: tell, request/reply, unknown bodies, and
//! bounded random broadcast.

use std::time::Duration;

use weft_proto::Body;
use weft_tests::{init_tracing, Ping, Pong, TestNetwork, TestNode};

#[tokio::test]
async fn test_tell_reaches_registered_handler() {
    init_tracing();

    let server = TestNode::start().await.unwrap();
    let sender = TestNode::start().await.unwrap();

    let client = sender.network.dial(&server.address()).await.unwrap();
    client.tell(&Ping { nonce: 1 }).await.unwrap();

    assert!(
        server
            .inbox
            .wait_for(Ping::TYPE_URL, 1, Duration::from_secs(5))
            .await
    );
    assert_eq!(server.inbox.senders(), vec![sender.id()]);
}

#[tokio::test]
async fn test_request_round_trips_through_echo_handler() {
    init_tracing();

    let server = TestNode::start().await.unwrap();
    let caller = TestNode::start().await.unwrap();

    let client = caller.network.dial(&server.address()).await.unwrap();
    let reply = client
        .request(&Ping { nonce: 42 }, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(reply.type_url, Pong::TYPE_URL);
    let pong: Pong = reply.decode_as().unwrap();
    assert_eq!(pong.nonce, 42);
}

#[tokio::test]
async fn test_concurrent_requests_on_independent_streams() {
    init_tracing();

    let server = TestNode::start().await.unwrap();
    let caller = TestNode::start().await.unwrap();
    let client = caller.network.dial(&server.address()).await.unwrap();

    let mut tasks = Vec::new();
    for nonce in 0..8u64 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            client
                .request(&Ping { nonce }, Duration::from_secs(5))
                .await
        }));
    }

    for (nonce, task) in tasks.into_iter().enumerate() {
        let reply = task.await.unwrap().unwrap();
        let pong: Pong = reply.decode_as().unwrap();
        assert_eq!(pong.nonce, nonce as u64);
    }
}

#[tokio::test]
async fn test_unknown_body_type_is_discarded_not_fatal() {
    init_tracing();

    let server = TestNode::start().await.unwrap();
    let sender = TestNode::start().await.unwrap();

    let client = sender.network.dial(&server.address()).await.unwrap();
    // No handler is registered for Pong; the node logs and carries on.
    client.tell(&Pong { nonce: 9 }).await.unwrap();
    client.tell(&Ping { nonce: 10 }).await.unwrap();

    assert!(
        server
            .inbox
            .wait_for(Ping::TYPE_URL, 1, Duration::from_secs(5))
            .await,
        "later messages still arrive"
    );
    assert_eq!(server.inbox.count_of(Pong::TYPE_URL), 0);
}

#[tokio::test]
async fn test_broadcast_reaches_all_peers() {
    init_tracing();

    let mut network = TestNetwork::new();
    let hub = network.add_node().await.unwrap();
    let mut members = Vec::new();
    for _ in 0..3 {
        let member = network.add_node().await.unwrap();
        hub.network.dial(&member.address()).await.unwrap();
        members.push(member);
    }

    hub.network.broadcast(&Ping { nonce: 5 }).await;

    for member in &members {
        assert!(
            member
                .inbox
                .wait_for(Ping::TYPE_URL, 1, Duration::from_secs(5))
                .await
        );
    }
}

#[tokio::test]
async fn test_broadcast_randomly_bounded_by_k() {
    init_tracing();

    let mut network = TestNetwork::new();
    let hub = network.add_node().await.unwrap();
    let mut members = Vec::new();
    for _ in 0..3 {
        let member = network.add_node().await.unwrap();
        hub.network.dial(&member.address()).await.unwrap();
        members.push(member);
    }

    hub.network.broadcast_randomly(&Ping { nonce: 7 }, 2).await;

    // All sends complete inline; wait for the recipients to record them.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let total = loop {
        let total: usize = members
            .iter()
            .map(|m| m.inbox.count_of(Ping::TYPE_URL))
            .sum();
        if total >= 2 || tokio::time::Instant::now() >= deadline {
            break total;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    let settled: usize = members
        .iter()
        .map(|m| m.inbox.count_of(Ping::TYPE_URL))
        .sum();

    assert_eq!(total, 2);
    assert_eq!(settled, 2, "no more than k peers hear a random broadcast");
}

#[tokio::test]
async fn test_reply_is_signed_by_the_responder() {
    init_tracing();

    let server = TestNode::start().await.unwrap();
    let caller = TestNode::start().await.unwrap();

    let client = caller.network.dial(&server.address()).await.unwrap();
    // request() verifies the reply envelope before returning, so a
    // successful round-trip is proof of a valid responder signature.
    let reply = client
        .request(&Ping { nonce: 3 }, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(reply.type_url, Pong::TYPE_URL);
}
