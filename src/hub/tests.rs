// src/hub/tests.rs
use super::*;
use tokio::sync::mpsc::error::TryRecvError;

const DRAW: &str = r#"{"method":"draw","params":{"x":0,"y":0,"w":1,"h":1,"p":"0"}}"#;

fn hub() -> HubHandle {
    Hub::spawn(HubConfig::default())
}

#[tokio::test]
async fn test_broadcast_reaches_every_client_once() {
    let hub = hub();
    let mut receivers = Vec::new();
    for n in 0..3 {
        let (client, receiver) = Client::new(format!("client-{}", n), 8);
        hub.register(client).await.unwrap();
        receivers.push(receiver);
    }

    hub.broadcast(DRAW, None).await.unwrap();
    assert_eq!(hub.client_count().await.unwrap(), 3);

    for receiver in &mut receivers {
        assert_eq!(receiver.queue.try_recv().unwrap().as_ref(), DRAW);
        assert!(matches!(receiver.queue.try_recv(), Err(TryRecvError::Empty)));
    }
}

#[tokio::test]
async fn test_broadcast_preserves_order_per_client() {
    let hub = hub();
    let (client, mut receiver) = Client::new("ordered", 8);
    hub.register(client).await.unwrap();

    for n in 0..5 {
        hub.broadcast(n.to_string(), None).await.unwrap();
    }
    hub.client_count().await.unwrap();

    for n in 0..5 {
        assert_eq!(receiver.queue.try_recv().unwrap().as_ref(), n.to_string());
    }
}

#[tokio::test]
async fn test_broadcast_skips_origin() {
    let hub = hub();
    let (sender, mut sender_rx) = Client::new("sender", 8);
    let (peer, mut peer_rx) = Client::new("peer", 8);
    let sender_id = sender.id();
    hub.register(sender).await.unwrap();
    hub.register(peer).await.unwrap();

    hub.broadcast(DRAW, Some(sender_id)).await.unwrap();
    hub.client_count().await.unwrap();

    assert!(matches!(sender_rx.queue.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(peer_rx.queue.try_recv().unwrap().as_ref(), DRAW);
}

#[tokio::test]
async fn test_full_queue_evicts_slow_client() {
    let hub = hub();
    let capacity = 3;
    let (slow, mut slow_rx) = Client::new("slow", capacity);
    let (fast, mut fast_rx) = Client::new("fast", 16);
    hub.register(slow).await.unwrap();
    hub.register(fast).await.unwrap();

    for n in 0..=capacity {
        hub.broadcast(n.to_string(), None).await.unwrap();
    }
    assert_eq!(hub.client_count().await.unwrap(), 1);
    assert_eq!(*slow_rx.closed.borrow(), Some(CloseReason::SlowConsumer));

    // Whatever fit before the overflow is still readable, then the queue is closed
    for n in 0..capacity {
        assert_eq!(slow_rx.queue.try_recv().unwrap().as_ref(), n.to_string());
    }
    assert!(matches!(slow_rx.queue.try_recv(), Err(TryRecvError::Disconnected)));

    // Later broadcasts only reach the remaining client
    hub.broadcast("after", None).await.unwrap();
    hub.client_count().await.unwrap();
    assert!(matches!(slow_rx.queue.try_recv(), Err(TryRecvError::Disconnected)));

    for n in 0..=capacity {
        assert_eq!(fast_rx.queue.try_recv().unwrap().as_ref(), n.to_string());
    }
    assert_eq!(fast_rx.queue.try_recv().unwrap().as_ref(), "after");
}

#[tokio::test]
async fn test_unregister_is_idempotent() {
    let hub = hub();
    let (client, mut receiver) = Client::new("twice", 4);
    let id = client.id();
    hub.register(client).await.unwrap();

    hub.unregister(id).await.unwrap();
    hub.unregister(id).await.unwrap();
    assert_eq!(hub.client_count().await.unwrap(), 0);

    assert_eq!(*receiver.closed.borrow(), Some(CloseReason::Normal));
    assert!(matches!(receiver.queue.try_recv(), Err(TryRecvError::Disconnected)));
}

#[tokio::test]
async fn test_client_with_dropped_receiver_is_removed() {
    let hub = hub();
    let (client, receiver) = Client::new("gone", 4);
    hub.register(client).await.unwrap();
    drop(receiver);

    hub.broadcast(DRAW, None).await.unwrap();
    assert_eq!(hub.client_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_shutdown_closes_all_clients() {
    let hub = hub();
    let (a, a_rx) = Client::new("a", 4);
    let (b, b_rx) = Client::new("b", 4);
    hub.register(a).await.unwrap();
    hub.register(b).await.unwrap();

    hub.shutdown().await.unwrap();

    assert_eq!(hub.client_count().await.unwrap(), 0);
    assert_eq!(*a_rx.closed.borrow(), Some(CloseReason::GoingAway));
    assert_eq!(*b_rx.closed.borrow(), Some(CloseReason::GoingAway));
}

#[tokio::test]
async fn test_saturated_hub_drops_broadcast() {
    let (commands, _commands_rx) = mpsc::channel(1);
    let hub = HubHandle {
        commands,
        submit_timeout: Duration::from_millis(20),
    };

    // Nothing drains the queue, so the second submission times out
    hub.broadcast(DRAW, None).await.unwrap();
    assert_eq!(hub.broadcast(DRAW, None).await, Err(HubError::Saturated));
}

#[test]
fn test_client_ids_are_unique() {
    let (a, _a_rx) = Client::new("a", 1);
    let (b, _b_rx) = Client::new("b", 1);
    assert_ne!(a.id(), b.id());
    assert_eq!(a.label(), "a");
}
