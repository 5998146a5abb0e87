use std::time::Duration;

use tokio::time::timeout;

use super::*;
use crate::outbox::{self, Outgoing, OutboxReceiver};

const WAIT: Duration = Duration::from_secs(2);

fn user(name: &str) -> User {
    User { id: Uuid::new_v4(), name: name.into(), email: None, is_guest: false }
}

fn member(name: &str, capacity: usize) -> (Member, OutboxReceiver) {
    let (outbox, rx) = outbox::channel(capacity);
    (Member { conn_id: Uuid::new_v4(), user: user(name), outbox }, rx)
}

fn spawn_hub() -> (HubHandle, mpsc::UnboundedReceiver<HubExit>) {
    let (exits, exit_rx) = mpsc::unbounded_channel();
    (HubHandle::spawn(Uuid::new_v4(), 256, exits), exit_rx)
}

#[tokio::test]
async fn register_returns_users_present_before_join() {
    let (hub, _exits) = spawn_hub();
    let (alice, _a) = member("alice", 8);
    let (bob, _b) = member("bob", 8);

    assert!(hub.register(alice.clone()).await.unwrap().is_empty());
    let seen = hub.register(bob.clone()).await.unwrap();
    assert_eq!(seen, vec![alice.user.clone()]);

    let others = hub.downgrade().list_users(Some(bob.conn_id)).await;
    assert_eq!(others, vec![alice.user]);
}

#[tokio::test]
async fn broadcast_reaches_every_member_in_order() {
    let (hub, _exits) = spawn_hub();
    let (alice, mut a) = member("alice", 8);
    let (bob, mut b) = member("bob", 8);
    hub.register(alice).await.unwrap();
    hub.register(bob).await.unwrap();

    for text in ["one", "two", "three"] {
        assert!(hub.broadcast(Payload::from(text)).await);
    }

    for rx in [&mut a, &mut b] {
        for text in ["one", "two", "three"] {
            let next = timeout(WAIT, rx.next()).await.unwrap();
            assert_eq!(next, Outgoing::Frame(Payload::from(text)));
        }
    }
}

#[tokio::test]
async fn last_unregister_shuts_hub_down() {
    let (hub, mut exits) = spawn_hub();
    let (alice, mut a) = member("alice", 8);
    let conn_id = alice.conn_id;
    hub.register(alice.clone()).await.unwrap();

    hub.downgrade().unregister(conn_id).await;

    let exit = timeout(WAIT, exits.recv()).await.unwrap().unwrap();
    assert_eq!(exit, HubExit { board_id: hub.board_id(), instance: hub.instance() });
    assert!(hub.is_closed());
    assert_eq!(timeout(WAIT, a.next()).await.unwrap(), Outgoing::Close(None));
    assert!(hub.register(alice).await.is_none());
}

#[tokio::test]
async fn weak_ref_is_noop_after_exit() {
    let (hub, mut exits) = spawn_hub();
    let (alice, _a) = member("alice", 8);
    let conn_id = alice.conn_id;
    hub.register(alice).await.unwrap();
    let weak = hub.downgrade();
    weak.unregister(conn_id).await;
    timeout(WAIT, exits.recv()).await.unwrap().unwrap();
    drop(hub);

    weak.broadcast(Payload::from("late")).await;
    assert!(weak.list_users(None).await.is_empty());
}

#[tokio::test]
async fn slow_member_is_dropped_without_stalling_others() {
    let (hub, _exits) = spawn_hub();
    let (slow, mut slow_rx) = member("slow", 256);
    let (healthy, mut healthy_rx) = member("healthy", 512);
    hub.register(slow.clone()).await.unwrap();
    hub.register(healthy).await.unwrap();

    for i in 0..300 {
        assert!(hub.broadcast(Payload::from(i.to_string())).await);
    }

    for i in 0..300 {
        let next = timeout(WAIT, healthy_rx.next()).await.unwrap();
        assert_eq!(next, Outgoing::Frame(Payload::from(i.to_string())));
    }
    assert!(slow.outbox.is_closed());
    assert_eq!(timeout(WAIT, slow_rx.next()).await.unwrap(), Outgoing::Close(None));

    let users = hub.downgrade().list_users(None).await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "healthy");
}

#[tokio::test]
async fn dropping_last_member_for_backpressure_shuts_down() {
    let (hub, mut exits) = spawn_hub();
    let (slow, _slow_rx) = member("slow", 1);
    hub.register(slow).await.unwrap();

    hub.broadcast(Payload::from("a")).await;
    hub.broadcast(Payload::from("b")).await;

    let exit = timeout(WAIT, exits.recv()).await.unwrap().unwrap();
    assert_eq!(exit.instance, hub.instance());
}
