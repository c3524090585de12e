use std::sync::Arc;
use tokio::sync::mpsc;

use linkup_server::chat::{ChannelBroadcaster, ChannelKind, DEFAULT_MAX_CHANNEL_HISTORY};
use linkup_server::directory::{InMemoryDirectory, UserDirectory};
use linkup_server::events::ServerEvent;
use linkup_server::models::{Message, MessageKind, UserIdentity, GENERAL_CHANNEL};
use linkup_server::presence::ConnectionRegistry;

fn user(id: &str) -> UserIdentity {
    UserIdentity {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        bio: String::new(),
        avatar_ref: None,
    }
}

fn setup(max_history: usize) -> (Arc<ConnectionRegistry>, ChannelBroadcaster) {
    let directory: Arc<dyn UserDirectory> = Arc::new(InMemoryDirectory::new(vec![
        user("a"),
        user("b"),
        user("c"),
    ]));
    let registry = Arc::new(ConnectionRegistry::new(directory));
    let broadcaster = ChannelBroadcaster::new(registry.clone(), max_history);
    (registry, broadcaster)
}

/// Register a connection and subscribe it to `channel_id`.
async fn attach(
    registry: &ConnectionRegistry,
    broadcaster: &ChannelBroadcaster,
    connection_id: &str,
    user_id: &str,
    channel_id: &str,
) -> mpsc::UnboundedReceiver<ServerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    registry
        .register(connection_id, user_id, tx)
        .await
        .expect("register");
    broadcaster.subscribe(connection_id, channel_id);
    rx
}

fn drain_messages(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ServerEvent::Message { message } = event {
            out.push(message);
        }
    }
    out
}

#[tokio::test]
async fn test_history_bounded_and_oldest_evicted() {
    let (_registry, broadcaster) = setup(DEFAULT_MAX_CHANNEL_HISTORY);

    for i in 0..105 {
        broadcaster.publish(GENERAL_CHANNEL, "a", &format!("msg {i}"));
    }

    let history = broadcaster.recent_history(GENERAL_CHANNEL, 1000);
    assert_eq!(history.len(), 100);
    assert_eq!(history.first().unwrap().content, "msg 5");
    assert_eq!(history.last().unwrap().content, "msg 104");
    for (offset, message) in history.iter().enumerate() {
        assert_eq!(message.content, format!("msg {}", offset + 5));
    }
}

#[tokio::test]
async fn test_recent_history_returns_newest_oldest_first() {
    let (_registry, broadcaster) = setup(DEFAULT_MAX_CHANNEL_HISTORY);
    for i in 0..10 {
        broadcaster.publish("lobby", "a", &format!("{i}"));
    }

    let recent: Vec<String> = broadcaster
        .recent_history("lobby", 3)
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(recent, vec!["7", "8", "9"]);

    assert!(broadcaster.recent_history("nowhere", 10).is_empty());
}

#[tokio::test]
async fn test_general_message_reaches_every_subscriber_once() {
    let (registry, broadcaster) = setup(DEFAULT_MAX_CHANNEL_HISTORY);
    let mut rx_a = attach(&registry, &broadcaster, "ca", "a", GENERAL_CHANNEL).await;
    let mut rx_b = attach(&registry, &broadcaster, "cb", "b", GENERAL_CHANNEL).await;
    let mut rx_c = attach(&registry, &broadcaster, "cc", "c", GENERAL_CHANNEL).await;

    let sent = broadcaster.publish(GENERAL_CHANNEL, "a", "hi");

    for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
        let received = drain_messages(rx);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], sent);
    }
    let history = broadcaster.recent_history(GENERAL_CHANNEL, 50);
    assert_eq!(history.last().unwrap().id, sent.id);
    assert_eq!(sent.author_user_id.as_deref(), Some("a"));
    assert_eq!(sent.kind, MessageKind::User);
}

#[tokio::test]
async fn test_room_message_stays_in_room() {
    let (registry, broadcaster) = setup(DEFAULT_MAX_CHANNEL_HISTORY);
    let mut rx_a = attach(&registry, &broadcaster, "ca", "a", "lobby").await;
    let mut rx_b = attach(&registry, &broadcaster, "cb", "b", GENERAL_CHANNEL).await;

    broadcaster.publish("lobby", "a", "room only");

    assert_eq!(drain_messages(&mut rx_a).len(), 1);
    assert!(drain_messages(&mut rx_b).is_empty());
    assert!(broadcaster.recent_history(GENERAL_CHANNEL, 50).is_empty());
}

#[tokio::test]
async fn test_unsubscribed_connection_stops_receiving() {
    let (registry, broadcaster) = setup(DEFAULT_MAX_CHANNEL_HISTORY);
    let mut rx = attach(&registry, &broadcaster, "ca", "a", "lobby").await;

    broadcaster.unsubscribe("ca", "lobby");
    assert!(!broadcaster.is_subscribed("ca", "lobby"));
    broadcaster.publish("lobby", "b", "after leave");

    assert!(drain_messages(&mut rx).is_empty());
    assert_eq!(broadcaster.recent_history("lobby", 10).len(), 1);
}

#[tokio::test]
async fn test_dead_subscribers_pruned_on_publish() {
    let (registry, broadcaster) = setup(DEFAULT_MAX_CHANNEL_HISTORY);
    let _rx = attach(&registry, &broadcaster, "ca", "a", "lobby").await;
    registry.unregister("ca");

    broadcaster.publish("lobby", "b", "anyone?");
    assert!(!broadcaster.is_subscribed("ca", "lobby"));
}

#[tokio::test]
async fn test_system_message_has_no_author() {
    let (registry, broadcaster) = setup(DEFAULT_MAX_CHANNEL_HISTORY);
    let mut rx = attach(&registry, &broadcaster, "ca", "a", GENERAL_CHANNEL).await;

    let notice = broadcaster.broadcast_system(GENERAL_CHANNEL, "A joined the chat");
    assert_eq!(notice.kind, MessageKind::System);
    assert!(notice.author_user_id.is_none());
    assert_eq!(drain_messages(&mut rx), vec![notice]);
}

#[tokio::test]
async fn test_channels_created_on_demand() {
    let (_registry, broadcaster) = setup(DEFAULT_MAX_CHANNEL_HISTORY);
    assert_eq!(broadcaster.stats().len(), 1, "general exists from the start");

    let summary = broadcaster.ensure_channel("lobby");
    assert_eq!(summary.kind, ChannelKind::Room);
    assert_eq!(summary.messages, 0);
    broadcaster.ensure_channel("lobby");

    let ids: Vec<String> = broadcaster.stats().into_iter().map(|s| s.channel_id).collect();
    assert_eq!(ids, vec!["general", "lobby"]);
}

#[tokio::test]
async fn test_room_dropped_when_last_subscriber_leaves() {
    let (registry, broadcaster) = setup(DEFAULT_MAX_CHANNEL_HISTORY);
    let _rx_a = attach(&registry, &broadcaster, "ca", "a", "lobby").await;
    let _rx_b = attach(&registry, &broadcaster, "cb", "b", "lobby").await;
    broadcaster.publish("lobby", "a", "hello");

    broadcaster.unsubscribe("ca", "lobby");
    assert_eq!(
        broadcaster.recent_history("lobby", 10).len(),
        1,
        "room kept while b is still in it"
    );

    broadcaster.unsubscribe("cb", "lobby");
    assert!(broadcaster.recent_history("lobby", 10).is_empty());
    let ids: Vec<String> = broadcaster.stats().into_iter().map(|s| s.channel_id).collect();
    assert_eq!(ids, vec!["general"]);
}

#[tokio::test]
async fn test_general_survives_without_subscribers() {
    let (registry, broadcaster) = setup(DEFAULT_MAX_CHANNEL_HISTORY);
    let _rx = attach(&registry, &broadcaster, "ca", "a", GENERAL_CHANNEL).await;
    broadcaster.publish(GENERAL_CHANNEL, "a", "still here");

    broadcaster.unsubscribe("ca", GENERAL_CHANNEL);
    assert_eq!(broadcaster.recent_history(GENERAL_CHANNEL, 10).len(), 1);
}

#[tokio::test]
async fn test_concurrent_publishers_deliver_in_history_order() {
    let (registry, broadcaster) = setup(1000);
    let broadcaster = Arc::new(broadcaster);
    let mut rx_a = attach(&registry, &broadcaster, "ca", "a", GENERAL_CHANNEL).await;
    let mut rx_b = attach(&registry, &broadcaster, "cb", "b", GENERAL_CHANNEL).await;

    let mut handles = Vec::new();
    for author in ["a", "b", "c", "a"] {
        let broadcaster = broadcaster.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..50 {
                broadcaster.publish(GENERAL_CHANNEL, author, &format!("{author}-{i}"));
            }
        }));
    }
    for handle in handles {
        handle.join().expect("publisher thread panicked");
    }

    let history_ids: Vec<String> = broadcaster
        .recent_history(GENERAL_CHANNEL, 1000)
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(history_ids.len(), 200);

    for rx in [&mut rx_a, &mut rx_b] {
        let received: Vec<String> = drain_messages(rx).into_iter().map(|m| m.id).collect();
        assert_eq!(received, history_ids);
    }
}
