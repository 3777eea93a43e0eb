//! Open room sessions: sending, snapshots and unread bookkeeping

use std::sync::Arc;
use std::time::Duration;

use market_chat::config::AppConfig;
use market_chat::notification::RecordingNotifier;
use market_chat::session::{RoomSession, UnreadState};
use market_chat::settings::LocalSettings;
use market_chat::{ChatError, ChatService, ChatStore, Database, ItemSummary, Message, OpenRoomRequest};

fn request() -> OpenRoomRequest {
    OpenRoomRequest {
        item: ItemSummary {
            id: "X123".to_string(),
            title: "Rice cooker".to_string(),
            image: None,
        },
        seller_id: "alice".to_string(),
        seller_name: "Alice".to_string(),
        buyer_id: "bob".to_string(),
        buyer_name: "Bob".to_string(),
    }
}

/// One device: a service over the shared store with its own settings and notifier
fn device(store: &Arc<dyn ChatStore>) -> (ChatService, Arc<RecordingNotifier>) {
    let config = AppConfig::default();
    let settings = Arc::new(LocalSettings::temporary().expect("Failed to open settings"));
    let notifier = Arc::new(RecordingNotifier::new());
    let service = ChatService::new(Arc::clone(store), settings, notifier.clone(), &config.notifications);
    (service, notifier)
}

fn shared_store() -> Arc<dyn ChatStore> {
    Arc::new(Database::open_in_memory().expect("Failed to open database"))
}

async fn snapshot(session: &mut RoomSession) -> Vec<Message> {
    tokio::time::timeout(Duration::from_secs(5), session.next_snapshot())
        .await
        .expect("Timed out waiting for snapshot")
        .expect("Message stream ended")
}

#[tokio::test]
async fn test_send_flips_read_flags() {
    let store = shared_store();
    let (buyer, _) = device(&store);

    let mut session = buyer.open_chat(&request(), "bob").await.expect("Failed to open chat");
    let message = session.send("hello").await.expect("Failed to send");

    assert_eq!(message.sender_id, "bob");
    assert_eq!(message.sender_name, "Bob");

    let room = session.room();
    assert_eq!(room.last_message, "hello");
    assert_eq!(room.last_message_sender.as_deref(), Some("bob"));
    assert!(room.buyer_read);
    assert!(!room.seller_read);
    assert_eq!(room.unread_count, 1);
}

#[tokio::test]
async fn test_unread_counter_resets_to_one() {
    let store = shared_store();
    let (service, _) = device(&store);
    let room = service.resolve_room(&request()).await.expect("Failed to resolve room");

    service.send_message(&room.id, "bob", "one").await.expect("send one");
    service.send_message(&room.id, "bob", "two").await.expect("send two");
    service.send_message(&room.id, "alice", "three").await.expect("send three");

    let room = store.room(&room.id).await.expect("load room").expect("room exists");
    assert_eq!(room.unread_count, 1);
    assert!(room.seller_read);
    assert!(!room.buyer_read);
    assert_eq!(room.last_message, "three");
}

#[tokio::test]
async fn test_messages_are_ordered_by_send_time() {
    let store = shared_store();
    let (service, _) = device(&store);
    let room = service.resolve_room(&request()).await.expect("Failed to resolve room");

    let texts: Vec<String> = (0..=5).map(|n| format!("message {n}")).collect();
    for (n, text) in texts.iter().enumerate() {
        let sender = if n % 2 == 0 { "bob" } else { "alice" };
        service.send_message(&room.id, sender, text).await.expect("Failed to send");
    }

    let mut session = service.enter_room(&room.id, "alice").await.expect("Failed to enter room");
    let messages = snapshot(&mut session).await;

    let received: Vec<String> = messages.iter().map(|m| m.text.clone()).collect();
    assert_eq!(received, texts);
    assert!(messages.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

#[tokio::test]
async fn test_open_room_marks_read_without_notifying() {
    let store = shared_store();
    let (seller, seller_notifier) = device(&store);
    let (buyer, _) = device(&store);

    let mut session = seller.open_chat(&request(), "alice").await.expect("Failed to open chat");
    assert!(snapshot(&mut session).await.is_empty());

    let room_id = session.room().id.clone();
    buyer.send_message(&room_id, "bob", "is it still available?").await.expect("Failed to send");

    let messages = snapshot(&mut session).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(session.state(), UnreadState::CaughtUp);

    // Suppressed as the room is on screen, but the in-room haptic still plays
    assert_eq!(seller_notifier.scheduled_count(), 0);
    assert_eq!(seller_notifier.vibration_count(), 1);

    let room = store.room(&room_id).await.expect("load room").expect("room exists");
    assert!(room.seller_read);
    assert_eq!(room.unread_count, 0);
}

#[tokio::test]
async fn test_backgrounded_room_notifies_and_stays_unread() {
    let store = shared_store();
    let (seller, seller_notifier) = device(&store);
    let (buyer, _) = device(&store);

    let mut session = seller.open_chat(&request(), "alice").await.expect("Failed to open chat");
    snapshot(&mut session).await;
    seller.viewing().set_foreground(false);

    let room_id = session.room().id.clone();
    buyer.send_message(&room_id, "bob", "hello").await.expect("Failed to send");
    snapshot(&mut session).await;

    assert!(!session.is_focused());
    assert_eq!(session.state(), UnreadState::HasUnread);
    assert_eq!(seller_notifier.vibration_count(), 0);

    let scheduled = seller_notifier.scheduled();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].content.title, "Rice cooker");
    assert_eq!(scheduled[0].content.body, "hello");

    let room = store.room(&room_id).await.expect("load room").expect("room exists");
    assert!(!room.seller_read);
}

#[tokio::test]
async fn test_own_messages_do_not_alert() {
    let store = shared_store();
    let (buyer, buyer_notifier) = device(&store);

    let mut session = buyer.open_chat(&request(), "bob").await.expect("Failed to open chat");
    snapshot(&mut session).await;

    session.send("hello").await.expect("Failed to send");
    let messages = snapshot(&mut session).await;

    assert_eq!(messages.len(), 1);
    assert_eq!(buyer_notifier.vibration_count(), 0);
    assert_eq!(buyer_notifier.scheduled_count(), 0);
}

#[tokio::test]
async fn test_closing_session_clears_open_room() {
    let store = shared_store();
    let (service, _) = device(&store);

    let session = service.open_chat(&request(), "bob").await.expect("Failed to open chat");
    assert_eq!(service.viewing().open_room().as_deref(), Some("X123_alice_bob"));

    session.close();
    assert_eq!(service.viewing().open_room(), None);
}

#[tokio::test]
async fn test_outsider_cannot_open_or_send() {
    let store = shared_store();
    let (service, _) = device(&store);
    let room = service.resolve_room(&request()).await.expect("Failed to resolve room");

    let opened = service.enter_room(&room.id, "mallory").await;
    assert!(matches!(opened, Err(ChatError::NotParticipant { .. })));

    let sent = service.send_message(&room.id, "mallory", "hi").await;
    assert!(matches!(sent, Err(ChatError::NotParticipant { .. })));
}

#[tokio::test]
async fn test_blank_message_is_rejected() {
    let store = shared_store();
    let (service, _) = device(&store);
    let room = service.resolve_room(&request()).await.expect("Failed to resolve room");

    let result = service.send_message(&room.id, "bob", "   ").await;

    assert!(matches!(result, Err(ChatError::InvalidInput(_))));
    assert!(store.messages(&room.id).await.expect("list messages").is_empty());
}
