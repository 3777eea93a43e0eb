use std::time::Duration;

use chrono::Utc;
use market_chat::models::{ChangeKind, NewMessage, NotificationSettings};
use market_chat::{ChatRoom, ChatStore, Database, ItemSummary, OpenRoomRequest, Role};
use tempfile::TempDir;

fn sample_room(item: &str, buyer: &str) -> ChatRoom {
    let request = OpenRoomRequest {
        item: ItemSummary {
            id: item.to_string(),
            title: "Rice cooker".to_string(),
            image: None,
        },
        seller_id: "alice".to_string(),
        seller_name: "Alice".to_string(),
        buyer_id: buyer.to_string(),
        buyer_name: "Buyer".to_string(),
    };
    let key = market_chat::resolve_room_key(item, "alice", buyer);
    // Backdated so any later send sorts as more recent
    ChatRoom::new(key, &request, Utc::now() - chrono::Duration::minutes(1))
}

fn new_message(sender: &str, text: &str) -> NewMessage {
    NewMessage {
        sender_id: sender.to_string(),
        sender_name: sender.to_string(),
        text: text.to_string(),
    }
}

#[test]
fn test_database_creation_and_initialization() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("nested").join("chat.db");
    let db_url = format!("sqlite://{}", db_path.display());

    let db = Database::new(&db_url).expect("Failed to create database");
    let _conn = db.get_connection().expect("Failed to get database connection");

    assert!(db_path.exists());
}

#[test]
fn test_rooms_persist_across_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_url = format!("sqlite:{}", temp_dir.path().join("chat.db").display());

    {
        let db = Database::new(&db_url).expect("Failed to create database");
        let room = sample_room("X123", "bob");
        db.insert_room_if_absent(&room).expect("Failed to insert room");
        db.insert_message(&room.id, &new_message("bob", "hello"))
            .expect("Failed to insert message");
    }

    let db = Database::new(&db_url).expect("Failed to reopen database");
    let room = db
        .get_room("X123_alice_bob")
        .expect("Failed to load room")
        .expect("Room should exist");

    assert_eq!(room.last_message, "hello");
    assert!(room.last_message_id.is_some());
    assert_eq!(db.get_messages(&room.id).expect("Failed to load messages").len(), 1);
}

#[test]
fn test_missing_room_is_reported() {
    let db = Database::open_in_memory().expect("Failed to open database");

    assert!(db.get_room("nope").expect("Failed to query").is_none());
    assert!(db.insert_message("nope", &new_message("bob", "hi")).is_err());
    assert!(db.update_read_state("nope", Role::Buyer).is_err());
}

#[test]
fn test_mark_read_clears_one_side() {
    let db = Database::open_in_memory().expect("Failed to open database");
    let room = sample_room("X123", "bob");
    db.insert_room_if_absent(&room).expect("Failed to insert room");
    db.insert_message(&room.id, &new_message("bob", "hello"))
        .expect("Failed to insert message");

    let room = db.update_read_state(&room.id, Role::Seller).expect("Failed to mark read");

    assert!(room.seller_read);
    assert!(room.buyer_read);
    assert_eq!(room.unread_count, 0);
}

#[tokio::test]
async fn test_rooms_for_user_and_unread_count() {
    let db = Database::open_in_memory().expect("Failed to open database");
    let with_bob = sample_room("X123", "bob");
    let with_carol = sample_room("X123", "carol");
    db.insert_room_if_absent(&with_bob).expect("insert bob room");
    db.insert_room_if_absent(&with_carol).expect("insert carol room");

    db.append_message(&with_carol.id, new_message("carol", "hi"))
        .await
        .expect("Failed to send");

    let rooms = db.rooms_for_user("alice").await.expect("Failed to list rooms");
    assert_eq!(rooms.len(), 2);
    // Most recently active first
    assert_eq!(rooms[0].id, with_carol.id);

    assert_eq!(db.unread_room_count("alice").await.expect("count"), 1);
    assert_eq!(db.unread_room_count("carol").await.expect("count"), 0);
    assert_eq!(db.rooms_for_user("bob").await.expect("list").len(), 1);
}

#[test]
fn test_reading_does_not_reorder_rooms() {
    let db = Database::open_in_memory().expect("Failed to open database");
    let older = sample_room("X", "bob");
    let newer = sample_room("Y", "bob");
    db.insert_room_if_absent(&older).expect("insert older room");
    db.insert_room_if_absent(&newer).expect("insert newer room");

    db.insert_message(&older.id, &new_message("bob", "first"))
        .expect("Failed to send");
    std::thread::sleep(Duration::from_millis(5));
    db.insert_message(&newer.id, &new_message("bob", "second"))
        .expect("Failed to send");

    let ids = |db: &Database| -> Vec<String> {
        db.get_rooms_for_user("alice")
            .expect("Failed to list rooms")
            .into_iter()
            .map(|room| room.id)
            .collect()
    };
    assert_eq!(ids(&db), vec!["Y_alice_bob", "X_alice_bob"]);

    std::thread::sleep(Duration::from_millis(5));
    db.update_read_state(&older.id, Role::Seller).expect("Failed to mark read");

    assert_eq!(ids(&db), vec!["Y_alice_bob", "X_alice_bob"]);
}

#[tokio::test]
async fn test_notification_settings_round_trip() {
    let db = Database::open_in_memory().expect("Failed to open database");
    assert_eq!(db.notification_settings("alice").await.expect("read settings"), None);

    let settings = NotificationSettings {
        chat: false,
        jobs: false,
        ..NotificationSettings::default()
    };
    db.save_notification_settings("alice", settings).await.expect("save");
    assert_eq!(db.notification_settings("alice").await.expect("read"), Some(settings));

    db.save_notification_settings("alice", NotificationSettings::default())
        .await
        .expect("overwrite");
    assert_eq!(
        db.notification_settings("alice").await.expect("read"),
        Some(NotificationSettings::default())
    );
}

#[tokio::test]
async fn test_message_subscription_delivers_snapshots() {
    let db = Database::open_in_memory().expect("Failed to open database");
    let room = sample_room("X123", "bob");
    db.insert_room_if_absent(&room).expect("Failed to insert room");

    let mut subscription = db.subscribe_messages(&room.id).expect("Failed to subscribe");
    let initial = tokio::time::timeout(Duration::from_secs(5), subscription.next())
        .await
        .expect("timed out")
        .expect("stream ended");
    assert!(initial.is_empty());

    db.append_message(&room.id, new_message("bob", "first")).await.expect("send");
    db.append_message(&room.id, new_message("alice", "second")).await.expect("send");

    let mut latest = Vec::new();
    while latest.len() < 2 {
        latest = tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .expect("timed out")
            .expect("stream ended");
    }
    let texts: Vec<&str> = latest.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);

    assert!(subscription.is_active());
    subscription.cancel();
}

#[tokio::test]
async fn test_room_subscription_reports_changes() {
    let db = Database::open_in_memory().expect("Failed to open database");
    let existing = sample_room("X123", "bob");
    db.insert_room_if_absent(&existing).expect("Failed to insert room");

    let mut subscription = db.subscribe_rooms("alice").expect("Failed to subscribe");
    let first = tokio::time::timeout(Duration::from_secs(5), subscription.next())
        .await
        .expect("timed out")
        .expect("stream ended");
    assert_eq!(first.kind, ChangeKind::Added);
    assert_eq!(first.room.id, existing.id);

    // Rooms of other users are filtered out
    db.insert_room_if_absent(&{
        let mut other = sample_room("Y456", "bob");
        other.id = "Y456_bob_carol".to_string();
        other.seller_id = "carol".to_string();
        other
    })
    .expect("Failed to insert other room");

    db.append_message(&existing.id, new_message("bob", "hello"))
        .await
        .expect("Failed to send");

    let change = tokio::time::timeout(Duration::from_secs(5), subscription.next())
        .await
        .expect("timed out")
        .expect("stream ended");
    assert_eq!(change.kind, ChangeKind::Modified);
    assert_eq!(change.room.last_message, "hello");
    assert!(!change.room.seller_read);
}

#[test]
fn test_subscribe_requires_runtime() {
    let db = Database::open_in_memory().expect("Failed to open database");
    assert!(db.subscribe_messages("X123_alice_bob").is_err());
}
