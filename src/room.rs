//! Chat room identity and get-or-create resolution.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::metrics::MetricsCollector;
use crate::models::{ChatRoom, OpenRoomRequest};
use crate::store::ChatStore;
use crate::validation::InputValidator;

/// Derive the canonical room key for an item and two participants.
///
/// The participant ids are ordered lexicographically, so the key is the same
/// whichever side starts the conversation.
#[must_use]
pub fn resolve_room_key(item_id: &str, user_a: &str, user_b: &str) -> String {
    let (low, high) = sorted_pair(user_a, user_b);
    format!("{item_id}_{low}_{high}")
}

fn sorted_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Resolves the single room for an (item, seller, buyer) triple
pub struct RoomResolver {
    store: Arc<dyn ChatStore>,
    metrics: MetricsCollector,
}

impl RoomResolver {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self {
            store,
            metrics: MetricsCollector,
        }
    }

    /// Fetch the room for `request`, creating it with no backlog if absent
    pub async fn get_or_create(&self, request: &OpenRoomRequest) -> Result<ChatRoom> {
        InputValidator::validate_id("item", &request.item.id)?;
        InputValidator::validate_participants(&request.seller_id, &request.buyer_id)?;

        let key = resolve_room_key(&request.item.id, &request.seller_id, &request.buyer_id);

        if let Some(room) = self.store.room(&key).await? {
            debug!(room_id = %key, "Chat room already exists");
            return self.check_identity(room, request);
        }

        let (room, created) = self
            .store
            .create_room_if_absent(ChatRoom::new(key, request, Utc::now()))
            .await?;

        if created {
            info!(room_id = %room.id, item_id = %room.item.id, "Created chat room");
            self.metrics.record_room_created();
            return Ok(room);
        }

        self.check_identity(room, request)
    }

    /// Ids may contain `_`, so two different triples can derive the same key
    fn check_identity(&self, room: ChatRoom, request: &OpenRoomRequest) -> Result<ChatRoom> {
        let stored = sorted_pair(&room.seller_id, &room.buyer_id);
        let wanted = sorted_pair(&request.seller_id, &request.buyer_id);
        let same = room.item.id == request.item.id && stored == wanted;

        if same {
            Ok(room)
        } else {
            warn!(room_id = %room.id, item_id = %request.item.id, "Room key collision");
            self.metrics.record_error("room", "get_or_create");
            Err(ChatError::RoomConflict(room.id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_sorts_participants() {
        assert_eq!(resolve_room_key("X123", "seller", "buyer"), "X123_buyer_seller");
        assert_eq!(resolve_room_key("X123", "buyer", "seller"), "X123_buyer_seller");
    }
}
