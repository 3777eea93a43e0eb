//! Which chat room is on screen, and whether the app is in the foreground.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct ViewingInner {
    /// Mounted rooms in mount order, each tagged with its guard's generation
    mounted: Vec<(u64, String)>,
    foreground: bool,
    next_generation: u64,
}

impl ViewingInner {
    fn top(&self) -> Option<String> {
        self.mounted.last().map(|(_, room)| room.clone())
    }
}

/// Shared viewing state. Cloning shares the same underlying state.
#[derive(Debug, Clone)]
pub struct ViewingState {
    inner: Arc<Mutex<ViewingInner>>,
}

impl Default for ViewingState {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewingState {
    /// Nothing open, app in the foreground
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ViewingInner {
                mounted: Vec::new(),
                foreground: true,
                next_generation: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `room_id` as on screen until the returned guard is dropped
    #[must_use]
    pub fn enter(&self, room_id: &str) -> ViewingGuard {
        let mut inner = self.lock();
        inner.next_generation += 1;
        let generation = inner.next_generation;
        inner.mounted.push((generation, room_id.to_string()));
        ViewingGuard {
            state: self.clone(),
            generation,
        }
    }

    /// The room on screen, counted only while the app is in the foreground
    #[must_use]
    pub fn open_room(&self) -> Option<String> {
        let inner = self.lock();
        if inner.foreground {
            inner.top()
        } else {
            None
        }
    }

    /// The mounted room regardless of foreground state
    #[must_use]
    pub fn mounted_room(&self) -> Option<String> {
        self.lock().top()
    }

    /// True if `room_id` is mounted and the app is in the foreground
    #[must_use]
    pub fn is_viewing(&self, room_id: &str) -> bool {
        self.open_room().as_deref() == Some(room_id)
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.lock().foreground = foreground;
    }

    #[must_use]
    pub fn is_foreground(&self) -> bool {
        self.lock().foreground
    }
}

/// Unmounts its room on drop. The most recent room still mounted becomes
/// the open one.
#[derive(Debug)]
pub struct ViewingGuard {
    state: ViewingState,
    generation: u64,
}

impl Drop for ViewingGuard {
    fn drop(&mut self) {
        let mut inner = self.state.lock();
        inner.mounted.retain(|(generation, _)| *generation != self.generation);
    }
}
