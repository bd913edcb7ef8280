//! Per-user build controller
//!
//! A user changing their selection while a build is in flight cancels that
//! build. Each selection gets a generation number; only the build holding the
//! newest generation may publish its result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::service::{RecommendationService, Selection};
use crate::error::{Error, Result};
use crate::models::Playlist;

/// What a subscriber currently sees for one user
#[derive(Debug, Clone)]
pub enum BuildState {
    Idle,
    Loading { generation: u64, selection: Selection },
    Ready { generation: u64, playlist: Arc<Playlist> },
}

impl BuildState {
    pub fn generation(&self) -> Option<u64> {
        match self {
            BuildState::Idle => None,
            BuildState::Loading { generation, .. } | BuildState::Ready { generation, .. } => {
                Some(*generation)
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, BuildState::Loading { .. })
    }
}

struct UserSlot {
    generation: u64,
    cancel: Option<CancellationToken>,
    state: watch::Sender<BuildState>,
}

impl UserSlot {
    fn new() -> Self {
        let (state, _) = watch::channel(BuildState::Idle);
        Self {
            generation: 0,
            cancel: None,
            state,
        }
    }
}

#[derive(Clone)]
pub struct PlaylistController {
    service: Arc<RecommendationService>,
    slots: Arc<Mutex<HashMap<String, UserSlot>>>,
}

impl PlaylistController {
    pub fn new(service: Arc<RecommendationService>) -> Self {
        Self {
            service,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn service(&self) -> &Arc<RecommendationService> {
        &self.service
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, UserSlot>> {
        // A poisoned map only means a panicking holder; the data is still usable
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, user_id: &str) -> watch::Receiver<BuildState> {
        self.lock_slots()
            .entry(user_id.to_string())
            .or_insert_with(UserSlot::new)
            .state
            .subscribe()
    }

    pub fn current(&self, user_id: &str) -> BuildState {
        self.lock_slots()
            .get(user_id)
            .map(|slot| slot.state.borrow().clone())
            .unwrap_or(BuildState::Idle)
    }

    /// Start a build for `selection`, cancelling any build in flight for the
    /// same user. Returns the new generation.
    pub fn select(&self, user_id: &str, selection: Selection, access_token: Option<String>) -> u64 {
        let cancel = CancellationToken::new();
        let (generation, sender) = {
            let mut slots = self.lock_slots();
            let slot = slots.entry(user_id.to_string()).or_insert_with(UserSlot::new);
            if let Some(previous) = slot.cancel.replace(cancel.clone()) {
                previous.cancel();
            }
            slot.generation += 1;
            slot.state.send_replace(BuildState::Loading {
                generation: slot.generation,
                selection,
            });
            (slot.generation, slot.state.clone())
        };

        let service = self.service.clone();
        let slots = self.slots.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            let result = service
                .build_playlist(&user_id, selection, access_token.as_deref(), &cancel)
                .await;

            let playlist = match result {
                Ok(playlist) => playlist,
                Err(Error::Cancelled) => {
                    debug!("Build {} for {} superseded", generation, user_id);
                    return;
                }
                Err(e) => {
                    warn!("Build {} for {} failed: {}", generation, user_id, e);
                    Playlist::default()
                }
            };

            // Publish only if no newer selection arrived meanwhile
            let mut slots = slots.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = slots.get_mut(&user_id) {
                if slot.generation == generation {
                    slot.cancel = None;
                    sender.send_replace(BuildState::Ready {
                        generation,
                        playlist: Arc::new(playlist),
                    });
                } else {
                    debug!("Dropping stale build {} for {}", generation, user_id);
                }
            }
        });

        generation
    }

    /// Select and wait for the result of this selection. Fails with
    /// [`Error::Cancelled`] if a newer selection supersedes it or the user's
    /// build is cancelled.
    pub async fn build(
        &self,
        user_id: &str,
        selection: Selection,
        access_token: Option<String>,
    ) -> Result<Arc<Playlist>> {
        let mut rx = self.subscribe(user_id);
        let generation = self.select(user_id, selection, access_token);

        loop {
            {
                let state = rx.borrow_and_update();
                match &*state {
                    BuildState::Ready { generation: g, playlist } if *g == generation => {
                        return Ok(playlist.clone());
                    }
                    // select() has already published Loading, so Idle means cancel()
                    BuildState::Idle => return Err(Error::Cancelled),
                    other if other.generation().map_or(false, |g| g > generation) => {
                        return Err(Error::Cancelled);
                    }
                    _ => {}
                }
            }
            if rx.changed().await.is_err() {
                return Err(Error::Cancelled);
            }
        }
    }

    /// Cancel whatever is in flight for the user
    pub fn cancel(&self, user_id: &str) {
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.get_mut(user_id) {
            if let Some(token) = slot.cancel.take() {
                token.cancel();
                slot.generation += 1;
                slot.state.send_replace(BuildState::Idle);
            }
        }
    }
}
