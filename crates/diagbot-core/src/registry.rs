//! Conversation → session map shared by every worker.
//!
//! The map is split into shards, each behind its own mutex. A conversation
//! always hashes to the same shard, so operations on one conversation are
//! serialized while different conversations rarely contend. No lock is held
//! across an await point or any I/O.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;

use crate::model::{ConversationId, DiagnosticTest};
use crate::session::DiagnosisSession;

const DEFAULT_SHARDS: usize = 16;

type Shard = HashMap<ConversationId, DiagnosisSession>;

/// Live sessions keyed by conversation, at most one per conversation.
pub struct SessionRegistry {
    shards: Vec<Mutex<Shard>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(count: usize) -> Self {
        let count = count.max(1);
        Self {
            shards: (0..count).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, id: &ConversationId) -> MutexGuard<'_, Shard> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        // A panic can only interrupt `update`'s callback, and the session is
        // out of the map while it runs: the shard stays consistent and that
        // one conversation simply loses its session.
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the session bound to `id`, if any.
    pub fn get(&self, id: &ConversationId) -> Option<DiagnosisSession> {
        self.shard(id).get(id).cloned()
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.shard(id).contains_key(id)
    }

    /// Bind a fresh session for `test`, returning the one it replaced.
    pub fn start(
        &self,
        id: &ConversationId,
        test: Arc<DiagnosticTest>,
    ) -> Option<DiagnosisSession> {
        self.shard(id)
            .insert(id.clone(), DiagnosisSession::start(test))
    }

    pub fn remove(&self, id: &ConversationId) -> Option<DiagnosisSession> {
        self.shard(id).remove(id)
    }

    /// Atomically read and modify the slot for `id`.
    ///
    /// `f` sees `None` when the conversation has no session; setting the slot
    /// to `None` removes it. Nothing else can touch this conversation while
    /// `f` runs, so `f` must not block.
    pub fn update<R>(
        &self,
        id: &ConversationId,
        f: impl FnOnce(&mut Option<DiagnosisSession>) -> R,
    ) -> R {
        let mut shard = self.shard(id);
        let mut slot = shard.remove(id);
        let result = f(&mut slot);
        if let Some(session) = slot {
            shard.insert(id.clone(), session);
        }
        result
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop sessions with no activity for longer than `max_idle`.
    ///
    /// Returns the number of sessions removed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            return 0;
        };
        let cutoff = Utc::now() - max_idle;

        let mut evicted = 0;
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let before = shard.len();
            shard.retain(|id, session| {
                let keep = session.last_activity() >= cutoff;
                if !keep {
                    tracing::info!(conversation = %id, session = %session.id(), "evicting idle session");
                }
                keep
            });
            evicted += before - shard.len();
        }
        evicted
    }
}
