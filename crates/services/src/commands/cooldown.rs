//! Per-user, per-command invocation spacing, held in memory.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domains::UserId;
use tracing::debug;

/// Table size past which expired windows are swept on the next acquire.
const PRUNE_AT: usize = 1024;

/// Maps each (user, command) key to the instant its window closes.
#[derive(Debug, Default)]
pub struct CooldownTable {
    ready_at: DashMap<(UserId, String), DateTime<Utc>>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically checks the window and, if it has passed, opens a new one
    /// ending at `now + cooldown`. Returns the remaining wait when still
    /// cooling down. Two concurrent callers for the same key cannot both pass.
    pub fn try_acquire(
        &self,
        user_id: UserId,
        command: &str,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), Duration> {
        // Must run before the entry guard below is taken.
        if self.ready_at.len() >= PRUNE_AT {
            self.prune(now);
        }

        let next = now.checked_add_signed(cooldown).unwrap_or(DateTime::<Utc>::MAX_UTC);
        match self.ready_at.entry((user_id, command.to_string())) {
            Entry::Occupied(mut slot) => {
                let ready_at = *slot.get();
                if now < ready_at {
                    return Err(ready_at - now);
                }
                slot.insert(next);
                Ok(())
            }
            Entry::Vacant(slot) => {
                slot.insert(next);
                Ok(())
            }
        }
    }

    /// Drops every key whose window has closed by `now`.
    pub fn prune(&self, now: DateTime<Utc>) {
        let before = self.ready_at.len();
        self.ready_at.retain(|_, ready_at| *ready_at > now);
        let removed = before.saturating_sub(self.ready_at.len());
        if removed > 0 {
            debug!(removed, remaining = self.ready_at.len(), "pruned cooldown windows");
        }
    }

    pub fn len(&self) -> usize {
        self.ready_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready_at.is_empty()
    }
}
