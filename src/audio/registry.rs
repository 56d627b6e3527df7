use serenity::model::id::GuildId;
use std::collections::HashMap;
use tracing::debug;

use super::session::GuildSession;

/// Guild id → session, owned by the runtime task.
///
/// At most one session per guild. Dormant sessions (Idle, empty, no voice)
/// are dropped as soon as the operation that created them gives up.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<GuildId, GuildSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, guild_id: GuildId) -> &mut GuildSession {
        self.sessions.entry(guild_id).or_insert_with(|| {
            debug!("🆕 Nueva sesión para guild {}", guild_id);
            GuildSession::new(guild_id)
        })
    }

    pub fn get(&self, guild_id: GuildId) -> Option<&GuildSession> {
        self.sessions.get(&guild_id)
    }

    pub fn get_mut(&mut self, guild_id: GuildId) -> Option<&mut GuildSession> {
        self.sessions.get_mut(&guild_id)
    }

    pub fn remove(&mut self, guild_id: GuildId) -> Option<GuildSession> {
        self.sessions.remove(&guild_id)
    }

    /// Drops the entry if nothing is left in it.
    pub fn discard_if_dormant(&mut self, guild_id: GuildId) {
        if self.sessions.get(&guild_id).is_some_and(GuildSession::is_dormant) {
            self.sessions.remove(&guild_id);
        }
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.sessions.keys().copied().collect()
    }
}
