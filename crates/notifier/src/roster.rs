//! Staff roster lookups for incoming events.

use std::collections::HashMap;

use carelink_core::staff::StaffUser;
use carelink_core::types::DbId;
use carelink_events::HealthEvent;

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("actor {0} is not on the staff roster")]
    UnknownActor(DbId),
}

/// The loaded staff list, indexed by id.
pub struct Roster {
    users: Vec<StaffUser>,
    by_id: HashMap<DbId, usize>,
}

impl Roster {
    /// Index the roster. A repeated id keeps its first entry.
    pub fn new(roster: Vec<StaffUser>) -> Self {
        let mut users = Vec::with_capacity(roster.len());
        let mut by_id = HashMap::with_capacity(roster.len());
        for user in roster {
            if by_id.contains_key(&user.id) {
                tracing::warn!(user_id = user.id, "Duplicate staff id in roster, ignoring");
                continue;
            }
            by_id.insert(user.id, users.len());
            users.push(user);
        }
        Self { users, by_id }
    }

    pub fn users(&self) -> &[StaffUser] {
        &self.users
    }

    pub fn get(&self, id: DbId) -> Option<&StaffUser> {
        self.by_id.get(&id).map(|&i| &self.users[i])
    }

    /// Replace the event's actor with the roster record of the same id.
    ///
    /// Name, role and phone from the event are not trusted.
    pub fn resolve(&self, mut event: HealthEvent) -> Result<HealthEvent, RosterError> {
        let known = self
            .get(event.actor.id)
            .ok_or(RosterError::UnknownActor(event.actor.id))?;
        if known.role != event.actor.role {
            tracing::warn!(
                actor_id = known.id,
                claimed_role = %event.actor.role,
                roster_role = %known.role,
                "Event actor role differs from roster, using roster"
            );
        }
        event.actor = known.clone();
        Ok(event)
    }
}
