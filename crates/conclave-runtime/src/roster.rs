//! The fixed set of roles taking part in one session.

use conclave_core::Role;
use serde::Serialize;

/// Id given to the built-in moderator.
pub const DEFAULT_MODERATOR_ID: &str = "moderator";

/// The built-in secretary/moderator role.
pub fn default_moderator() -> Role {
    Role::new(DEFAULT_MODERATOR_ID, "Meeting Secretary", "AI Secretary").with_persona(
        "You are the meeting secretary. You open and close the meeting, keep time, and \
         produce an accurate, balanced summary of what was decided.",
    )
}

/// Roles of a session, moderator first.
#[derive(Clone, Debug, Serialize)]
pub struct Roster {
    roles: Vec<Role>,
    #[serde(rename = "moderatorId")]
    moderator_id: String,
}

impl Roster {
    /// Build a roster from a moderator and the participants, in order.
    ///
    /// The moderator is always treated as active.
    pub fn new(mut moderator: Role, participants: Vec<Role>) -> Self {
        moderator.active = true;
        let moderator_id = moderator.id.clone();
        let mut roles = Vec::with_capacity(participants.len() + 1);
        roles.push(moderator);
        roles.extend(participants);
        Self {
            roles,
            moderator_id,
        }
    }

    /// The moderator role.
    pub fn moderator(&self) -> &Role {
        &self.roles[0]
    }

    /// Whether `id` is the moderator.
    pub fn is_moderator(&self, id: &str) -> bool {
        self.moderator_id == id
    }

    /// Role by id.
    pub fn get(&self, id: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    /// Every role, moderator first.
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Active roles other than the moderator, in roster order.
    pub fn active_participants(&self) -> impl Iterator<Item = &Role> {
        self.roles[1..].iter().filter(|r| r.active)
    }

    /// Ids accepted as transcript speakers.
    pub fn speaker_ids(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|r| r.id.as_str())
    }
}
