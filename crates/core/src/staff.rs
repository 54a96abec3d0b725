//! Staff user records as seen by the notification core.

use serde::{Deserialize, Serialize};

use crate::roles::Role;
use crate::types::DbId;

/// A staff member: either the actor of an operation or a notification
/// recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffUser {
    pub id: DbId,
    pub name: String,
    pub role: Role,
    /// Mobile number used by the SMS channel, if on file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl StaffUser {
    pub fn new(id: DbId, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            phone: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}
