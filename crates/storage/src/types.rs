use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// Well-known key the logged-in user record is persisted under.
pub const SESSION_STATE_KEY: &str = "chat-app-user";

/// Persisted identity of the logged-in user.
///
/// Field names follow the backend's user document so the login response can be stored as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "avatarImage", default)]
    pub avatar_image: String,
    #[serde(rename = "isAvatarImageSet", default)]
    pub is_avatar_image_set: bool,
}

impl SessionRecord {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: String::new(),
            avatar_image: String::new(),
            is_avatar_image_set: false,
        }
    }

    pub fn with_avatar(mut self, avatar_image: impl Into<String>) -> Self {
        self.avatar_image = avatar_image.into();
        self.is_avatar_image_set = !self.avatar_image.is_empty();
        self
    }
}
