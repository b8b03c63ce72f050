//! Pre-configured test data fixtures.
//!
//! Provides:
//! - Identities that pass the service's format check
//! - `TestMeeting` builder for `POST /api/v1/meetings` bodies
//! - `join_body` for `POST /api/v1/meetings/{id}/join` bodies

use serde_json::{json, Value};
use uuid::Uuid;

/// Host identity used by most fixtures.
pub const HOST: &str = "hostaaaaaaaaaaaaaaaaaaaa";
pub const ALICE: &str = "aliceaaaaaaaaaaaaaaaaaaa";
pub const BOB: &str = "bobaaaaaaaaaaaaaaaaaaaaa";
pub const CAROL: &str = "carolaaaaaaaaaaaaaaaaaaa";

/// A fresh valid identity (32 hex characters).
#[must_use]
pub fn random_identity() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Test meeting fixture.
#[derive(Debug, Clone)]
pub struct TestMeeting {
    /// Creator (becomes host).
    pub creator_identity: String,
    pub title: String,
    pub description: Option<String>,
    pub max_participants: Option<u32>,
    pub allow_chat: Option<bool>,
    pub allow_screen_share: Option<bool>,
    pub password: Option<String>,
}

impl TestMeeting {
    /// Create a meeting fixture hosted by `creator_identity`.
    #[must_use]
    pub fn new(creator_identity: impl Into<String>) -> Self {
        Self {
            creator_identity: creator_identity.into(),
            title: "Test Meeting".to_string(),
            description: None,
            max_participants: None,
            allow_chat: None,
            allow_screen_share: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the maximum participants.
    #[must_use]
    pub fn with_max_participants(mut self, max: u32) -> Self {
        self.max_participants = Some(max);
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn without_chat(mut self) -> Self {
        self.allow_chat = Some(false);
        self
    }

    #[must_use]
    pub fn without_screen_share(mut self) -> Self {
        self.allow_screen_share = Some(false);
        self
    }

    /// JSON request body.
    #[must_use]
    pub fn to_body(&self) -> Value {
        let mut settings = serde_json::Map::new();
        if let Some(max) = self.max_participants {
            settings.insert("maxParticipants".to_string(), json!(max));
        }
        if let Some(allow) = self.allow_chat {
            settings.insert("allowChat".to_string(), json!(allow));
        }
        if let Some(allow) = self.allow_screen_share {
            settings.insert("allowScreenShare".to_string(), json!(allow));
        }

        let mut body = json!({
            "title": self.title,
            "creatorIdentity": self.creator_identity,
            "settings": settings,
        });
        if let Some(description) = &self.description {
            body["description"] = json!(description);
        }
        if let Some(password) = &self.password {
            body["password"] = json!(password);
        }
        body
    }
}

/// JSON body for a join request.
#[must_use]
pub fn join_body(identity: &str, display_name: &str, password: Option<&str>) -> Value {
    let mut body = json!({
        "identity": identity,
        "displayName": display_name,
        "email": format!("{display_name}@example.com").to_lowercase(),
    });
    if let Some(password) = password {
        body["password"] = json!(password);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use meet_service::identity;

    #[test]
    fn test_fixture_identities_are_valid() {
        for id in [HOST, ALICE, BOB, CAROL] {
            assert!(identity::validate(id), "{id} should be valid");
        }
        assert!(identity::validate(&random_identity()));
    }

    #[test]
    fn test_meeting_body_includes_only_set_fields() {
        let body = TestMeeting::new(HOST).to_body();
        assert_eq!(body["creatorIdentity"], HOST);
        assert!(body.get("password").is_none());
        assert_eq!(body["settings"], json!({}));

        let body = TestMeeting::new(HOST)
            .with_max_participants(2)
            .with_password("secret")
            .without_chat()
            .to_body();
        assert_eq!(body["settings"]["maxParticipants"], 2);
        assert_eq!(body["settings"]["allowChat"], false);
        assert_eq!(body["password"], "secret");
    }
}
