use serde::{Deserialize, Serialize};

use super::id::UserId;

/// Authenticated user snapshot, resolved from a verified bearer token.
///
/// Calls store these snapshots instead of user references: the chat
/// application owns the user records, this service only relays what the
/// token carried at the moment the call was touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl Identity {
    /// The short form used in payloads that only need to say who acted.
    #[must_use]
    pub fn brief(&self) -> ActorBrief {
        ActorBrief {
            username: self.username.clone(),
            name: self.name.clone(),
        }
    }
}

/// Minimal who-did-it payload for rejection notices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorBrief {
    pub username: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brief_carries_display_fields() {
        let identity = Identity {
            id: UserId::from_string("u1".to_string()),
            username: "ada".to_string(),
            name: "Ada Lovelace".to_string(),
            picture: None,
        };

        let brief = identity.brief();
        assert_eq!(brief.username, "ada");
        assert_eq!(brief.name, "Ada Lovelace");
    }

    #[test]
    fn test_picture_omitted_when_absent() {
        let identity = Identity {
            id: UserId::from_string("u1".to_string()),
            username: "ada".to_string(),
            name: "Ada Lovelace".to_string(),
            picture: None,
        };

        let json = serde_json::to_value(&identity).unwrap();
        assert!(json.get("picture").is_none());
    }
}
