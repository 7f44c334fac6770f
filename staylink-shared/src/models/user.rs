use serde::{Deserialize, Serialize};

/// Display data for a conversation participant.
///
/// The marketplace application owns the full user documents; the messaging
/// core only carries the fields conversation lists need to render.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    /// Unique identifier for the user.
    #[serde(rename = "_id")]
    pub id: String,

    /// Display name, when the projection has one for this user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UserSummary {
    /// Summary with no resolved display data.
    #[must_use]
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Response shape for the marketplace `GET /me` endpoint.
///
/// `id` is the marketplace-local user id, not the external auth provider id;
/// the REST layer bridges the two before the socket identifies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeResponse {
    pub user: UserSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_summary_serialization_uses_underscore_id() {
        let user = UserSummary {
            id: "u1".into(),
            name: Some("Avery".into()),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("\"_id\":\"u1\""));
        assert!(json.contains("\"name\":\"Avery\""));
    }

    #[test]
    fn test_bare_summary_omits_name() {
        let user = UserSummary::bare("u2");
        let json = serde_json::to_string(&user).unwrap();

        assert_eq!(json, "{\"_id\":\"u2\"}");
    }
}
