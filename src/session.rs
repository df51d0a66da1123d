use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::ChannelToken;

/// One preview request's identity. Never mutated; a newer request supersedes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSession {
    pub session_id: String,
    pub version: u64,
    pub collaboration: bool,
    pub code_hash: String,
    /// RFC 3339, UTC.
    pub generated_at: String,
}

impl PreviewSession {
    pub fn new(
        session_id: Option<String>,
        version: u64,
        collaboration: bool,
        code_hash: impl Into<String>,
    ) -> Self {
        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_session_id);
        Self {
            session_id,
            version,
            collaboration,
            code_hash: code_hash.into(),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn token(&self, channel: &str) -> ChannelToken {
        ChannelToken::new(channel, self.session_id.clone())
    }

    pub fn supersedes(&self, other: &PreviewSession) -> bool {
        self.version > other.version
    }
}

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_missing_ids() {
        let a = PreviewSession::new(None, 1, false, "abc");
        let b = PreviewSession::new(Some("  ".into()), 1, false, "abc");
        assert_eq!(a.session_id.len(), 36);
        assert_ne!(a.session_id, b.session_id);

        let c = PreviewSession::new(Some("fixed".into()), 2, true, "abc");
        assert_eq!(c.session_id, "fixed");
        assert!(c.supersedes(&a));
        assert!(chrono::DateTime::parse_from_rfc3339(&c.generated_at).is_ok());
        assert_eq!(c.token("ch").session_id, "fixed");
    }
}
