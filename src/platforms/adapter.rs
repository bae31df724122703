use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::PlatformKind;

/// Result of one send attempt.
///
/// Ordinary rejections by the platform come back as `success: false` with an
/// error text; `Err` is reserved for transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendOutcome {
    pub success: bool,
    pub external_id: Option<String>,
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn delivered(external_id: Option<String>) -> Self {
        Self {
            success: true,
            external_id,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            error: Some(error.into()),
        }
    }
}

/// One external messaging platform, bound to a single integration's credentials.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> PlatformKind;

    /// Sends `content` to the conversation identified by `conversation_external_id`.
    async fn send(&self, conversation_external_id: &str, content: &str) -> AppResult<SendOutcome>;
}
