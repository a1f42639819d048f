use serde_json::json;

use crate::tooling::outcome::ExecutionOutcome;

/// Typed failure kinds the engine raises. Components convert lower-level
/// errors into one of these before surfacing them; the CLI boundary collapses
/// them into statuses and exit codes.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("app platform CLI unavailable: {0}")]
    PlatformUnavailable(String),
    #[error("another fpwrap instance is holding the lock")]
    Busy,
    #[error("wrapper name {name:?} is already claimed by {holder}")]
    NameCollision { name: String, holder: String },
    #[error("{0} is blocklisted")]
    Blocklisted(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("hook exited with code {0}")]
    HookFailed(i32),
    #[error("alias chain for {0:?} hits a cycle or exceeds the depth limit")]
    CycleOrDepth(String),
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::PlatformUnavailable(_) => "platform_unavailable",
            EngineError::Busy => "busy",
            EngineError::NameCollision { .. } => "name_collision",
            EngineError::Blocklisted(_) => "blocklisted",
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::HookFailed(_) => "hook_failed",
            EngineError::CycleOrDepth(_) => "alias_cycle",
            EngineError::Io { .. } => "io",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            EngineError::PlatformUnavailable(_) => "FW101",
            EngineError::Busy => "FW102",
            EngineError::NameCollision { .. } => "FW110",
            EngineError::Blocklisted(_) => "FW111",
            EngineError::InvalidInput(_) => "FW120",
            EngineError::HookFailed(_) => "FW140",
            EngineError::CycleOrDepth(_) => "FW150",
            EngineError::Io { .. } => "FW130",
        }
    }

    /// True for kinds the user can fix by invoking differently.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidInput(_)
                | EngineError::Blocklisted(_)
                | EngineError::CycleOrDepth(_)
        )
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            EngineError::PlatformUnavailable(_) => {
                Some("Install flatpak or make sure it is on PATH.")
            }
            EngineError::Busy => Some("Wait for the other fpwrap run to finish, then retry."),
            EngineError::CycleOrDepth(_) => {
                Some("Remove one of the aliases in the chain and retry.")
            }
            _ => None,
        }
    }

    pub fn into_outcome(self) -> ExecutionOutcome {
        let mut details = json!({
            "reason": self.reason(),
            "code": self.code(),
        });
        if let Some(hint) = self.hint() {
            details["hint"] = json!(hint);
        }
        let message = self.to_string();
        if self.is_user_error() {
            ExecutionOutcome::user_error(message, details)
        } else {
            ExecutionOutcome::failure(message, details)
        }
    }
}
