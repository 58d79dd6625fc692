use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the capture session controller.
///
/// `Opened` and `Running` are stable. Every other state except `Closed` is only
/// occupied while a hardware acknowledgement is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Closed,
    Opening,
    Opened,
    Configuring,
    Running,
    Reconfiguring,
    Closing,
}

impl SessionState {
    pub fn is_stable(&self) -> bool {
        matches!(self, SessionState::Opened | SessionState::Running)
    }

    pub fn is_transient(&self) -> bool {
        !self.is_stable() && *self != SessionState::Closed
    }

    /// Whether the controller may move from `self` to `next`
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, next),
            (Closed, Opening)
                | (Opening, Opened)
                | (Opening, Closed)
                | (Opening, Closing)
                | (Opened, Configuring)
                | (Opened, Closing)
                | (Configuring, Running)
                | (Configuring, Opened)
                | (Configuring, Closing)
                | (Running, Reconfiguring)
                | (Running, Opened)
                | (Running, Closing)
                | (Reconfiguring, Running)
                | (Reconfiguring, Closing)
                | (Closing, Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Closed => "closed",
            SessionState::Opening => "opening",
            SessionState::Opened => "opened",
            SessionState::Configuring => "configuring",
            SessionState::Running => "running",
            SessionState::Reconfiguring => "reconfiguring",
            SessionState::Closing => "closing",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
