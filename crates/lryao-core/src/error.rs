/// Raised when a party deviates from the protocol.
///
/// The reason describes which check failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cheat attempt detected: {reason}")]
pub struct CheatError {
    reason: String,
}

impl CheatError {
    /// Creates a new cheat error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the reason the check failed.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}
