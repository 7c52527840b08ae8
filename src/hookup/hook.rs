/// Matches any source operation or any event.
pub const WILDCARD: &str = "*";

/// Event fired by every operation after a successful run.
pub const AFTER_RUN: &str = "after_run";

/// "When `source` fires `event`, run `target`."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    source: String,
    event: String,
    target: String,
}

impl Hook {
    pub fn new(source: impl Into<String>, event: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            event: event.into(),
            target: target.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}
