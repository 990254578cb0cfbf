use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// One immutable record that a named workflow step ran on an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Step identifier from the controlled vocabulary (e.g. "Data_Received").
    pub event_id: String,

    /// When the step ran. Log order is write order, not timestamp order.
    pub timestamp: DateTime<Utc>,

    pub outcome: EventOutcome,

    /// Who produced the event, conventionally `component-version`.
    pub agent: String,

    /// Free-text report. `None` in summary views.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Event {
    pub fn new(
        event_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        outcome: EventOutcome,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            timestamp,
            outcome,
            agent: agent.into(),
            details: None,
        }
    }

    pub fn success(event_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(event_id, timestamp, EventOutcome::Success, "")
    }

    pub fn failure(event_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(event_id, timestamp, EventOutcome::Failure, "")
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == EventOutcome::Success
    }

    /// Copy without the detail text.
    pub fn summary(&self) -> Self {
        Self {
            details: None,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Success,
    Failure,
}

impl EventOutcome {
    pub fn from_success(success: bool) -> Self {
        if success {
            EventOutcome::Success
        } else {
            EventOutcome::Failure
        }
    }
}

impl std::fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventOutcome::Success => "success",
            EventOutcome::Failure => "failure",
        };
        write!(f, "{s}")
    }
}
