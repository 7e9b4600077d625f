use chrono::{DateTime, Utc};
use common::AttemptId;
use serde::{Deserialize, Serialize};

/// Position of an entry within one attempt's journal.
///
/// Sequences start at 1 for the first entry and increment by 1 for each
/// subsequent entry of the same attempt; 0 means "nothing journaled yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    /// Creates a sequence from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the sequence of an empty journal (0).
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the sequence of the first entry (1).
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next sequence.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw sequence value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recorded step of a checkout attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// The attempt this entry belongs to.
    pub attempt_id: AttemptId,

    /// Position within the attempt's journal.
    pub sequence: Sequence,

    /// The type of the recorded event (e.g., "PaymentAuthorized").
    pub event_type: String,

    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,
}

impl JournalEntry {
    /// Creates a new journal entry builder.
    pub fn builder() -> JournalEntryBuilder {
        JournalEntryBuilder::default()
    }
}

/// Builder for constructing journal entries.
#[derive(Debug, Default)]
pub struct JournalEntryBuilder {
    attempt_id: Option<AttemptId>,
    sequence: Option<Sequence>,
    event_type: Option<String>,
    recorded_at: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
}

impl JournalEntryBuilder {
    /// Sets the attempt ID.
    pub fn attempt_id(mut self, attempt_id: AttemptId) -> Self {
        self.attempt_id = Some(attempt_id);
        self
    }

    /// Sets the sequence.
    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds the entry, returning None if required fields are missing.
    pub fn try_build(self) -> Option<JournalEntry> {
        Some(JournalEntry {
            attempt_id: self.attempt_id?,
            sequence: self.sequence?,
            event_type: self.event_type?,
            recorded_at: self.recorded_at.unwrap_or_else(Utc::now),
            payload: self.payload?,
        })
    }
}

/// Checks that a batch targets one attempt and has consecutive sequences
/// starting right after `expected`.
pub(crate) fn validate_entries_for_append(
    entries: &[JournalEntry],
    expected: Sequence,
) -> Result<(), String> {
    let Some(first) = entries.first() else {
        return Err("cannot append an empty batch".to_string());
    };

    let mut next = expected.next();
    for entry in entries {
        if entry.attempt_id != first.attempt_id {
            return Err("all entries must belong to the same attempt".to_string());
        }
        if entry.sequence != next {
            return Err(format!(
                "entry sequences must be consecutive: expected {next}, got {}",
                entry.sequence
            ));
        }
        next = next.next();
    }

    Ok(())
}
