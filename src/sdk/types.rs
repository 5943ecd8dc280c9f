/**
 * ============================================================================
 * TRACKER TYPES MODULE
 * ============================================================================
 *
 * PURPOSE: Define the data structures shared across the tracking pipeline
 *
 * TYPES DEFINED:
 * - Priority: Delivery urgency declared per event in the schema
 * - ParamType: Closed set of parameter types the schema can declare
 * - FlushTrigger: Why a batch left the queue
 * - EventBatch: Group of event records dispatched together
 * - DispatchStatistics: Counters for monitoring the queue
 * - TrackerError: Every failure the pipeline can surface
 *
 * ============================================================================
 */

use crate::sdk::event::EventRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/**
 * Delivery priority of an event definition
 * High priority events bypass the batching queue
 */
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    #[default]
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/**
 * Parameter type as declared in the schema
 * Arrays are distinguished from plain objects
 */
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /**
     * Runtime type of a JSON value
     * Returns None for null, which the schema treats as an absent value
     */
    pub fn of(value: &Value) -> Option<ParamType> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ParamType::Boolean),
            Value::Number(_) => Some(ParamType::Number),
            Value::String(_) => Some(ParamType::String),
            Value::Array(_) => Some(ParamType::Array),
            Value::Object(_) => Some(ParamType::Object),
        }
    }

    /**
     * Check whether a value satisfies this declared type
     * Declared `object` accepts anything (loosely-typed payloads)
     */
    pub fn accepts(&self, actual: ParamType) -> bool {
        *self == ParamType::Object || *self == actual
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/**
 * Reason a batch was dispatched
 * Only used for logging and statistics, never sent on the wire
 */
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FlushTrigger {
    Immediate,
    Size,
    Timer,
    Manual,
    Unload,
}

/**
 * A batch of event records ready for transmission
 * Batches are created when an immediate send or a flush condition occurs
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    pub batch_id: String, // UUID for tracking
    pub created_at: DateTime<Utc>,
    pub trigger: FlushTrigger,
    pub events: Vec<EventRecord>,
}

impl EventBatch {
    pub fn new(trigger: FlushTrigger, events: Vec<EventRecord>) -> Self {
        Self {
            batch_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            trigger,
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/**
 * Queue statistics for monitoring and debugging
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DispatchStatistics {
    pub events_queued: u64,
    pub events_dispatched: u64,
    pub batches_dispatched: u64,
    pub immediate_sends: u64,
    pub unload_flushes: u64,
    pub last_flush_time: Option<DateTime<Utc>>,
}

/**
 * Errors raised inside the tracking pipeline
 * In lenient mode these never reach the host application
 */
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerError {
    /// Unknown event or schema violation
    Validation {
        event_name: String,
        errors: Vec<String>,
    },

    /// Configuration rejected at construction or load time
    InvalidConfig(String),

    /// Schema document could not be parsed or fetched
    SchemaLoad(String),

    /// Payload could not be serialized for the wire
    Serialization(String),

    /// Network surface could not be created
    Transport(String),

    /// A panic was caught by the fault boundary
    Panicked(String),
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerError::Validation { event_name, errors } => {
                write!(f, "[Validation Fail] Event '{}': {}", event_name, errors.join("; "))
            }
            TrackerError::InvalidConfig(message) => {
                write!(f, "Invalid tracker configuration: {}", message)
            }
            TrackerError::SchemaLoad(message) => write!(f, "Failed to load schema: {}", message),
            TrackerError::Serialization(message) => {
                write!(f, "Failed to serialize payload: {}", message)
            }
            TrackerError::Transport(message) => write!(f, "Transport error: {}", message),
            TrackerError::Panicked(message) => write!(f, "Tracking code panicked: {}", message),
        }
    }
}

impl std::error::Error for TrackerError {}
