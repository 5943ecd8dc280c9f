/**
 * ============================================================================
 * EVENT BUILDER MODULE
 * ============================================================================
 *
 * PURPOSE: Turn (name, params) into the canonical record sent on the wire
 *
 * RECORD SHAPE:
 * { "eventName": ..., "timestamp": <epoch ms>, "url": ..., "userAgent": ...,
 *   ...caller params }
 *
 * Caller params override the metadata fields. `eventName` is reserved and
 * always carries the tracked name.
 *
 * ============================================================================
 */

use crate::sdk::environment::EnvironmentContext;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

pub const EVENT_NAME_FIELD: &str = "eventName";
pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const URL_FIELD: &str = "url";
pub const USER_AGENT_FIELD: &str = "userAgent";

/**
 * Enriched, immutable representation of a tracked occurrence
 */
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct EventRecord(Map<String, Value>);

impl EventRecord {
    pub fn event_name(&self) -> &str {
        self.0
            .get(EVENT_NAME_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// None when a caller param replaced the timestamp with a non-integer
    pub fn timestamp(&self) -> Option<i64> {
        self.0.get(TIMESTAMP_FIELD).and_then(Value::as_i64)
    }

    pub fn url(&self) -> Option<&str> {
        self.0.get(URL_FIELD).and_then(Value::as_str)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.0.get(USER_AGENT_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/**
 * Stamps events with environment metadata
 */
#[derive(Clone)]
pub struct EventBuilder {
    env: Arc<dyn EnvironmentContext>,
}

impl EventBuilder {
    pub fn new(env: Arc<dyn EnvironmentContext>) -> Self {
        Self { env }
    }

    pub fn create_event(&self, event_name: &str, params: &Map<String, Value>) -> EventRecord {
        let mut fields = Map::with_capacity(params.len() + 4);
        fields.insert(EVENT_NAME_FIELD.to_string(), Value::from(event_name));
        fields.insert(TIMESTAMP_FIELD.to_string(), Value::from(self.env.now_millis()));
        fields.insert(URL_FIELD.to_string(), Value::from(self.env.current_url()));
        fields.insert(USER_AGENT_FIELD.to_string(), Value::from(self.env.user_agent()));

        for (key, value) in params {
            if key == EVENT_NAME_FIELD {
                log::debug!("Ignoring reserved parameter '{}' on event '{}'", key, event_name);
                continue;
            }
            fields.insert(key.clone(), value.clone());
        }

        EventRecord(fields)
    }
}
