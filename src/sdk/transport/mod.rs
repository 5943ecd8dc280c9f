/**
 * ============================================================================
 * TRANSPORT DISPATCHER MODULE
 * ============================================================================
 *
 * PURPOSE: Serialize batches and hand them to the network
 *
 * STRATEGIES:
 * - Xhr: POST with a JSON array body (normal operation)
 * - Beacon: fire-and-forget delivery that survives teardown; falls back to
 *   Xhr when the beacon primitive is unavailable or refuses the payload
 * - Pixel: GET with the payload flattened into query parameters. Nested
 *   values are rendered as JSON text, so this is lossy for arrays/objects
 *
 * DELIVERY:
 * Best effort only. Nothing here reports success or failure upstream;
 * failures are logged and the batch is forgotten.
 *
 * ============================================================================
 */

pub mod http;
pub mod recording;
#[cfg(test)]
pub(crate) mod test_server;

pub use http::HttpNetwork;
pub use recording::{RecordedRequest, RecordingNetwork, RequestKind};

use crate::sdk::types::EventBatch;
use serde_json::Value;
use std::sync::Arc;

/**
 * Delivery mechanism for one dispatch
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Xhr,
    Beacon,
    Pixel,
}

/**
 * Seam between the queue and the network
 */
pub trait Transport: Send + Sync {
    fn send(&self, batch: &EventBatch, strategy: Strategy);
}

/**
 * Raw network primitives offered by the host environment
 * None of these calls wait for the request to complete
 */
pub trait NetworkSurface: Send + Sync {
    fn post_json(&self, url: &str, body: String);

    fn beacon_available(&self) -> bool;

    /// Returns false when the beacon was refused
    fn send_beacon(&self, url: &str, body: String) -> bool;

    fn get(&self, url: &str);
}

/**
 * Default transport: picks the network primitive for each strategy
 */
#[derive(Clone)]
pub struct StrategyDispatcher {
    endpoint: String,
    network: Arc<dyn NetworkSurface>,
}

impl StrategyDispatcher {
    pub fn new(endpoint: impl Into<String>, network: Arc<dyn NetworkSurface>) -> Self {
        Self {
            endpoint: endpoint.into(),
            network,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send_xhr(&self, payload: String) {
        self.network.post_json(&self.endpoint, payload);
    }

    fn send_beacon(&self, payload: String) {
        if !self.network.beacon_available() {
            log::debug!("Beacon unavailable, falling back to xhr");
            self.send_xhr(payload);
            return;
        }
        if !self.network.send_beacon(&self.endpoint, payload.clone()) {
            log::warn!("Beacon refused payload ({} bytes), falling back to xhr", payload.len());
            self.send_xhr(payload);
        }
    }

    fn send_pixel(&self, data: &Value) {
        match pixel_url(&self.endpoint, data) {
            Ok(url) => self.network.get(&url),
            Err(e) => log::warn!("Dropping pixel payload: {}", e),
        }
    }
}

impl Transport for StrategyDispatcher {
    fn send(&self, batch: &EventBatch, strategy: Strategy) {
        log::debug!(
            "Dispatching batch {} ({} events, {:?}) via {:?}",
            batch.batch_id,
            batch.len(),
            batch.trigger,
            strategy
        );

        if strategy == Strategy::Pixel {
            match serde_json::to_value(&batch.events) {
                Ok(data) => self.send_pixel(&data),
                Err(e) => log::warn!("Failed to serialize batch {}: {}", batch.batch_id, e),
            }
            return;
        }

        let payload = match serde_json::to_string(&batch.events) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Failed to serialize batch {}: {}", batch.batch_id, e);
                return;
            }
        };

        match strategy {
            Strategy::Beacon => self.send_beacon(payload),
            _ => self.send_xhr(payload),
        }
    }
}

/**
 * Flatten a payload into key/value pairs for a query string
 * Objects contribute their fields, arrays their indices; nested values are
 * rendered as compact JSON text
 */
pub fn flatten_query_pairs(data: &Value) -> Vec<(String, String)> {
    match data {
        Value::Object(fields) => fields
            .iter()
            .map(|(key, value)| (key.clone(), query_value(value)))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), query_value(value)))
            .collect(),
        Value::Null => Vec::new(),
        scalar => vec![(query_value(scalar), String::new())],
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        nested => nested.to_string(),
    }
}

/**
 * Endpoint URL with the flattened payload appended as query parameters
 */
pub fn pixel_url(endpoint: &str, data: &Value) -> Result<String, String> {
    let mut url = reqwest::Url::parse(endpoint)
        .map_err(|e| format!("Invalid endpoint '{}': {}", endpoint, e))?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in flatten_query_pairs(data) {
            query.append_pair(&key, &value);
        }
    }
    Ok(url.to_string())
}
