/**
 * ============================================================================
 * RECORDING NETWORK MODULE
 * ============================================================================
 *
 * PURPOSE: Mock network surface that intercepts requests instead of
 * sending them
 *
 * Every request is kept in memory in arrival order and optionally passed
 * to a log callback, so demos can show traffic and tests can assert on
 * payloads without a server.
 *
 * ============================================================================
 */

use crate::sdk::transport::NetworkSurface;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Browsers cap beacon payloads at roughly this size
const DEFAULT_BEACON_MAX_BYTES: usize = 64 * 1024;

type LogCallback = Box<dyn Fn(&RecordedRequest) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Xhr,
    Beacon,
    Pixel,
}

/**
 * One intercepted request
 */
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub kind: RequestKind,
    pub url: String,
    pub body: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl RecordedRequest {
    /**
     * Body parsed as JSON
     * None for pixel requests and unparseable bodies
     */
    pub fn payload(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|body| serde_json::from_str(body).ok())
    }

    /// Number of events in a JSON array payload
    pub fn event_count(&self) -> usize {
        self.payload()
            .and_then(|payload| payload.as_array().map(Vec::len))
            .unwrap_or(0)
    }
}

pub struct RecordingNetwork {
    requests: Mutex<Vec<RecordedRequest>>,
    beacon_supported: AtomicBool,
    beacon_max_bytes: Mutex<Option<usize>>,
    log_callback: Mutex<Option<LogCallback>>,
}

impl Default for RecordingNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingNetwork {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            beacon_supported: AtomicBool::new(true),
            beacon_max_bytes: Mutex::new(Some(DEFAULT_BEACON_MAX_BYTES)),
            log_callback: Mutex::new(None),
        }
    }

    pub fn set_beacon_supported(&self, supported: bool) {
        self.beacon_supported.store(supported, Ordering::SeqCst);
    }

    /// None removes the size cap
    pub fn set_beacon_max_bytes(&self, max_bytes: Option<usize>) {
        *self.beacon_max_bytes.lock().unwrap_or_else(PoisonError::into_inner) = max_bytes;
    }

    /**
     * Observe each request as it is recorded
     *
     * The callback runs synchronously on the sending thread, while the
     * batching queue's lock is held. It must not call back into the tracker
     * or the queue; doing so deadlocks. Hand the request off (channel, copy)
     * instead.
     */
    pub fn set_log_callback(&self, callback: impl Fn(&RecordedRequest) + Send + Sync + 'static) {
        *self.log_callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(callback));
    }

    /// Snapshot of every request so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Remove and return every request so far
    pub fn take(&self) -> Vec<RecordedRequest> {
        std::mem::take(&mut *self.requests.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn record(&self, kind: RequestKind, url: &str, body: Option<String>) {
        let request = RecordedRequest {
            kind,
            url: url.to_string(),
            body,
            received_at: Utc::now(),
        };

        log::debug!("[MOCK] {:?} request to {} intercepted", kind, url);

        if let Some(callback) = self.log_callback.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            callback(&request);
        }

        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }
}

impl NetworkSurface for RecordingNetwork {
    fn post_json(&self, url: &str, body: String) {
        self.record(RequestKind::Xhr, url, Some(body));
    }

    fn beacon_available(&self) -> bool {
        self.beacon_supported.load(Ordering::SeqCst)
    }

    fn send_beacon(&self, url: &str, body: String) -> bool {
        let max_bytes = *self.beacon_max_bytes.lock().unwrap_or_else(PoisonError::into_inner);
        if max_bytes.is_some_and(|max| body.len() > max) {
            return false;
        }
        self.record(RequestKind::Beacon, url, Some(body));
        true
    }

    fn get(&self, url: &str) {
        self.record(RequestKind::Pixel, url, None);
    }
}
