/**
 * ============================================================================
 * HTTP NETWORK MODULE
 * ============================================================================
 *
 * PURPOSE: Production network surface backed by reqwest
 *
 * BEHAVIOR:
 * - Every request is spawned on the current tokio runtime; callers never
 *   wait for completion
 * - Non-2xx responses and transport errors are logged, not reported
 * - Beacon requests are tracked so a host can drain them before exiting
 * - Without a tokio runtime the beacon is unavailable and plain requests
 *   are dropped with a warning
 *
 * ============================================================================
 */

use crate::sdk::config::TrackerConfig;
use crate::sdk::transport::NetworkSurface;
use crate::sdk::types::TrackerError;
use reqwest::header::CONTENT_TYPE;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub struct HttpNetwork {
    client: reqwest::Client,
    beacon_enabled: bool,
    in_flight_beacons: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpNetwork {
    /**
     * Create network surface with timeout and user agent from config
     */
    pub fn new(config: &TrackerConfig) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TrackerError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            beacon_enabled: config.beacon_enabled,
            in_flight_beacons: Mutex::new(Vec::new()),
        })
    }

    fn spawn_request(&self, request: reqwest::RequestBuilder, label: &'static str) -> Option<JoinHandle<()>> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!("No async runtime available, dropping {} request", label);
                return None;
            }
        };

        Some(handle.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    log::debug!("{} request delivered: status={}", label, response.status());
                }
                Ok(response) => {
                    log::warn!("{} request rejected by collector: status={}", label, response.status());
                }
                Err(e) => {
                    log::warn!("{} request failed: {}", label, e);
                }
            }
        }))
    }

    /**
     * Number of beacon requests that have not finished yet
     */
    pub fn pending_beacons(&self) -> usize {
        let mut beacons = self.in_flight_beacons.lock().unwrap_or_else(PoisonError::into_inner);
        beacons.retain(|handle| !handle.is_finished());
        beacons.len()
    }

    /**
     * Wait for in-flight beacons, giving up after `timeout`
     * Returns the number of beacons still unfinished
     */
    pub async fn drain_beacons(&self, timeout: Duration) -> usize {
        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.in_flight_beacons.lock().unwrap_or_else(PoisonError::into_inner));
        let total = handles.len();
        if total == 0 {
            return 0;
        }

        log::info!("Draining {} in-flight beacon(s)", total);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut unfinished = 0;
        for handle in handles {
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                unfinished += 1;
            }
        }

        if unfinished > 0 {
            log::warn!("{} beacon(s) still in flight after {:?}", unfinished, timeout);
        }
        unfinished
    }
}

impl NetworkSurface for HttpNetwork {
    fn post_json(&self, url: &str, body: String) {
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        self.spawn_request(request, "xhr");
    }

    fn beacon_available(&self) -> bool {
        self.beacon_enabled && Handle::try_current().is_ok()
    }

    fn send_beacon(&self, url: &str, body: String) -> bool {
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        match self.spawn_request(request, "beacon") {
            Some(handle) => {
                let mut beacons = self.in_flight_beacons.lock().unwrap_or_else(PoisonError::into_inner);
                beacons.retain(|existing| !existing.is_finished());
                beacons.push(handle);
                true
            }
            None => false,
        }
    }

    fn get(&self, url: &str) {
        let request = self.client.get(url);
        self.spawn_request(request, "pixel");
    }
}
