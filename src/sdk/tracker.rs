/**
 * ============================================================================
 * TRACKER FACADE MODULE
 * ============================================================================
 *
 * PURPOSE: Single entry point host code calls to record events
 *
 * PIPELINE (track_event):
 * 1. Drop the event if the tracker is not initialized
 * 2. Validate against the schema registry
 * 3. Build the event record
 * 4. Resolve immediacy: explicit flag, else priority == high
 * 5. Hand off to the batching queue
 *
 * Every step runs inside the fault boundary selected by `debug`:
 * strict returns failures to the caller, lenient logs and drops them.
 *
 * AUTO-TRACKING:
 * Host events (clicks, errors, paint/load timings, visibility changes)
 * are delivered through handle_host_event. Listeners for clicks, errors
 * and performance exist only when auto-tracking is enabled; the
 * visibility listener that flushes on hide is always registered.
 *
 * ============================================================================
 */

use crate::sdk::config::TrackerConfig;
use crate::sdk::environment::EnvironmentContext;
use crate::sdk::event::EventBuilder;
use crate::sdk::policy::ErrorPolicy;
use crate::sdk::queue::BatchQueue;
use crate::sdk::schema::{Schema, SchemaRegistry};
use crate::sdk::transport::{HttpNetwork, NetworkSurface, StrategyDispatcher, Transport};
use crate::sdk::types::{DispatchStatistics, Priority, TrackerError};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

const FIRST_CONTENTFUL_PAINT: &str = "first-contentful-paint";
const LARGEST_CONTENTFUL_PAINT: &str = "largest-contentful-paint";

/**
 * One element on the path from a click target up to the document root
 */
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementInfo {
    pub id: Option<String>,
    /// Value of the element's tracking marker attribute (`data-event`)
    pub tracking_marker: Option<String>,
    pub text: String,
}

/**
 * Navigation timing entry, milliseconds relative to navigation start
 */
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NavigationTiming {
    pub request_start: f64,
    pub response_start: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/**
 * Occurrences in the host that the tracker may listen to
 */
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// `path[0]` is the click target, followed by its ancestors
    Click { path: Vec<ElementInfo> },
    Error {
        message: String,
        filename: Option<String>,
        lineno: Option<u32>,
        colno: Option<u32>,
    },
    UnhandledRejection { reason: String },
    Paint { name: String, start_time: f64 },
    Load { timing: NavigationTiming },
    VisibilityChange(Visibility),
}

#[derive(Debug, Default)]
struct Listeners {
    click: AtomicBool,
    errors: AtomicBool,
    performance: AtomicBool,
    visibility: AtomicBool,
}

#[derive(Debug, Default)]
struct PaintTimings {
    fcp: Option<f64>,
    lcp: Option<f64>,
}

pub struct Tracker {
    config: TrackerConfig,
    policy: ErrorPolicy,
    schema: SchemaRegistry,
    builder: EventBuilder,
    queue: BatchQueue,
    env: Arc<dyn EnvironmentContext>,
    initialized: AtomicBool,
    listeners: Listeners,
    paint: Mutex<PaintTimings>,
}

impl Tracker {
    /**
     * Create a tracker bound to a configuration
     * Fails on invalid configuration, or on auto-tracking setup errors in debug mode
     */
    pub fn new(
        config: TrackerConfig,
        env: Arc<dyn EnvironmentContext>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, TrackerError> {
        config.validate().map_err(TrackerError::InvalidConfig)?;

        let queue = BatchQueue::new(transport, config.batch_size, config.flush_interval());
        let tracker = Self {
            policy: ErrorPolicy::from_debug(config.debug),
            schema: SchemaRegistry::new(),
            builder: EventBuilder::new(env.clone()),
            queue,
            env,
            initialized: AtomicBool::new(false),
            listeners: Listeners::default(),
            paint: Mutex::new(PaintTimings::default()),
            config,
        };

        tracker.listeners.visibility.store(true, Ordering::SeqCst);
        tracker.initialized.store(true, Ordering::SeqCst);

        if tracker.config.auto_track {
            tracker
                .policy
                .run("auto-tracking setup", || tracker.init_auto_tracking())?;
        }

        log::info!(
            "Tracker initialized (endpoint={}, debug={}, auto_track={})",
            tracker.config.endpoint,
            tracker.config.debug,
            tracker.config.auto_track
        );
        Ok(tracker)
    }

    /**
     * Tracker sending through the given network surface
     */
    pub fn with_network(
        config: TrackerConfig,
        env: Arc<dyn EnvironmentContext>,
        network: Arc<dyn NetworkSurface>,
    ) -> Result<Self, TrackerError> {
        let transport = Arc::new(StrategyDispatcher::new(config.endpoint.clone(), network));
        Self::new(config, env, transport)
    }

    /**
     * Tracker sending over HTTP with reqwest
     */
    pub fn with_http(config: TrackerConfig, env: Arc<dyn EnvironmentContext>) -> Result<Self, TrackerError> {
        let network = Arc::new(HttpNetwork::new(&config)?);
        Self::with_network(config, env, network)
    }

    /**
     * Track an event
     * `force_immediate` overrides the priority-based decision when set
     */
    pub fn track_event(
        &self,
        event_name: &str,
        params: Value,
        force_immediate: Option<bool>,
    ) -> Result<(), TrackerError> {
        self.policy
            .run("track_event", || self.track_inner(event_name, params, force_immediate))
    }

    fn track_inner(
        &self,
        event_name: &str,
        params: Value,
        force_immediate: Option<bool>,
    ) -> Result<(), TrackerError> {
        if !self.initialized.load(Ordering::SeqCst) {
            if self.policy.is_strict() {
                log::warn!("Tracker not initialized, dropping '{}'", event_name);
            }
            return Ok(());
        }

        let params = into_params(event_name, params)?;

        let validation = self.schema.validate(event_name, &params);
        if !validation.valid {
            let error = TrackerError::Validation {
                event_name: event_name.to_string(),
                errors: validation.errors,
            };
            if self.policy.is_strict() {
                return Err(error);
            }
            log::warn!("{}", error);
            return Ok(());
        }

        let record = self.builder.create_event(event_name, &params);

        let immediate = force_immediate
            .unwrap_or_else(|| self.schema.priority(event_name) == Priority::High);

        self.queue.add_event(record, immediate);
        Ok(())
    }

    /**
     * Merge a schema into the registry
     */
    pub fn load_schema(&self, schema: Schema) {
        self.schema.load_config(schema);
    }

    /**
     * Merge a JSON schema document into the registry
     */
    pub fn load_schema_json(&self, json_str: &str) -> Result<(), TrackerError> {
        self.schema.load_json(json_str)
    }

    /**
     * Fetch a JSON schema document and merge it
     * The registry is untouched when the fetch or parse fails
     */
    pub async fn load_remote_schema(&self, url: &str) -> Result<(), TrackerError> {
        log::info!("Fetching remote schema from {}", url);

        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout())
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(|e| TrackerError::SchemaLoad(format!("Failed to create HTTP client: {}", e)))?;

        let response = client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| TrackerError::SchemaLoad(format!("Failed to fetch schema: {}", e)))?;

        if !response.status().is_success() {
            return Err(TrackerError::SchemaLoad(format!(
                "Schema endpoint returned status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TrackerError::SchemaLoad(format!("Failed to read schema body: {}", e)))?;

        self.schema.load_json(&body)
    }

    /**
     * Deliver a host occurrence to the registered listeners
     */
    pub fn handle_host_event(&self, event: HostEvent) -> Result<(), TrackerError> {
        self.policy.run("host event", || match event {
            HostEvent::Click { path } => {
                if self.listeners.click.load(Ordering::SeqCst) {
                    self.on_click(&path)?;
                }
                Ok(())
            }
            HostEvent::Error {
                message,
                filename,
                lineno,
                colno,
            } => {
                if !self.listeners.errors.load(Ordering::SeqCst) {
                    return Ok(());
                }
                let mut params = Map::new();
                params.insert("message".to_string(), Value::from(message));
                if let Some(filename) = filename {
                    params.insert("filename".to_string(), Value::from(filename));
                }
                if let Some(lineno) = lineno {
                    params.insert("lineno".to_string(), Value::from(lineno));
                }
                if let Some(colno) = colno {
                    params.insert("colno".to_string(), Value::from(colno));
                }
                self.track_event("error", Value::Object(params), None)
            }
            HostEvent::UnhandledRejection { reason } => {
                if !self.listeners.errors.load(Ordering::SeqCst) {
                    return Ok(());
                }
                self.track_event(
                    "error",
                    json!({ "message": format!("Unhandled Promise Rejection: {}", reason) }),
                    None,
                )
            }
            HostEvent::Paint { name, start_time } => {
                if self.listeners.performance.load(Ordering::SeqCst) {
                    self.on_paint(&name, start_time);
                }
                Ok(())
            }
            HostEvent::Load { timing } => {
                if !self.listeners.performance.load(Ordering::SeqCst) {
                    return Ok(());
                }
                let (fcp, lcp) = {
                    let paint = self.paint.lock().unwrap_or_else(PoisonError::into_inner);
                    (paint.fcp.unwrap_or(0.0), paint.lcp.unwrap_or(0.0))
                };
                self.track_event(
                    "performance",
                    json!({
                        "fcp": fcp,
                        "lcp": lcp,
                        "ttfb": timing.response_start - timing.request_start,
                    }),
                    None,
                )
            }
            HostEvent::VisibilityChange(visibility) => {
                if visibility == Visibility::Hidden && self.listeners.visibility.load(Ordering::SeqCst) {
                    log::debug!("Host hidden, flushing queue via beacon");
                    self.queue.flush_on_unload();
                }
                Ok(())
            }
        })
    }

    /**
     * Flush queued events now
     */
    pub fn flush(&self) {
        self.queue.flush();
    }

    /**
     * Flush queued events via beacon
     */
    pub fn flush_on_unload(&self) {
        self.queue.flush_on_unload();
    }

    /**
     * Flush through the unload path and stop accepting events
     */
    pub fn shutdown(&self) {
        // Stop accepting first so nothing is queued behind the final flush
        self.initialized.store(false, Ordering::SeqCst);
        self.queue.flush_on_unload();
        log::info!("Tracker shutdown");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn environment(&self) -> &Arc<dyn EnvironmentContext> {
        &self.env
    }

    pub fn pending_events(&self) -> usize {
        self.queue.pending_len()
    }

    pub fn statistics(&self) -> DispatchStatistics {
        self.queue.statistics()
    }

    fn init_auto_tracking(&self) -> Result<(), TrackerError> {
        self.track_event(
            "pageView",
            json!({
                "pageTitle": self.env.document_title(),
                "referrer": self.env.referrer(),
            }),
            None,
        )?;

        self.listeners.click.store(true, Ordering::SeqCst);
        self.listeners.errors.store(true, Ordering::SeqCst);
        self.listeners.performance.store(true, Ordering::SeqCst);
        log::debug!("Auto-tracking listeners registered");
        Ok(())
    }

    fn on_click(&self, path: &[ElementInfo]) -> Result<(), TrackerError> {
        let Some(element) = path.iter().find(|element| element.tracking_marker.is_some()) else {
            return Ok(());
        };

        let button_id = non_empty(element.id.as_deref())
            .or_else(|| non_empty(element.tracking_marker.as_deref()))
            .unwrap_or("unknown");

        self.track_event(
            "buttonClick",
            json!({
                "buttonId": button_id,
                "buttonText": element.text,
                "pageUrl": self.env.current_url(),
            }),
            None,
        )
    }

    fn on_paint(&self, name: &str, start_time: f64) {
        let mut paint = self.paint.lock().unwrap_or_else(PoisonError::into_inner);
        match name {
            FIRST_CONTENTFUL_PAINT => {
                if paint.fcp.is_none() {
                    paint.fcp = Some(start_time);
                }
            }
            // Later candidates supersede earlier ones
            LARGEST_CONTENTFUL_PAINT => paint.lcp = Some(start_time),
            _ => {}
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

fn into_params(event_name: &str, params: Value) -> Result<Map<String, Value>, TrackerError> {
    match params {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(TrackerError::Validation {
            event_name: event_name.to_string(),
            errors: vec![format!(
                "Event parameters must be an object, got '{}'",
                crate::sdk::types::ParamType::of(&other).map(|t| t.as_str()).unwrap_or("null")
            )],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::environment::StaticEnvironment;
    use crate::sdk::transport::test_server::serve_once;
    use crate::sdk::transport::{RecordingNetwork, RequestKind, Strategy};
    use crate::sdk::types::EventBatch;
    use std::sync::Weak;
    use std::time::Duration;

    const ENDPOINT: &str = "http://collector.test/api/test";

    fn environment() -> Arc<StaticEnvironment> {
        Arc::new(
            StaticEnvironment::new("https://shop.example.com/products", "test-agent/1.0")
                .with_title("Products")
                .with_referrer("https://search.example.com/"),
        )
    }

    fn tracker_with(debug: bool, auto_track: bool) -> (Arc<RecordingNetwork>, Tracker) {
        let network = Arc::new(RecordingNetwork::new());
        let mut config = TrackerConfig::with_endpoint(ENDPOINT);
        config.debug = debug;
        config.auto_track = auto_track;
        let tracker = Tracker::with_network(config, environment(), network.clone()).unwrap();
        (network, tracker)
    }

    fn tracker(debug: bool) -> (Arc<RecordingNetwork>, Tracker) {
        tracker_with(debug, false)
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_priority_event_is_delayed() {
        let (network, tracker) = tracker(true);
        tracker
            .track_event("pageView", json!({"pageTitle": "Test", "referrer": ""}), None)
            .unwrap();
        assert_eq!(network.count(), 0);

        tokio::time::sleep(Duration::from_millis(2500)).await;

        let requests = network.requests();
        assert_eq!(requests.len(), 1);
        let payload = requests[0].payload().unwrap();
        assert_eq!(payload.as_array().unwrap().len(), 1);
        assert_eq!(payload[0]["eventName"], "pageView");
        assert_eq!(payload[0]["url"], "https://shop.example.com/products");
        assert_eq!(payload[0]["userAgent"], "test-agent/1.0");
        assert_eq!(requests[0].url, ENDPOINT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_priority_event_is_immediate() {
        let (network, tracker) = tracker(true);
        tracker
            .track_event(
                "purchase",
                json!({"orderId": "123", "amount": 100, "currency": "USD", "items": []}),
                None,
            )
            .unwrap();

        let requests = network.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, RequestKind::Xhr);
        let payload = requests[0].payload().unwrap();
        assert_eq!(payload.as_array().unwrap().len(), 1);
        assert_eq!(payload[0]["eventName"], "purchase");
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_immediate_overrides_priority() {
        let (network, tracker) = tracker(true);
        tracker
            .track_event("pageView", json!({"pageTitle": "a"}), Some(true))
            .unwrap();
        assert_eq!(network.count(), 1);

        tracker
            .track_event(
                "purchase",
                json!({"orderId": "1", "amount": 1, "currency": "USD", "items": []}),
                Some(false),
            )
            .unwrap();
        assert_eq!(network.count(), 1);
        assert_eq!(tracker.pending_events(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_mismatch_fails_loudly_in_debug() {
        let (network, tracker) = tracker(true);
        let err = tracker
            .track_event("pageView", json!({"pageTitle": 123, "referrer": ""}), None)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Validation Fail"));
        assert!(message.contains("pageTitle"));
        assert_eq!(tracker.pending_events(), 0);
        assert_eq!(network.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loaded_schema_required_field() {
        let (_network, tracker) = tracker(true);
        tracker
            .load_schema_json(
                r#"{
                    "version": "1.0.1",
                    "events": {
                        "testEvent": {
                            "priority": "low",
                            "params": { "requiredField": { "type": "string", "required": true } }
                        }
                    }
                }"#,
            )
            .unwrap();

        let err = tracker.track_event("testEvent", json!({}), None).unwrap_err();
        assert!(err.to_string().contains("Missing required parameter"));

        assert!(tracker
            .track_event("testEvent", json!({"requiredField": "ok"}), None)
            .is_ok());
        assert_eq!(tracker.schema().version(), "1.0.1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_of_five() {
        let (network, tracker) = tracker(true);
        for i in 0..5 {
            tracker
                .track_event("pageView", json!({"pageTitle": format!("Page {}", i), "referrer": ""}), None)
                .unwrap();
        }

        let requests = network.requests();
        assert_eq!(requests.len(), 1);
        let payload = requests[0].payload().unwrap();
        assert_eq!(payload.as_array().unwrap().len(), 5);
        assert_eq!(payload[4]["pageTitle"], "Page 4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_event_dropped_silently_in_production() {
        let (network, tracker) = tracker(false);
        assert!(tracker.track_event("unknownEvent", json!({"foo": "bar"}), None).is_ok());
        assert!(tracker.track_event("pageView", json!({"pageTitle": 1}), None).is_ok());

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(network.count(), 0);
        assert_eq!(tracker.pending_events(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_event_fails_in_debug() {
        let (_network, tracker) = tracker(true);
        let err = tracker.track_event("unknownEvent", json!({}), None).unwrap_err();
        assert_eq!(
            err,
            TrackerError::Validation {
                event_name: "unknownEvent".to_string(),
                errors: vec!["Event 'unknownEvent' is not defined in the schema.".to_string()],
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_object_params_rejected() {
        let (_network, tracker) = tracker(true);
        let err = tracker.track_event("pageView", json!([1, 2]), None).unwrap_err();
        assert!(err.to_string().contains("must be an object"));

        // Null means no params at all
        assert!(tracker.track_event("pageView", Value::Null, None).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_after_shutdown_are_ignored() {
        let (network, tracker) = tracker(true);
        tracker.track_event("pageView", json!({"pageTitle": "a"}), None).unwrap();
        tracker.shutdown();

        let requests = network.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, RequestKind::Beacon);
        assert!(!tracker.is_initialized());

        assert!(tracker.track_event("pageView", json!({"pageTitle": "b"}), None).is_ok());
        assert!(tracker.track_event("unknownEvent", json!({}), None).is_ok());
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(network.count(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let network = Arc::new(RecordingNetwork::new());
        let config = TrackerConfig::with_endpoint("/api/track");
        let result = Tracker::with_network(config, environment(), network);
        assert!(matches!(result, Err(TrackerError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_track_emits_page_view() {
        let (network, tracker) = tracker_with(true, true);
        assert_eq!(tracker.pending_events(), 1);

        tracker.flush();
        let payload = network.requests()[0].payload().unwrap();
        assert_eq!(payload[0]["eventName"], "pageView");
        assert_eq!(payload[0]["pageTitle"], "Products");
        assert_eq!(payload[0]["referrer"], "https://search.example.com/");
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_walks_to_marked_ancestor() {
        let (network, tracker) = tracker_with(true, true);
        tracker.flush();
        network.take();

        let path = vec![
            ElementInfo {
                id: None,
                tracking_marker: None,
                text: "Buy".to_string(),
            },
            ElementInfo {
                id: Some("buy-btn".to_string()),
                tracking_marker: Some("buy".to_string()),
                text: "Buy now".to_string(),
            },
            ElementInfo {
                id: Some("outer".to_string()),
                tracking_marker: Some("section".to_string()),
                text: String::new(),
            },
        ];
        tracker.handle_host_event(HostEvent::Click { path }).unwrap();
        tracker.flush();

        let payload = network.requests()[0].payload().unwrap();
        assert_eq!(payload[0]["eventName"], "buttonClick");
        assert_eq!(payload[0]["buttonId"], "buy-btn");
        assert_eq!(payload[0]["buttonText"], "Buy now");
        assert_eq!(payload[0]["pageUrl"], "https://shop.example.com/products");
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_id_fallbacks() {
        let (network, tracker) = tracker_with(true, true);
        tracker.flush();
        network.take();

        let marker_only = ElementInfo {
            id: Some(String::new()),
            tracking_marker: Some("promo".to_string()),
            text: String::new(),
        };
        let empty_marker = ElementInfo {
            id: None,
            tracking_marker: Some(String::new()),
            text: String::new(),
        };
        let unmarked = ElementInfo::default();

        tracker.handle_host_event(HostEvent::Click { path: vec![marker_only] }).unwrap();
        tracker.handle_host_event(HostEvent::Click { path: vec![empty_marker] }).unwrap();
        tracker.handle_host_event(HostEvent::Click { path: vec![unmarked] }).unwrap();
        tracker.flush();

        let payload = network.requests()[0].payload().unwrap();
        let events = payload.as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["buttonId"], "promo");
        assert_eq!(events[1]["buttonId"], "unknown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_sent_immediately() {
        let (network, tracker) = tracker_with(true, true);

        tracker
            .handle_host_event(HostEvent::Error {
                message: "x is undefined".to_string(),
                filename: Some("app.js".to_string()),
                lineno: Some(10),
                colno: None,
            })
            .unwrap();
        tracker
            .handle_host_event(HostEvent::UnhandledRejection {
                reason: "timeout".to_string(),
            })
            .unwrap();

        let requests = network.requests();
        assert_eq!(requests.len(), 2);
        let first = requests[0].payload().unwrap();
        assert_eq!(first[0]["eventName"], "error");
        assert_eq!(first[0]["lineno"], 10);
        assert!(first[0].get("colno").is_none());
        let second = requests[1].payload().unwrap();
        assert_eq!(second[0]["message"], "Unhandled Promise Rejection: timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn test_performance_timings() {
        let (network, tracker) = tracker_with(true, true);
        tracker.flush();
        network.take();

        for (name, start_time) in [
            ("first-contentful-paint", 120.0),
            ("first-contentful-paint", 300.0),
            ("largest-contentful-paint", 400.0),
            ("largest-contentful-paint", 650.0),
        ] {
            tracker
                .handle_host_event(HostEvent::Paint {
                    name: name.to_string(),
                    start_time,
                })
                .unwrap();
        }
        tracker
            .handle_host_event(HostEvent::Load {
                timing: NavigationTiming {
                    request_start: 20.0,
                    response_start: 95.0,
                },
            })
            .unwrap();
        tracker.flush();

        let payload = network.requests()[0].payload().unwrap();
        assert_eq!(payload[0]["eventName"], "performance");
        assert_eq!(payload[0]["fcp"], 120.0);
        assert_eq!(payload[0]["lcp"], 650.0);
        assert_eq!(payload[0]["ttfb"], 75.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listeners_inactive_without_auto_track() {
        let (network, tracker) = tracker(true);
        tracker
            .handle_host_event(HostEvent::Click {
                path: vec![ElementInfo {
                    id: Some("b".to_string()),
                    tracking_marker: Some("b".to_string()),
                    text: String::new(),
                }],
            })
            .unwrap();
        tracker
            .handle_host_event(HostEvent::UnhandledRejection {
                reason: "x".to_string(),
            })
            .unwrap();

        assert_eq!(network.count(), 0);
        assert_eq!(tracker.pending_events(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_visibility_flushes_via_beacon() {
        let (network, tracker) = tracker(true);
        tracker.track_event("pageView", json!({"pageTitle": "a"}), None).unwrap();
        tracker.track_event("pageView", json!({"pageTitle": "b"}), None).unwrap();

        tracker
            .handle_host_event(HostEvent::VisibilityChange(Visibility::Visible))
            .unwrap();
        assert_eq!(network.count(), 0);

        tracker
            .handle_host_event(HostEvent::VisibilityChange(Visibility::Hidden))
            .unwrap();
        let requests = network.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, RequestKind::Beacon);
        assert_eq!(requests[0].event_count(), 2);
        assert!(tracker.is_initialized());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schema_merge_keeps_default_events() {
        let (network, tracker) = tracker(true);
        tracker.load_schema(
            serde_json::from_value(json!({
                "version": "1.1.0",
                "events": {
                    "dynamic_promo_click": {
                        "priority": "high",
                        "params": { "promoId": { "type": "string" }, "location": { "type": "string" } }
                    }
                }
            }))
            .unwrap(),
        );

        tracker
            .track_event("dynamic_promo_click", json!({"promoId": "SUMMER", "location": "header"}), None)
            .unwrap();
        assert_eq!(network.count(), 1);

        let err = tracker.track_event("pageView", json!({"pageTitle": 5}), None).unwrap_err();
        assert!(err.to_string().contains("pageTitle"));
    }

    #[tokio::test]
    async fn test_remote_schema_failure_leaves_registry() {
        let (_network, tracker) = tracker(true);
        let before = tracker.schema().snapshot();
        // Port 9 (discard) is not listening in test environments
        let result = tracker.load_remote_schema("http://127.0.0.1:9/schema.json").await;
        assert!(matches!(result, Err(TrackerError::SchemaLoad(_))));
        assert_eq!(tracker.schema().snapshot(), before);
    }

    #[tokio::test]
    async fn test_remote_schema_fetched_and_merged() {
        let document = r#"{
            "version": "2.0.0",
            "events": {
                "remote_banner_click": {
                    "priority": "high",
                    "params": { "bannerId": { "type": "string", "required": true } }
                }
            }
        }"#;
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", document).await;
        let (network, tracker) = tracker(true);

        tracker
            .load_remote_schema(&format!("{}/schema.json", base_url))
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert_eq!(request.request_line(), "GET /schema.json HTTP/1.1");
        assert_eq!(request.header("accept").as_deref(), Some("application/json"));

        assert_eq!(tracker.schema().version(), "2.0.0");
        assert!(tracker.schema().contains("remote_banner_click"));
        assert!(tracker.schema().contains("pageView"));

        tracker
            .track_event("remote_banner_click", json!({"bannerId": "spring"}), None)
            .unwrap();
        assert_eq!(network.count(), 1);
    }

    #[tokio::test]
    async fn test_remote_schema_error_status_leaves_registry() {
        let (base_url, server) = serve_once("HTTP/1.1 503 Service Unavailable", "").await;
        let (_network, tracker) = tracker(true);
        let before = tracker.schema().snapshot();

        let result = tracker.load_remote_schema(&format!("{}/schema.json", base_url)).await;
        match result {
            Err(TrackerError::SchemaLoad(message)) => assert!(message.contains("503")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(tracker.schema().snapshot(), before);
        server.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_callback_hands_off_requests() {
        let (network, tracker) = tracker(true);
        let (sender, receiver) = std::sync::mpsc::channel();
        network.set_log_callback(move |request| {
            let _ = sender.send(request.clone());
        });

        tracker.track_event("pageView", json!({"pageTitle": "a"}), None).unwrap();
        tracker.flush();

        // Reacting to a logged request outside the callback is safe
        let logged = receiver.try_recv().unwrap();
        assert_eq!(logged.event_count(), 1);
        tracker
            .track_event("pageView", json!({"pageTitle": "after log"}), None)
            .unwrap();
        tracker.flush();
        assert_eq!(receiver.try_recv().unwrap().event_count(), 1);
    }

    /// Records whether the tracker still accepted events at each send
    #[derive(Default)]
    struct ObservingTransport {
        tracker: Mutex<Weak<Tracker>>,
        sends: Mutex<Vec<(Strategy, bool)>>,
    }

    impl Transport for ObservingTransport {
        fn send(&self, _batch: &EventBatch, strategy: Strategy) {
            let accepting = self
                .tracker
                .lock()
                .unwrap()
                .upgrade()
                .map(|tracker| tracker.is_initialized())
                .unwrap_or(false);
            self.sends.lock().unwrap().push((strategy, accepting));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_intake_before_final_flush() {
        let transport = Arc::new(ObservingTransport::default());
        let mut config = TrackerConfig::with_endpoint(ENDPOINT);
        config.debug = true;
        let tracker = Arc::new(Tracker::new(config, environment(), transport.clone()).unwrap());
        *transport.tracker.lock().unwrap() = Arc::downgrade(&tracker);

        tracker.track_event("pageView", json!({"pageTitle": "a"}), None).unwrap();
        tracker.shutdown();

        assert_eq!(*transport.sends.lock().unwrap(), vec![(Strategy::Beacon, false)]);

        // Late arrivals are not left behind in the queue
        tracker.track_event("pageView", json!({"pageTitle": "late"}), None).unwrap();
        assert_eq!(tracker.pending_events(), 0);
        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(transport.sends.lock().unwrap().len(), 1);
    }
}
