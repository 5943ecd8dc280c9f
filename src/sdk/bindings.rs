/**
 * ============================================================================
 * BINDINGS MODULE
 * ============================================================================
 *
 * PURPOSE: Convenience callers for common UI tracking patterns
 *
 * Everything here goes through Tracker::track_event and adds no rules of
 * its own:
 * - track_page_view: pageView with title and referrer
 * - PageStayGuard: pageStay with dwell time and scroll depth on drop
 * - ExposureTracker: exposure with visible duration
 * - track_button_click / track_form_submit(_with): interaction events
 *
 * ============================================================================
 */

use crate::sdk::tracker::Tracker;
use crate::sdk::types::TrackerError;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio::time::Instant;

const UNKNOWN_BUTTON_ID: &str = "unknown-btn";

/**
 * Track a page view
 * `title_override` replaces the document title when given
 */
pub fn track_page_view(tracker: &Tracker, title_override: Option<&str>) -> Result<(), TrackerError> {
    let env = tracker.environment();
    let page_title = title_override
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| env.document_title());

    tracker.track_event(
        "pageView",
        json!({
            "pageTitle": page_title,
            "referrer": env.referrer(),
        }),
        None,
    )
}

/**
 * Track a button click
 * The button id is `event_id`, else the element's own `element_id`, else a
 * fixed placeholder; empty strings count as missing
 */
pub fn track_button_click(
    tracker: &Tracker,
    event_id: Option<&str>,
    element_id: Option<&str>,
    button_name: &str,
    extra: Option<Value>,
) -> Result<(), TrackerError> {
    let button_id = event_id
        .filter(|id| !id.is_empty())
        .or_else(|| element_id.filter(|id| !id.is_empty()))
        .unwrap_or(UNKNOWN_BUTTON_ID);

    let mut params = Map::new();
    params.insert("buttonId".to_string(), Value::from(button_id));
    params.insert("buttonText".to_string(), Value::from(button_name));
    params.insert("pageUrl".to_string(), Value::from(tracker.environment().current_url()));
    if let Some(extra) = extra {
        params.insert("extra".to_string(), extra);
    }

    tracker.track_event("buttonClick", Value::Object(params), None)
}

/**
 * Track a form submission
 * Field values are sent as strings
 */
pub fn track_form_submit<I, K, V>(tracker: &Tracker, form_id: &str, fields: I) -> Result<(), TrackerError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    track_form_submit_with(tracker, form_id, fields, |fields| {
        fields
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect()
    })
}

/**
 * Track a form submission, shaping the form data with `transform`
 * `transform` receives the raw fields in submission order
 */
pub fn track_form_submit_with<I, K, V, F>(
    tracker: &Tracker,
    form_id: &str,
    fields: I,
    transform: F,
) -> Result<(), TrackerError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
    F: FnOnce(Vec<(String, String)>) -> Map<String, Value>,
{
    let fields: Vec<(String, String)> = fields
        .into_iter()
        .map(|(key, value)| (key.into(), value.to_string()))
        .collect();
    let form_data = transform(fields);

    tracker.track_event(
        "formSubmit",
        json!({
            "formId": form_id,
            "formData": form_data,
        }),
        None,
    )
}

/**
 * Measures how long a page stays open
 * Emits pageStay when dropped
 */
pub struct PageStayGuard {
    tracker: Arc<Tracker>,
    started_at: Instant,
}

impl PageStayGuard {
    pub fn new(tracker: Arc<Tracker>) -> Self {
        Self {
            tracker,
            started_at: Instant::now(),
        }
    }

    pub fn elapsed_millis(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

impl Drop for PageStayGuard {
    fn drop(&mut self) {
        let params = json!({
            "duration": self.elapsed_millis(),
            "scrollDepth": self.tracker.environment().scroll_depth(),
        });
        // Failures were already logged by the tracker
        let _ = self.tracker.track_event("pageStay", params, None);
    }
}

/**
 * Measures how long a component is visible
 *
 * Visible then hidden emits one exposure event. Dropping the tracker
 * while the component is still visible emits the final one.
 */
pub struct ExposureTracker {
    tracker: Arc<Tracker>,
    component_id: String,
    component_name: String,
    visible_since: Option<Instant>,
}

impl ExposureTracker {
    pub fn new(tracker: Arc<Tracker>, component_id: impl Into<String>, component_name: impl Into<String>) -> Self {
        Self {
            tracker,
            component_id: component_id.into(),
            component_name: component_name.into(),
            visible_since: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible_since.is_some()
    }

    /**
     * Report a visibility change
     * Repeated reports of the same state are ignored
     */
    pub fn set_visible(&mut self, visible: bool) -> Result<(), TrackerError> {
        match (visible, self.visible_since) {
            (true, None) => {
                self.visible_since = Some(Instant::now());
                Ok(())
            }
            (false, Some(since)) => {
                self.visible_since = None;
                self.emit(since)
            }
            _ => Ok(()),
        }
    }

    fn emit(&self, since: Instant) -> Result<(), TrackerError> {
        self.tracker.track_event(
            "exposure",
            json!({
                "componentId": self.component_id,
                "componentName": self.component_name,
                "duration": since.elapsed().as_millis() as u64,
            }),
            None,
        )
    }
}

impl Drop for ExposureTracker {
    fn drop(&mut self) {
        if let Some(since) = self.visible_since.take() {
            let _ = self.emit(since);
        }
    }
}
