/**
 * ============================================================================
 * PULSE TRACKER DEMO
 * ============================================================================
 *
 * Runs the tracker against an in-memory network and prints every request
 * the collector would have received.
 *
 * RUST_LOG=debug shows the tracker's own log output.
 *
 * ============================================================================
 */

use pulse_tracker::{
    track_button_click, track_form_submit, track_page_view, ExposureTracker, PageStayGuard,
    RecordedRequest, RecordingNetwork, StaticEnvironment, Tracker, TrackerConfig,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DYNAMIC_SCHEMA: &str = r#"{
    "version": "1.1.0",
    "events": {
        "dynamic_promo_click": {
            "priority": "high",
            "params": {
                "promoId": { "type": "string", "required": true },
                "location": { "type": "string" }
            }
        }
    }
}"#;

fn print_request(request: &RecordedRequest) {
    let payload = request
        .payload()
        .map(|payload| serde_json::to_string_pretty(&payload).unwrap_or_default())
        .unwrap_or_else(|| request.url.clone());
    println!(
        "[Collector] {:?} at {} ({} event(s))\n{}",
        request.kind,
        request.received_at.format("%H:%M:%S%.3f"),
        request.event_count(),
        payload
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pulse_tracker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let network = Arc::new(RecordingNetwork::new());
    network.set_log_callback(print_request);

    let env = Arc::new(
        StaticEnvironment::new("https://demo.pulse.dev/", "pulse-demo/0.1")
            .with_title("Pulse Demo")
            .with_referrer("https://search.example.com/"),
    );

    let mut config = TrackerConfig::with_endpoint("http://localhost:8080/api/track");
    config.auto_track = true;
    let tracker = Arc::new(Tracker::with_network(config, env.clone(), network.clone())?);

    println!("== Page view (batched)");
    track_page_view(&tracker, Some("Landing"))?;

    println!("== Purchase (sent immediately)");
    tracker.track_event(
        "purchase",
        json!({"orderId": "ORD-1001", "amount": 99.5, "currency": "USD", "items": ["sku-1"]}),
        None,
    )?;

    println!("== Interactions fill the batch");
    track_button_click(&tracker, Some("hero-cta"), None, "Get started", Some(json!({"variant": "b"})))?;
    track_form_submit(&tracker, "newsletter", [("email", "reader@example.com")])?;
    {
        let mut banner = ExposureTracker::new(tracker.clone(), "banner-summer", "Summer Banner");
        banner.set_visible(true)?;
        tokio::time::sleep(Duration::from_millis(150)).await;
        banner.set_visible(false)?;
    }

    println!("== Timer flush");
    tracker.track_event("pageView", json!({"pageTitle": "Pricing", "referrer": ""}), None)?;
    tokio::time::sleep(tracker.config().flush_interval() + Duration::from_millis(200)).await;

    println!("== Schema update and dynamic event");
    tracker.load_schema_json(DYNAMIC_SCHEMA)?;
    println!("schema version is now {}", tracker.schema().version());
    tracker.track_event(
        "dynamic_promo_click",
        json!({"promoId": "SUMMER24", "location": "header"}),
        None,
    )?;

    println!("== Invalid event is dropped in production mode");
    tracker.track_event("unknownEvent", json!({"foo": "bar"}), None)?;

    println!("== Unload flush via beacon");
    {
        env.set_scroll(800.0, 900.0, 3400.0);
        let _stay = PageStayGuard::new(tracker.clone());
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    tracker.shutdown();

    let stats = tracker.statistics();
    println!(
        "Dispatched {} event(s) in {} batch(es), {} immediate, {} unload flush(es); {} request(s) recorded",
        stats.events_dispatched,
        stats.batches_dispatched,
        stats.immediate_sends,
        stats.unload_flushes,
        network.count()
    );
    Ok(())
}
