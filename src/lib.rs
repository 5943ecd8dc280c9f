pub mod sdk;

pub use sdk::bindings::{
    track_button_click, track_form_submit, track_form_submit_with, track_page_view, ExposureTracker,
    PageStayGuard,
};
pub use sdk::config::TrackerConfig;
pub use sdk::environment::{EnvironmentContext, StaticEnvironment};
pub use sdk::event::{EventBuilder, EventRecord};
pub use sdk::policy::ErrorPolicy;
pub use sdk::queue::BatchQueue;
pub use sdk::schema::{EventDefinition, ParamSpec, Schema, SchemaRegistry, ValidationResult};
pub use sdk::tracker::{ElementInfo, HostEvent, NavigationTiming, Tracker, Visibility};
pub use sdk::transport::{
    HttpNetwork, NetworkSurface, RecordedRequest, RecordingNetwork, RequestKind, Strategy,
    StrategyDispatcher, Transport,
};
pub use sdk::types::{
    DispatchStatistics, EventBatch, FlushTrigger, ParamType, Priority, TrackerError,
};
