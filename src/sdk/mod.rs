/**
 * ============================================================================
 * TRACKING SDK MODULE
 * ============================================================================
 *
 * PURPOSE: Event pipeline that validates, enriches, batches and ships
 * tracking events from a host application to a collection endpoint.
 *
 * ARCHITECTURE:
 * - config: Tracker configuration, validation and persistence
 * - types: Shared data structures and the error type
 * - schema: Runtime-extensible event schema registry
 * - environment: Injectable accessors for page/host metadata
 * - event: Event record construction
 * - transport: Delivery strategies and network surfaces
 * - queue: Batching queue with size/timer/unload flushing
 * - policy: Fault-isolation boundary (strict vs lenient)
 * - tracker: Facade orchestrating the pipeline and auto-tracking
 * - bindings: Lifecycle helpers layered on top of the tracker
 *
 * ============================================================================
 */

pub mod config;
pub mod types;
pub mod schema;
pub mod environment;
pub mod event;
pub mod transport;
pub mod queue;
pub mod policy;
pub mod tracker;
pub mod bindings;
