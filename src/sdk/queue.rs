/**
 * ============================================================================
 * BATCHING QUEUE MODULE
 * ============================================================================
 *
 * PURPOSE: Accumulate non-urgent events and ship them in batches
 *
 * STATE MACHINE:
 *   Empty --push--> Accumulating (timer armed on first push)
 *   Accumulating --size reached | timer fired--> Flushing --> Empty
 *   any state --flush_on_unload--> Empty (beacon strategy)
 *
 * BATCHING STRATEGY:
 * - Size-based: flush synchronously on the push that reaches batch_size
 * - Time-based: flush flush_interval after the first queued event
 * - Trigger-based: manual flush, or unload flush via beacon
 * - Immediate events bypass the queue as singleton batches
 *
 * THREAD SAFETY:
 * - Pending events, the armed timer and statistics share one Mutex
 * - Batches are handed to the transport while the lock is held, so they
 *   leave in the order their triggers occurred. Transports must not call
 *   back into the queue
 * - Timers carry a generation number; a stale timer never flushes or
 *   disarms a newer one
 *
 * ============================================================================
 */

use crate::sdk::event::EventRecord;
use crate::sdk::transport::{Strategy, Transport};
use crate::sdk::types::{DispatchStatistics, EventBatch, FlushTrigger};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(2000);

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct QueueState {
    pending: Vec<EventRecord>,
    timer: Option<ArmedTimer>,
    next_generation: u64,
    statistics: DispatchStatistics,
}

struct QueueInner {
    state: Mutex<QueueState>,
    transport: Arc<dyn Transport>,
    batch_size: usize,
    flush_interval: Duration,
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /**
     * Take every pending event as one batch and disarm the timer
     */
    fn take_batch(state: &mut QueueState, trigger: FlushTrigger) -> EventBatch {
        if let Some(timer) = state.timer.take() {
            timer.handle.abort();
        }
        let events = std::mem::take(&mut state.pending);
        EventBatch::new(trigger, events)
    }

    fn dispatch(&self, state: &mut QueueState, batch: EventBatch, strategy: Strategy) {
        let stats = &mut state.statistics;
        stats.events_dispatched += batch.len() as u64;
        stats.batches_dispatched += 1;
        if batch.trigger != FlushTrigger::Immediate {
            stats.last_flush_time = Some(Utc::now());
        }

        log::info!(
            "Flushing batch {} with {} events ({:?})",
            batch.batch_id,
            batch.len(),
            batch.trigger
        );
        self.transport.send(&batch, strategy);
    }

    fn flush_from_timer(&self, generation: u64) {
        let mut state = self.lock();

        match &state.timer {
            Some(timer) if timer.generation == generation => {}
            _ => {
                log::debug!("Ignoring stale flush timer #{}", generation);
                return;
            }
        }
        // Already running; dropping the handle detaches instead of aborting
        state.timer = None;

        if state.pending.is_empty() {
            log::debug!("Flush timer fired on an empty queue");
            return;
        }

        let batch = Self::take_batch(&mut state, FlushTrigger::Timer);
        self.dispatch(&mut state, batch, Strategy::Xhr);
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = state.timer.take() {
            timer.handle.abort();
        }
        if !state.pending.is_empty() {
            log::warn!("Batch queue dropped with {} unsent events", state.pending.len());
        }
    }
}

/**
 * Buffers events and flushes them by size, timer, or on demand
 * Clones share the same queue
 */
#[derive(Clone)]
pub struct BatchQueue {
    inner: Arc<QueueInner>,
}

impl BatchQueue {
    pub fn new(transport: Arc<dyn Transport>, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    pending: Vec::new(),
                    timer: None,
                    next_generation: 0,
                    statistics: DispatchStatistics::default(),
                }),
                transport,
                batch_size: batch_size.max(1),
                flush_interval,
            }),
        }
    }

    pub fn with_defaults(transport: Arc<dyn Transport>) -> Self {
        Self::new(transport, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL)
    }

    /**
     * Add an event to the queue
     * Immediate events are sent alone via xhr and leave the queue untouched
     */
    pub fn add_event(&self, record: EventRecord, immediate: bool) {
        let mut state = self.inner.lock();

        if immediate {
            state.statistics.immediate_sends += 1;
            let batch = EventBatch::new(FlushTrigger::Immediate, vec![record]);
            self.inner.dispatch(&mut state, batch, Strategy::Xhr);
            return;
        }

        state.pending.push(record);
        state.statistics.events_queued += 1;

        if state.pending.len() >= self.inner.batch_size {
            log::debug!("Batch size threshold reached ({} events)", state.pending.len());
            let batch = QueueInner::take_batch(&mut state, FlushTrigger::Size);
            self.inner.dispatch(&mut state, batch, Strategy::Xhr);
        } else if state.timer.is_none() {
            self.arm_timer(&mut state);
        }
    }

    /**
     * Flush pending events via xhr
     * No-op when nothing is pending
     */
    pub fn flush(&self) {
        let mut state = self.inner.lock();
        if state.pending.is_empty() {
            log::debug!("Flush requested but queue is empty");
            return;
        }

        let batch = QueueInner::take_batch(&mut state, FlushTrigger::Manual);
        self.inner.dispatch(&mut state, batch, Strategy::Xhr);
    }

    /**
     * Flush pending events via beacon before the host goes away
     * The armed timer is left alone and will fire on an empty queue
     */
    pub fn flush_on_unload(&self) {
        let mut state = self.inner.lock();
        if state.pending.is_empty() {
            return;
        }

        let events = std::mem::take(&mut state.pending);
        state.statistics.unload_flushes += 1;
        let batch = EventBatch::new(FlushTrigger::Unload, events);
        self.inner.dispatch(&mut state, batch, Strategy::Beacon);
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn has_armed_timer(&self) -> bool {
        self.inner.lock().timer.is_some()
    }

    pub fn batch_size(&self) -> usize {
        self.inner.batch_size
    }

    pub fn flush_interval(&self) -> Duration {
        self.inner.flush_interval
    }

    /**
     * Get current statistics snapshot
     */
    pub fn statistics(&self) -> DispatchStatistics {
        self.inner.lock().statistics.clone()
    }

    fn arm_timer(&self, state: &mut QueueState) {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                log::warn!(
                    "No async runtime available, flush timer not armed ({} events waiting)",
                    state.pending.len()
                );
                return;
            }
        };

        state.next_generation += 1;
        let generation = state.next_generation;
        let interval = self.inner.flush_interval;
        let queue: Weak<QueueInner> = Arc::downgrade(&self.inner);

        let handle = runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            if let Some(inner) = queue.upgrade() {
                log::debug!("Batch time threshold reached ({:?})", interval);
                inner.flush_from_timer(generation);
            }
        });

        state.timer = Some(ArmedTimer { generation, handle });
    }
}
