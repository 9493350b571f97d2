// Logger core: the produce path, the flush task, and the lifecycle.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use crate::config::{ConfigError, LoggerConfig};
use crate::entry::{utf8_truncate, Level, LogEntry, LEVEL_COUNT, MAX_LINE};
use crate::flush::FlushEngine;
use crate::format::{format_template, Loggable};
use crate::overflow::{FallbackQueue, OverflowRing};
use crate::queue::MpmcRing;
use crate::sink::Sink;

thread_local! {
    // message assembly buffer; grows once to typical line size and stays
    static SCRATCH: RefCell<String> = RefCell::new(String::with_capacity(512));
    static SPILL: RefCell<ThreadSpill> = RefCell::new(ThreadSpill::new());
}

/// A thread's spill ring together with the logger it currently serves.
/// Records parked here are surrendered to the owner's fallback queue when
/// the thread exits or starts producing into a different logger, so a ring
/// never strands records and never leaks them across loggers.
struct ThreadSpill {
    ring: OverflowRing,
    owner: Weak<Logger>,
}

impl ThreadSpill {
    fn new() -> Self {
        Self {
            ring: OverflowRing::new(),
            owner: Weak::new(),
        }
    }

    fn ring_for(&mut self, logger: &Arc<Logger>) -> &mut OverflowRing {
        if !std::ptr::eq(self.owner.as_ptr(), Arc::as_ptr(logger)) {
            if !self.ring.is_empty() {
                match self.owner.upgrade() {
                    Some(previous) => previous.fallback.spill_ring(&mut self.ring),
                    // the previous logger is gone; its records have nowhere
                    // left to go
                    None => while self.ring.try_pop().is_some() {},
                }
            }
            self.owner = Arc::downgrade(logger);
        }
        &mut self.ring
    }
}

impl Drop for ThreadSpill {
    fn drop(&mut self) {
        if !self.ring.is_empty() {
            if let Some(owner) = self.owner.upgrade() {
                owner.fallback.spill_ring(&mut self.ring);
            }
        }
    }
}

/// Overflow counters, monotonically non-decreasing, populated only when
/// `track_metrics` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggerStats {
    /// Times the MPMC ring was full at the moment of a produce attempt.
    pub overflow_pushes: u64,
    /// Records routed to the mutex-guarded fallback queue.
    pub backpressure_spins: u64,
}

/// The logger. Usually reached through [`init`] and the `log_*` macros; can
/// also be held as an explicit handle when a process hosts several runtimes
/// or tests need isolation.
pub struct Logger {
    queue: MpmcRing,
    fallback: FallbackQueue,
    engine: Mutex<FlushEngine>,
    flush_interval: Duration,
    track_metrics: bool,
    shutting_down: AtomicBool,
    flusher_started: AtomicBool,
    produce_seq: AtomicU64,
    overflow_pushes: AtomicU64,
    backpressure_spins: AtomicU64,
}

impl Logger {
    /// Open all sinks and build the queues. Does not spawn the flush task;
    /// call [`Logger::start`] from inside the runtime, or rely on the inline
    /// early drain.
    pub fn new(config: LoggerConfig) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;

        let enable_color = config.enable_color_stdout;
        let sinks: [Sink; LEVEL_COUNT] =
            std::array::from_fn(|i| Sink::open(config.sink_path(Level::ALL[i]), enable_color));
        let engine = FlushEngine::new(
            sinks,
            config.clamped_batch_size(),
            config.max_file_size_bytes,
            config.max_files,
            config.json_mode,
            enable_color,
        );

        Ok(Arc::new(Self {
            queue: MpmcRing::with_capacity_pow2(config.queue_capacity_pow2),
            fallback: FallbackQueue::new(),
            engine: Mutex::new(engine),
            flush_interval: Duration::from_nanos(config.flush_interval_ns),
            track_metrics: config.track_metrics,
            shutting_down: AtomicBool::new(false),
            flusher_started: AtomicBool::new(false),
            produce_seq: AtomicU64::new(0),
            overflow_pushes: AtomicU64::new(0),
            backpressure_spins: AtomicU64::new(0),
        }))
    }

    /// Spawn the flush task on the current tokio runtime. A no-op outside a
    /// runtime; produce calls then drain inline until one exists.
    pub fn start(self: &Arc<Self>) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let logger = Arc::clone(self);
            handle.spawn(flush_task(logger));
        }
    }

    /// Render `template` with `args` and enqueue the record. Fire-and-forget:
    /// never blocks on I/O, never reports an error, silently drops after
    /// shutdown.
    pub fn log(self: &Arc<Self>, level: Level, template: &str, args: &[&dyn Loggable]) {
        if self.shutting_down.load(Ordering::Acquire) {
            return;
        }
        let msg = render_message(|scratch| format_template(scratch, template, args));
        self.enqueue_with_overflow(LogEntry::new(level, msg, self.next_seq()));
    }

    /// Enqueue a message pre-rendered by `format_args!`.
    pub fn log_fmt(self: &Arc<Self>, level: Level, args: std::fmt::Arguments<'_>) {
        if self.shutting_down.load(Ordering::Acquire) {
            return;
        }
        let msg = render_message(|scratch| {
            use std::fmt::Write;
            let _ = write!(scratch, "{}", args);
        });
        self.enqueue_with_overflow(LogEntry::new(level, msg, self.next_seq()));
    }

    fn next_seq(&self) -> u64 {
        self.produce_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn enqueue_with_overflow(self: &Arc<Self>, entry: LogEntry) {
        SPILL.with(|cell| match cell.try_borrow_mut() {
            Ok(mut spill) => {
                let ring = spill.ring_for(self);
                self.route(ring, entry);
            }
            // produce call re-entered from inside a render; the fallback
            // queue still accepts the record
            Err(_) => {
                self.count_backpressure();
                self.fallback.enqueue(entry);
            }
        });

        if !self.flusher_started.load(Ordering::Acquire) {
            self.flush_early();
        }
    }

    // Tier order must match flush order: the spill ring drains into the MPMC
    // ring only while the fallback queue is empty, and once records sit in
    // the fallback every later record follows them there. That keeps each
    // thread's records in produce order across all three tiers.
    fn route(&self, ring: &mut OverflowRing, entry: LogEntry) {
        if !ring.is_empty() {
            if !self.fallback.is_empty() {
                self.count_backpressure();
                self.fallback.spill(ring, entry);
                return;
            }
            self.drain_overflow(ring);
            if !ring.is_empty() {
                // MPMC still full behind the spilled records
                match ring.try_push(entry) {
                    Ok(()) => {}
                    Err(entry) => {
                        self.count_backpressure();
                        self.fallback.spill(ring, entry);
                    }
                }
                return;
            }
        }

        if !self.fallback.is_empty() {
            self.count_backpressure();
            self.fallback.enqueue(entry);
            return;
        }

        match self.queue.try_enqueue(entry) {
            Ok(()) => {}
            Err(entry) => {
                self.count_overflow_push();
                match ring.try_push(entry) {
                    Ok(()) => {}
                    Err(entry) => {
                        self.count_backpressure();
                        self.fallback.spill(ring, entry);
                    }
                }
            }
        }
    }

    /// Move spilled records back into the MPMC ring, stopping at the first
    /// refusal and restoring the refused record to the front.
    fn drain_overflow(&self, ring: &mut OverflowRing) {
        while let Some(entry) = ring.try_pop() {
            if let Err(entry) = self.queue.try_enqueue(entry) {
                ring.rollback_last_pop(entry);
                break;
            }
        }
    }

    /// Drain and write one batch. Called periodically by the flush task, by
    /// produce calls before the flush task runs, and by the shutdown drain.
    /// Returns the number of records flushed.
    pub fn flush_once_batch(&self) -> usize {
        let mut engine = self
            .engine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        engine.flush_once(&self.queue, &self.fallback)
    }

    fn flush_early(&self) {
        if let Ok(mut engine) = self.engine.try_lock() {
            engine.flush_once(&self.queue, &self.fallback);
        }
    }

    /// Stop accepting records, drain both shared queues, then fsync and close
    /// every unique sink handle once. Idempotent.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        loop {
            self.flush_once_batch();
            if self.queue.is_empty() && self.fallback.is_empty() {
                break;
            }
            std::thread::yield_now();
        }

        let mut engine = self
            .engine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        engine.close_sinks();
    }

    pub fn stats(&self) -> LoggerStats {
        LoggerStats {
            overflow_pushes: self.overflow_pushes.load(Ordering::Relaxed),
            backpressure_spins: self.backpressure_spins.load(Ordering::Relaxed),
        }
    }

    fn count_overflow_push(&self) {
        if self.track_metrics {
            self.overflow_pushes.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn count_backpressure(&self) {
        if self.track_metrics {
            self.backpressure_spins.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[cfg(test)]
    fn mark_flusher_started(&self) {
        self.flusher_started.store(true, Ordering::Release);
    }
}

/// Render into the thread-local scratch buffer, truncate on a code-point
/// boundary, and hand back an owned copy sized to the message.
fn render_message(fill: impl FnOnce(&mut String)) -> String {
    SCRATCH.with(|cell| match cell.try_borrow_mut() {
        Ok(mut scratch) => {
            scratch.clear();
            fill(&mut scratch);
            utf8_truncate(&mut scratch, MAX_LINE);
            scratch.clone()
        }
        // re-entrant produce call; render into a one-off buffer
        Err(_) => {
            let mut local = String::new();
            fill(&mut local);
            utf8_truncate(&mut local, MAX_LINE);
            local
        }
    })
}

async fn flush_task(logger: Arc<Logger>) {
    logger.flusher_started.store(true, Ordering::Release);
    loop {
        logger.flush_once_batch();
        if logger.shutting_down.load(Ordering::Acquire) {
            break;
        }
        tokio::time::sleep(logger.flush_interval).await;
    }
}

static GLOBAL: OnceLock<Arc<Logger>> = OnceLock::new();

/// Build the process-wide logger and spawn its flush task. A second call is
/// a no-op; configuration errors leave the slot unset.
pub fn init(config: LoggerConfig) -> Result<(), ConfigError> {
    if GLOBAL.get().is_some() {
        return Ok(());
    }
    let logger = Logger::new(config)?;
    if GLOBAL.set(Arc::clone(&logger)).is_ok() {
        logger.start();
    }
    Ok(())
}

/// Drain and close the process-wide logger. Produce calls after this return
/// without effect.
pub fn shutdown() {
    if let Some(logger) = GLOBAL.get() {
        logger.shutdown();
    }
}

/// Counters of the process-wide logger; zeros before `init`.
pub fn stats() -> LoggerStats {
    GLOBAL.get().map(|logger| logger.stats()).unwrap_or_default()
}

pub fn log(level: Level, template: &str, args: &[&dyn Loggable]) {
    if let Some(logger) = GLOBAL.get() {
        logger.log(level, template, args);
    }
}

pub fn log_fmt(level: Level, args: std::fmt::Arguments<'_>) {
    if let Some(logger) = GLOBAL.get() {
        logger.log_fmt(level, args);
    }
}
