// SPDX-License-Identifier: Apache-2.0 OR MIT
// Log record, level table, and the per-record timestamp / thread-id sources

use std::cell::Cell;

use chrono::Utc;

/// Upper bound on message bytes carried by a single record. Longer messages
/// are truncated on a UTF-8 code-point boundary before they are enqueued.
pub const MAX_LINE: usize = 4096;

/// Log levels, least to most severe.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Critical = 5,
    Fatal = 6,
}

/// Number of levels; sink tables and staging buffers are indexed by level.
pub const LEVEL_COUNT: usize = 7;

impl Level {
    /// All levels in sink-table order.
    pub const ALL: [Level; LEVEL_COUNT] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Critical,
        Level::Fatal,
    ];

    #[inline]
    pub const fn as_usize(self) -> usize {
        self as usize
    }

    /// Single-letter tag used in the line prefix.
    pub const fn letter(self) -> char {
        match self {
            Level::Trace => 'T',
            Level::Debug => 'D',
            Level::Info => 'I',
            Level::Warn => 'W',
            Level::Error => 'E',
            Level::Critical => 'C',
            Level::Fatal => 'F',
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A single log record. Created on the producing thread, carried through the
/// queues by value, consumed exactly once by the flusher.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Process-wide produce sequence; the flusher uses it to restore produce
    /// order when a batch mixes queue and fallback records.
    pub seq: u64,
    /// Wall-clock milliseconds since the Unix epoch, read once before the
    /// first enqueue attempt.
    pub ts_ms: u64,
    /// Stable identifier of the producing OS thread.
    pub thread_id: u32,
    pub level: Level,
    /// Rendered message, valid UTF-8, at most `MAX_LINE` bytes.
    pub msg: String,
}

impl LogEntry {
    pub(crate) fn new(level: Level, msg: String, seq: u64) -> Self {
        Self {
            seq,
            ts_ms: now_ms_wallclock(),
            thread_id: current_thread_id(),
            level,
            msg,
        }
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn now_ms_wallclock() -> u64 {
    Utc::now().timestamp_millis() as u64
}

thread_local! {
    static THREAD_ID_CACHE: Cell<u32> = const { Cell::new(0) };
}

/// Stable nonzero id for the current thread, cached on first use.
pub(crate) fn current_thread_id() -> u32 {
    THREAD_ID_CACHE.with(|cache| {
        let id = cache.get();
        if id != 0 {
            return id;
        }
        let id = os_thread_id().unwrap_or_else(|| address_thread_id(cache));
        cache.set(id);
        id
    })
}

#[cfg(target_os = "linux")]
fn os_thread_id() -> Option<u32> {
    let tid = unsafe { libc::gettid() } as u32;
    (tid != 0 && tid != u32::MAX).then_some(tid)
}

#[cfg(not(target_os = "linux"))]
fn os_thread_id() -> Option<u32> {
    None
}

/// Stable nonzero 16-bit id derived from the address of the thread-local
/// cache slot.
fn address_thread_id(slot: &Cell<u32>) -> u32 {
    let id = (slot as *const Cell<u32> as usize & 0xFFFF) as u32;
    if id == 0 {
        1
    } else {
        id
    }
}

/// Truncate `s` to at most `max_bytes`, never splitting a code point.
pub(crate) fn utf8_truncate(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
