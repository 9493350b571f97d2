// Batch flush engine.
//
// One pass drains up to `batch_size` records (MPMC first, then the fallback
// queue), formats them into per-level staging buffers, and writes each
// non-empty buffer with a single syscall. Rotation is consulted once per
// level per batch, before the write, so a batch lands entirely in one file.

use std::io::Write;

use chrono::{DateTime, Utc};

use crate::entry::{Level, LogEntry, LEVEL_COUNT};
use crate::overflow::FallbackQueue;
use crate::queue::MpmcRing;
use crate::sink::Sink;

pub(crate) const COLOR_RESET: &str = "\x1b[0m";

pub(crate) const fn level_color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[90m",
        Level::Debug => "\x1b[36m",
        Level::Info => "\x1b[32m",
        Level::Warn => "\x1b[33m",
        Level::Error => "\x1b[31m",
        Level::Critical => "\x1b[91m",
        Level::Fatal => "\x1b[95m",
    }
}

/// Flusher-side state: the sink table, the reusable batch scratch, and the
/// per-level staging buffers. Lives behind the logger's flush mutex, which is
/// what makes "exactly one flusher" hold even when an early produce call
/// drains inline.
pub(crate) struct FlushEngine {
    sinks: [Sink; LEVEL_COUNT],
    scratch: Vec<LogEntry>,
    staging: [Vec<u8>; LEVEL_COUNT],
    batch_size: usize,
    max_file_size_bytes: u64,
    max_files: u32,
    json_mode: bool,
    enable_color: bool,
}

impl FlushEngine {
    pub fn new(
        sinks: [Sink; LEVEL_COUNT],
        batch_size: usize,
        max_file_size_bytes: u64,
        max_files: u32,
        json_mode: bool,
        enable_color: bool,
    ) -> Self {
        Self {
            sinks,
            scratch: Vec::with_capacity(batch_size),
            staging: std::array::from_fn(|_| Vec::new()),
            batch_size,
            max_file_size_bytes,
            max_files,
            json_mode,
            enable_color,
        }
    }

    /// Drain one batch and write it out. Returns the number of records
    /// flushed.
    pub fn flush_once(&mut self, queue: &MpmcRing, fallback: &FallbackQueue) -> usize {
        self.scratch.clear();
        let mut drained = queue.try_dequeue_bulk(&mut self.scratch, self.batch_size);
        if drained < self.batch_size {
            let from_fallback =
                fallback.dequeue_bulk(&mut self.scratch, self.batch_size - drained);
            if from_fallback > 0 {
                // a producer may have slipped records into the ring between
                // the two passes; pull those too, then restore produce order
                drained += from_fallback + queue.try_dequeue_bulk(&mut self.scratch, usize::MAX);
                self.scratch.sort_by_key(|entry| entry.seq);
            }
        }
        if drained == 0 {
            return 0;
        }

        for buf in &mut self.staging {
            buf.clear();
        }

        let scratch = std::mem::take(&mut self.scratch);
        for entry in &scratch {
            let idx = entry.level.as_usize();
            if self.json_mode {
                format_json_record(&mut self.staging[idx], entry);
            } else {
                format_text_record(&mut self.staging[idx], entry, self.sinks[idx].color_enabled);
            }
        }
        self.scratch = scratch;

        for idx in 0..LEVEL_COUNT {
            let buf = &self.staging[idx];
            if buf.is_empty() {
                continue;
            }
            let sink = &mut self.sinks[idx];
            sink.maybe_rotate(
                buf.len(),
                self.max_file_size_bytes,
                self.max_files,
                self.enable_color,
            );
            sink.write_buf(buf);
        }

        drained
    }

    /// Fsync and close each unique handle once; the shared stdout handle is
    /// only fsynced.
    pub fn close_sinks(&mut self) {
        let mut stdout_synced = false;
        for sink in &mut self.sinks {
            if sink.is_stdout() {
                if !stdout_synced {
                    sink.sync();
                    stdout_synced = true;
                }
            } else {
                sink.close();
            }
        }
    }

    #[cfg(test)]
    pub fn sink_bytes_written(&self, level: Level) -> u64 {
        self.sinks[level.as_usize()].bytes_written
    }
}

fn write_timestamp(buf: &mut Vec<u8>, ts_ms: u64) {
    let ts = DateTime::<Utc>::from_timestamp_millis(ts_ms as i64).unwrap_or(DateTime::UNIX_EPOCH);
    let _ = write!(buf, "{}", ts.format("%Y-%m-%d %H:%M:%S%.3f"));
}

pub(crate) fn format_text_record(buf: &mut Vec<u8>, entry: &LogEntry, color_enabled: bool) {
    if color_enabled {
        buf.extend_from_slice(level_color(entry.level).as_bytes());
    }
    buf.push(b'[');
    write_timestamp(buf, entry.ts_ms);
    let _ = write!(buf, "][{}][{}] ", entry.thread_id, entry.level.letter());
    buf.extend_from_slice(entry.msg.as_bytes());
    buf.push(b'\n');
    if color_enabled {
        buf.extend_from_slice(COLOR_RESET.as_bytes());
    }
}

pub(crate) fn format_json_record(buf: &mut Vec<u8>, entry: &LogEntry) {
    buf.extend_from_slice(b"{\"time\":\"");
    write_timestamp(buf, entry.ts_ms);
    let _ = write!(
        buf,
        "\",\"thread\":{},\"level\":\"{}\",\"msg\":\"",
        entry.thread_id,
        entry.level.letter()
    );
    json_escape_into(buf, &entry.msg);
    buf.extend_from_slice(b"\"}\n");
}

/// Escape quotes, backslashes and the common control characters; everything
/// else passes through byte-for-byte since the message is already UTF-8.
fn json_escape_into(buf: &mut Vec<u8>, msg: &str) {
    for &byte in msg.as_bytes() {
        match byte {
            b'"' => buf.extend_from_slice(b"\\\""),
            b'\\' => buf.extend_from_slice(b"\\\\"),
            b'\n' => buf.extend_from_slice(b"\\n"),
            b'\r' => buf.extend_from_slice(b"\\r"),
            b'\t' => buf.extend_from_slice(b"\\t"),
            _ => buf.push(byte),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: Level, ts_ms: u64, thread_id: u32, msg: &str) -> LogEntry {
        LogEntry {
            seq: ts_ms,
            ts_ms,
            thread_id,
            level,
            msg: msg.to_string(),
        }
    }

    #[test]
    fn test_text_line_exact() {
        let mut buf = Vec::new();
        format_text_record(
            &mut buf,
            &entry(Level::Info, 1_730_000_000_000, 1, "hello world"),
            false,
        );
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "[2024-10-27 05:13:20.000][1][I] hello world\n"
        );
    }

    #[test]
    fn test_text_line_millisecond_padding() {
        let mut buf = Vec::new();
        format_text_record(&mut buf, &entry(Level::Warn, 1_730_000_000_007, 42, "x"), false);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "[2024-10-27 05:13:20.007][42][W] x\n"
        );
    }

    #[test]
    fn test_text_line_colored() {
        let mut buf = Vec::new();
        format_text_record(&mut buf, &entry(Level::Error, 1_730_000_000_000, 1, "boom"), true);
        let line = String::from_utf8(buf).unwrap();
        assert!(line.starts_with("\x1b[31m["));
        assert!(line.ends_with("boom\n\x1b[0m"));
    }

    #[test]
    fn test_color_table() {
        assert_eq!(level_color(Level::Trace), "\x1b[90m");
        assert_eq!(level_color(Level::Debug), "\x1b[36m");
        assert_eq!(level_color(Level::Info), "\x1b[32m");
        assert_eq!(level_color(Level::Warn), "\x1b[33m");
        assert_eq!(level_color(Level::Error), "\x1b[31m");
        assert_eq!(level_color(Level::Critical), "\x1b[91m");
        assert_eq!(level_color(Level::Fatal), "\x1b[95m");
    }

    #[test]
    fn test_json_line_exact() {
        let mut buf = Vec::new();
        format_json_record(&mut buf, &entry(Level::Info, 1_730_000_000_000, 1, "a\"b\nc\td"));
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "{\"time\":\"2024-10-27 05:13:20.000\",\"thread\":1,\"level\":\"I\",\
             \"msg\":\"a\\\"b\\nc\\td\"}\n"
        );
    }

    #[test]
    fn test_json_escape_backslash_and_cr() {
        let mut buf = Vec::new();
        json_escape_into(&mut buf, "a\\b\rc");
        assert_eq!(buf, b"a\\\\b\\rc");
    }

    #[test]
    fn test_json_passes_utf8_verbatim() {
        let mut buf = Vec::new();
        json_escape_into(&mut buf, "héllo ☃");
        assert_eq!(buf, "héllo ☃".as_bytes());
    }

    #[test]
    fn test_flush_once_groups_by_level() {
        let dir = tempfile::tempdir().unwrap();
        let info_path = dir.path().join("info.log");
        let error_path = dir.path().join("error.log");

        let sinks: [Sink; LEVEL_COUNT] = std::array::from_fn(|i| {
            if i == Level::Info.as_usize() {
                Sink::open(Some(&info_path), false)
            } else if i == Level::Error.as_usize() {
                Sink::open(Some(&error_path), false)
            } else {
                Sink::stdout(false)
            }
        });
        let mut engine = FlushEngine::new(sinks, 512, 0, 3, false, false);

        let queue = MpmcRing::with_capacity_pow2(4);
        let fallback = FallbackQueue::new();
        queue
            .try_enqueue(entry(Level::Info, 1_730_000_000_000, 1, "first"))
            .unwrap();
        queue
            .try_enqueue(entry(Level::Error, 1_730_000_000_001, 1, "bad"))
            .unwrap();
        queue
            .try_enqueue(entry(Level::Info, 1_730_000_000_002, 1, "second"))
            .unwrap();

        assert_eq!(engine.flush_once(&queue, &fallback), 3);
        assert_eq!(engine.flush_once(&queue, &fallback), 0);
        let info_bytes = engine.sink_bytes_written(Level::Info);
        engine.close_sinks();

        let info = std::fs::read_to_string(&info_path).unwrap();
        assert_eq!(info.len() as u64, info_bytes);
        assert_eq!(
            info,
            "[2024-10-27 05:13:20.000][1][I] first\n\
             [2024-10-27 05:13:20.002][1][I] second\n"
        );
        let error = std::fs::read_to_string(&error_path).unwrap();
        assert_eq!(error, "[2024-10-27 05:13:20.001][1][E] bad\n");
    }

    #[test]
    fn test_flush_once_tops_up_from_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let info_path = dir.path().join("topup.log");

        let sinks: [Sink; LEVEL_COUNT] = std::array::from_fn(|i| {
            if i == Level::Info.as_usize() {
                Sink::open(Some(&info_path), false)
            } else {
                Sink::stdout(false)
            }
        });
        let mut engine = FlushEngine::new(sinks, 512, 0, 3, false, false);

        let queue = MpmcRing::with_capacity_pow2(4);
        let fallback = FallbackQueue::new();
        queue
            .try_enqueue(entry(Level::Info, 1_730_000_000_000, 1, "queued"))
            .unwrap();
        fallback.enqueue(entry(Level::Info, 1_730_000_000_001, 1, "spilled"));

        assert_eq!(engine.flush_once(&queue, &fallback), 2);
        assert!(fallback.is_empty());
        engine.close_sinks();

        let info = std::fs::read_to_string(&info_path).unwrap();
        assert!(info.contains("queued\n"));
        assert!(info.contains("spilled\n"));
        // queue records come before the fallback top-up
        assert!(info.find("queued").unwrap() < info.find("spilled").unwrap());
    }

    #[test]
    fn test_flush_respects_batch_size() {
        let sinks: [Sink; LEVEL_COUNT] = std::array::from_fn(|_| Sink::stdout(false));
        let mut engine = FlushEngine::new(sinks, 2, 0, 3, false, false);

        let queue = MpmcRing::with_capacity_pow2(4);
        let fallback = FallbackQueue::new();
        for i in 0..5 {
            queue
                .try_enqueue(entry(Level::Info, 0, 1, &format!("m{}", i)))
                .unwrap();
        }

        assert_eq!(engine.flush_once(&queue, &fallback), 2);
        assert_eq!(engine.flush_once(&queue, &fallback), 2);
        assert_eq!(engine.flush_once(&queue, &fallback), 1);
        assert_eq!(engine.flush_once(&queue, &fallback), 0);
    }

    #[test]
    fn test_json_mode_batch_written_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("json.log");

        let sinks: [Sink; LEVEL_COUNT] = std::array::from_fn(|i| {
            if i == Level::Debug.as_usize() {
                Sink::open(Some(&path), false)
            } else {
                Sink::stdout(false)
            }
        });
        let mut engine = FlushEngine::new(sinks, 512, 0, 3, true, false);

        let queue = MpmcRing::with_capacity_pow2(4);
        let fallback = FallbackQueue::new();
        queue
            .try_enqueue(entry(Level::Debug, 1_730_000_000_000, 7, "dbg"))
            .unwrap();

        engine.flush_once(&queue, &fallback);
        engine.close_sinks();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"time\":\"2024-10-27 05:13:20.000\",\"thread\":7,\"level\":\"D\",\"msg\":\"dbg\"}\n"
        );
    }
}
