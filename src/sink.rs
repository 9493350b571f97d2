// Per-level output sinks and size-based rotation.
//
// A sink is either an append-mode file or the shared stdout handle. Only the
// flusher touches sink state; producers never see a file handle. Rotation
// happens strictly between two batches for a level, so one batch never spans
// two physical files.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

pub(crate) enum SinkTarget {
    Stdout,
    File(File),
}

pub(crate) struct Sink {
    pub target: SinkTarget,
    /// Destination path; `None` means stdout and disables rotation.
    pub path: Option<PathBuf>,
    /// Bytes appended since the last rotation.
    pub bytes_written: u64,
    pub color_enabled: bool,
}

impl Sink {
    /// Open a sink for `path`, falling back to stdout when the path is absent
    /// or cannot be opened.
    pub fn open(path: Option<&Path>, enable_color: bool) -> Self {
        match path {
            Some(p) => match open_append(p) {
                Ok(file) => {
                    let color_enabled = enable_color && is_tty(file.as_raw_fd());
                    Self {
                        target: SinkTarget::File(file),
                        path: Some(p.to_path_buf()),
                        bytes_written: 0,
                        color_enabled,
                    }
                }
                Err(_) => Self::stdout(enable_color),
            },
            None => Self::stdout(enable_color),
        }
    }

    pub fn stdout(enable_color: bool) -> Self {
        Self {
            target: SinkTarget::Stdout,
            path: None,
            bytes_written: 0,
            color_enabled: enable_color && is_tty(libc::STDOUT_FILENO),
        }
    }

    pub fn is_stdout(&self) -> bool {
        matches!(self.target, SinkTarget::Stdout)
    }

    /// Write a staging buffer in one syscall and account the bytes the kernel
    /// actually took. Short writes are not retried.
    pub fn write_buf(&mut self, buf: &[u8]) {
        let written = match &mut self.target {
            SinkTarget::Stdout => std::io::stdout().lock().write(buf).unwrap_or(0),
            SinkTarget::File(file) => file.write(buf).unwrap_or(0),
        };
        self.bytes_written += written as u64;
    }

    /// Rotate if appending `incoming` bytes would push the current file over
    /// the configured threshold.
    pub fn maybe_rotate(
        &mut self,
        incoming: usize,
        max_file_size_bytes: u64,
        max_files: u32,
        enable_color: bool,
    ) {
        if max_file_size_bytes == 0 {
            return;
        }
        let Some(path) = self.path.clone() else {
            return;
        };
        if self.bytes_written + incoming as u64 <= max_file_size_bytes {
            return;
        }

        self.sync();
        // drop the old handle before renaming under it
        self.target = SinkTarget::Stdout;
        rotate_files(&path, max_files);

        match open_append(&path) {
            Ok(file) => {
                self.color_enabled = enable_color && is_tty(file.as_raw_fd());
                self.target = SinkTarget::File(file);
                self.bytes_written = 0;
            }
            Err(_) => {
                // degrade to stdout; rotation is disabled for this sink from
                // here on
                self.path = None;
                self.bytes_written = 0;
                self.color_enabled = enable_color && is_tty(libc::STDOUT_FILENO);
            }
        }
    }

    /// Flush kernel buffers for this sink. Errors are ignored; stdout on a
    /// terminal typically rejects fsync.
    pub fn sync(&self) {
        match &self.target {
            SinkTarget::Stdout => unsafe {
                libc::fsync(libc::STDOUT_FILENO);
            },
            SinkTarget::File(file) => {
                let _ = file.sync_all();
            }
        }
    }

    /// Fsync and close the underlying file; stdout is only fsynced.
    pub fn close(&mut self) {
        self.sync();
        self.target = SinkTarget::Stdout;
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o644)
        .open(path)
}

fn is_tty(fd: i32) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

/// Shift rotated backups one slot up, oldest first, then retire the live
/// file to `<path>.1`. Keeps `<path>.1` .. `<path>.<max_files - 1>`; the
/// rename direction must stay highest-index-down so an older file never
/// overwrites a newer one.
fn rotate_files(path: &Path, max_files: u32) {
    if max_files < 2 {
        let _ = std::fs::remove_file(path);
        return;
    }

    let _ = std::fs::remove_file(numbered(path, max_files - 1));
    for i in (1..max_files - 1).rev() {
        let _ = std::fs::rename(numbered(path, i), numbered(path, i + 1));
    }
    let _ = std::fs::rename(path, numbered(path, 1));
}

fn numbered(path: &Path, index: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}
