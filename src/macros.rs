// SPDX-License-Identifier: Apache-2.0 OR MIT
// Level macros over the process-wide logger.

/// Log at trace level through the process-wide logger.
///
/// # Examples
/// ```ignore
/// log_trace!("worker={} tick={}", id, tick);
/// ```
#[macro_export]
macro_rules! log_trace {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{
        let args: &[&dyn $crate::Loggable] = &[$(&$arg),*];
        $crate::log($crate::Level::Trace, $fmt, args);
    }};
}

/// Log at debug level through the process-wide logger.
#[macro_export]
macro_rules! log_debug {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{
        let args: &[&dyn $crate::Loggable] = &[$(&$arg),*];
        $crate::log($crate::Level::Debug, $fmt, args);
    }};
}

/// Log at info level through the process-wide logger.
#[macro_export]
macro_rules! log_info {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{
        let args: &[&dyn $crate::Loggable] = &[$(&$arg),*];
        $crate::log($crate::Level::Info, $fmt, args);
    }};
}

/// Log at warn level through the process-wide logger.
#[macro_export]
macro_rules! log_warn {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{
        let args: &[&dyn $crate::Loggable] = &[$(&$arg),*];
        $crate::log($crate::Level::Warn, $fmt, args);
    }};
}

/// Log at error level through the process-wide logger.
#[macro_export]
macro_rules! log_error {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{
        let args: &[&dyn $crate::Loggable] = &[$(&$arg),*];
        $crate::log($crate::Level::Error, $fmt, args);
    }};
}

/// Log at critical level through the process-wide logger.
#[macro_export]
macro_rules! log_critical {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{
        let args: &[&dyn $crate::Loggable] = &[$(&$arg),*];
        $crate::log($crate::Level::Critical, $fmt, args);
    }};
}

/// Log at fatal level through the process-wide logger.
#[macro_export]
macro_rules! log_fatal {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{
        let args: &[&dyn $crate::Loggable] = &[$(&$arg),*];
        $crate::log($crate::Level::Fatal, $fmt, args);
    }};
}

/// Log a `format_args!`-rendered message at an explicit level.
///
/// # Examples
/// ```ignore
/// log_write!(Level::Info, "handled {} requests in {:?}", count, elapsed);
/// ```
#[macro_export]
macro_rules! log_write {
    ($level:expr, $($fmt:tt)+) => {
        $crate::log_fmt($level, ::core::format_args!($($fmt)+))
    };
}
