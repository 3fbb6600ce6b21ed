use std::fmt;

/// Verbosity used by components that choose the log level at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    None,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::None => "NONE",
        };
        f.write_str(name)
    }
}

impl LogLevel {
    fn as_log_level(&self) -> Option<log::Level> {
        match self {
            LogLevel::Trace => Some(log::Level::Trace),
            LogLevel::Debug => Some(log::Level::Debug),
            LogLevel::Info => Some(log::Level::Info),
            LogLevel::Warning => Some(log::Level::Warn),
            LogLevel::Error => Some(log::Level::Error),
            LogLevel::None => None,
        }
    }
}

/// A named logging handle. Every component gets its own instance, so records can be
/// filtered by target (for example `relayer/executor`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logger {
    target: String,
}

impl Logger {
    pub fn new(target: impl Into<String>) -> Self {
        Self { target: target.into() }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Logs `message` followed by the extras, rendered as `k = v` pairs.
    pub fn log(&self, level: LogLevel, message: &str, extras: &[&dyn fmt::Display]) {
        let Some(level) = level.as_log_level() else {
            return;
        };
        if !log::log_enabled!(target: self.target.as_str(), level) {
            return;
        }

        log::log!(target: self.target.as_str(), level, "{}{}", message, format_extras(extras));
    }

    pub fn trace(&self, message: &str, extras: &[&dyn fmt::Display]) {
        self.log(LogLevel::Trace, message, extras)
    }

    pub fn debug(&self, message: &str, extras: &[&dyn fmt::Display]) {
        self.log(LogLevel::Debug, message, extras)
    }

    pub fn info(&self, message: &str, extras: &[&dyn fmt::Display]) {
        self.log(LogLevel::Info, message, extras)
    }

    pub fn warn(&self, message: &str, extras: &[&dyn fmt::Display]) {
        self.log(LogLevel::Warning, message, extras)
    }

    pub fn error(&self, message: &str, extras: &[&dyn fmt::Display]) {
        self.log(LogLevel::Error, message, extras)
    }
}

/// Pairs the extras two at a time as ` k = v`. An odd trailing extra is dropped.
pub fn format_extras(extras: &[&dyn fmt::Display]) -> String {
    extras
        .chunks_exact(2)
        .map(|pair| format!(" {} = {}", pair[0], pair[1]))
        .collect()
}
