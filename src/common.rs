// Licensed under the Apache-2.0 license

//! Logging hooks shared by the driver modules.
//!
//! Drivers take a `Logger` as a defaulted generic parameter so that release
//! builds can compile every message away with [`NoOpLogger`], while bring-up
//! builds route the same messages to a UART or any other text sink through
//! [`FmtLogger`].

use core::fmt;

/// Severity attached to a log record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Sink for driver diagnostics.
///
/// Only [`Logger::log`] is required; the level helpers forward to it.
pub trait Logger {
    fn log(&mut self, level: Level, args: fmt::Arguments<'_>);

    fn debug(&mut self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    fn info(&mut self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    fn warn(&mut self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }
}

/// Logger that discards everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log(&mut self, _level: Level, _args: fmt::Arguments<'_>) {}
}

/// Logger writing one line per record to a `core::fmt::Write` sink.
///
/// Records below `min_level` are dropped. Write errors from the sink are
/// ignored; logging must never fail a bus operation.
pub struct FmtLogger<W: fmt::Write> {
    sink: W,
    min_level: Level,
}

impl<W: fmt::Write> FmtLogger<W> {
    #[must_use]
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            min_level: Level::Debug,
        }
    }

    #[must_use]
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: fmt::Write> Logger for FmtLogger<W> {
    fn log(&mut self, level: Level, args: fmt::Arguments<'_>) {
        if level < self.min_level {
            return;
        }
        let _ = write!(self.sink, "[{}] ", level.tag());
        let _ = self.sink.write_fmt(args);
        let _ = self.sink.write_str("\r\n");
    }
}
