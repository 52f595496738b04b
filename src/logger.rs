//! Logging capability handed to the engine through the [`Context`](crate::Context).

use crate::result::{StepError, StepState};
use crate::step::StepName;
use serde::Serialize;
use std::fmt;
use tracing::Level;

/// Structured record emitted once per step execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLogRecord {
    pub step_name: StepName,
    pub state: StepState,
    pub message: Option<String>,
    pub error: Option<StepError>,
    pub run_count: u32,
    pub max_run_attempts: u32,
}

impl fmt::Display for StepLogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Step: {} State: {} {}/{}",
            self.step_name, self.state, self.run_count, self.max_run_attempts
        )?;
        if let Some(message) = &self.message {
            write!(f, " Message: {}", message)?;
        }
        if let Some(error) = &self.error {
            write!(f, " Error: {}", error)?;
        }
        Ok(())
    }
}

/// Sink for step records and free-form messages.
///
/// The engine calls [`StepLogger::log_step`] after every execution whether or
/// not step logging is enabled; implementations decide what to drop.
///
/// # Examples
///
/// ```
/// use stepchain::{StepLogRecord, StepLogger};
/// use std::sync::Mutex;
///
/// #[derive(Default)]
/// struct Collecting(Mutex<Vec<String>>);
///
/// impl StepLogger for Collecting {
///     fn log_step(&self, record: &StepLogRecord) {
///         if let Ok(mut lines) = self.0.lock() {
///             lines.push(record.to_string());
///         }
///     }
/// }
/// ```
pub trait StepLogger: Send + Sync {
    /// Receives the record of one step execution.
    fn log_step(&self, record: &StepLogRecord);

    /// Receives a message written by a step function through
    /// [`Context::log`](crate::Context::log).
    fn log(&self, _level: Level, _message: &str) {}
}

/// Options for [`TracingLogger`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggerOpts {
    /// Emit an event for every step execution. Default: off.
    pub step_logging_enabled: bool,
}

/// [`StepLogger`] that forwards everything to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger {
    opts: LoggerOpts,
}

impl TracingLogger {
    pub fn new(opts: LoggerOpts) -> Self {
        Self { opts }
    }

    /// A logger with step logging turned on.
    pub fn enabled() -> Self {
        Self::new(LoggerOpts {
            step_logging_enabled: true,
        })
    }

    pub fn opts(&self) -> LoggerOpts {
        self.opts
    }
}

impl StepLogger for TracingLogger {
    fn log_step(&self, record: &StepLogRecord) {
        if !self.opts.step_logging_enabled {
            return;
        }

        let step = record.step_name.as_str();
        let step_message = record.message.as_deref().unwrap_or_default();
        let error = record.error.as_ref().map(ToString::to_string);
        let error = error.as_deref().unwrap_or_default();

        match record.state {
            StepState::Complete | StepState::Skipped => tracing::info!(
                step,
                state = %record.state,
                run_count = record.run_count,
                max_run_attempts = record.max_run_attempts,
                step_message,
                "step executed"
            ),
            StepState::Pending | StepState::Error => tracing::warn!(
                step,
                state = %record.state,
                run_count = record.run_count,
                max_run_attempts = record.max_run_attempts,
                step_message,
                error,
                "step executed"
            ),
            StepState::Failed => tracing::error!(
                step,
                state = %record.state,
                run_count = record.run_count,
                max_run_attempts = record.max_run_attempts,
                step_message,
                "step executed"
            ),
        }
    }

    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!("{}", message),
            Level::WARN => tracing::warn!("{}", message),
            Level::INFO => tracing::info!("{}", message),
            Level::DEBUG => tracing::debug!("{}", message),
            _ => tracing::trace!("{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn record(state: StepState) -> StepLogRecord {
        StepLogRecord {
            step_name: StepName::new("add"),
            state,
            message: None,
            error: None,
            run_count: 2,
            max_run_attempts: 5,
        }
    }

    #[test]
    fn test_record_display() {
        assert_eq!(
            record(StepState::Complete).to_string(),
            "Step: add State: complete 2/5"
        );

        let mut with_error = record(StepState::Error);
        with_error.error = Some(StepError::new("net", "reset"));
        assert_eq!(
            with_error.to_string(),
            "Step: add State: error 2/5 Error: [net] reset"
        );
    }

    #[test]
    fn test_logger_defaults_to_disabled() {
        let logger = TracingLogger::default();
        assert!(!logger.opts().step_logging_enabled);
        assert!(TracingLogger::enabled().opts().step_logging_enabled);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn output(&self) -> String {
            String::from_utf8(self.0.lock().expect("lock").clone()).expect("utf8")
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        captured.output()
    }

    #[test]
    fn test_logger_levels_follow_state() {
        let logger = TracingLogger::enabled();

        let output = capture(|| logger.log_step(&record(StepState::Complete)));
        assert!(output.contains("INFO"));
        assert!(output.contains("step executed"));
        assert!(output.contains("add"));

        let mut errored = record(StepState::Error);
        errored.error = Some(StepError::new("net", "reset"));
        let output = capture(|| logger.log_step(&errored));
        assert!(output.contains("WARN"));
        assert!(output.contains("[net] reset"));

        let output = capture(|| logger.log_step(&record(StepState::Failed)));
        assert!(output.contains("ERROR"));
    }

    #[test]
    fn test_disabled_logger_emits_nothing() {
        let logger = TracingLogger::default();
        let output = capture(|| logger.log_step(&record(StepState::Failed)));
        assert!(output.is_empty());
    }

    #[test]
    fn test_free_form_message_uses_level() {
        let logger = TracingLogger::default();
        let output = capture(|| logger.log(Level::WARN, "free-form message"));
        assert!(output.contains("WARN"));
        assert!(output.contains("free-form message"));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let value = serde_json::to_value(record(StepState::Pending)).expect("serializable");
        assert_eq!(value["stepName"], serde_json::json!("add"));
        assert_eq!(value["maxRunAttempts"], serde_json::json!(5));
    }
}
