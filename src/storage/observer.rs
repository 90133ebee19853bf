//! Query observation.
//!
//! Every database call made by the Postgres store runs through
//! [`QueryObserver::observe`], which times it and emits one log record
//! afterwards. The observer never alters the call's result.

use std::backtrace::Backtrace;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::observability::metrics;

/// Outcome of an observed database call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    Ok,
    Error,
}

impl QueryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOutcome::Ok => "ok",
            QueryOutcome::Error => "error",
        }
    }
}

/// One log entry per database call. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLogRecord {
    pub operation: String,
    /// Query text with backslashes and double quotes removed.
    pub query: String,
    pub args: Vec<String>,
    pub duration_micros: u64,
    pub outcome: QueryOutcome,
    pub error_message: Option<String>,
}

/// Timestamp captured before a call starts.
#[derive(Debug, Clone, Copy)]
pub struct QueryStart(Instant);

impl QueryStart {
    fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

/// Wraps database calls with timing and outcome logging.
#[derive(Debug, Clone)]
pub struct QueryObserver {
    enabled: bool,
    log_successes: bool,
}

impl QueryObserver {
    /// `level` gates successful-call logs: only `info` (or more verbose) and
    /// `warn` emit them. Failures are always logged while enabled.
    pub fn new(enabled: bool, level: &str) -> Self {
        let log_successes = matches!(
            level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn"
        );
        Self {
            enabled,
            log_successes,
        }
    }

    /// Observer that records nothing.
    pub fn disabled() -> Self {
        Self::new(false, "error")
    }

    /// Called before the database operation.
    pub fn before(&self) -> QueryStart {
        QueryStart(Instant::now())
    }

    /// Called after the database operation. Returns the emitted record, if any.
    pub fn after<E: Display>(
        &self,
        start: QueryStart,
        operation: &str,
        query: &str,
        args: &[String],
        error: Option<&E>,
    ) -> Option<QueryLogRecord> {
        if !self.enabled {
            return None;
        }

        let elapsed = start.elapsed();
        let record = QueryLogRecord {
            operation: operation.to_string(),
            query: sanitize_query(query),
            args: args.to_vec(),
            duration_micros: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            outcome: if error.is_some() {
                QueryOutcome::Error
            } else {
                QueryOutcome::Ok
            },
            error_message: error.map(ToString::to_string),
        };
        metrics::record_query(operation, record.outcome.as_str(), elapsed);

        match &record.error_message {
            Some(message) => {
                tracing::error!(
                    operation = %record.operation,
                    query = %record.query,
                    args = ?record.args,
                    duration_us = record.duration_micros,
                    outcome = record.outcome.as_str(),
                    error = %message,
                    backtrace = %Backtrace::force_capture(),
                    "sqlQueryErr"
                );
            }
            None if self.log_successes => {
                tracing::info!(
                    operation = %record.operation,
                    query = %record.query,
                    args = ?record.args,
                    duration_us = record.duration_micros,
                    outcome = record.outcome.as_str(),
                    "sqlQuery"
                );
            }
            None => {}
        }

        Some(record)
    }

    /// Time `call` and log its outcome, returning its result untouched.
    pub async fn observe<T, E, F>(
        &self,
        operation: &str,
        query: &str,
        args: Vec<String>,
        call: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let start = self.before();
        let result = call.await;
        self.after(start, operation, query, &args, result.as_ref().err());
        result
    }
}

/// Strip characters that would break single-line log output.
pub fn sanitize_query(query: &str) -> String {
    query.chars().filter(|c| !matches!(c, '\\' | '"')).collect()
}
