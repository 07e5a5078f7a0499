//! Structured event definitions for logging.
//!
//! Every event carries correlation IDs (run_id, stream_id, host_id) and the
//! round stage it was emitted from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Stages of a decision round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Configuration load and engine construction.
    Init,
    /// Safety filtering of the action space.
    Filter,
    /// Bandit scoring and argmax.
    Select,
    /// Uncertainty gate.
    Gate,
    /// Outcome intake and reward assembly.
    Observe,
    /// Arm statistics update.
    Update,
    /// Online evaluation.
    Evaluate,
    /// Checkpoint export and restore.
    Checkpoint,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Filter => "filter",
            Stage::Select => "select",
            Stage::Gate => "gate",
            Stage::Observe => "observe",
            Stage::Update => "update",
            Stage::Evaluate => "evaluate",
            Stage::Checkpoint => "checkpoint",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_ERROR: &str = "config.error";
    pub const ENGINE_CREATED: &str = "engine.created";

    pub const FILTER_NO_ELIGIBLE: &str = "filter.no_eligible";

    pub const ROUND_SELECTED: &str = "round.selected";
    pub const ROUND_OVERRIDDEN: &str = "round.overridden";
    pub const ROUND_EXPIRED: &str = "round.expired";

    pub const OUTCOME_APPLIED: &str = "outcome.applied";
    pub const OUTCOME_REJECTED: &str = "outcome.rejected";
    pub const OUTCOME_UNKNOWN_ROUND: &str = "outcome.unknown_round";

    pub const POLICY_HALTED: &str = "policy.halted";

    pub const STATE_EXPORTED: &str = "state.exported";
    pub const STATE_LOADED: &str = "state.loaded";
    pub const STATE_REJECTED: &str = "state.rejected";

    pub const EVAL_SUMMARY: &str = "eval.summary";
}

/// A structured log event for JSONL output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,

    pub level: Level,

    /// Event name (e.g., "round.selected").
    pub event: String,

    /// Unique ID for this invocation of ct-core.
    pub run_id: String,

    /// Patient stream the event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,

    pub stage: Stage,

    pub host_id: String,

    pub message: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, serde_json::Value>,

    /// Round the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_id: Option<u64>,

    /// Arm the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arm: Option<usize>,
}

impl LogEvent {
    pub fn new(
        level: Level,
        event: impl Into<String>,
        run_id: impl Into<String>,
        host_id: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> Self {
        LogEvent {
            ts: Utc::now(),
            level,
            event: event.into(),
            run_id: run_id.into(),
            stream_id: None,
            stage,
            host_id: host_id.into(),
            message: message.into(),
            fields: HashMap::new(),
            round_id: None,
            arm: None,
        }
    }

    pub fn with_stream_id(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.fields.insert(key.into(), v);
        }
        self
    }

    /// Attach the round and arm this event is about.
    pub fn with_round(mut self, round_id: u64, arm: Option<usize>) -> Self {
        self.round_id = Some(round_id);
        self.arm = arm;
        self
    }

    /// Serialize to a single JSON line.
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Correlation IDs shared by every event of one engine.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub stream_id: Option<String>,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            stream_id: None,
            host_id: host_id.into(),
        }
    }

    /// Context for the current process with a fresh run ID.
    pub fn for_current_run() -> Self {
        LogContext::new(super::generate_run_id(), super::get_host_id())
    }

    pub fn with_stream_id(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    /// Stream ID for macro fields; empty when none is set.
    pub fn stream(&self) -> &str {
        self.stream_id.as_deref().unwrap_or("")
    }

    pub fn event(
        &self,
        level: Level,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        let mut e = LogEvent::new(level, event, &self.run_id, &self.host_id, stage, message);
        e.stream_id.clone_from(&self.stream_id);
        e
    }

    pub fn info(&self, event: impl Into<String>, stage: Stage, message: impl Into<String>) -> LogEvent {
        self.event(Level::Info, event, stage, message)
    }

    pub fn debug(&self, event: impl Into<String>, stage: Stage, message: impl Into<String>) -> LogEvent {
        self.event(Level::Debug, event, stage, message)
    }

    pub fn warn(&self, event: impl Into<String>, stage: Stage, message: impl Into<String>) -> LogEvent {
        self.event(Level::Warn, event, stage, message)
    }

    pub fn error(&self, event: impl Into<String>, stage: Stage, message: impl Into<String>) -> LogEvent {
        self.event(Level::Error, event, stage, message)
    }
}
