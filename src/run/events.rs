//! Progress events emitted while a turn is driven.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::openai::RunStatus;
use crate::tools::ToolOutput;

/// Typed progress of one turn. Exactly one terminal variant ends a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    // -- Lifecycle --
    TurnStarted {
        run_id: String,
    },
    RunStatusChanged {
        status: RunStatus,
    },
    StepStarted {
        step_id: String,
    },
    StepEnded {
        step_id: String,
    },

    // -- Assistant text --
    TextStarted,
    TextChunk {
        text: String,
    },
    TextEnded,

    // -- Tool calls --
    ToolCallStarted {
        tool_id: String,
        tool_name: String,
    },
    ToolCallArgumentChunk {
        tool_id: String,
        chunk: String,
    },
    ToolCallReady {
        tool_id: String,
        tool_name: String,
        arguments: String,
    },
    ToolCallExecuted {
        tool_id: String,
        tool_name: String,
        output: ToolOutput,
    },
    ToolBatchCompleted {
        all_succeeded: bool,
    },
    TokenUsage {
        prompt: u64,
        completion: u64,
    },

    // -- Terminal --
    TurnEnded {
        message: String,
    },
    TurnAborted,
    TurnError {
        message: String,
    },
    TurnExpired,
    UnsupportedContent {
        kind: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TurnEnded { .. }
                | Self::TurnAborted
                | Self::TurnError { .. }
                | Self::TurnExpired
                | Self::UnsupportedContent { .. }
        )
    }
}

/// Envelope for events of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEvent {
    pub turn_id: Uuid,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

/// Stamps events with the turn id and a gap-free sequence number.
#[derive(Debug)]
pub(crate) struct EventEmitter {
    turn_id: Uuid,
    next_seq: u64,
}

impl EventEmitter {
    pub(crate) fn new(turn_id: Uuid) -> Self {
        Self {
            turn_id,
            next_seq: 0,
        }
    }

    pub(crate) fn wrap(&mut self, event: ProgressEvent) -> TurnEvent {
        let seq = self.next_seq;
        self.next_seq += 1;
        TurnEvent {
            turn_id: self.turn_id,
            seq,
            timestamp: Utc::now(),
            event,
        }
    }
}
