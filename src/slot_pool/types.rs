//! SlotPool types

use crate::models::StatsSnapshot;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// Externally visible lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Idle,
    Initializing,
    Running,
    Error,
}

/// Lifecycle state owned by a slot
///
/// The live-view URL and the poller only exist inside `Running`, so a slot
/// cannot be running without both, nor hold either while idle.
#[derive(Debug)]
pub(crate) enum SlotState {
    Idle,
    Initializing,
    Running {
        live_view_url: String,
        poller: PollerHandle,
    },
    Error {
        message: String,
    },
}

impl SlotState {
    pub(crate) fn status(&self) -> SlotStatus {
        match self {
            SlotState::Idle => SlotStatus::Idle,
            SlotState::Initializing => SlotStatus::Initializing,
            SlotState::Running { .. } => SlotStatus::Running,
            SlotState::Error { .. } => SlotStatus::Error,
        }
    }
}

/// Cancellable stats poller task bound to one slot
///
/// Dropping the handle aborts the task.
#[derive(Debug)]
pub struct PollerHandle {
    sid: u8,
    handle: JoinHandle<()>,
}

impl PollerHandle {
    pub fn new(sid: u8, handle: JoinHandle<()>) -> Self {
        Self { sid, handle }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.handle.abort();
        tracing::debug!(sid = self.sid, "Stats poller cancelled");
    }
}

/// One concurrent session channel
#[derive(Debug)]
pub(crate) struct Slot {
    pub sid: u8,
    pub state: SlotState,
    /// Bumped on every allocation and every stop; stale work compares against it
    pub epoch: u64,
    pub source_label: Option<String>,
    pub snapshot: Option<StatsSnapshot>,
    /// Started, but no successful poll yet
    pub connecting: bool,
    /// Consecutive not-found poll replies
    pub missed_polls: u32,
}

impl Slot {
    pub(crate) fn new(sid: u8) -> Self {
        Self {
            sid,
            state: SlotState::Idle,
            epoch: 0,
            source_label: None,
            snapshot: None,
            connecting: false,
            missed_polls: 0,
        }
    }

    /// Idle, or Error (advisory only, reusable by a fresh start)
    pub(crate) fn is_available(&self) -> bool {
        matches!(self.state, SlotState::Idle | SlotState::Error { .. })
    }

    pub(crate) fn is_active(&self) -> bool {
        matches!(
            self.state,
            SlotState::Initializing | SlotState::Running { .. }
        )
    }

    pub(crate) fn holds(&self, ticket: SlotTicket) -> bool {
        self.sid == ticket.sid && self.epoch == ticket.epoch
    }

    /// Back to Idle; drops (and thereby cancels) any poller
    pub(crate) fn reset(&mut self) {
        self.state = SlotState::Idle;
        self.epoch += 1;
        self.source_label = None;
        self.snapshot = None;
        self.connecting = false;
        self.missed_polls = 0;
    }

    pub(crate) fn view(&self) -> SlotView {
        let (live_view_url, last_error) = match &self.state {
            SlotState::Running { live_view_url, .. } => (Some(live_view_url.clone()), None),
            SlotState::Error { message } => (None, Some(message.clone())),
            SlotState::Idle | SlotState::Initializing => (None, None),
        };

        SlotView {
            sid: self.sid,
            state: self.state.status(),
            live_view_url,
            source_label: self.source_label.clone(),
            last_error,
            connecting: self.connecting,
            snapshot: self.snapshot.clone(),
            missed_polls: self.missed_polls,
        }
    }
}

/// Proof of allocation: a slot id plus the epoch it was allocated at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTicket {
    pub sid: u8,
    pub epoch: u64,
}

/// Read-only projection of a slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotView {
    pub sid: u8,
    pub state: SlotStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_view_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub connecting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<StatsSnapshot>,
    pub missed_polls: u32,
}

impl SlotView {
    /// Live-view URL present iff running
    pub fn is_consistent(&self) -> bool {
        self.live_view_url.is_some() == (self.state == SlotStatus::Running)
    }
}

/// Running slot data handed to the aggregator
#[derive(Debug, Clone)]
pub struct RunningSlot {
    pub sid: u8,
    pub source_label: Option<String>,
    pub snapshot: StatsSnapshot,
}
