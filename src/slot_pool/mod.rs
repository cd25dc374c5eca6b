//! SlotPool - fixed set of concurrent session slots
//!
//! ## Responsibilities
//!
//! - Own one record per slot id (1..=K)
//! - First-available allocation by ascending sid
//! - Lifecycle transitions guarded by allocation epochs
//! - Poller handle ownership (slot teardown cancels the poller)
//!
//! ## Design
//!
//! All slots sit behind one lock. Each transition is a single
//! read-modify-write of one slot record, and the lock is never held across
//! a network call.

mod types;

pub use types::{PollerHandle, RunningSlot, SlotStatus, SlotTicket, SlotView};

use crate::error::{Error, Result};
use crate::models::StatsSnapshot;
use tokio::sync::RwLock;
use types::{Slot, SlotState};

/// Default number of slots
pub const DEFAULT_SLOT_COUNT: usize = 4;

/// Capacity error text surfaced to the operator
pub const ALL_SLOTS_BUSY: &str = "All video slots are in use. Stop a stream to add a new one.";

/// Outcome of applying a polled snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Snapshot stored
    Applied,
    /// The slot moved on (stopped or re-allocated); the poller should exit
    Stale,
}

/// SlotPool instance
pub struct SlotPool {
    slots: RwLock<Vec<Slot>>,
}

impl SlotPool {
    /// Create a pool with sids `1..=count`
    pub fn new(count: usize) -> Result<Self> {
        if count == 0 || count > u8::MAX as usize {
            return Err(Error::Config(format!(
                "slot count must be between 1 and {}, got {}",
                u8::MAX,
                count
            )));
        }

        let slots = (1..=count as u8).map(Slot::new).collect();
        Ok(Self {
            slots: RwLock::new(slots),
        })
    }

    /// Claim the lowest-sid available slot and mark it Initializing
    pub async fn allocate(&self) -> Result<SlotTicket> {
        let mut slots = self.slots.write().await;

        let slot = slots
            .iter_mut()
            .find(|s| s.is_available())
            .ok_or_else(|| Error::OverCapacity(ALL_SLOTS_BUSY.to_string()))?;

        if let SlotState::Error { message } = &slot.state {
            tracing::debug!(sid = slot.sid, previous_error = %message, "Reusing errored slot");
        }

        slot.reset();
        slot.state = SlotState::Initializing;
        let ticket = SlotTicket {
            sid: slot.sid,
            epoch: slot.epoch,
        };

        tracing::info!(sid = ticket.sid, epoch = ticket.epoch, "Slot allocated");
        Ok(ticket)
    }

    /// Attach the human readable source label to an initializing slot
    pub async fn set_source_label(&self, ticket: SlotTicket, label: String) -> bool {
        let mut slots = self.slots.write().await;
        match Self::slot_for(&mut slots, ticket) {
            Some(slot) => {
                slot.source_label = Some(label);
                true
            }
            None => false,
        }
    }

    /// Give an initializing slot back (Initializing -> Idle)
    pub async fn release(&self, ticket: SlotTicket) -> bool {
        let mut slots = self.slots.write().await;
        match Self::slot_for(&mut slots, ticket) {
            Some(slot) if matches!(slot.state, SlotState::Initializing) => {
                slot.reset();
                tracing::info!(sid = ticket.sid, "Slot released");
                true
            }
            _ => false,
        }
    }

    /// Initializing -> Running
    ///
    /// `spawn_poller` runs under the pool lock, so the poller cannot observe
    /// the slot before it is Running. It is not called for a stale ticket.
    pub async fn mark_running<F>(&self, ticket: SlotTicket, live_view_url: String, spawn_poller: F) -> bool
    where
        F: FnOnce() -> PollerHandle,
    {
        let mut slots = self.slots.write().await;
        match Self::slot_for(&mut slots, ticket) {
            Some(slot) if matches!(slot.state, SlotState::Initializing) => {
                slot.state = SlotState::Running {
                    live_view_url,
                    poller: spawn_poller(),
                };
                slot.connecting = true;
                tracing::info!(sid = ticket.sid, epoch = ticket.epoch, "Slot running");
                true
            }
            _ => false,
        }
    }

    /// Initializing -> Error
    pub async fn mark_error(&self, ticket: SlotTicket, message: String) -> bool {
        let mut slots = self.slots.write().await;
        match Self::slot_for(&mut slots, ticket) {
            Some(slot) if matches!(slot.state, SlotState::Initializing) => {
                tracing::warn!(sid = ticket.sid, error = %message, "Slot start failed");
                slot.state = SlotState::Error { message };
                slot.connecting = false;
                true
            }
            _ => false,
        }
    }

    /// Replace a running slot's snapshot wholesale
    pub async fn apply_snapshot(&self, ticket: SlotTicket, snapshot: StatsSnapshot) -> PollOutcome {
        let mut slots = self.slots.write().await;
        match Self::slot_for(&mut slots, ticket) {
            Some(slot) if matches!(slot.state, SlotState::Running { .. }) => {
                if slot.connecting {
                    tracing::info!(sid = ticket.sid, "First stats received, pipeline live");
                }
                slot.snapshot = Some(snapshot);
                slot.connecting = false;
                slot.missed_polls = 0;
                PollOutcome::Applied
            }
            _ => PollOutcome::Stale,
        }
    }

    /// Count a not-found poll reply; state is left alone
    pub async fn record_missed_poll(&self, ticket: SlotTicket) -> PollOutcome {
        let mut slots = self.slots.write().await;
        match Self::slot_for(&mut slots, ticket) {
            Some(slot) if matches!(slot.state, SlotState::Running { .. }) => {
                slot.missed_polls = slot.missed_polls.saturating_add(1);
                PollOutcome::Applied
            }
            _ => PollOutcome::Stale,
        }
    }

    /// Any state -> Idle, cancelling the slot's poller
    ///
    /// Returns the status the slot had before.
    pub async fn stop(&self, sid: u8) -> Result<SlotStatus> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .iter_mut()
            .find(|s| s.sid == sid)
            .ok_or_else(|| Error::NotFound(format!("Slot {} does not exist", sid)))?;

        let previous = slot.state.status();
        slot.reset();
        tracing::info!(sid = sid, previous = ?previous, "Slot stopped");
        Ok(previous)
    }

    /// Every slot -> Idle in one step, cancelling every poller
    ///
    /// Returns the sids that were Initializing or Running.
    pub async fn reset_all(&self) -> Vec<u8> {
        let mut slots = self.slots.write().await;
        let mut active = Vec::new();

        for slot in slots.iter_mut() {
            if slot.is_active() {
                active.push(slot.sid);
            }
            slot.reset();
        }

        tracing::info!(active = ?active, "All slots reset");
        active
    }

    /// Number of Initializing/Running slots
    pub async fn active_count(&self) -> usize {
        self.slots.read().await.iter().filter(|s| s.is_active()).count()
    }

    /// All slot ids in ascending order
    pub async fn sids(&self) -> Vec<u8> {
        self.slots.read().await.iter().map(|s| s.sid).collect()
    }

    /// Whether a ticket still owns its slot
    pub async fn is_current(&self, ticket: SlotTicket) -> bool {
        self.slots.read().await.iter().any(|s| s.holds(ticket))
    }

    /// Whether the slot is Initializing or Running under any epoch
    pub async fn is_active(&self, sid: u8) -> bool {
        self.slots
            .read()
            .await
            .iter()
            .any(|s| s.sid == sid && s.is_active())
    }

    /// View of one slot
    pub async fn view(&self, sid: u8) -> Option<SlotView> {
        self.slots
            .read()
            .await
            .iter()
            .find(|s| s.sid == sid)
            .map(|s| s.view())
    }

    /// Views of all slots, ascending sid
    pub async fn views(&self) -> Vec<SlotView> {
        self.slots.read().await.iter().map(|s| s.view()).collect()
    }

    /// Running slots that have a snapshot
    pub async fn running_with_snapshot(&self) -> Vec<RunningSlot> {
        self.slots
            .read()
            .await
            .iter()
            .filter(|s| matches!(s.state, SlotState::Running { .. }))
            .filter_map(|s| {
                s.snapshot.clone().map(|snapshot| RunningSlot {
                    sid: s.sid,
                    source_label: s.source_label.clone(),
                    snapshot,
                })
            })
            .collect()
    }

    fn slot_for(slots: &mut [Slot], ticket: SlotTicket) -> Option<&mut Slot> {
        slots.iter_mut().find(|s| s.holds(ticket))
    }
}

impl Default for SlotPool {
    fn default() -> Self {
        Self {
            slots: RwLock::new((1..=DEFAULT_SLOT_COUNT as u8).map(Slot::new).collect()),
        }
    }
}
