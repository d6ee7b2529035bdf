//! The time-ordered event queue: deferred effects resolved against a moving
//! clock.
//!
//! Commands and the autonomous scheduler place [`EventPayload`]s keyed by a
//! trigger time strictly in the future. [`EventQueue::advance`] moves the
//! clock forward and fires every due event in `(trigger_time,
//! sequence_number)` order -- FIFO among equal triggers, never reordered,
//! never fired twice. Each firing applies its payload to the world graph and
//! ledger *before* the next event fires, so same-tick events observe each
//! other's consequences.
//!
//! A fired event may itself schedule a follow-up (recurring stipends do). If
//! the follow-up's trigger still falls inside the window being advanced over,
//! it fires within the same `advance` call: the queue is re-checked until no
//! due event remains. This makes firing order invariant under advance
//! granularity -- one big advance and several small ones produce the same
//! final state.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap};

use serde::{Deserialize, Serialize};
use tracing::warn;

use fugue_world::entity::EntityId;
use fugue_world::graph::{EntityProto, WorldGraph};
use fugue_world::ledger::ResourceLedger;

use crate::clock::{Clock, GameDuration, GameTime};
use crate::narrate::{Narration, NarrationLog};
use crate::QueueError;

// ---------------------------------------------------------------------------
// EventHandle
// ---------------------------------------------------------------------------

/// A handle to a scheduled event, valid until the event fires or is
/// cancelled. Handles are never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventHandle(u64);

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// The deferred effect carried by a scheduled event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    /// Spawn `item` into `dest` (falling back to the enclosing location if
    /// `dest` is closed or full -- see `WorldGraph::deliver`).
    DeliverItem { item: EntityProto, dest: EntityId },
    /// Credit the ledger, optionally rescheduling itself `repeat_every`
    /// later -- the recurring stipend.
    CreditFunds {
        amount: i64,
        repeat_every: Option<GameDuration>,
    },
}

// ---------------------------------------------------------------------------
// PendingEvent
// ---------------------------------------------------------------------------

/// A scheduled event waiting in the queue. `seq` doubles as the handle value
/// and as the FIFO tie-break among equal trigger times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PendingEvent {
    pub(crate) trigger: GameTime,
    pub(crate) seq: u64,
    pub(crate) payload: EventPayload,
}

impl Ord for PendingEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.trigger
            .cmp(&other.trigger)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for PendingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// EventQueue
// ---------------------------------------------------------------------------

/// The event queue and the clock it advances. The clock lives here because
/// every legal clock movement must resolve due events on the way.
#[derive(Debug, Clone)]
pub struct EventQueue {
    clock: Clock,
    heap: BinaryHeap<Reverse<PendingEvent>>,
    /// Sequence numbers of events that are scheduled and neither fired nor
    /// cancelled. Cancellation leaves the heap entry in place; firing skips
    /// entries no longer in this set.
    pending: BTreeSet<u64>,
    next_seq: u64,
}

impl EventQueue {
    /// An empty queue with the clock at the epoch.
    pub fn new() -> Self {
        Self::starting_at(GameTime::EPOCH)
    }

    /// An empty queue with the clock at `start`.
    pub fn starting_at(start: GameTime) -> Self {
        Self {
            clock: Clock::starting_at(start),
            heap: BinaryHeap::new(),
            pending: BTreeSet::new(),
            next_seq: 0,
        }
    }

    /// The current instant.
    pub fn now(&self) -> GameTime {
        self.clock.now()
    }

    /// Number of scheduled, not-yet-resolved events.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the handle refers to a scheduled, not-yet-resolved event.
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.pending.contains(&handle.0)
    }

    /// Schedule a payload to fire at `trigger`.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotInFuture`] unless `trigger` is strictly after the
    /// current clock -- immediate and backward scheduling are rejected to
    /// keep firing order well-defined.
    pub fn schedule(
        &mut self,
        trigger: GameTime,
        payload: EventPayload,
    ) -> Result<EventHandle, QueueError> {
        if trigger <= self.clock.now() {
            return Err(QueueError::NotInFuture {
                trigger,
                now: self.clock.now(),
            });
        }
        Ok(self.enqueue(trigger, payload))
    }

    /// Remove a not-yet-fired event.
    ///
    /// # Errors
    ///
    /// [`QueueError::AlreadyResolved`] if the event fired or was cancelled.
    pub fn cancel(&mut self, handle: EventHandle) -> Result<(), QueueError> {
        if self.pending.remove(&handle.0) {
            Ok(())
        } else {
            Err(QueueError::AlreadyResolved { handle })
        }
    }

    /// Remove a not-yet-fired event and hand back its trigger and payload,
    /// so a rolled-back cancellation can be rescheduled.
    pub(crate) fn take(
        &mut self,
        handle: EventHandle,
    ) -> Result<(GameTime, EventPayload), QueueError> {
        if !self.pending.remove(&handle.0) {
            return Err(QueueError::AlreadyResolved { handle });
        }
        let mut taken = None;
        let entries = std::mem::take(&mut self.heap);
        for Reverse(ev) in entries.into_iter() {
            if ev.seq == handle.0 {
                taken = Some((ev.trigger, ev.payload));
            } else {
                self.heap.push(Reverse(ev));
            }
        }
        taken.ok_or(QueueError::AlreadyResolved { handle })
    }

    /// Move the clock to `to`, firing every due event in order.
    ///
    /// Returns how many events fired. The queue is re-checked after each
    /// firing, so events scheduled *by* a firing still fire in this call if
    /// their trigger lands inside the window.
    ///
    /// # Errors
    ///
    /// [`QueueError::MovedBackward`] if `to` precedes the current clock.
    pub fn advance(
        &mut self,
        to: GameTime,
        graph: &mut WorldGraph,
        ledger: &mut ResourceLedger,
        log: &mut NarrationLog,
    ) -> Result<usize, QueueError> {
        self.clock.advance_to(to)?;

        let mut fired = 0;
        loop {
            let due = matches!(self.heap.peek(), Some(Reverse(ev)) if ev.trigger <= to);
            if !due {
                break;
            }
            let Some(Reverse(event)) = self.heap.pop() else {
                break;
            };
            if !self.pending.remove(&event.seq) {
                continue; // cancelled; the heap entry was left behind
            }
            self.fire(event, graph, ledger, log);
            fired += 1;
        }
        Ok(fired)
    }

    // -- internals ----------------------------------------------------------

    fn enqueue(&mut self, trigger: GameTime, payload: EventPayload) -> EventHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(PendingEvent {
            trigger,
            seq,
            payload,
        }));
        self.pending.insert(seq);
        EventHandle(seq)
    }

    /// Apply one payload. Firing is itself a small internal effect, applied
    /// fully before the next due event is considered.
    fn fire(
        &mut self,
        event: PendingEvent,
        graph: &mut WorldGraph,
        ledger: &mut ResourceLedger,
        log: &mut NarrationLog,
    ) {
        match event.payload {
            EventPayload::DeliverItem { item, dest } => match graph.deliver(&item, dest) {
                Ok((_, landed)) => {
                    let dest_name = graph
                        .name(landed)
                        .map(str::to_owned)
                        .unwrap_or_default();
                    log.push(Narration::ItemDelivered {
                        item: item.name,
                        dest: dest_name,
                    });
                }
                Err(err) => {
                    warn!(item = %item.name, %err, "delivery could not land anywhere, parcel lost");
                }
            },
            EventPayload::CreditFunds {
                amount,
                repeat_every,
            } => {
                ledger.credit(amount);
                log.push(Narration::FundsCredited { amount });
                if let Some(period) = repeat_every {
                    if period.is_zero() {
                        warn!("zero-period recurring credit dropped");
                    } else {
                        self.enqueue(
                            event.trigger + period,
                            EventPayload::CreditFunds {
                                amount,
                                repeat_every: Some(period),
                            },
                        );
                    }
                }
            }
        }
    }

    // -- snapshot -----------------------------------------------------------

    /// Capture the queue: clock, counters, and every still-pending event.
    pub fn snapshot(&self) -> QueueSnapshot {
        let mut events: Vec<PendingEvent> = self
            .heap
            .iter()
            .filter(|Reverse(ev)| self.pending.contains(&ev.seq))
            .map(|Reverse(ev)| ev.clone())
            .collect();
        events.sort();
        QueueSnapshot {
            now: self.clock.now(),
            next_seq: self.next_seq,
            events,
        }
    }

    /// Rebuild a queue from a snapshot. Handles captured before the snapshot
    /// remain valid.
    pub fn from_snapshot(snapshot: QueueSnapshot) -> Self {
        let mut queue = Self::starting_at(snapshot.now);
        queue.next_seq = snapshot.next_seq;
        for event in snapshot.events {
            queue.pending.insert(event.seq);
            queue.heap.push(Reverse(event));
        }
        queue
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// QueueSnapshot
// ---------------------------------------------------------------------------

/// Serializable queue state: clock, sequence counter, pending events in
/// firing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    now: GameTime,
    next_seq: u64,
    events: Vec<PendingEvent>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
