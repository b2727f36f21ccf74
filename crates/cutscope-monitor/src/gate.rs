//! Bounded handoff of uploaded frames from the renderer to the display.
//!
//! The gate owns a small ring of buffer slots (two or three). Each slot is in
//! exactly one state at a time:
//!
//! ```text
//!   Free ──acquire──► Writing ──publish──► Ready ──consume──► Displayed
//!    ▲                  │                   │                   │
//!    └──── drop/stale ──┘◄──── superseded ──┘◄── next consume ──┘
//! ```
//!
//! Only the renderer touches a `Writing` slot and only the display touches the
//! `Displayed` one, so the slot buffers never see a concurrent reader and
//! writer. Publication is latest-wins: a newer `Ready` slot frees the older
//! one instead of queueing behind it.

use cutscope_core::RationalTime;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("frame gate closed")]
    Closed,
    /// The gate was flushed while waiting; the frame is stale.
    #[error("frame gate flushed")]
    Flushed,
    #[error("timed out waiting for a free slot")]
    Timeout,
}

/// Identity of a published frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStamp {
    /// Ingress sequence number from [`FrameGate::ticket`].
    pub seq: u64,
    pub position: i64,
    pub pts: RationalTime,
}

/// Result of a successful [`FrameGate::consume_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumed {
    pub slot: usize,
    pub stamp: FrameStamp,
    /// Frames ticketed since the previous consume that were never shown.
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Writing { epoch: u64 },
    Ready(FrameStamp),
    Displayed(FrameStamp),
}

#[derive(Debug)]
struct GateState {
    slots: Vec<SlotState>,
    epoch: u64,
    /// Lowest ticket that has not been accounted for by a consume.
    next_expected: u64,
    /// Tickets at or above `next_expected` that will never be published.
    retired: Vec<u64>,
    closed: bool,
}

/// Latest-wins slot ring between one writer thread and one reader thread.
pub struct FrameGate<T> {
    state: Mutex<GateState>,
    slot_freed: Condvar,
    buffers: Box<[Mutex<T>]>,
    tickets: AtomicU64,
}

impl<T> FrameGate<T> {
    /// Create a gate with one slot per buffer.
    ///
    /// # Panics
    /// If fewer than two buffers are given.
    pub fn new(buffers: Vec<T>) -> Self {
        assert!(buffers.len() >= 2, "frame gate needs at least two slots");
        let slots = vec![SlotState::Free; buffers.len()];
        Self {
            state: Mutex::new(GateState {
                slots,
                epoch: 0,
                next_expected: 0,
                retired: Vec::new(),
                closed: false,
            }),
            slot_freed: Condvar::new(),
            buffers: buffers.into_iter().map(Mutex::new).collect(),
            tickets: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffers.len()
    }

    /// Current flush generation.
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Hand out the next ingress sequence number.
    pub fn ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::AcqRel)
    }

    /// Claim a free slot for writing, blocking up to `timeout`.
    ///
    /// Fails with [`GateError::Flushed`] as soon as the gate's epoch differs
    /// from `epoch`, so a renderer never waits on behalf of a stale frame.
    pub fn acquire_slot(&self, epoch: u64, timeout: Duration) -> Result<SlotWriter<'_, T>, GateError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let index = loop {
            if state.closed {
                return Err(GateError::Closed);
            }
            if state.epoch != epoch {
                return Err(GateError::Flushed);
            }
            if let Some(index) = state.slots.iter().position(|s| *s == SlotState::Free) {
                break index;
            }
            if self.slot_freed.wait_until(&mut state, deadline).timed_out() {
                return Err(GateError::Timeout);
            }
        };
        state.slots[index] = SlotState::Writing { epoch };
        drop(state);

        trace!(slot = index, "slot acquired");
        Ok(SlotWriter {
            gate: self,
            index,
            guard: Some(self.buffers[index].lock()),
        })
    }

    /// Take the newest published frame, if one arrived since the last call.
    ///
    /// Never blocks on the renderer. The previously displayed slot is freed.
    pub fn consume_ready(&self) -> Option<Consumed> {
        let mut state = self.state.lock();
        let (index, stamp) = state
            .slots
            .iter()
            .enumerate()
            .find_map(|(i, s)| match s {
                SlotState::Ready(stamp) => Some((i, *stamp)),
                _ => None,
            })?;

        for slot in state.slots.iter_mut() {
            if matches!(slot, SlotState::Displayed(_)) {
                *slot = SlotState::Free;
            }
        }
        state.slots[index] = SlotState::Displayed(stamp);
        let from = state.next_expected;
        let retired = state
            .retired
            .iter()
            .filter(|&&seq| seq >= from && seq < stamp.seq)
            .count() as u64;
        let skipped = stamp.seq.saturating_sub(from).saturating_sub(retired);
        state.next_expected = from.max(stamp.seq + 1);
        let next_expected = state.next_expected;
        state.retired.retain(|&seq| seq >= next_expected);
        drop(state);
        self.slot_freed.notify_all();

        Some(Consumed {
            slot: index,
            stamp,
            skipped,
        })
    }

    /// Exclude a ticket whose frame was lost before publication from the
    /// next consume's `skipped` count.
    pub fn retire(&self, seq: u64) {
        let mut state = self.state.lock();
        if seq >= state.next_expected {
            state.retired.push(seq);
        }
    }

    /// Read the slot currently on screen.
    pub fn with_displayed<R>(&self, f: impl FnOnce(&T, FrameStamp) -> R) -> Option<R> {
        let (index, stamp) = {
            let state = self.state.lock();
            state.slots.iter().enumerate().find_map(|(i, s)| match s {
                SlotState::Displayed(stamp) => Some((i, *stamp)),
                _ => None,
            })?
        };
        // Only the reader moves a slot out of Displayed, so it stays ours.
        let buffer = self.buffers[index].lock();
        Some(f(&buffer, stamp))
    }

    pub fn displayed(&self) -> Option<FrameStamp> {
        self.state.lock().slots.iter().find_map(|s| match s {
            SlotState::Displayed(stamp) => Some(*stamp),
            _ => None,
        })
    }

    /// Whether a published frame is waiting for the display.
    pub fn has_ready(&self) -> bool {
        self.state
            .lock()
            .slots
            .iter()
            .any(|s| matches!(s, SlotState::Ready(_)))
    }

    /// Discard every published but undisplayed frame and invalidate writers
    /// that are still uploading. The displayed frame stays on screen.
    ///
    /// Returns the new epoch.
    pub fn flush(&self) -> u64 {
        let mut state = self.state.lock();
        state.epoch += 1;
        for slot in state.slots.iter_mut() {
            if matches!(slot, SlotState::Ready(_)) {
                *slot = SlotState::Free;
            }
        }
        state.next_expected = self.tickets.load(Ordering::Acquire);
        state.retired.clear();
        let epoch = state.epoch;
        drop(state);
        self.slot_freed.notify_all();
        trace!(epoch, "gate flushed");
        epoch
    }

    /// Flush, then hand every slot not being written to `f` and mark it free.
    /// Used when the profile changes and all textures must go.
    pub fn clear_all(&self, mut f: impl FnMut(&mut T)) -> u64 {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.next_expected = self.tickets.load(Ordering::Acquire);
        state.retired.clear();
        for (slot, buffer) in state.slots.iter_mut().zip(self.buffers.iter()) {
            if matches!(slot, SlotState::Writing { .. }) {
                continue;
            }
            *slot = SlotState::Free;
            f(&mut buffer.lock());
        }
        let epoch = state.epoch;
        drop(state);
        self.slot_freed.notify_all();
        epoch
    }

    /// Wake any waiting writer and refuse further acquisitions.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.slot_freed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Run `f` on every slot buffer. Caller guarantees no writer is active.
    pub fn for_each_buffer(&self, mut f: impl FnMut(&mut T)) {
        for buffer in self.buffers.iter() {
            f(&mut buffer.lock());
        }
    }

    fn finish_write(&self, index: usize, stamp: Option<FrameStamp>) -> bool {
        let mut state = self.state.lock();
        let SlotState::Writing { epoch } = state.slots[index] else {
            panic!(
                "slot {index} published while {:?}; the renderer does not own it",
                state.slots[index]
            );
        };
        let accepted = match stamp {
            Some(stamp) if epoch == state.epoch && !state.closed => {
                for slot in state.slots.iter_mut() {
                    if matches!(slot, SlotState::Ready(_)) {
                        *slot = SlotState::Free;
                    }
                }
                state.slots[index] = SlotState::Ready(stamp);
                true
            }
            _ => {
                state.slots[index] = SlotState::Free;
                false
            }
        };
        drop(state);
        self.slot_freed.notify_all();
        accepted
    }
}

/// Exclusive write access to one slot buffer.
///
/// Dropping the writer without publishing returns the slot to the free pool.
pub struct SlotWriter<'a, T> {
    gate: &'a FrameGate<T>,
    index: usize,
    guard: Option<MutexGuard<'a, T>>,
}

impl<T> SlotWriter<'_, T> {
    pub fn slot(&self) -> usize {
        self.index
    }

    /// Hand the slot to the display. Returns `false` if the gate was flushed
    /// or closed since the slot was acquired; the frame is then discarded.
    pub fn publish(mut self, stamp: FrameStamp) -> bool {
        self.guard.take();
        let accepted = self.gate.finish_write(self.index, Some(stamp));
        trace!(slot = self.index, position = stamp.position, accepted, "slot published");
        std::mem::forget(self);
        accepted
    }
}

impl<T> Deref for SlotWriter<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // present until publish or drop
        self.guard.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> DerefMut for SlotWriter<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T> Drop for SlotWriter<'_, T> {
    fn drop(&mut self) {
        self.guard.take();
        self.gate.finish_write(self.index, None);
    }
}
