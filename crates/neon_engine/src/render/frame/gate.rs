//! Frames-in-flight gate
//!
//! Bounds how many submitted frames the GPU may still be working on. Each
//! acquired frame carries a [`FrameTicket`]; the backend completes the ticket
//! once the GPU has finished the frame, from whatever thread observes that.

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::render::{RenderError, RenderResult};

/// Maximum number of frames the GPU may work on concurrently
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Monotonic frame number, starting at 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

/// Completion message posted by a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCompleted {
    /// Frame that finished on the GPU
    pub frame: FrameId,
    /// Ring slot the frame read from
    pub slot: usize,
}

/// Completion notification for one in-flight frame
///
/// Completing (or dropping) the ticket posts exactly one [`FrameCompleted`] to
/// the gate. Tickets are `Send` so the release can happen on a fence-watcher
/// thread.
#[derive(Debug)]
pub struct FrameTicket {
    frame: FrameId,
    slot: usize,
    sender: Option<Sender<FrameCompleted>>,
}

impl FrameTicket {
    /// Frame this ticket belongs to
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Ring slot the frame reads from
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Attach the ring slot chosen for this frame
    pub fn with_slot(mut self, slot: usize) -> Self {
        self.slot = slot;
        self
    }

    /// Signal that the GPU finished the frame
    pub fn complete(mut self) {
        self.signal();
    }

    fn signal(&mut self) {
        if let Some(sender) = self.sender.take() {
            // The gate may already be gone during shutdown
            let _ = sender.send(FrameCompleted {
                frame: self.frame,
                slot: self.slot,
            });
        }
    }
}

impl Drop for FrameTicket {
    fn drop(&mut self) {
        self.signal();
    }
}

/// Counting gate over in-flight frames
#[derive(Debug)]
pub struct FrameGate {
    capacity: usize,
    sender: Sender<FrameCompleted>,
    receiver: Receiver<FrameCompleted>,
    outstanding: VecDeque<FrameId>,
    next_frame: u64,
}

impl FrameGate {
    /// Create a gate allowing `capacity` frames in flight
    pub fn new(capacity: usize) -> RenderResult<Self> {
        if capacity == 0 {
            return Err(RenderError::InvalidConfig("frames in flight must be at least 1".to_string()));
        }
        let (sender, receiver) = crossbeam_channel::unbounded();
        log::debug!("Created frame gate with {} frames in flight", capacity);
        Ok(Self {
            capacity,
            sender,
            receiver,
            outstanding: VecDeque::with_capacity(capacity),
            next_frame: 0,
        })
    }

    /// Maximum frames in flight
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames acquired whose completion has not been observed yet
    pub fn in_flight(&self) -> usize {
        self.outstanding.len()
    }

    /// Number of frames handed out so far
    pub fn frames_acquired(&self) -> u64 {
        self.next_frame
    }

    /// Block until a frame may be produced and return its ticket
    ///
    /// There is no timeout: if the GPU never completes an outstanding frame,
    /// this never returns.
    pub fn acquire(&mut self) -> RenderResult<FrameTicket> {
        self.drain_completed();
        while self.outstanding.len() >= self.capacity {
            let completed = self
                .receiver
                .recv()
                .map_err(|_| RenderError::Backend("frame completion channel closed".to_string()))?;
            self.release(completed);
        }
        Ok(self.issue())
    }

    /// Non-blocking acquire; `None` when the gate is full
    pub fn try_acquire(&mut self) -> Option<FrameTicket> {
        self.drain_completed();
        (self.outstanding.len() < self.capacity).then(|| self.issue())
    }

    /// Block until every outstanding frame has completed
    pub fn wait_all(&mut self) -> RenderResult<()> {
        self.drain_completed();
        while !self.outstanding.is_empty() {
            let completed = self
                .receiver
                .recv()
                .map_err(|_| RenderError::Backend("frame completion channel closed".to_string()))?;
            self.release(completed);
        }
        Ok(())
    }

    fn issue(&mut self) -> FrameTicket {
        let frame = FrameId(self.next_frame);
        self.next_frame += 1;
        self.outstanding.push_back(frame);
        log::trace!("Acquired frame {} ({} in flight)", frame.0, self.outstanding.len());
        FrameTicket {
            frame,
            slot: 0,
            sender: Some(self.sender.clone()),
        }
    }

    fn drain_completed(&mut self) {
        loop {
            match self.receiver.try_recv() {
                Ok(completed) => self.release(completed),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    fn release(&mut self, completed: FrameCompleted) {
        match self.outstanding.iter().position(|&frame| frame == completed.frame) {
            Some(index) => {
                self.outstanding.remove(index);
                log::trace!("Frame {} completed on slot {}", completed.frame.0, completed.slot);
            }
            None => log::warn!("Ignoring completion for unknown frame {}", completed.frame.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_gate_rejects_zero_capacity() {
        assert!(matches!(FrameGate::new(0), Err(RenderError::InvalidConfig(_))));
    }

    #[test]
    fn test_immediate_completion_never_blocks() {
        let mut gate = FrameGate::new(MAX_FRAMES_IN_FLIGHT).unwrap();

        for expected in 0..6 {
            let ticket = gate.acquire().unwrap();
            assert_eq!(ticket.frame(), FrameId(expected));
            ticket.complete();
        }
        gate.wait_all().unwrap();
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.frames_acquired(), 6);
    }

    #[test]
    fn test_gate_full_until_completion() {
        let mut gate = FrameGate::new(3).unwrap();
        let tickets: Vec<_> = (0..3).map(|_| gate.acquire().unwrap()).collect();

        assert_eq!(gate.in_flight(), 3);
        assert!(gate.try_acquire().is_none());

        let mut tickets = tickets.into_iter();
        tickets.next().unwrap().complete();
        let fourth = gate.try_acquire().unwrap();
        assert_eq!(fourth.frame(), FrameId(3));
        assert_eq!(gate.in_flight(), 3);
    }

    #[test]
    fn test_dropped_ticket_releases_exactly_once() {
        let mut gate = FrameGate::new(1).unwrap();
        let ticket = gate.acquire().unwrap().with_slot(0);
        drop(ticket);

        let next = gate.acquire().unwrap();
        assert_eq!(next.frame(), FrameId(1));
        assert_eq!(gate.in_flight(), 1);
    }

    #[test]
    fn test_acquire_blocks_while_first_frame_stalls() {
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let (stall_tx, stall_rx) = crossbeam_channel::bounded::<FrameTicket>(1);

        let producer = thread::spawn(move || {
            let mut gate = FrameGate::new(3).unwrap();
            let first = gate.acquire().unwrap();
            let _second = gate.acquire().unwrap();
            let _third = gate.acquire().unwrap();
            // Frame 0 stays with the test; frames 1 and 2 stay in flight here
            stall_tx.send(first).unwrap();
            let blocked = gate.acquire().unwrap();
            result_tx.send(blocked.frame()).unwrap();
        });

        let first = stall_rx.recv().unwrap();
        assert!(result_rx.recv_timeout(Duration::from_millis(100)).is_err());

        first.complete();
        assert_eq!(result_rx.recv_timeout(Duration::from_secs(5)).unwrap(), FrameId(3));
        producer.join().unwrap();
    }

    #[test]
    fn test_completion_from_other_thread() {
        let mut gate = FrameGate::new(2).unwrap();

        for _ in 0..10 {
            let ticket = gate.acquire().unwrap();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(1));
                ticket.complete();
            });
        }
        gate.wait_all().unwrap();
        assert_eq!(gate.in_flight(), 0);
    }
}
