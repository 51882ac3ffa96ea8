//! The ordered buffer of pending outgoing frames.
//!
//! The queue is owned by the channel worker alone; collaborator threads
//! hand frames over through the worker's command channel, never by
//! touching the queue. High-priority kinds are inserted ahead of queued
//! normal-priority frames but behind earlier high-priority frames, so
//! FIFO order holds within each priority class. A frame being written to
//! the stream has already left the queue — preemption only ever happens
//! at frame boundaries.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::{FrameError, Result};
use crate::frame::Frame;

/// Default queue byte budget: 1 MiB, same as the frame payload limit.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024 * 1024;

/// Priority-aware FIFO of frames awaiting transmission.
#[derive(Debug)]
pub struct SendQueue {
    frames: VecDeque<Frame>,
    /// Number of high-priority frames at the front of `frames`.
    high_len: usize,
    queued_bytes: usize,
    capacity: usize,
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl SendQueue {
    /// Create a queue with an explicit byte budget.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            high_len: 0,
            queued_bytes: 0,
            capacity,
        }
    }

    /// Queue a frame for transmission.
    ///
    /// High-priority kinds go in front of all queued normal-priority
    /// frames, behind high-priority frames queued earlier. Fails when the
    /// byte budget would be exceeded; a full queue means the peer has not
    /// been draining for a while and the caller decides whether that is
    /// worth a reset.
    pub fn enqueue(&mut self, frame: Frame) -> Result<()> {
        let size = frame.wire_size();
        if self.queued_bytes + size > self.capacity {
            return Err(FrameError::QueueFull {
                queued: self.queued_bytes,
                capacity: self.capacity,
            });
        }

        self.queued_bytes += size;
        if frame.kind.is_high_priority() {
            trace!(kind = %frame.kind, at = self.high_len, "queueing high-priority frame");
            self.frames.insert(self.high_len, frame);
            self.high_len += 1;
        } else {
            self.frames.push_back(frame);
        }
        Ok(())
    }

    /// The next frame to transmit, without removing it.
    pub fn front(&self) -> Option<&Frame> {
        self.frames.front()
    }

    /// Remove and return the next frame to transmit.
    pub fn pop_front(&mut self) -> Option<Frame> {
        let frame = self.frames.pop_front()?;
        self.queued_bytes -= frame.wire_size();
        self.high_len = self.high_len.saturating_sub(1);
        Some(frame)
    }

    /// Discard all pending frames (connection reset).
    pub fn clear(&mut self) {
        self.frames.clear();
        self.high_len = 0;
        self.queued_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Bytes currently queued.
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }
}
