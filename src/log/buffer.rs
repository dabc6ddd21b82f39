// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Client-facing log buffer sinks.
//!
//! A `LogBuffer` is a fixed-capacity ring of structured entries that the
//! dispatcher fans complete lines into. Consumers (typically an IPC session
//! forwarding log events) drain it with [`LogBuffer::read`]. Buffers never
//! block the producer: when full, messages are dropped and the drop is made
//! visible to the consumer through a synthetic overflow entry.

use super::level::Level;
use super::ring::Ring;

/// Prefix of the synthetic entry inserted when a buffer overflows. Reserved:
/// no real module uses this name.
pub const OVERFLOW_PREFIX: &str = "overflow";

/// One captured log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Verbose prefix of the originating handle.
    pub prefix: String,
    pub level: Level,
    /// Line text, newline-terminated.
    pub text: String,
}

impl LogEntry {
    /// True for the synthetic marker inserted in place of dropped messages.
    pub fn is_overflow(&self) -> bool {
        self.prefix == OVERFLOW_PREFIX && self.level == Level::Fatal
    }
}

/// Level filter attached to a buffer at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFilter {
    /// Accept messages up to and including this level.
    AtMost(Level),
    /// Accept exactly what the terminal would print, following the
    /// terminal threshold as it changes. Used for log capture that mirrors
    /// terminal output.
    TrackTerminal,
}

pub struct LogBuffer {
    filter: BufferFilter,
    ring: Ring<LogEntry>,
    wakeup: Option<Box<dyn Fn() + Send + Sync>>,
}

impl LogBuffer {
    pub(crate) fn new(
        capacity: usize,
        filter: BufferFilter,
        wakeup: Option<Box<dyn Fn() + Send + Sync>>,
    ) -> LogBuffer {
        LogBuffer {
            filter,
            ring: Ring::new(capacity),
            wakeup,
        }
    }

    pub fn filter(&self) -> BufferFilter {
        self.filter
    }

    /// Drain one entry, oldest first. The consumer side of the ring.
    pub fn read(&self) -> Option<LogEntry> {
        self.ring.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Drop everything still queued. Used when the sink is unregistered.
    pub(crate) fn clear(&self) {
        self.ring.clear();
    }

    /// Accept threshold given the emitting handle's terminal threshold.
    /// `TrackTerminal` buffers mirror whatever that handle would print, so
    /// per-module overrides apply to them module by module.
    pub(crate) fn threshold(&self, term_level: i8) -> i8 {
        match self.filter {
            BufferFilter::AtMost(l) => l.as_i8(),
            BufferFilter::TrackTerminal => term_level,
        }
    }

    pub(crate) fn accepts(&self, level: Level, term_level: i8) -> bool {
        // Stats lines only go to buffers that asked for them outright.
        if level == Level::Stats && self.filter != BufferFilter::AtMost(Level::Stats) {
            return false;
        }
        level.as_i8() <= self.threshold(term_level)
    }

    /// Enqueue one line, applying the overflow discipline: with two or more
    /// free slots the entry is stored, with exactly one free slot a synthetic
    /// overflow marker is stored instead, and with none the line is skipped
    /// (a marker is already queued) and the wakeup stays silent. Called with
    /// the root lock held, so there is a single producer.
    pub(crate) fn dispatch(&self, prefix: &str, level: Level, text: &str) {
        match self.ring.free() {
            0 => return, // the previous write left an overflow marker
            1 => {
                let _ = self.ring.push(LogEntry {
                    prefix: OVERFLOW_PREFIX.to_string(),
                    level: Level::Fatal,
                    text: "log-message buffer overflow\n".to_string(),
                });
            }
            _ => {
                let _ = self.ring.push(LogEntry {
                    prefix: prefix.to_string(),
                    level,
                    text: text.to_string(),
                });
            }
        }
        if let Some(wakeup) = &self.wakeup {
            wakeup();
        }
    }
}

impl std::fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBuffer")
            .field("filter", &self.filter)
            .field("capacity", &self.ring.capacity())
            .field("queued", &self.ring.len())
            .finish()
    }
}
