//! Voice accumulation — collects a streamed voice message into one PCM
//! buffer for replay.
//!
//! Unlike binary transfers, a voice stream declares no length up front:
//! it is an append-only buffer keyed by (from, to), opened by VOICE_START,
//! grown by VOICE_CHUNK, and consumed by VOICE_END. Ordering inside one
//! stream connection is transport-guaranteed; on the datagram path a lost
//! chunk simply shortens the clip.

use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;

use crate::frame::VoiceFormat;

struct Take {
    format: VoiceFormat,
    pcm: Vec<u8>,
    started_at: Instant,
}

/// Table of in-flight voice messages, keyed by (from, to).
#[derive(Default)]
pub struct VoiceBank {
    active: DashMap<(String, String), Take>,
}

impl VoiceBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an accumulator. Idempotent — a second START for a live key
    /// keeps the existing buffer and its format.
    pub fn start(&self, from: &str, to: &str, format: VoiceFormat) {
        self.active
            .entry((from.to_string(), to.to_string()))
            .or_insert_with(|| Take {
                format,
                pcm: Vec::new(),
                started_at: Instant::now(),
            });
    }

    /// Append PCM bytes. Chunks for a key with no open accumulator are
    /// dropped (their START was lost or already finished).
    pub fn push(&self, from: &str, to: &str, bytes: &[u8]) {
        if let Some(mut take) = self.active.get_mut(&(from.to_string(), to.to_string())) {
            take.pcm.extend_from_slice(bytes);
        }
    }

    /// Close and consume the accumulator, yielding the declared format and
    /// the full clip. `None` when no accumulator was open for the key.
    pub fn finish(&self, from: &str, to: &str) -> Option<(VoiceFormat, Bytes)> {
        self.active
            .remove(&(from.to_string(), to.to_string()))
            .map(|(_, take)| (take.format, Bytes::from(take.pcm)))
    }

    /// Evict accumulators whose END never arrived. Returns the count.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let before = self.active.len();
        self.active
            .retain(|_, take| take.started_at.elapsed() <= max_age);
        before - self.active.len()
    }

    pub fn in_flight(&self) -> usize {
        self.active.len()
    }
}
