//! Chunked transfer — splitting payloads and reassembling them from
//! out-of-order, possibly incomplete chunk sets.
//!
//! There is no retransmission. Correctness is "every chunk arrived before
//! END" or "the transfer is reported failed" — never a silent partial
//! result. Chunks are placed by index, never by arrival order.

use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use rand::RngCore;

use crate::frame::{BinaryKind, Destination};

/// Evict in-flight transfers with no END after this long.
pub const DEFAULT_TRANSFER_MAX_AGE: Duration = Duration::from_secs(300);

/// How often owners of a [`Reassembler`] should run [`Reassembler::sweep`].
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Split a payload into `ceil(len / chunk_size)` ordered chunks, each at
/// most `chunk_size` bytes. Empty input yields no chunks.
pub fn split(bytes: &[u8], chunk_size: usize) -> Vec<Bytes> {
    assert!(chunk_size > 0, "chunk_size must be positive");
    bytes
        .chunks(chunk_size)
        .map(Bytes::copy_from_slice)
        .collect()
}

/// Fresh caller-generated transfer id: 16 random bytes, hex-encoded.
pub fn new_transfer_id() -> String {
    let mut raw = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut raw);
    hex::encode(raw)
}

/// A fully reassembled transfer, handed out exactly once at END.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTransfer {
    pub from: String,
    pub to: Destination,
    pub id: String,
    pub kind: BinaryKind,
    pub filename: String,
    pub bytes: Bytes,
}

/// Outcome of an END record.
#[derive(Debug, Clone, PartialEq)]
pub enum EndResult {
    /// All slots were present; the payload is the slots joined in index
    /// order. The transfer is gone from the table.
    Complete(CompletedTransfer),
    /// At least one slot never arrived. The partial data is discarded —
    /// there is no buffering for late chunks.
    Incomplete {
        from: String,
        to: Destination,
        missing: usize,
    },
    /// The id is not tracked. Repeated END records land here, so callers
    /// must treat this as silence, not as an error.
    Unknown,
}

struct Transfer {
    from: String,
    to: Destination,
    kind: BinaryKind,
    filename: String,
    parts: Vec<Option<Bytes>>,
    received: usize,
    started_at: Instant,
}

/// Keyed table of in-flight transfers. Safe for concurrent use from the
/// reader task and the sweep task.
#[derive(Default)]
pub struct Reassembler {
    inflight: DashMap<String, Transfer>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or idempotently re-affirm) a transfer. Repeated START
    /// records for a live id never re-initialize it, and `total == 0`
    /// is ignored outright.
    pub fn on_start(
        &self,
        id: &str,
        from: &str,
        to: &Destination,
        kind: BinaryKind,
        filename: &str,
        total: usize,
    ) {
        if total == 0 {
            return;
        }
        self.inflight.entry(id.to_string()).or_insert_with(|| Transfer {
            from: from.to_string(),
            to: to.clone(),
            kind,
            filename: filename.to_string(),
            parts: vec![None; total],
            received: 0,
            started_at: Instant::now(),
        });
    }

    /// Place chunk bytes into their slot. Ignored unless the transfer is
    /// tracked, the index is in range, and the slot is empty — first
    /// writer wins, duplicates are dropped.
    pub fn on_chunk(&self, id: &str, index: usize, bytes: Bytes) {
        if let Some(mut transfer) = self.inflight.get_mut(id) {
            if let Some(slot @ None) = transfer.parts.get_mut(index) {
                *slot = Some(bytes);
                transfer.received += 1;
            }
        }
    }

    /// Finalize a transfer. Ids are matched verbatim, exactly as
    /// `on_start` stored them. Whatever the outcome, the id stops being
    /// tracked afterwards.
    pub fn on_end(&self, id: &str) -> EndResult {
        let Some((_, transfer)) = self.inflight.remove(id) else {
            return EndResult::Unknown;
        };

        let missing = transfer.parts.len() - transfer.received;
        if missing > 0 {
            return EndResult::Incomplete {
                from: transfer.from,
                to: transfer.to,
                missing,
            };
        }

        let total: usize = transfer
            .parts
            .iter()
            .map(|p| p.as_ref().map_or(0, Bytes::len))
            .sum();
        let mut bytes = Vec::with_capacity(total);
        for part in &transfer.parts {
            // every slot is Some here — missing == 0
            if let Some(part) = part {
                bytes.extend_from_slice(part);
            }
        }

        EndResult::Complete(CompletedTransfer {
            from: transfer.from,
            to: transfer.to,
            id: id.to_string(),
            kind: transfer.kind,
            filename: transfer.filename,
            bytes: Bytes::from(bytes),
        })
    }

    /// Drop transfers that have been in flight longer than `max_age`.
    /// Returns how many were evicted.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let before = self.inflight.len();
        self.inflight
            .retain(|_, transfer| transfer.started_at.elapsed() <= max_age);
        before - self.inflight.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}
