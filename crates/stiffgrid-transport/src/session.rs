//! Per-batch transfer session.
//!
//! A session is opened when a batch starts sending work and finished once
//! every result is home. It owns the outbound buffers between the size
//! declaration and the payload transfer, and it enforces the phase order:
//!
//! ```text
//! Sending ──declare_and_receive──▶ Solving ──return_and_send──▶ Returning
//!                                                                  │
//!                                   Closed ◀──return_and_receive───┘
//! ```
//!
//! Dropping a session on any path releases its buffers.

use stiff_core::ProcessId;
use tracing::{debug, warn};

use crate::error::{TransportError, TransportResult};
use crate::messenger::{Envelope, Messenger, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Sending,
    Solving,
    Returning,
    Closed,
}

/// Traffic counters of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub payloads_sent: u32,
    pub payloads_received: u32,
}

pub struct TransferSession<'a, M: Messenger> {
    messenger: &'a mut M,
    batch: u64,
    stage: Stage,
    /// Declared but not yet transferred payloads.
    pending: Vec<(ProcessId, Vec<u8>)>,
    stats: SessionStats,
}

impl<'a, M: Messenger> TransferSession<'a, M> {
    pub fn open(messenger: &'a mut M, batch: u64) -> Self {
        debug!(rank = messenger.rank(), batch, "transfer session opened");
        Self {
            messenger,
            batch,
            stage: Stage::Sending,
            pending: Vec::new(),
            stats: SessionStats::default(),
        }
    }

    // ── Work out ───────────────────────────────────────────────────

    /// Declare a work payload to `target`; the payload follows once every
    /// declaration of this phase is exchanged.
    pub async fn declare_and_send(&mut self, target: ProcessId, payload: Vec<u8>) -> TransportResult<()> {
        if self.stage != Stage::Sending {
            return Err(TransportError::OutOfOrder("work declared after the send phase"));
        }
        self.declare(Tag::WorkSize, target, payload).await
    }

    /// Receive the work declared by `sources`, after flushing our own
    /// declared payloads. Ends the send phase.
    pub async fn declare_and_receive(
        &mut self,
        sources: &[ProcessId],
    ) -> TransportResult<Vec<(ProcessId, Vec<u8>)>> {
        if self.stage != Stage::Sending {
            return Err(TransportError::OutOfOrder("work received after the send phase"));
        }
        let received = self
            .complete_phase(Tag::WorkSize, Tag::WorkPayload, sources)
            .await?;
        self.stage = Stage::Solving;
        Ok(received)
    }

    // ── Results home ───────────────────────────────────────────────

    /// Declare solved results for their `owner`.
    pub async fn return_and_send(&mut self, owner: ProcessId, payload: Vec<u8>) -> TransportResult<()> {
        match self.stage {
            Stage::Solving | Stage::Returning => {}
            Stage::Sending => {
                return Err(TransportError::OutOfOrder("results returned before work was sent"));
            }
            Stage::Closed => return Err(TransportError::OutOfOrder("session already closed")),
        }
        self.stage = Stage::Returning;
        self.declare(Tag::ResultSize, owner, payload).await
    }

    /// Receive our own solved items back from `sources`. Ends the session.
    pub async fn return_and_receive(
        &mut self,
        sources: &[ProcessId],
    ) -> TransportResult<Vec<(ProcessId, Vec<u8>)>> {
        match self.stage {
            Stage::Solving | Stage::Returning => {}
            Stage::Sending => {
                return Err(TransportError::OutOfOrder("results received before work was sent"));
            }
            Stage::Closed => return Err(TransportError::OutOfOrder("session already closed")),
        }
        let received = self
            .complete_phase(Tag::ResultSize, Tag::ResultPayload, sources)
            .await?;
        self.stage = Stage::Closed;
        Ok(received)
    }

    /// Release the session once every result is home.
    pub fn finish(self) -> TransportResult<SessionStats> {
        if self.stage != Stage::Closed {
            return Err(TransportError::OutOfOrder("session finished before results returned"));
        }
        debug!(
            batch = self.batch,
            sent = self.stats.bytes_sent,
            received = self.stats.bytes_received,
            "transfer session closed"
        );
        Ok(self.stats)
    }

    // ── Internals ──────────────────────────────────────────────────

    async fn declare(&mut self, size_tag: Tag, target: ProcessId, payload: Vec<u8>) -> TransportResult<()> {
        let len = payload.len() as u64;
        self.messenger
            .send(target, Envelope::size_declaration(size_tag, self.batch, len))
            .await?;
        self.pending.push((target, payload));
        Ok(())
    }

    /// Receive all size declarations, flush our payloads, then receive and
    /// check every inbound payload.
    async fn complete_phase(
        &mut self,
        size_tag: Tag,
        payload_tag: Tag,
        sources: &[ProcessId],
    ) -> TransportResult<Vec<(ProcessId, Vec<u8>)>> {
        let batch = self.batch;

        let mut declared = Vec::with_capacity(sources.len());
        for &peer in sources {
            let envelope = self.messenger.recv(peer).await?.expect(peer, size_tag, batch)?;
            declared.push((peer, envelope.declared_size(peer)?));
        }

        for (target, payload) in std::mem::take(&mut self.pending) {
            self.stats.bytes_sent += payload.len() as u64;
            self.stats.payloads_sent += 1;
            self.messenger
                .send(target, Envelope::new(payload_tag, batch, payload))
                .await?;
        }

        let mut received = Vec::with_capacity(declared.len());
        for (peer, size) in declared {
            let envelope = self.messenger.recv(peer).await?.expect(peer, payload_tag, batch)?;
            let actual = envelope.data.len() as u64;
            if actual != size {
                return Err(TransportError::SizeMismatch {
                    peer,
                    declared: size,
                    actual,
                });
            }
            self.stats.bytes_received += actual;
            self.stats.payloads_received += 1;
            received.push((peer, envelope.data));
        }
        Ok(received)
    }
}

impl<M: Messenger> Drop for TransferSession<'_, M> {
    fn drop(&mut self) {
        if self.stage != Stage::Closed {
            warn!(
                batch = self.batch,
                stage = ?self.stage,
                pending = self.pending.len(),
                "transfer session released before completion"
            );
        }
        self.pending.clear();
    }
}
