//! Messaging capability — point-to-point tagged envelopes.

use std::future::Future;

use stiff_core::ProcessId;

use crate::error::{TransportError, TransportResult};

/// What an envelope carries. Receivers reject anything out of phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Byte length of an upcoming work payload.
    WorkSize,
    /// Encoded work items sent for solving.
    WorkPayload,
    /// Byte length of an upcoming result payload.
    ResultSize,
    /// Encoded solved items on their way home.
    ResultPayload,
    /// Encoded cost report for the all-gather.
    CostReport,
    /// A local value contributed to a group minimum.
    GroupMinimum,
}

/// A single message between two processes.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub tag: Tag,
    /// Batch the message belongs to.
    pub batch: u64,
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn new(tag: Tag, batch: u64, data: Vec<u8>) -> Self {
        Self { tag, batch, data }
    }

    /// A size declaration for a payload of `len` bytes.
    pub fn size_declaration(tag: Tag, batch: u64, len: u64) -> Self {
        Self::new(tag, batch, len.to_le_bytes().to_vec())
    }

    /// Read back the declared size of a size declaration.
    pub fn declared_size(&self, peer: ProcessId) -> TransportResult<u64> {
        let bytes: [u8; 8] = self
            .data
            .as_slice()
            .try_into()
            .map_err(|_| TransportError::MalformedDeclaration(peer))?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Check tag and batch against what the protocol expects next.
    pub fn expect(self, peer: ProcessId, tag: Tag, batch: u64) -> TransportResult<Self> {
        if self.tag != tag {
            return Err(TransportError::UnexpectedTag {
                peer,
                expected: tag,
                found: self.tag,
            });
        }
        if self.batch != batch {
            return Err(TransportError::BatchMismatch {
                peer,
                expected: batch,
                found: self.batch,
            });
        }
        Ok(self)
    }
}

/// Buffered point-to-point messaging between the processes of a fixed
/// SPMD group.
///
/// Messages between one ordered pair of processes arrive in the order they
/// were sent. `send` never waits for the receiver; `recv` blocks until a
/// message from that specific peer arrives.
pub trait Messenger: Send {
    /// This process's rank.
    fn rank(&self) -> ProcessId;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    fn send(
        &mut self,
        to: ProcessId,
        envelope: Envelope,
    ) -> impl Future<Output = TransportResult<()>> + Send;

    fn recv(&mut self, from: ProcessId) -> impl Future<Output = TransportResult<Envelope>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_declaration_round_trip() {
        let env = Envelope::size_declaration(Tag::WorkSize, 3, 123_456);
        assert_eq!(env.declared_size(1).unwrap(), 123_456);

        let bad = Envelope::new(Tag::WorkSize, 3, vec![1, 2, 3]);
        assert!(matches!(
            bad.declared_size(1),
            Err(TransportError::MalformedDeclaration(1))
        ));
    }

    #[test]
    fn expect_checks_tag_then_batch() {
        let env = Envelope::new(Tag::ResultPayload, 7, vec![]);
        assert!(matches!(
            env.clone().expect(2, Tag::WorkPayload, 7),
            Err(TransportError::UnexpectedTag { peer: 2, .. })
        ));
        assert!(matches!(
            env.clone().expect(2, Tag::ResultPayload, 8),
            Err(TransportError::BatchMismatch { expected: 8, found: 7, .. })
        ));
        assert!(env.expect(2, Tag::ResultPayload, 7).is_ok());
    }
}
