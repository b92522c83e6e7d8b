//! In-process channel mesh.
//!
//! Connects N endpoints with one unbounded tokio channel per ordered pair,
//! so each endpoint can run as its own task and behave like a separate
//! process. Unbounded channels give the buffered-send semantics the
//! protocol relies on: a send completes without the peer receiving.

use stiff_core::ProcessId;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::trace;

use crate::error::{TransportError, TransportResult};
use crate::messenger::{Envelope, Messenger};

/// Builder for a fully connected group of endpoints.
pub struct ChannelMesh;

impl ChannelMesh {
    /// Create `n` connected endpoints, indexed by rank.
    pub fn build(n: usize) -> Vec<MeshEndpoint> {
        let mut senders: Vec<Vec<Option<UnboundedSender<Envelope>>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();
        let mut receivers: Vec<Vec<Option<UnboundedReceiver<Envelope>>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();

        for from in 0..n {
            for to in 0..n {
                if from == to {
                    continue;
                }
                let (tx, rx) = unbounded_channel();
                senders[from][to] = Some(tx);
                receivers[to][from] = Some(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (outbound, inbound))| MeshEndpoint {
                rank,
                outbound,
                inbound,
            })
            .collect()
    }
}

/// One process's connection to the mesh.
pub struct MeshEndpoint {
    rank: ProcessId,
    /// Indexed by target rank; `None` at our own rank.
    outbound: Vec<Option<UnboundedSender<Envelope>>>,
    /// Indexed by source rank; `None` at our own rank.
    inbound: Vec<Option<UnboundedReceiver<Envelope>>>,
}

impl MeshEndpoint {
    fn check_peer(&self, peer: ProcessId) -> TransportResult<()> {
        if peer == self.rank {
            return Err(TransportError::SelfMessage(peer));
        }
        if peer >= self.outbound.len() {
            return Err(TransportError::UnknownPeer {
                peer,
                n_processes: self.outbound.len(),
            });
        }
        Ok(())
    }
}

impl Messenger for MeshEndpoint {
    fn rank(&self) -> ProcessId {
        self.rank
    }

    fn size(&self) -> usize {
        self.outbound.len()
    }

    async fn send(&mut self, to: ProcessId, envelope: Envelope) -> TransportResult<()> {
        self.check_peer(to)?;
        trace!(from = self.rank, to, tag = ?envelope.tag, bytes = envelope.data.len(), "send");
        self.outbound[to]
            .as_ref()
            .ok_or(TransportError::SelfMessage(to))?
            .send(envelope)
            .map_err(|_| TransportError::Disconnected { peer: to })
    }

    async fn recv(&mut self, from: ProcessId) -> TransportResult<Envelope> {
        self.check_peer(from)?;
        let rank = self.rank;
        let envelope = self.inbound[from]
            .as_mut()
            .ok_or(TransportError::SelfMessage(from))?
            .recv()
            .await
            .ok_or(TransportError::Disconnected { peer: from })?;
        trace!(from, to = rank, tag = ?envelope.tag, bytes = envelope.data.len(), "recv");
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::Tag;

    #[tokio::test]
    async fn messages_arrive_in_order_per_pair() {
        let mut mesh = ChannelMesh::build(3);
        let mut p2 = mesh.pop().unwrap();
        let _p1 = mesh.pop().unwrap();
        let mut p0 = mesh.pop().unwrap();

        for i in 0..3u8 {
            p0.send(2, Envelope::new(Tag::WorkPayload, 0, vec![i])).await.unwrap();
        }
        for i in 0..3u8 {
            assert_eq!(p2.recv(0).await.unwrap().data, vec![i]);
        }
    }

    #[tokio::test]
    async fn rejects_self_and_unknown_peers() {
        let mut mesh = ChannelMesh::build(2);
        let p0 = &mut mesh[0];

        assert_eq!(p0.rank(), 0);
        assert_eq!(p0.size(), 2);
        assert!(matches!(
            p0.send(0, Envelope::new(Tag::WorkSize, 0, vec![])).await,
            Err(TransportError::SelfMessage(0))
        ));
        assert!(matches!(
            p0.recv(4).await,
            Err(TransportError::UnknownPeer { peer: 4, n_processes: 2 })
        ));
    }

    #[tokio::test]
    async fn dropped_peer_reports_disconnect() {
        let mut mesh = ChannelMesh::build(2);
        let p1 = mesh.pop().unwrap();
        let mut p0 = mesh.pop().unwrap();
        drop(p1);

        assert!(matches!(
            p0.send(1, Envelope::new(Tag::WorkSize, 0, vec![])).await,
            Err(TransportError::Disconnected { peer: 1 })
        ));
        assert!(matches!(
            p0.recv(1).await,
            Err(TransportError::Disconnected { peer: 1 })
        ));
    }
}
