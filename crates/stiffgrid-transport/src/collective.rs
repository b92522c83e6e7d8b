//! Collective operations built from point-to-point messages.

use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::messenger::{Envelope, Messenger, Tag};

/// Gather one payload from every process onto every process.
///
/// Returns the payloads indexed by rank, including this process's own.
/// All sends happen before any receive, so the exchange cannot deadlock on
/// buffered channels.
pub async fn all_gather<M: Messenger>(
    messenger: &mut M,
    tag: Tag,
    batch: u64,
    payload: Vec<u8>,
) -> TransportResult<Vec<Vec<u8>>> {
    let rank = messenger.rank();
    let n = messenger.size();

    for peer in (0..n).filter(|p| *p != rank) {
        messenger
            .send(peer, Envelope::new(tag, batch, payload.clone()))
            .await?;
    }

    let mut gathered = vec![Vec::new(); n];
    for peer in (0..n).filter(|p| *p != rank) {
        let envelope = messenger.recv(peer).await?.expect(peer, tag, batch)?;
        gathered[peer] = envelope.data;
    }
    gathered[rank] = payload;

    debug!(rank, processes = n, batch, ?tag, "all-gather complete");
    Ok(gathered)
}

/// Minimum of one value over the whole group. Every process gets the same
/// result.
pub async fn all_reduce_min<M: Messenger>(
    messenger: &mut M,
    batch: u64,
    value: f64,
) -> TransportResult<f64> {
    let gathered = all_gather(
        messenger,
        Tag::GroupMinimum,
        batch,
        value.to_le_bytes().to_vec(),
    )
    .await?;

    let mut min = f64::INFINITY;
    for (peer, bytes) in gathered.iter().enumerate() {
        let bytes: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TransportError::MalformedValue(peer))?;
        min = min.min(f64::from_le_bytes(bytes));
    }
    Ok(min)
}
