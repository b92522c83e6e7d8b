//! Transport error types.
//!
//! Every variant means the processes are no longer in lockstep. None of
//! them are recoverable within a batch.

use stiff_core::ProcessId;
use thiserror::Error;

use crate::messenger::Tag;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("process {peer} declared {declared} bytes but sent {actual}")]
    SizeMismatch {
        peer: ProcessId,
        declared: u64,
        actual: u64,
    },

    #[error("expected {expected:?} from process {peer}, got {found:?}")]
    UnexpectedTag {
        peer: ProcessId,
        expected: Tag,
        found: Tag,
    },

    #[error("message from process {peer} belongs to batch {found}, expected batch {expected}")]
    BatchMismatch {
        peer: ProcessId,
        expected: u64,
        found: u64,
    },

    #[error("malformed size declaration from process {0}")]
    MalformedDeclaration(ProcessId),

    #[error("malformed reduction value from process {0}")]
    MalformedValue(ProcessId),

    #[error("channel to process {peer} is closed")]
    Disconnected { peer: ProcessId },

    #[error("unknown process {peer} (group size {n_processes})")]
    UnknownPeer {
        peer: ProcessId,
        n_processes: usize,
    },

    #[error("process {0} cannot message itself")]
    SelfMessage(ProcessId),

    #[error("transfer session used out of order: {0}")]
    OutOfOrder(&'static str),
}

pub type TransportResult<T> = Result<T, TransportError>;
