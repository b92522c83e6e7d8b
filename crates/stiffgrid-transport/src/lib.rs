//! stiffgrid-transport — moves encoded work between processes.
//!
//! The transport never looks inside a payload. It moves byte buffers
//! between named processes in two phases: every buffer's size is declared
//! first, then the payloads follow and are checked against the declaration.
//!
//! # Architecture
//!
//! ```text
//! TransferSession (one per batch)
//!   ├── declare_and_send / declare_and_receive      (work out, work in)
//!   └── return_and_send / return_and_receive        (results home)
//!         │
//!         ▼
//! Messenger (trait)
//!   └── MeshEndpoint — in-process tokio channel mesh
//! ```

pub mod collective;
pub mod error;
pub mod mesh;
pub mod messenger;
pub mod session;

pub use collective::{all_gather, all_reduce_min};
pub use error::{TransportError, TransportResult};
pub use mesh::{ChannelMesh, MeshEndpoint};
pub use messenger::{Envelope, Messenger, Tag};
pub use session::{SessionStats, TransferSession};
