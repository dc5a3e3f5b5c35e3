//! Leader/follower replication.
//!
//! A node broadcasts its id to every configured peer once at startup; the
//! lowest id wins and becomes leader. There is no quorum and no ongoing
//! re-election: a node that dies keeps its last-decided role until the
//! process is restarted.

pub mod node;
pub mod protocol;

pub use node::{ping, ReplicationNode, Role};
pub use protocol::PeerRequest;
