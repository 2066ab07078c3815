//! Wire protocol framing and negotiation.
//!
//! Implements exactly the message shapes the `upload-pack`/`receive-pack`
//! exchange uses: pkt-line framing, capability advertisement, and the v1
//! want/have/done and ref-update/report-status sequences. Protocol v2,
//! sideband multiplexing, bundle files, and remote-config parsing are
//! handled elsewhere (or not at all) — this crate only frames and
//! negotiates, it never opens a connection itself.

pub mod capability;
pub mod pktline;
pub mod v1;

/// Errors that can occur during protocol framing or negotiation.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("push rejected: {0}")]
    PushRejected(String),

    #[error("unsupported capability: {0}")]
    UnsupportedCapability(String),

    #[error(transparent)]
    Hash(#[from] git_hash::HashError),

    #[error(transparent)]
    Pack(#[from] git_pack::PackError),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
