//! Fabric errors.

use thiserror::Error;

use weft_core::encoding::DecodeError;
use weft_proto::ProtoError;

/// Errors surfaced by the connection and session fabric.
#[derive(Debug, Error)]
pub enum NetError {
    /// Address is empty, unparseable, or out of range
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A node may not dial its own address
    #[error("Peer should not dial itself")]
    SelfDial,

    /// DNS resolution returned nothing
    #[error("Name resolution failed for {0}")]
    NameResolution(String),

    /// Operation on a nil or closed session
    #[error("Not connected to peer")]
    NotConnected,

    /// Connection attempt on a client with a live session
    #[error("Connection already established")]
    AlreadyConnected,

    /// Transport dial failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Reconnect budget exhausted
    #[error("Unable to reestablish connection")]
    Unreachable,

    /// Deadline exceeded
    #[error("Request timed out")]
    Timeout,

    /// Could not open a stream on the session
    #[error("Stream open failed: {0}")]
    StreamOpenFailed(String),

    /// Write side of a stream failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Read side of a stream failed
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Inbound bytes are not a well-formed envelope
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Envelope-level failure (signature, type mismatch)
    #[error(transparent)]
    Envelope(#[from] ProtoError),

    /// A user handler returned an error
    #[error("Handler failed: {0}")]
    Handler(String),

    /// Underlying I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
