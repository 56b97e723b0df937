//! Length-delimited envelope frames.
//!
//! Each stream carries one frame: a u32 little-endian length followed by the
//! canonical encoding of the envelope.

use bytes::BytesMut;
use quinn::{RecvStream, SendStream};

use weft_core::encoding::{CanonicalDecode, CanonicalEncode};
use weft_proto::{Envelope, MAX_FRAME_SIZE};

use crate::error::NetError;

pub(crate) async fn write_frame(
    stream: &mut SendStream,
    envelope: &Envelope,
) -> Result<(), NetError> {
    let mut buf = BytesMut::new();
    envelope.encode(&mut buf);

    let len = (buf.len() as u32).to_le_bytes();
    stream
        .write_all(&len)
        .await
        .map_err(|e| NetError::SendFailed(e.to_string()))?;
    stream
        .write_all(&buf)
        .await
        .map_err(|e| NetError::SendFailed(e.to_string()))?;
    Ok(())
}

pub(crate) async fn read_frame(stream: &mut RecvStream) -> Result<Envelope, NetError> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| NetError::ReceiveFailed(e.to_string()))?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(NetError::ReceiveFailed(format!(
            "frame of {len} bytes exceeds limit"
        )));
    }

    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| NetError::ReceiveFailed(e.to_string()))?;

    Ok(Envelope::from_bytes(&buf)?)
}
