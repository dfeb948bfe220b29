//! # Wire Framing
//!
//! TCP frames carry a request id so many calls can share one connection:
//!
//! ```text
//! [u32 LE len][u64 LE id][payload]      len = 8 + payload.len()
//! ```
//!
//! Pipe frames are one-shot and carry no id:
//!
//! ```text
//! [u32 LE len][payload]                 len = payload.len()
//! ```
//!
//! A reader that sees end-of-stream before the first header byte reports a
//! clean close (`Ok(None)`). End-of-stream anywhere else is a lost connection.

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;

use crate::transport::Error;
use crate::transport::Result;

pub const LEN_PREFIX: usize = 4;
pub const ID_LEN: usize = 8;

/// Default cap on a single payload.
pub const DEFAULT_MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

pub fn encode_tcp(id: u64, payload: &[u8]) -> Result<Vec<u8>> {
    let len = checked_len(payload.len() + ID_LEN)?;
    let mut frame = Vec::with_capacity(LEN_PREFIX + ID_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&id.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

pub fn encode_pipe(payload: &[u8]) -> Result<Vec<u8>> {
    let len = checked_len(payload.len())?;
    let mut frame = Vec::with_capacity(LEN_PREFIX + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

fn checked_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::PayloadTooLarge {
        len,
        max: u32::MAX as usize,
    })
}

/// Reads one `[len][id][payload]` frame.
pub async fn read_tcp<R>(reader: &mut R, max_payload: usize) -> Result<Option<(u64, Vec<u8>)>>
where
    R: AsyncRead + Unpin,
{
    let Some(len) = read_len(reader).await? else {
        return Ok(None);
    };
    if len < ID_LEN {
        return Err(Error::Protocol(format!("frame length {} is shorter than a request id", len)));
    }
    let payload_len = len - ID_LEN;
    if payload_len > max_payload {
        return Err(Error::PayloadTooLarge { len: payload_len, max: max_payload });
    }

    let mut id = [0u8; ID_LEN];
    reader.read_exact(&mut id).await?;

    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;

    Ok(Some((u64::from_le_bytes(id), payload)))
}

/// Reads one `[len][payload]` frame.
pub async fn read_pipe<R>(reader: &mut R, max_payload: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let Some(len) = read_len(reader).await? else {
        return Ok(None);
    };
    if len > max_payload {
        return Err(Error::PayloadTooLarge { len, max: max_payload });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

async fn read_len<R>(reader: &mut R) -> Result<Option<usize>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; LEN_PREFIX];
    let mut filled = 0;
    while filled < LEN_PREFIX {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::ConnectionLost("stream closed inside a frame header".into()));
        }
        filled += n;
    }
    Ok(Some(u32::from_le_bytes(header) as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tcp_layout() {
        let frame = encode_tcp(7, &[1, 2, 3]).unwrap();
        assert_eq!(&frame[..4], &11u32.to_le_bytes());
        assert_eq!(&frame[4..12], &7u64.to_le_bytes());
        assert_eq!(&frame[12..], &[1, 2, 3]);

        let mut reader = &frame[..];
        let (id, payload) = read_tcp(&mut reader, 16).await.unwrap().unwrap();
        assert_eq!(id, 7);
        assert_eq!(payload, vec![1, 2, 3]);
        assert!(read_tcp(&mut reader, 16).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pipe_layout() {
        let frame = encode_pipe(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(&frame[..4], &5u32.to_le_bytes());

        let mut reader = &frame[..];
        let payload = read_pipe(&mut reader, 16).await.unwrap().unwrap();
        assert_eq!(payload, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn empty_payloads_are_legal() {
        let frame = encode_tcp(1, &[]).unwrap();
        let mut reader = &frame[..];
        let (id, payload) = read_tcp(&mut reader, 0).await.unwrap().unwrap();
        assert_eq!(id, 1);
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn length_shorter_than_id_is_a_protocol_fault() {
        let mut bytes = 4u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0; 4]);
        let mut reader = &bytes[..];
        match read_tcp(&mut reader, 16).await {
            Err(Error::Protocol(_)) => {}
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected() {
        let frame = encode_pipe(&[0; 32]).unwrap();
        let mut reader = &frame[..];
        match read_pipe(&mut reader, 16).await {
            Err(Error::PayloadTooLarge { len: 32, max: 16 }) => {}
            other => panic!("expected payload too large, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn truncation_is_a_lost_connection() {
        let frame = encode_tcp(3, &[9; 10]).unwrap();

        let mut header_only = &frame[..2];
        match read_tcp(&mut header_only, 64).await {
            Err(Error::ConnectionLost(_)) => {}
            other => panic!("expected connection lost, got {:?}", other),
        }

        let mut body_cut = &frame[..frame.len() - 1];
        match read_tcp(&mut body_cut, 64).await {
            Err(Error::ConnectionLost(_)) => {}
            other => panic!("expected connection lost, got {:?}", other),
        }
    }
}
