//! Length-prefixed typed frame codec (wire protocol, §4.1).
//!
//! One frame is `type(1) || size(4, BE) || flags(4, BE) || timestamp_ns(8, BE, signed) || payload(size)`.
//! Reads use "read exactly" semantics with separate header/body deadlines so
//! a slow client can't hold a connection open indefinitely on a partial
//! header.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};
use crate::protocol_constants::{
    FLAG_CODEC_CONFIG, FRAME_HEADER_LEN, MAX_FRAME_PAYLOAD_LEN, MIN_FRAME_PAYLOAD_LEN,
};

/// The four frame types defined by the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Video,
    Audio,
    Configuration,
    Metadata,
}

impl FrameType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(FrameType::Video),
            0x02 => Some(FrameType::Audio),
            0x03 => Some(FrameType::Configuration),
            0x04 => Some(FrameType::Metadata),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            FrameType::Video => 0x01,
            FrameType::Audio => 0x02,
            FrameType::Configuration => 0x03,
            FrameType::Metadata => 0x04,
        }
    }
}

/// One decoded wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub flags: u32,
    pub timestamp_ns: i64,
    pub payload: Vec<u8>,
}

impl Frame {
    /// True for video/audio frames carrying decoder-initialization bytes
    /// rather than picture or sample data (`flags & 0x2`).
    pub fn is_codec_config(&self) -> bool {
        self.flags & FLAG_CODEC_CONFIG != 0
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        out.push(self.frame_type.to_byte());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.timestamp_ns.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Reads one frame, applying `header_timeout` to the 17-byte header and
/// `body_timeout` to the payload. The handshake frame and ordinary data
/// frames use different deadline pairs; see `protocol_constants`.
///
/// `cancel` is raced against both reads via `select!` so a blocked read can
/// be interrupted at its next suspension point instead of only at the next
/// loop iteration — see `stream::force_disconnect`.
pub async fn read_frame<R>(
    reader: &mut R,
    header_timeout: Duration,
    body_timeout: Duration,
    cancel: &CancellationToken,
) -> CoreResult<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    tokio::select! {
        _ = cancel.cancelled() => return Err(CoreError::ForceDisconnected),
        result = timeout(header_timeout, reader.read_exact(&mut header)) => {
            result.map_err(|_| CoreError::Timeout("frame header".into()))??;
        }
    }

    let frame_type = FrameType::from_byte(header[0]).ok_or_else(|| {
        CoreError::ProtocolViolation(format!("unknown frame type 0x{:02x}", header[0]))
    })?;
    let size = u32::from_be_bytes(header[1..5].try_into().unwrap());
    let flags = u32::from_be_bytes(header[5..9].try_into().unwrap());
    let timestamp_ns = i64::from_be_bytes(header[9..17].try_into().unwrap());

    if size < MIN_FRAME_PAYLOAD_LEN || size > MAX_FRAME_PAYLOAD_LEN {
        return Err(CoreError::ProtocolViolation(format!(
            "frame size {} out of range",
            size
        )));
    }

    let mut payload = vec![0u8; size as usize];
    tokio::select! {
        _ = cancel.cancelled() => return Err(CoreError::ForceDisconnected),
        result = timeout(body_timeout, reader.read_exact(&mut payload)) => {
            result.map_err(|_| CoreError::Timeout("frame payload".into()))??;
        }
    }

    Ok(Frame {
        frame_type,
        flags,
        timestamp_ns,
        payload,
    })
}

/// Writes one frame in full.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> CoreResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_frame() -> Frame {
        Frame {
            frame_type: FrameType::Video,
            flags: FLAG_CODEC_CONFIG,
            timestamp_ns: -42,
            payload: vec![1, 2, 3, 4],
        }
    }

    #[tokio::test]
    async fn encode_then_decode_round_trips() {
        let frame = sample_frame();
        let bytes = frame.encode();
        let mut cursor = Cursor::new(bytes);
        let decoded = read_frame(
            &mut cursor,
            Duration::from_secs(1),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn codec_config_flag_is_detected() {
        let mut frame = sample_frame();
        assert!(frame.is_codec_config());
        frame.flags = 0;
        assert!(!frame.is_codec_config());
    }

    #[tokio::test]
    async fn zero_size_payload_is_rejected() {
        let mut bytes = vec![0x01u8];
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0i64.to_be_bytes());
        let mut cursor = Cursor::new(bytes);
        let result = read_frame(
            &mut cursor,
            Duration::from_secs(1),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(CoreError::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let mut bytes = vec![0x01u8];
        bytes.extend_from_slice(&(MAX_FRAME_PAYLOAD_LEN + 1).to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0i64.to_be_bytes());
        let mut cursor = Cursor::new(bytes);
        let result = read_frame(
            &mut cursor,
            Duration::from_secs(1),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(CoreError::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn unknown_type_byte_is_rejected() {
        let mut bytes = vec![0xAAu8];
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0i64.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        let mut cursor = Cursor::new(bytes);
        let result = read_frame(
            &mut cursor,
            Duration::from_secs(1),
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(CoreError::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_blocked_read() {
        let (mut reader, _writer) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = read_frame(
            &mut reader,
            Duration::from_secs(30),
            Duration::from_secs(30),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(CoreError::ForceDisconnected)));
    }
}
