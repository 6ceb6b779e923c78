//! Republish adapter (C5): takes decoded, pixel-converted frames and pushes
//! them out through either the native shared-library sender or a no-op
//! stand-in.

mod native;
mod passthrough;

pub use native::NativePublisher;
pub use passthrough::PassthroughPublisher;

use async_trait::async_trait;
use camrelay_decode::{AudioFrame, SampleFormat};

use crate::error::CoreResult;

/// Quality preset for a Native publisher's sender, matching the native
/// library's integer scale (not a continuous value).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    /// Maps to the native library's integer quality constant.
    pub fn as_native_value(self) -> i32 {
        match self {
            Quality::Low => 1,
            Quality::Medium => 50,
            Quality::High => 100,
        }
    }
}

/// Abstraction over "send this decoded media somewhere". [`NativePublisher`]
/// is the production implementation; [`PassthroughPublisher`] exists for
/// tests and for running the ingest pipeline without a sender attached.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Reconfigures the sender for a new resolution/frame rate. Destroys
    /// and recreates the underlying sender on change; a call with the
    /// unchanged tuple is a no-op that returns `Ok(true)`.
    async fn reconfigure(&self, width: u32, height: u32, fps: u32) -> CoreResult<bool>;

    /// Publishes one NV12 video frame. `pts` is in the wire protocol's
    /// 90kHz clock.
    async fn send_video(&self, nv12: &[u8], width: u32, height: u32, pts: i64) -> CoreResult<()>;

    /// Publishes one audio frame. Integer sample formats are normalized to
    /// float32 in `[-1, 1]` here, not by the decoder (see
    /// [`camrelay_decode::AudioFrame`]'s doc comment).
    async fn send_audio(&self, frame: &AudioFrame) -> CoreResult<()>;

    /// Applies a new quality preset without interrupting the connection
    /// or decode pipeline; implementations may need to recreate their
    /// underlying sender handle to do so.
    async fn update_quality(&self, level: Quality) -> CoreResult<()>;

    /// Releases the underlying sender. Idempotent.
    async fn destroy(&self);
}

/// Converts decoder-native PCM into float32 planar samples laid out as
/// `[ch0 samples][ch1 samples]...`, the shape the native sender expects.
///
/// Grounded in the original bridge's audio path, which normalizes
/// int16/int32 PCM to float32 and flattens an already-planar
/// `(channels, samples)` array in C order.
pub fn normalize_audio_to_planar_f32(frame: &AudioFrame) -> Vec<f32> {
    let samples_per_channel = frame.samples_per_channel;
    let channels = frame.channels as usize;
    let mut out = Vec::with_capacity(samples_per_channel * channels);

    if frame.planar {
        for channel in 0..channels {
            let start = channel * samples_per_channel * frame.format.bytes_per_sample();
            let bytes = &frame.data[start..start + samples_per_channel * frame.format.bytes_per_sample()];
            append_normalized(bytes, frame.format, &mut out);
        }
    } else {
        let mut interleaved = Vec::with_capacity(samples_per_channel * channels);
        append_normalized(&frame.data, frame.format, &mut interleaved);
        for channel in 0..channels {
            for sample_index in 0..samples_per_channel {
                out.push(interleaved[sample_index * channels + channel]);
            }
        }
    }
    out
}

fn append_normalized(bytes: &[u8], format: SampleFormat, out: &mut Vec<f32>) {
    match format {
        SampleFormat::I16 => {
            for chunk in bytes.chunks_exact(2) {
                let sample = i16::from_ne_bytes([chunk[0], chunk[1]]);
                out.push(sample as f32 / 32768.0);
            }
        }
        SampleFormat::I32 => {
            for chunk in bytes.chunks_exact(4) {
                let sample = i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                out.push(sample as f32 / 2_147_483_648.0);
            }
        }
        SampleFormat::F32 => {
            for chunk in bytes.chunks_exact(4) {
                out.push(f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
            }
        }
        SampleFormat::F64 => {
            for chunk in bytes.chunks_exact(8) {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                out.push(f64::from_ne_bytes(buf) as f32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_maps_to_native_scale() {
        assert_eq!(Quality::Low.as_native_value(), 1);
        assert_eq!(Quality::Medium.as_native_value(), 50);
        assert_eq!(Quality::High.as_native_value(), 100);
    }

    #[test]
    fn i16_planar_normalizes_in_range() {
        let samples: Vec<i16> = vec![0, i16::MAX, i16::MIN, -1000, 1000];
        let mut data = Vec::new();
        for s in &samples {
            data.extend_from_slice(&s.to_ne_bytes());
        }
        let frame = AudioFrame {
            format: SampleFormat::I16,
            planar: true,
            channels: 1,
            samples_per_channel: samples.len(),
            sample_rate: 48_000,
            data,
        };
        let normalized = normalize_audio_to_planar_f32(&frame);
        assert_eq!(normalized.len(), samples.len());
        for value in normalized {
            assert!((-1.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn interleaved_stereo_deinterleaves_to_planar() {
        // L0 R0 L1 R1
        let interleaved: Vec<i16> = vec![100, -100, 200, -200];
        let mut data = Vec::new();
        for s in &interleaved {
            data.extend_from_slice(&s.to_ne_bytes());
        }
        let frame = AudioFrame {
            format: SampleFormat::I16,
            planar: false,
            channels: 2,
            samples_per_channel: 2,
            sample_rate: 48_000,
            data,
        };
        let normalized = normalize_audio_to_planar_f32(&frame);
        assert_eq!(normalized.len(), 4);
        // Planar layout: [L0, L1][R0, R1]
        assert!(normalized[0] > 0.0);
        assert!(normalized[1] > 0.0);
        assert!(normalized[2] < 0.0);
        assert!(normalized[3] < 0.0);
    }
}
