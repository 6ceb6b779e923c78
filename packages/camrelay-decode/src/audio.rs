//! Raw AAC packet decoding and ADTS framing.
//!
//! The phone client sends bare AAC payloads with no container framing.
//! FFmpeg's native AAC decoder expects ADTS-framed input when fed without
//! an `AudioSpecificConfig` extradata block, so every non-codec-config
//! payload is wrapped in a synthesized 7-byte ADTS header before being
//! handed to the decoder.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::sample::{Sample, Type as SampleType};
use ffmpeg::util::frame::audio::Audio as FfmpegAudioFrame;

use crate::error::DecodeError;
use crate::frame::{AudioFrame, SampleFormat};

pub struct AacDecoder {
    decoder: ffmpeg::decoder::Audio,
}

impl AacDecoder {
    pub fn new() -> Result<Self, DecodeError> {
        let codec = ffmpeg::decoder::find(codec::Id::AAC)
            .ok_or_else(|| DecodeError::Init("AAC decoder not available".into()))?;
        let context = codec::context::Context::new_with_codec(codec);

        let mut options = ffmpeg::Dictionary::new();
        options.set("flags", "low_delay");
        options.set("flags2", "fast");

        let decoder = context
            .open_as_with(codec, options)
            .map_err(|e| DecodeError::Init(e.to_string()))?
            .audio()
            .map_err(|e| DecodeError::Init(e.to_string()))?;

        Ok(Self { decoder })
    }

    /// Feeds a codec-config (AudioSpecificConfig-like) payload. No ADTS
    /// header is synthesized for these -- they carry decoder init bytes,
    /// not a frame of audio.
    pub fn decode_config(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        let packet = ffmpeg::Packet::copy(data);
        self.decoder
            .send_packet(&packet)
            .map_err(|e| DecodeError::InvalidData(e.to_string()))?;
        let mut decoded = FfmpegAudioFrame::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {}
        Ok(())
    }

    /// Prepends an ADTS header to `payload` and decodes exactly the frame(s)
    /// that produces. Per the stream handler's contract, callers publish at
    /// most one audio frame per wire frame, so only the first decoded frame
    /// (if any) matters to them.
    pub fn decode(
        &mut self,
        payload: &[u8],
        sample_rate_index: u8,
        channel_config: u8,
    ) -> Result<Vec<AudioFrame>, DecodeError> {
        let header = build_adts_header(payload.len(), sample_rate_index, channel_config);
        let mut framed = Vec::with_capacity(header.len() + payload.len());
        framed.extend_from_slice(&header);
        framed.extend_from_slice(payload);

        let packet = ffmpeg::Packet::copy(&framed);
        self.decoder
            .send_packet(&packet)
            .map_err(|e| DecodeError::InvalidData(e.to_string()))?;

        let mut out = Vec::new();
        let mut decoded = FfmpegAudioFrame::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            out.push(to_audio_frame(&decoded));
        }
        Ok(out)
    }
}

fn to_audio_frame(frame: &FfmpegAudioFrame) -> AudioFrame {
    let (format, planar) = match frame.format() {
        Sample::I16(SampleType::Packed) => (SampleFormat::I16, false),
        Sample::I16(SampleType::Planar) => (SampleFormat::I16, true),
        Sample::I32(SampleType::Packed) => (SampleFormat::I32, false),
        Sample::I32(SampleType::Planar) => (SampleFormat::I32, true),
        Sample::F64(SampleType::Packed) => (SampleFormat::F64, false),
        Sample::F64(SampleType::Planar) => (SampleFormat::F64, true),
        Sample::F32(SampleType::Planar) => (SampleFormat::F32, true),
        // Anything else, including F32 packed, is normalized to the decoder's
        // most common native output (float planar) by the caller's assumption;
        // fall back to packed float32 so the byte length math below still holds.
        _ => (SampleFormat::F32, false),
    };

    let channels = frame.channels() as u16;
    let samples = frame.samples();
    let bytes_per_sample = format.bytes_per_sample();

    let mut data = Vec::new();
    if planar {
        for ch in 0..channels as usize {
            let plane = frame.data(ch);
            data.extend_from_slice(&plane[..samples * bytes_per_sample]);
        }
    } else {
        let plane = frame.data(0);
        data.extend_from_slice(&plane[..samples * bytes_per_sample * channels as usize]);
    }

    AudioFrame {
        sample_rate: frame.rate(),
        channels,
        samples_per_channel: samples,
        format,
        planar,
        data,
    }
}

/// Synthesizes the 7-byte ADTS header for one AAC-LC frame.
///
/// `sample_rate_index` and `channel_config` are the MPEG-4 audio table
/// indices parsed from the client's codec-config frame (see the stream
/// handler's handling of `flags & 0x2` audio payloads).
pub fn build_adts_header(payload_len: usize, sample_rate_index: u8, channel_config: u8) -> [u8; 7] {
    let frame_length = (payload_len + 7) as u32;
    let mut header = [0u8; 7];
    header[0] = 0xFF;
    header[1] = 0xF9; // MPEG-4, layer 0, no CRC
    header[2] = (1 << 6) | ((sample_rate_index & 0x0F) << 2) | ((channel_config >> 2) & 0x01);
    header[3] = ((channel_config & 0x03) << 6) | (((frame_length >> 11) & 0x03) as u8);
    header[4] = ((frame_length >> 3) & 0xFF) as u8;
    header[5] = (((frame_length & 0x07) as u8) << 5) | 0x1F;
    header[6] = 0xFC;
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adts_header_encodes_frame_length() {
        let header = build_adts_header(100, 3, 2);
        let frame_length = 107u32;
        let decoded_length = (((header[3] & 0x03) as u32) << 11)
            | ((header[4] as u32) << 3)
            | ((header[5] as u32) >> 5);
        assert_eq!(decoded_length, frame_length);
        assert_eq!(header[0], 0xFF);
        assert_eq!(header[1] & 0xF0, 0xF0);
    }

    #[test]
    fn adts_header_encodes_sample_rate_and_channel_config() {
        let header = build_adts_header(50, 4, 2);
        let sample_rate_index = (header[2] >> 2) & 0x0F;
        let channel_config =
            ((header[2] & 0x01) << 2) | ((header[3] >> 6) & 0x03);
        assert_eq!(sample_rate_index, 4);
        assert_eq!(channel_config, 2);
    }
}
