//! Raw H.264 Annex-B packet decoding.
//!
//! Unlike demuxed decoding from a container, this decoder is fed bare
//! elementary-stream packets (SPS/PPS and slice NALUs) with no container
//! -- the phone client sends them straight off the wire. The decoder is
//! opened with the same low-latency intent as a live preview pipeline: no
//! internal buffering, minimal probing, single threaded.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};
use ffmpeg::util::frame::video::Video as FfmpegVideoFrame;

use crate::error::DecodeError;
use crate::frame::VideoFrame;

pub struct H264Decoder {
    decoder: ffmpeg::decoder::Video,
    scaler: Option<SwsContext>,
}

impl H264Decoder {
    /// Opens a single-threaded, low-delay H.264 decoder.
    pub fn new() -> Result<Self, DecodeError> {
        let codec = ffmpeg::decoder::find(codec::Id::H264)
            .ok_or_else(|| DecodeError::Init("H.264 decoder not available".into()))?;
        let context = codec::context::Context::new_with_codec(codec);

        let mut options = ffmpeg::Dictionary::new();
        options.set("flags", "low_delay");
        options.set("flags2", "fast");
        options.set("analyzeduration", "0");
        options.set("probesize", "32");
        options.set("threads", "1");

        let decoder = context
            .open_as_with(codec, options)
            .map_err(|e| DecodeError::Init(e.to_string()))?
            .video()
            .map_err(|e| DecodeError::Init(e.to_string()))?;

        Ok(Self {
            decoder,
            scaler: None,
        })
    }

    /// Feeds one packet (codec-config or slice data) and drains every
    /// picture the decoder is ready to emit.
    ///
    /// Codec-config packets (SPS/PPS) never produce an output picture --
    /// the drain loop below simply runs zero times for those, which is the
    /// "feed to the decoder and return" behavior the caller needs.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<VideoFrame>, DecodeError> {
        let packet = ffmpeg::Packet::copy(data);
        self.decoder
            .send_packet(&packet)
            .map_err(|e| DecodeError::InvalidData(e.to_string()))?;

        let mut out = Vec::new();
        let mut decoded = FfmpegVideoFrame::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            out.push(self.to_yuv420p(&decoded)?);
        }
        Ok(out)
    }

    fn to_yuv420p(&mut self, frame: &FfmpegVideoFrame) -> Result<VideoFrame, DecodeError> {
        let width = frame.width();
        let height = frame.height();

        if frame.format() == Pixel::YUV420P {
            return Ok(pack_yuv420p(frame, width, height));
        }

        if self.scaler.is_none() {
            self.scaler = Some(
                SwsContext::get(
                    frame.format(),
                    width,
                    height,
                    Pixel::YUV420P,
                    width,
                    height,
                    Flags::BILINEAR,
                )
                .map_err(|e| DecodeError::InvalidData(e.to_string()))?,
            );
        }

        let mut converted = FfmpegVideoFrame::empty();
        self.scaler
            .as_mut()
            .unwrap()
            .run(frame, &mut converted)
            .map_err(|e| DecodeError::InvalidData(e.to_string()))?;
        Ok(pack_yuv420p(&converted, width, height))
    }
}

/// Strips row-stride padding from a YUV420P frame's three planes.
fn pack_yuv420p(frame: &FfmpegVideoFrame, width: u32, height: u32) -> VideoFrame {
    let chroma_w = (width as usize).div_ceil(2);
    let chroma_h = (height as usize).div_ceil(2);

    let y = copy_plane(frame.data(0), frame.stride(0), width as usize, height as usize);
    let u = copy_plane(frame.data(1), frame.stride(1), chroma_w, chroma_h);
    let v = copy_plane(frame.data(2), frame.stride(2), chroma_w, chroma_h);

    VideoFrame {
        width,
        height,
        y,
        u,
        v,
    }
}

fn copy_plane(plane: &[u8], stride: usize, row_len: usize, rows: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(row_len * rows);
    for row in 0..rows {
        let start = row * stride;
        out.extend_from_slice(&plane[start..start + row_len]);
    }
    out
}
