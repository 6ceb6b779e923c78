//! Low-latency H.264/AAC decoding for raw, containerless packets.
//!
//! Each decoder instance here is single-threaded and configured for
//! minimal buffering -- they exist to decode one live camera stream as it
//! arrives, not to play back a file. Ownership is always one decoder per
//! stream; nothing in this crate is shared across streams.

pub mod audio;
pub mod error;
pub mod frame;
pub mod video;

pub use audio::{build_adts_header, AacDecoder};
pub use error::DecodeError;
pub use frame::{AudioFrame, SampleFormat, VideoFrame};
pub use video::H264Decoder;
