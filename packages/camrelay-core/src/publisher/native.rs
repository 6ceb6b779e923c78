//! FFI binding to the native republishing shared library.
//!
//! Mirrors the original bridge's `ctypes.CDLL` wrapper: a dynamically
//! loaded library exposing `omt_send_create`, `omt_send_destroy`, and
//! `omt_send`, with frames marshalled through a C-layout struct matching
//! the host library's `OMTMediaFrame`.

use std::ffi::{c_int, c_void, CString};
use std::os::raw::c_char;
use std::path::Path;

use async_trait::async_trait;
use libloading::{Library, Symbol};
use parking_lot::Mutex;

use camrelay_decode::AudioFrame;

use super::{normalize_audio_to_planar_f32, Publisher, Quality};
use crate::error::{CoreError, CoreResult};

const FRAME_TYPE_VIDEO: c_int = 2;
const FRAME_TYPE_AUDIO: c_int = 4;
const CODEC_NV12: c_int = 0x3231_564E;
const CODEC_FPA1: c_int = 0x3141_5046;
const COLOR_SPACE_BT709: c_int = 709;

/// Mirrors the native library's `OMTMediaFrame` layout exactly; field order
/// and widths must not change.
#[repr(C)]
struct OmtMediaFrame {
    frame_type: c_int,
    timestamp: i64,
    codec: c_int,
    width: c_int,
    height: c_int,
    stride: c_int,
    flags: c_int,
    frame_rate_n: c_int,
    frame_rate_d: c_int,
    aspect_ratio: f32,
    color_space: c_int,
    sample_rate: c_int,
    channels: c_int,
    samples_per_channel: c_int,
    data: *const c_void,
    data_length: c_int,
    compressed_data: *const c_void,
    compressed_length: c_int,
    frame_metadata: *const c_void,
    frame_metadata_length: c_int,
}

impl Default for OmtMediaFrame {
    fn default() -> Self {
        OmtMediaFrame {
            frame_type: 0,
            timestamp: -1,
            codec: 0,
            width: 0,
            height: 0,
            stride: 0,
            flags: 0,
            frame_rate_n: 0,
            frame_rate_d: 0,
            aspect_ratio: 0.0,
            color_space: 0,
            sample_rate: 0,
            channels: 0,
            samples_per_channel: 0,
            data: std::ptr::null(),
            data_length: 0,
            compressed_data: std::ptr::null(),
            compressed_length: 0,
            frame_metadata: std::ptr::null(),
            frame_metadata_length: 0,
        }
    }
}

type CreateFn = unsafe extern "C" fn(*const c_char, c_int) -> *mut c_void;
type DestroyFn = unsafe extern "C" fn(*mut c_void);
type SendFn = unsafe extern "C" fn(*mut c_void, *const OmtMediaFrame) -> c_int;

/// Raw function pointers copied out of the library's symbol table. Valid
/// only as long as `NativePublisher::_library` stays loaded.
struct Symbols {
    create: CreateFn,
    destroy: DestroyFn,
    send: SendFn,
}

struct Inner {
    sender: *mut c_void,
    width: u32,
    height: u32,
    fps: u32,
    quality: Quality,
}

// SAFETY: `sender` is an opaque handle owned exclusively by this struct and
// every access to it goes through `Mutex<Inner>`; the native library is
// documented as safe to call from any single thread at a time.
unsafe impl Send for Inner {}

/// Publishes decoded frames to the native shared library, recreating its
/// sender handle on resolution/fps change.
pub struct NativePublisher {
    name: String,
    _library: Library,
    symbols: Symbols,
    inner: Mutex<Inner>,
}

impl NativePublisher {
    /// Loads `lib_path` and creates a sender named `name` at `quality`.
    pub fn new(lib_path: impl AsRef<Path>, name: &str, quality: Quality) -> CoreResult<Self> {
        let library = unsafe {
            Library::new(lib_path.as_ref())
                .map_err(|e| CoreError::Publisher(format!("failed to load native library: {e}")))?
        };

        let symbols = unsafe {
            let create: Symbol<CreateFn> = library
                .get(b"omt_send_create\0")
                .map_err(|e| CoreError::Publisher(format!("missing omt_send_create: {e}")))?;
            let destroy: Symbol<DestroyFn> = library
                .get(b"omt_send_destroy\0")
                .map_err(|e| CoreError::Publisher(format!("missing omt_send_destroy: {e}")))?;
            let send: Symbol<SendFn> = library
                .get(b"omt_send\0")
                .map_err(|e| CoreError::Publisher(format!("missing omt_send: {e}")))?;
            Symbols {
                create: *create,
                destroy: *destroy,
                send: *send,
            }
        };

        let sender = Self::create_sender(&symbols, name, quality)?;

        Ok(NativePublisher {
            name: name.to_string(),
            _library: library,
            symbols,
            inner: Mutex::new(Inner {
                sender,
                width: 1280,
                height: 720,
                fps: 30,
                quality,
            }),
        })
    }

    fn create_sender(symbols: &Symbols, name: &str, quality: Quality) -> CoreResult<*mut c_void> {
        let c_name = CString::new(name)
            .map_err(|_| CoreError::Publisher("sender name contains a NUL byte".into()))?;
        let sender = unsafe { (symbols.create)(c_name.as_ptr(), quality.as_native_value()) };
        if sender.is_null() {
            return Err(CoreError::Publisher(format!(
                "native library refused to create sender {name}"
            )));
        }
        Ok(sender)
    }
}

impl Drop for NativePublisher {
    fn drop(&mut self) {
        let inner = self.inner.lock();
        if !inner.sender.is_null() {
            unsafe { (self.symbols.destroy)(inner.sender) };
        }
    }
}

#[async_trait]
impl Publisher for NativePublisher {
    async fn reconfigure(&self, width: u32, height: u32, fps: u32) -> CoreResult<bool> {
        let mut inner = self.inner.lock();
        if inner.width == width && inner.height == height && inner.fps == fps {
            log::debug!("native publisher config unchanged: {width}x{height}@{fps}fps");
            return Ok(true);
        }

        log::info!(
            "reconfiguring native publisher {}: {}x{}@{}fps -> {}x{}@{}fps",
            self.name,
            inner.width,
            inner.height,
            inner.fps,
            width,
            height,
            fps
        );

        unsafe { (self.symbols.destroy)(inner.sender) };
        let new_sender = match Self::create_sender(&self.symbols, &self.name, inner.quality) {
            Ok(sender) => sender,
            Err(e) => {
                inner.sender = std::ptr::null_mut();
                return Err(e);
            }
        };

        inner.sender = new_sender;
        inner.width = width;
        inner.height = height;
        inner.fps = fps;
        Ok(true)
    }

    async fn send_video(&self, nv12: &[u8], width: u32, height: u32, pts: i64) -> CoreResult<()> {
        let inner = self.inner.lock();
        let mut frame = OmtMediaFrame {
            frame_type: FRAME_TYPE_VIDEO,
            codec: CODEC_NV12,
            width: width as c_int,
            height: height as c_int,
            stride: width as c_int,
            frame_rate_n: inner.fps as c_int * 1000,
            frame_rate_d: 1000,
            aspect_ratio: 16.0 / 9.0,
            color_space: COLOR_SPACE_BT709,
            timestamp: pts,
            data: nv12.as_ptr() as *const c_void,
            data_length: nv12.len() as c_int,
            ..Default::default()
        };

        let result = unsafe { (self.symbols.send)(inner.sender, &mut frame) };
        if result < 0 {
            return Err(CoreError::Publisher(format!(
                "native library rejected video frame (code {result})"
            )));
        }
        Ok(())
    }

    async fn send_audio(&self, frame: &AudioFrame) -> CoreResult<()> {
        let planar = normalize_audio_to_planar_f32(frame);
        let inner = self.inner.lock();

        let mut omt_frame = OmtMediaFrame {
            frame_type: FRAME_TYPE_AUDIO,
            codec: CODEC_FPA1,
            sample_rate: frame.sample_rate as c_int,
            channels: frame.channels as c_int,
            samples_per_channel: frame.samples_per_channel as c_int,
            timestamp: -1,
            data: planar.as_ptr() as *const c_void,
            data_length: (planar.len() * std::mem::size_of::<f32>()) as c_int,
            ..Default::default()
        };

        let result = unsafe { (self.symbols.send)(inner.sender, &mut omt_frame) };
        if result < 0 {
            return Err(CoreError::Publisher(format!(
                "native library rejected audio frame (code {result})"
            )));
        }
        Ok(())
    }

    async fn update_quality(&self, level: Quality) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.quality == level {
            return Ok(());
        }

        log::info!(
            "updating native publisher {} quality: {:?} -> {level:?}",
            self.name,
            inner.quality
        );

        // The native library only takes quality at sender-creation time, so
        // applying a new value means recreating the sender handle; the TCP
        // connection and decode pipeline are untouched.
        unsafe { (self.symbols.destroy)(inner.sender) };
        let new_sender = match Self::create_sender(&self.symbols, &self.name, level) {
            Ok(sender) => sender,
            Err(e) => {
                inner.sender = std::ptr::null_mut();
                return Err(e);
            }
        };

        inner.sender = new_sender;
        inner.quality = level;
        Ok(())
    }

    async fn destroy(&self) {
        let mut inner = self.inner.lock();
        if !inner.sender.is_null() {
            unsafe { (self.symbols.destroy)(inner.sender) };
            inner.sender = std::ptr::null_mut();
        }
    }
}
