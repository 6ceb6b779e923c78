//! Per-connection state machine (C2): handshake, streaming loop, teardown.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::time::timeout;

use camrelay_decode::{AacDecoder, H264Decoder};

use crate::error::{CoreError, CoreResult};
use crate::events::{HostCallbacks, HostEvent, Hooks};
use crate::framing::{read_frame, Frame, FrameType};
use crate::pixel::yuv420p_to_nv12;
use crate::protocol_constants::{
    CONFIG_BODY_TIMEOUT, CONFIG_HEADER_TIMEOUT, DATA_BODY_TIMEOUT, DATA_HEADER_TIMEOUT,
    RECV_BUFFER_SIZE, WATCHDOG_IDLE_TIMEOUT, WATCHDOG_POLL_INTERVAL, WRITER_CLOSE_TIMEOUT,
};
use crate::publisher::Publisher;
use crate::stream::types::StreamRuntime;

#[derive(Debug, Default, Deserialize)]
struct VideoConfig {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    #[allow(dead_code)]
    bitrate: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AudioConfig {
    enabled: Option<bool>,
    #[serde(rename = "sampleRate")]
    #[allow(dead_code)]
    sample_rate: Option<u32>,
    #[allow(dead_code)]
    channels: Option<u16>,
    #[allow(dead_code)]
    bitrate: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceConfig {
    model: Option<String>,
    #[serde(rename = "batteryPercent")]
    battery_percent: Option<i32>,
    #[serde(rename = "cpuTemperatureCelsius")]
    cpu_temperature_c: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPayload {
    video: Option<VideoConfig>,
    audio: Option<AudioConfig>,
    device: Option<DeviceConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataPayload {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(rename = "batteryPercent")]
    battery_percent: Option<i32>,
    #[serde(rename = "cpuTemperatureCelsius")]
    cpu_temperature_c: Option<f64>,
}

/// Decodes the two audio bytes of an AAC `AudioSpecificConfig` into the
/// sampling-frequency index and channel-configuration fields (ISO/IEC
/// 14496-3): `audioObjectType(5) | samplingFrequencyIndex(4) | channelConfiguration(4) | ...`.
fn parse_audio_specific_config(data: &[u8]) -> Option<(u8, u8)> {
    if data.len() < 2 {
        return None;
    }
    let sample_rate_index = ((data[0] & 0x07) << 1) | (data[1] >> 7);
    let channel_config = (data[1] >> 3) & 0x0F;
    Some((sample_rate_index, channel_config))
}

fn configure_socket(socket: &TcpStream) -> std::io::Result<()> {
    socket.set_nodelay(true)?;
    let sock_ref = socket2::SockRef::from(socket);
    sock_ref.set_keepalive(false)?;
    sock_ref.set_recv_buffer_size(RECV_BUFFER_SIZE)?;
    Ok(())
}

/// Runs one accepted connection to completion. Never returns early without
/// running its own teardown: watchdog cancellation, writer close, publisher
/// release, and the terminating `ConnectionChanged{false}` (unless the
/// supervisor already emitted it during shutdown).
pub async fn handle_connection(
    socket: TcpStream,
    runtime: Arc<StreamRuntime>,
    publisher: Arc<dyn Publisher>,
    callbacks: HostCallbacks,
    hooks: Hooks,
) {
    if let Err(e) = configure_socket(&socket) {
        log::warn!("failed to configure socket options: {e}");
    }

    let (mut read_half, write_half) = socket.into_split();
    *runtime.writer.lock() = Some(write_half);

    let watchdog_runtime = runtime.clone();
    let watchdog = tokio::spawn(async move { watchdog_loop(watchdog_runtime).await });

    let result = run_session(&mut read_half, &runtime, &publisher, &callbacks, &hooks).await;

    watchdog.abort();

    close_writer(&runtime).await;
    publisher.destroy().await;

    match &result {
        Ok(()) => log::info!("stream {} session ended", runtime.config.stream_id),
        Err(CoreError::ProtocolViolation(msg)) => {
            log::error!("stream {} protocol violation: {msg}", runtime.config.stream_id)
        }
        Err(CoreError::Timeout(msg)) => {
            log::info!("stream {} timed out: {msg}", runtime.config.stream_id)
        }
        Err(CoreError::ForceDisconnected) => {
            log::info!("stream {} force-disconnected", runtime.config.stream_id)
        }
        Err(e) => log::warn!("stream {} ended with error: {e}", runtime.config.stream_id),
    }

    if !runtime.disconnect_emitted.swap(true, Ordering::SeqCst) {
        callbacks.emit(HostEvent::ConnectionChanged {
            stream_id: runtime.config.stream_id.to_string(),
            connected: false,
            info: None,
        });
    }
    hooks.disconnected();
}

async fn watchdog_loop(runtime: Arc<StreamRuntime>) {
    loop {
        tokio::time::sleep(WATCHDOG_POLL_INTERVAL).await;
        if !runtime.is_running() {
            return;
        }
        if runtime.idle_for() >= WATCHDOG_IDLE_TIMEOUT {
            log::info!(
                "stream {} idle for {:?}, watchdog stopping it",
                runtime.config.stream_id,
                runtime.idle_for()
            );
            runtime.stop_running();
            return;
        }
    }
}

async fn run_session(
    socket: &mut OwnedReadHalf,
    runtime: &Arc<StreamRuntime>,
    publisher: &Arc<dyn Publisher>,
    callbacks: &HostCallbacks,
    hooks: &Hooks,
) -> CoreResult<()> {
    let handshake = match read_frame(socket, CONFIG_HEADER_TIMEOUT, CONFIG_BODY_TIMEOUT, &runtime.cancel).await {
        Ok(frame) if frame.frame_type == FrameType::Configuration => Some(frame),
        Ok(_) => {
            return Err(CoreError::ProtocolViolation(
                "first frame must be a configuration frame".into(),
            ))
        }
        Err(CoreError::Timeout(_)) => None,
        Err(e) => return Err(e),
    };

    let info = match handshake {
        Some(frame) => apply_handshake(runtime, publisher, &frame.payload).await?,
        None => {
            log::info!(
                "stream {} received no handshake within deadline, using defaults",
                runtime.config.stream_id
            );
            String::new()
        }
    };

    callbacks.emit(HostEvent::ConnectionChanged {
        stream_id: runtime.config.stream_id.to_string(),
        connected: true,
        info: Some(info.clone()),
    });
    hooks.config_received(&info);

    let mut video_decoder = H264Decoder::new().map_err(CoreError::from)?;
    let mut audio_decoder = if runtime.media.lock().audio_enabled {
        Some(AacDecoder::new().map_err(CoreError::from)?)
    } else {
        None
    };

    let mut consumed_any_frame = false;
    while runtime.is_running() && !runtime.is_force_stopped() {
        let frame = match read_frame(socket, DATA_HEADER_TIMEOUT, DATA_BODY_TIMEOUT, &runtime.cancel).await {
            Ok(frame) => frame,
            Err(CoreError::Timeout(ref msg)) if msg.contains("header") && consumed_any_frame => {
                log::info!("stream {} data header timed out, ending session", runtime.config.stream_id);
                break;
            }
            Err(e) => return Err(e),
        };

        consumed_any_frame = true;
        runtime.touch();
        runtime
            .bytes_received
            .fetch_add(frame.payload.len() as u64, Ordering::SeqCst);

        match frame.frame_type {
            FrameType::Video => {
                handle_video_frame(&frame, runtime, publisher, &mut video_decoder, hooks).await?
            }
            FrameType::Audio => {
                handle_audio_frame(&frame, runtime, publisher, &mut audio_decoder).await?
            }
            FrameType::Metadata => handle_metadata_frame(&frame, runtime),
            FrameType::Configuration => {
                handle_reconfigure_frame(&frame, runtime, publisher).await?
            }
        }
    }

    Ok(())
}

async fn apply_handshake(
    runtime: &Arc<StreamRuntime>,
    publisher: &Arc<dyn Publisher>,
    payload: &[u8],
) -> CoreResult<String> {
    let parsed: ConfigPayload = serde_json::from_slice(payload)
        .map_err(|e| CoreError::ProtocolViolation(format!("invalid handshake JSON: {e}")))?;

    apply_config_payload(runtime, &parsed);

    let media = runtime.media.lock().clone();
    if let Err(e) = publisher
        .reconfigure(media.width, media.height, media.fps)
        .await
    {
        log::warn!(
            "stream {} publisher reconfigure failed, continuing with defaults: {e}",
            runtime.config.stream_id
        );
    }

    let telemetry = runtime.telemetry.lock();
    Ok(format!(
        "{}x{}@{}fps model={} battery={} temp={}",
        media.width,
        media.height,
        media.fps,
        telemetry.model.as_deref().unwrap_or("unknown"),
        telemetry.battery_percent,
        telemetry.cpu_temperature_c
    ))
}

fn apply_config_payload(runtime: &Arc<StreamRuntime>, parsed: &ConfigPayload) {
    let mut media = runtime.media.lock();
    if let Some(video) = &parsed.video {
        if let Some(width) = video.width {
            media.width = width;
        }
        if let Some(height) = video.height {
            media.height = height;
        }
        if let Some(fps) = video.fps {
            media.fps = fps;
        }
    }
    if let Some(audio) = &parsed.audio {
        if let Some(enabled) = audio.enabled {
            media.audio_enabled = enabled;
        }
    }
    drop(media);

    if let Some(device) = &parsed.device {
        let mut telemetry = runtime.telemetry.lock();
        if let Some(model) = &device.model {
            telemetry.model = Some(model.clone());
        }
        if let Some(battery) = device.battery_percent {
            telemetry.battery_percent = battery;
        }
        if let Some(temp) = device.cpu_temperature_c {
            telemetry.cpu_temperature_c = temp;
        }
    }
}

async fn handle_video_frame(
    frame: &Frame,
    runtime: &Arc<StreamRuntime>,
    publisher: &Arc<dyn Publisher>,
    decoder: &mut H264Decoder,
    hooks: &Hooks,
) -> CoreResult<()> {
    if frame.is_codec_config() {
        if let Err(e) = decoder.decode(&frame.payload) {
            log::debug!("video codec-config rejected by decoder: {e}");
        }
        return Ok(());
    }

    let pictures = match decoder.decode(&frame.payload) {
        Ok(pictures) => pictures,
        Err(e) => {
            log::debug!("video decoder dropped a packet: {e}");
            return Ok(());
        }
    };

    for picture in pictures {
        let nv12 = yuv420p_to_nv12(&picture.y, &picture.u, &picture.v, picture.width as usize, picture.height as usize);
        let (fps, step) = {
            let media = runtime.media.lock();
            (media.fps, media.pts_step())
        };
        let pts = runtime.next_pts(step);

        if let Err(e) = publisher
            .send_video(&nv12, picture.width, picture.height, pts)
            .await
        {
            log::debug!("publisher dropped a video frame: {e}");
        }

        runtime.video_frames_decoded.fetch_add(1, Ordering::SeqCst);
        let elapsed_ms = runtime.idle_for().as_millis() as i64;
        runtime.latency.record(elapsed_ms);
        let _ = fps;
        hooks.frame_decoded(Arc::new(nv12), picture.width, picture.height);
    }
    Ok(())
}

async fn handle_audio_frame(
    frame: &Frame,
    runtime: &Arc<StreamRuntime>,
    publisher: &Arc<dyn Publisher>,
    decoder: &mut Option<AacDecoder>,
) -> CoreResult<()> {
    if !runtime.media.lock().audio_enabled {
        return Ok(());
    }
    let Some(decoder) = decoder else {
        return Ok(());
    };

    if frame.is_codec_config() {
        if let Some((sample_rate_index, channel_config)) =
            parse_audio_specific_config(&frame.payload)
        {
            let mut media = runtime.media.lock();
            media.sample_rate_index = Some(sample_rate_index);
            media.channel_config = Some(channel_config);
        }
        if let Err(e) = decoder.decode_config(&frame.payload) {
            log::debug!("audio codec-config rejected by decoder: {e}");
        }
        return Ok(());
    }

    let (sample_rate_index, channel_config) = {
        let media = runtime.media.lock();
        match (media.sample_rate_index, media.channel_config) {
            (Some(sri), Some(cc)) => (sri, cc),
            _ => return Ok(()),
        }
    };

    let frames = match decoder.decode(&frame.payload, sample_rate_index, channel_config) {
        Ok(frames) => frames,
        Err(e) => {
            log::debug!("audio decoder dropped a packet: {e}");
            return Ok(());
        }
    };

    if let Some(audio_frame) = frames.into_iter().next() {
        if let Err(e) = publisher.send_audio(&audio_frame).await {
            log::debug!("publisher dropped an audio frame: {e}");
        }
        runtime.audio_frames_decoded.fetch_add(1, Ordering::SeqCst);
    }
    Ok(())
}

fn handle_metadata_frame(frame: &Frame, runtime: &Arc<StreamRuntime>) {
    let Ok(parsed) = serde_json::from_slice::<MetadataPayload>(&frame.payload) else {
        log::debug!("ignoring malformed metadata frame");
        return;
    };
    if parsed.kind.as_deref() != Some("misc") {
        return;
    }
    let mut telemetry = runtime.telemetry.lock();
    if let Some(battery) = parsed.battery_percent {
        telemetry.battery_percent = battery;
    }
    if let Some(temp) = parsed.cpu_temperature_c {
        telemetry.cpu_temperature_c = temp;
    }
}

async fn handle_reconfigure_frame(
    frame: &Frame,
    runtime: &Arc<StreamRuntime>,
    publisher: &Arc<dyn Publisher>,
) -> CoreResult<()> {
    let parsed: ConfigPayload = match serde_json::from_slice(&frame.payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::debug!("ignoring malformed mid-stream configuration frame: {e}");
            return Ok(());
        }
    };

    let previous = runtime.media.lock().clone();
    apply_config_payload(runtime, &parsed);
    let updated = runtime.media.lock().clone();

    if (updated.width, updated.height, updated.fps) != (previous.width, previous.height, previous.fps) {
        match publisher
            .reconfigure(updated.width, updated.height, updated.fps)
            .await
        {
            Ok(_) => runtime.reset_counters(),
            Err(e) => log::warn!(
                "stream {} mid-stream reconfigure failed: {e}",
                runtime.config.stream_id
            ),
        }
    }
    Ok(())
}

/// Takes the connection's write half, if it hasn't already been taken by
/// the other of `force_disconnect`/the handler's own teardown, and shuts
/// it down within `WRITER_CLOSE_TIMEOUT`.
async fn close_writer(runtime: &StreamRuntime) {
    let writer = runtime.writer.lock().take();
    if let Some(mut writer) = writer {
        if timeout(WRITER_CLOSE_TIMEOUT, writer.shutdown()).await.is_err() {
            log::warn!(
                "stream {} writer did not close within {:?}",
                runtime.config.stream_id,
                WRITER_CLOSE_TIMEOUT
            );
        }
    }
}

/// Cancels the session's blocked read (if any) at its next suspension
/// point and closes the writer within `WRITER_CLOSE_TIMEOUT`. Used by the
/// supervisor's shutdown and network-down paths.
pub async fn force_disconnect(runtime: &StreamRuntime) {
    runtime.request_force_stop();
    runtime.stop_running();
    runtime.cancel.cancel();
    close_writer(runtime).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_audio_specific_config_sample_rate_and_channels() {
        // AudioObjectType=2 (AAC-LC), samplingFrequencyIndex=4 (44.1kHz), channelConfig=2 (stereo).
        let byte0 = 0x12u8;
        let byte1 = 0x10u8;
        let (sample_rate_index, channel_config) =
            parse_audio_specific_config(&[byte0, byte1]).unwrap();
        assert_eq!(sample_rate_index, 4);
        assert_eq!(channel_config, 2);
    }

    #[test]
    fn short_payload_yields_none() {
        assert!(parse_audio_specific_config(&[0x12]).is_none());
    }
}
