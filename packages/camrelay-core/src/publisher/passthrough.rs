//! No-op publisher, used when a stream runs without a native sender
//! attached (tests, or a deliberately sender-less configuration).

use async_trait::async_trait;
use camrelay_decode::AudioFrame;

use super::{Publisher, Quality};
use crate::error::CoreResult;

#[derive(Debug, Default)]
pub struct PassthroughPublisher;

#[async_trait]
impl Publisher for PassthroughPublisher {
    async fn reconfigure(&self, _width: u32, _height: u32, _fps: u32) -> CoreResult<bool> {
        Ok(true)
    }

    async fn send_video(
        &self,
        _nv12: &[u8],
        _width: u32,
        _height: u32,
        _pts: i64,
    ) -> CoreResult<()> {
        Ok(())
    }

    async fn send_audio(&self, _frame: &AudioFrame) -> CoreResult<()> {
        Ok(())
    }

    async fn update_quality(&self, _level: Quality) -> CoreResult<()> {
        Ok(())
    }

    async fn destroy(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passthrough_accepts_every_call() {
        let publisher = PassthroughPublisher;
        assert!(publisher.reconfigure(1280, 720, 30).await.unwrap());
        publisher.send_video(&[0u8; 4], 2, 2, 0).await.unwrap();
        publisher.update_quality(Quality::High).await.unwrap();
        publisher.destroy().await;
    }
}
