//! Landed-tip percentile stream
//!
//! The relay publishes recent landed-tip percentiles (in SOL) over a
//! websocket. Each text frame is a JSON array of samples; the newest is last.

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::RoutingError;
use crate::sniffer::errors::ExponentialBackoff;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TipSample {
    pub landed_tips_75th_percentile: f64,
    #[serde(default)]
    pub landed_tips_95th_percentile: f64,
    #[serde(default)]
    pub landed_tips_99th_percentile: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TipFrame {
    Batch(Vec<TipSample>),
    Single(TipSample),
}

/// Newest sample in one stream frame, `None` for an empty batch.
pub fn parse_tip_frame(text: &str) -> Result<Option<TipSample>, RoutingError> {
    let frame: TipFrame = serde_json::from_str(text)
        .map_err(|e| RoutingError::Stream(format!("bad tip frame: {}", e)))?;
    Ok(match frame {
        TipFrame::Batch(samples) => samples.last().copied(),
        TipFrame::Single(sample) => Some(sample),
    })
}

/// Follow the stream forever, reconnecting with backoff after every error.
pub async fn follow<F>(url: String, mut backoff: ExponentialBackoff, on_sample: F)
where
    F: Fn(TipSample) + Send + Sync,
{
    loop {
        match stream_once(&url, &mut backoff, &on_sample).await {
            Ok(()) => warn!(url = %url, "Tip stream closed"),
            Err(e) => warn!(url = %url, error = %e, "Error reading tip stream"),
        }
        let delay = backoff.next_backoff();
        debug!(delay_ms = delay.as_millis() as u64, "Reconnecting tip stream");
        tokio::time::sleep(delay).await;
    }
}

async fn stream_once<F>(
    url: &str,
    backoff: &mut ExponentialBackoff,
    on_sample: &F,
) -> Result<(), RoutingError>
where
    F: Fn(TipSample) + Send + Sync,
{
    let (mut ws, _response) = connect_async(url)
        .await
        .map_err(|e| RoutingError::Stream(format!("connect {}: {}", url, e)))?;
    info!(url = %url, "Tip stream connected");

    while let Some(message) = ws.next().await {
        match message.map_err(|e| RoutingError::Stream(e.to_string()))? {
            Message::Text(text) => {
                if let Some(sample) = parse_tip_frame(&text)? {
                    backoff.reset();
                    debug!(
                        p75 = sample.landed_tips_75th_percentile,
                        p95 = sample.landed_tips_95th_percentile,
                        p99 = sample.landed_tips_99th_percentile,
                        "Received tip sample"
                    );
                    on_sample(sample);
                }
            }
            Message::Ping(payload) => {
                ws.send(Message::Pong(payload))
                    .await
                    .map_err(|e| RoutingError::Stream(e.to_string()))?;
            }
            Message::Close(frame) => {
                debug!(?frame, "Tip stream close frame");
                return Ok(());
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_sample_wins() {
        let text = r#"[
            {"time":"2024-05-01T00:00:00Z","landed_tips_75th_percentile":0.001,"landed_tips_95th_percentile":0.01},
            {"time":"2024-05-01T00:00:01Z","landed_tips_75th_percentile":0.0025,"landed_tips_99th_percentile":0.05}
        ]"#;
        let sample = parse_tip_frame(text).unwrap().unwrap();
        assert_eq!(sample.landed_tips_75th_percentile, 0.0025);
        assert_eq!(sample.landed_tips_99th_percentile, 0.05);
    }

    #[test]
    fn test_single_object_and_empty_frames() {
        let single = parse_tip_frame(r#"{"landed_tips_75th_percentile":0.004}"#).unwrap();
        assert_eq!(single.map(|s| s.landed_tips_75th_percentile), Some(0.004));
        assert!(parse_tip_frame("[]").unwrap().is_none());
        assert!(parse_tip_frame("not json").is_err());
    }
}
