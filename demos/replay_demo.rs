//! Replays a scripted burst of input through the full recording pipeline.
//!
//! Events are fed through a [`ChannelSource`] instead of the platform
//! collector, and screenshots are recorded as placeholder paths, so this
//! runs anywhere without permissions.
//!
//! Run with: cargo run --example replay_demo

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use screen_session_recorder::{
    capture::{CaptureError, CaptureTarget, CapturedImage, Region, Screenshot},
    collector::{ChannelSource, KeyboardEvent, MouseEvent, SensorEvent},
    observer::{ScreenObserver, ScreenObserverSettings},
    storage::JsonlStore,
    transparency::create_shared_log,
    Aggregator, Config, RunContext, ScreenCapturer, SelectionScope, StopReason,
};

/// Reports a full-screen image without writing it.
struct PlaceholderCapturer;

impl ScreenCapturer for PlaceholderCapturer {
    fn capture(
        &self,
        _scope: &SelectionScope,
        target: &CaptureTarget,
    ) -> Result<Screenshot, CaptureError> {
        Ok(Screenshot {
            images: vec![CapturedImage {
                path: target.path(),
                region: Region::new(0.0, 0.0, 1920.0, 1080.0),
                window_id: None,
            }],
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("screen_session_recorder=debug")
        .init();

    let dir = tempfile::tempdir()?;
    let config = Config {
        data_path: dir.path().to_path_buf(),
        screenshots_path: dir.path().join("screenshots"),
        poll_interval: Duration::from_millis(10),
        ..Config::default()
    };
    let log_path = config.observation_log_path();
    let ctx = RunContext::new(config, SelectionScope::AllScreens)?;

    let (events, source) = ChannelSource::new(64);
    let observer = ScreenObserver::new(
        &ctx,
        ScreenObserverSettings::from_config(&ctx.config),
        Box::new(source),
        Arc::new(PlaceholderCapturer),
    )?;

    let store = JsonlStore::open(&log_path).await?;
    let transparency = create_shared_log();
    let mut aggregator = Aggregator::new(ctx, Box::new(store)).with_transparency(transparency.clone());
    aggregator.register(Box::new(observer))?;
    let stop = aggregator.stop_handle();
    let run = tokio::spawn(async move { aggregator.run().await });

    // Two typing bursts five seconds apart, with a click and a scroll in between
    let start = Utc::now();
    let at = |ms: i64| start + ChronoDuration::milliseconds(ms);
    for ms in [0, 150, 320, 500] {
        events.send(SensorEvent::Keyboard(KeyboardEvent::at(at(ms), true)))?;
    }
    events.send(SensorEvent::Mouse(MouseEvent::click_at(at(1_200), true)))?;
    events.send(SensorEvent::Mouse(MouseEvent::scroll_at(at(1_400), 0.0, -6.0)))?;
    for ms in [5_000, 5_200] {
        events.send(SensorEvent::Keyboard(KeyboardEvent::at(at(ms), true)))?;
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    let summary = stop.stop(StopReason::UserCancelled).await;
    run.await??;

    println!("{summary}");
    println!();
    for observation in JsonlStore::read_all(&log_path)? {
        println!(
            "#{:<3} {:<16} {}",
            observation.sequence,
            observation.kind.to_string(),
            serde_json::to_string(&observation.payload)?
        );
    }
    println!();
    println!("{}", transparency.summary());
    Ok(())
}
