//! Live Viewer Application
//!
//! Streams a synthetic test pattern to a vision pipeline and logs the
//! overlay output. With no arguments it runs fully offline against an
//! in-process fake pipeline; pass a WebSocket endpoint to stream to a real
//! backend:
//!
//! ```text
//! viewer                          # offline loopback demo
//! viewer ws://localhost:8090      # real backend, pipeline from prefs
//! viewer ws://localhost:8090 pose # real backend, explicit pipeline
//! ```

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vision_stream_client::{
    catalog::{PipelineCatalog, StaticCatalog},
    client::StreamClient,
    overlay::CanvasSize,
    prefs::PreferenceStore,
    protocol::ClientMessage,
    session::ConnectionState,
    source::TestPatternSource,
    transport::{Connector, LoopbackConnector, LoopbackPeer, WsConnector},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Live Viewer");

    let endpoint = std::env::args().nth(1).filter(|a| a != "--loopback");
    let pipeline_arg = std::env::args().nth(2);

    // List available pipelines
    let catalog = StaticCatalog::from_pairs(&[
        ("yolo-v8", "Object detection"),
        ("pose", "Pose estimation"),
        ("ocr", "Scene text"),
    ]);
    println!("\n=== Available Pipelines ===");
    let pipelines = catalog.list_pipelines().await?;
    for pipeline in &pipelines {
        println!("  {} ({})", pipeline.name, pipeline.id);
    }
    println!();

    // Preferences are best-effort; a read-only host just skips them
    let prefs = match PreferenceStore::open_default() {
        Ok(prefs) => Some(prefs),
        Err(e) => {
            tracing::warn!("preferences unavailable: {}", e);
            None
        }
    };

    let pipeline_id = pipeline_arg
        .or_else(|| prefs.as_ref().and_then(|p| p.get("pipeline")))
        .or_else(|| pipelines.first().map(|p| p.id.clone()))
        .unwrap_or_default();

    let (connector, loopback): (Arc<dyn Connector>, Option<LoopbackConnector>) = match &endpoint {
        Some(url) => {
            tracing::info!("Streaming to backend {}", url);
            (Arc::new(WsConnector::new(url.clone())), None)
        }
        None => {
            tracing::info!("No endpoint given; running offline loopback demo");
            let loopback = LoopbackConnector::new();
            (Arc::new(loopback.clone()), Some(loopback))
        }
    };

    let client = StreamClient::new(
        connector,
        TestPatternSource::new(640, 480),
        CanvasSize::default(),
    );

    // Log state transitions and error banners as they happen
    let banner = Arc::new(parking_lot::Mutex::new((
        ConnectionState::Disconnected,
        None::<String>,
    )));
    let banner_cb = banner.clone();
    let _subscription = client.subscribe(move |snapshot| {
        let mut last = banner_cb.lock();
        if snapshot.state != last.0 {
            tracing::info!("session state: {:?}", snapshot.state);
            last.0 = snapshot.state;
        }
        let message = snapshot.last_error.as_ref().map(|e| e.message.clone());
        if message != last.1 {
            if let Some(message) = &message {
                tracing::warn!("error banner: {}", message);
            }
            last.1 = message;
        }
    });

    tracing::info!("Selecting pipeline {}", pipeline_id);
    client.select_pipeline(&pipeline_id).await?;
    if let Some(prefs) = &prefs {
        if let Err(e) = prefs.set("pipeline", &pipeline_id) {
            tracing::warn!("could not persist pipeline choice: {}", e);
        }
    }

    if let Some(loopback) = &loopback {
        let peer = loopback
            .take_peer()
            .expect("loopback connect leaves a peer behind");
        tokio::spawn(run_fake_pipeline(peer));
    }

    // Main loop - periodic overlay and session stats
    tracing::info!("Streaming - press Ctrl+C to stop");
    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    loop {
        ticker.tick().await;
        let snapshot = client.store().snapshot();
        let commands = client.render_latest();
        tracing::info!(
            "state {:?}, overlay commands {}, last frame {:?}, dropped {}, slow-downs {}",
            snapshot.state,
            commands.len(),
            snapshot.last_result.as_ref().map(|f| f.frame_index),
            snapshot.metrics.dropped_frames,
            snapshot.metrics.slow_down_warnings,
        );
    }
}

/// Fake pipeline for the offline demo: answers every frame with one
/// orbiting tracked detection and nudges the client to slow down now and
/// then so the backoff path is visible.
async fn run_fake_pipeline(mut peer: LoopbackPeer) {
    let mut served: u64 = 0;
    while let Some(message) = peer.recv_frame().await {
        let ClientMessage::Frame { frame_index, .. } = message;
        served += 1;

        let t = frame_index as f32 * 0.1;
        let x = 240.0 + 150.0 * t.sin();
        let y = 160.0 + 100.0 * t.cos();
        let result = serde_json::json!({
            "detections": [
                {"x1": x, "y1": y, "x2": x + 80.0, "y2": y + 120.0, "track_id": 1}
            ],
            "labels": ["player"],
            "scores": [0.9],
        });

        if peer.send_result(frame_index, result).await.is_err() {
            break;
        }
        if served % 90 == 0 && peer.send_slow_down().await.is_err() {
            break;
        }
    }
    tracing::debug!("fake pipeline finished after {} frames", served);
}
