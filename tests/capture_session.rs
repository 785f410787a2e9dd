use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use noisetiles::capture::{CaptureController, CaptureError, CellError};
use noisetiles::config::{CaptureConfig, ConfigError, NoiseParams};
use noisetiles::material::NoiseMaterial;
use noisetiles::render::{OrthoCamera, Renderer, Surface, Viewport};
use noisetiles::sink::{ArtifactSink, DirSink, MemorySink, SinkError};

fn live_renderer(params: NoiseParams) -> Arc<Mutex<Renderer>> {
    let surface = Surface {
        viewport: Viewport { width: 300, height: 200 },
        camera: OrthoCamera { left: -1.25, right: 0.75, top: 0.6, bottom: -0.4 },
        capturing: false,
    };
    Arc::new(Mutex::new(Renderer::new(surface, NoiseMaterial::new(params))))
}

fn small_tiles() -> CaptureConfig {
    CaptureConfig { tile_width: 16, tile_height: 16, ..CaptureConfig::default() }
}

fn assert_near(actual: Duration, expected_secs: u64) {
    let expected = Duration::from_secs(expected_secs);
    let diff = if actual > expected { actual - expected } else { expected - actual };
    assert!(diff < Duration::from_millis(10), "expected ~{expected:?}, got {actual:?}");
}

#[tokio::test]
async fn export_produces_every_tile_once() {
    let renderer = live_renderer(NoiseParams::default());
    let sink = Arc::new(MemorySink::new());
    let ctl = CaptureController::new(renderer, Arc::clone(&sink), small_tiles());

    let report = ctl.save().await.expect("capture should succeed");
    assert_eq!(report.cells.len(), 25);
    assert_eq!(report.delivered().count(), 25);

    let names = sink.names();
    assert_eq!(names.len(), 25);
    let unique: HashSet<_> = names.iter().cloned().collect();
    assert_eq!(unique.len(), 25);
    for row in 1..=5 {
        for col in 1..=5 {
            assert!(unique.contains(&format!("{row}_{col}.png")), "missing {row}_{col}.png");
        }
    }
    assert_eq!(names.first().map(String::as_str), Some("1_1.png"));
    assert_eq!(names.last().map(String::as_str), Some("5_5.png"));

    for (name, png) in sink.take() {
        let img = image::load_from_memory(&png).expect(&name).to_rgba8();
        assert_eq!(img.dimensions(), (16, 16), "{name}");
    }
}

#[tokio::test]
async fn export_restores_renderer_exactly() {
    let params = NoiseParams {
        size: 2.5,
        start: 0.22,
        stop: 0.0,
        force: 0.17,
        power: 1.2,
        x: 0.3,
        y: 1.7,
        preview: false,
        preview_x: 2,
        preview_y: -1,
    };
    let renderer = live_renderer(params.clone());
    let before = renderer.lock().await.surface.clone();

    let ctl = CaptureController::new(Arc::clone(&renderer), Arc::new(MemorySink::new()), small_tiles());
    ctl.save().await.unwrap();

    let after = renderer.lock().await;
    assert_eq!(after.surface, before);
    assert!(!after.surface.capturing);
    assert_eq!(after.material().map(|m| &m.params), Some(&params));
    assert!(!ctl.is_active());
}

#[tokio::test]
async fn corner_tiles_are_mostly_masked() {
    // Edges below the noise range make every unmasked pixel opaque white, so
    // alpha only reflects the mask. Corner tiles sit outside the 2.495-radius
    // circle except near their inner corner.
    let params = NoiseParams { start: -3.0, stop: -2.0, force: 0.0, ..NoiseParams::default() };
    let sink = Arc::new(MemorySink::new());
    let ctl = CaptureController::new(live_renderer(params), Arc::clone(&sink), small_tiles());
    ctl.save().await.unwrap();

    let tiles: std::collections::HashMap<_, _> = sink.take().into_iter().collect();
    let alpha_sum = |name: &str| -> u64 {
        let img = image::load_from_memory(&tiles[name]).unwrap().to_rgba8();
        img.pixels().map(|p| p.0[3] as u64).sum()
    };
    // Row 3, column 3 maps to mask cell (2, 2): the centre of the circle.
    let centre = alpha_sum("3_3.png");
    let corner = alpha_sum("1_1.png");
    assert_eq!(centre, 16 * 16 * 255);
    assert!(corner > 0);
    assert!(corner < centre / 2, "corner {corner} should be mostly masked vs centre {centre}");
}

#[tokio::test]
async fn export_into_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let sink = Arc::new(DirSink::create(tmp.path().join("tiles")).unwrap());
    let ctl = CaptureController::new(live_renderer(NoiseParams::default()), sink, small_tiles());
    ctl.save().await.unwrap();

    let mut files: Vec<_> = std::fs::read_dir(tmp.path().join("tiles"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    files.sort();
    assert_eq!(files.len(), 25);
    assert_eq!(files[0], "1_1.png");
    assert_eq!(files[24], "5_5.png");
}

struct FlakySink {
    inner: MemorySink,
    reject: &'static str,
}

impl ArtifactSink for FlakySink {
    fn deliver(&self, name: &str, png: &[u8]) -> Result<(), SinkError> {
        if name == self.reject {
            return Err(SinkError::Rejected(name.to_string()));
        }
        self.inner.deliver(name, png)
    }
}

#[tokio::test]
async fn failed_tile_is_reported_and_session_continues() {
    let params = NoiseParams::default();
    let renderer = live_renderer(params.clone());
    let sink = Arc::new(FlakySink { inner: MemorySink::new(), reject: "3_3.png" });
    let ctl = CaptureController::new(Arc::clone(&renderer), Arc::clone(&sink), small_tiles());

    let report = ctl.save().await.unwrap();
    assert_eq!(report.delivered().count(), 24);
    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "3_3.png");
    assert!(matches!(failed[0].outcome, Err(CellError::Deliver(SinkError::Rejected(_)))));
    assert_eq!(sink.inner.names().len(), 24);

    let after = renderer.lock().await;
    assert_eq!(after.material().map(|m| &m.params), Some(&params));
    assert!(!after.surface.capturing);
}

#[tokio::test]
async fn missing_material_is_reported_without_side_effects() {
    let renderer = live_renderer(NoiseParams::default());
    renderer.lock().await.detach_material();
    let before = renderer.lock().await.surface.clone();

    let sink = Arc::new(MemorySink::new());
    let ctl = CaptureController::new(Arc::clone(&renderer), Arc::clone(&sink), small_tiles());
    let err = ctl.save().await.unwrap_err();
    assert!(matches!(err, CaptureError::MissingMaterial));

    assert_eq!(renderer.lock().await.surface, before);
    assert!(sink.names().is_empty());
    assert!(!ctl.is_active());
}

#[tokio::test(start_paused = true)]
async fn second_save_is_rejected_while_active() {
    let renderer = live_renderer(NoiseParams::default());
    let config = CaptureConfig { row_delay: Duration::from_secs(1), ..small_tiles() };
    let ctl = Arc::new(CaptureController::new(renderer, Arc::new(MemorySink::new()), config));

    let first = tokio::spawn({
        let ctl = Arc::clone(&ctl);
        async move { ctl.save().await }
    });
    while !ctl.is_active() {
        tokio::task::yield_now().await;
    }

    let err = ctl.save().await.unwrap_err();
    assert!(matches!(err, CaptureError::SessionActive));

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.delivered().count(), 25);
    assert!(!ctl.is_active());

    // The guard is released, so a new session can run.
    assert!(ctl.save().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn paced_export_follows_row_schedule() {
    let renderer = live_renderer(NoiseParams::default());
    let config = CaptureConfig { tile_width: 16, tile_height: 16, ..CaptureConfig::paced() };
    let sink = Arc::new(MemorySink::new());
    let ctl = CaptureController::new(renderer, Arc::clone(&sink), config);

    let report = ctl.save().await.unwrap();
    assert_eq!(report.row_starts.len(), 5);
    for (i, start) in report.row_starts.iter().enumerate() {
        assert_near(*start, i as u64 + 1);
    }
    assert_near(report.restored_at, 7);
    assert_eq!(sink.names().len(), 25);
}

#[tokio::test(start_paused = true)]
async fn live_render_waits_for_session() {
    let renderer = live_renderer(NoiseParams::default());
    let config = CaptureConfig { row_delay: Duration::from_secs(1), ..small_tiles() };
    let ctl = Arc::new(CaptureController::new(Arc::clone(&renderer), Arc::new(MemorySink::new()), config));

    let session = tokio::spawn({
        let ctl = Arc::clone(&ctl);
        async move { ctl.save().await }
    });
    while !ctl.is_active() {
        tokio::task::yield_now().await;
    }
    // Give the session a chance to take the renderer.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let guard = renderer.lock().await;
    assert!(!ctl.is_active(), "renderer handed out mid-session");
    assert!(!guard.surface.capturing);
    drop(guard);
    session.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn dropped_session_still_restores_renderer() {
    let params = NoiseParams { x: 0.5, y: 2.0, ..NoiseParams::default() };
    let renderer = live_renderer(params.clone());
    let before = renderer.lock().await.surface.clone();
    let config = CaptureConfig { tile_width: 16, tile_height: 16, ..CaptureConfig::paced() };
    let sink = Arc::new(MemorySink::new());
    let ctl = CaptureController::new(Arc::clone(&renderer), Arc::clone(&sink), config);

    // Row 3 isn't due until t=3s, so the future is dropped mid-session.
    let outcome = tokio::time::timeout(Duration::from_millis(2500), ctl.save()).await;
    assert!(outcome.is_err(), "session should still be running at 2.5s");
    assert!(sink.names().len() < 25);

    let after = renderer.lock().await;
    assert_eq!(after.surface, before);
    assert_eq!(after.material().map(|m| &m.params), Some(&params));
    assert!(!ctl.is_active());
}

#[tokio::test]
async fn zero_tile_size_is_rejected_up_front() {
    let renderer = live_renderer(NoiseParams::default());
    let before = renderer.lock().await.surface.clone();
    let sink = Arc::new(MemorySink::new());
    let config = CaptureConfig { tile_width: 0, tile_height: 0, ..CaptureConfig::default() };
    let ctl = CaptureController::new(Arc::clone(&renderer), Arc::clone(&sink), config);

    let err = ctl.save().await.unwrap_err();
    assert!(matches!(err, CaptureError::Config(ConfigError::TileSize { width: 0, height: 0, .. })));
    assert!(sink.names().is_empty());
    assert_eq!(renderer.lock().await.surface, before);
    assert!(!ctl.is_active());
}
