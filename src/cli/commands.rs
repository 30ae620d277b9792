//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::controller::PlaybackController;
use crate::engine::{export_wav, AudioBuffer, AudioContext, AudioSink, ChannelLayout, NullSink, WavSink};
use crate::error::Result;
use crate::mixer::LayerMixer;
use crate::player::{PlaybackObserver, PlaybackSnapshot};
use crate::prefs::{JsonFilePreferences, MemoryPreferences, PreferenceStore};
use crate::segment::{parse_manifest, Segment};
use crate::source::{DefaultFetcher, DirectorySoundscapes};
use crate::synth::{BinauralSynthesizer, TextureSynthesizer};

/// Timeout for a single segment or soundscape download
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Offline render block size in frames
const RENDER_BLOCK_FRAMES: usize = 1024;

/// Options for the `play` command
#[derive(Debug, Clone, Default)]
pub struct PlayArgs {
    pub manifest: PathBuf,
    pub soundscapes: Option<PathBuf>,
    pub atmosphere: Option<String>,
    pub out: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub stream_interval_ms: Option<u64>,
    pub prefs: Option<PathBuf>,
}

/// Prints segment changes and completion to the terminal
struct ConsoleObserver {
    last_decile: u32,
}

impl PlaybackObserver for ConsoleObserver {
    fn on_progress(&mut self, state: &PlaybackSnapshot) {
        let decile = (state.progress_percent / 10.0) as u32;
        if decile > self.last_decile {
            self.last_decile = decile;
            println!(
                "  {:>3.0}%  {:.1}s / {:.1}s",
                state.progress_percent, state.current_time_seconds, state.total_duration_seconds
            );
        }
    }

    fn on_segment_change(&mut self, index: usize, segment: &Segment) {
        println!("[{}] {}", index + 1, segment.text);
    }

    fn on_complete(&mut self) {
        println!("Session complete");
    }
}

/// Play a segment manifest and render the mix.
pub async fn play(args: PlayArgs) -> Result<()> {
    let config = match args.config.as_deref() {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    info!("Loading manifest: {}", args.manifest.display());
    let content = std::fs::read_to_string(&args.manifest)?;
    let base = args.manifest.parent().unwrap_or_else(|| Path::new("."));
    let segments: Vec<Segment> = parse_manifest(&content)?
        .into_iter()
        .map(|segment| resolve_reference(segment, base))
        .collect();

    let prefs: Arc<dyn PreferenceStore> = match args.prefs.as_deref() {
        Some(path) => Arc::new(JsonFilePreferences::open(path)?),
        None => Arc::new(MemoryPreferences::new()),
    };
    let sink: Box<dyn AudioSink> = match args.out.as_deref() {
        Some(path) => Box::new(WavSink::create(path, config.sample_rate)?),
        None => Box::new(NullSink),
    };
    let soundscapes = DirectorySoundscapes::new(
        args.soundscapes
            .clone()
            .unwrap_or_else(|| base.to_path_buf()),
    );

    let mut controller = PlaybackController::new(
        config,
        Arc::new(DefaultFetcher::new().with_timeout(FETCH_TIMEOUT)),
        Arc::new(soundscapes),
        prefs,
    );
    let observer = ConsoleObserver { last_decile: 0 };

    println!("Playing {} segment(s)", segments.len());
    match args.stream_interval_ms {
        Some(interval_ms) => {
            controller
                .load_and_start_session(Vec::new(), args.atmosphere.as_deref(), true, observer, sink)
                .await?;
            for segment in segments {
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                controller.append_to_queue(vec![segment]).await;
            }
            controller.set_streaming(false).await;
        }
        None => {
            controller
                .load_and_start_session(segments, args.atmosphere.as_deref(), false, observer, sink)
                .await?;
        }
    }

    let snapshot = controller.finished().await;
    controller.teardown().await;

    if snapshot.nothing_played() {
        warn!("No segment could be played");
    }
    if snapshot.segments_failed > 0 {
        println!("Skipped {} unavailable segment(s)", snapshot.segments_failed);
    }
    if let Some(out) = args.out.as_deref() {
        println!("Mix written: {}", out.display());
    }

    Ok(())
}

/// Resolve relative local references against the manifest directory.
fn resolve_reference(mut segment: Segment, base: &Path) -> Segment {
    let reference = segment.audio_reference.as_str();
    let is_url = reference.contains("://");
    if !is_url && Path::new(reference).is_relative() {
        segment.audio_reference = base.join(reference).to_string_lossy().into_owned();
    }
    segment
}

/// Write a looping pink-noise bed.
pub fn texture(out: &Path, seconds: f64, rms_db: f32) -> Result<()> {
    info!("Generating {:.1}s texture at {} dB", seconds, rms_db);

    let buffer = TextureSynthesizer::new(EngineConfig::default().sample_rate, rms_db).generate(seconds);
    export_wav(&buffer, out)?;

    println!("Texture written: {}", out.display());
    println!("RMS: {:.1} dB, peak: {:.3}", buffer.rms_db(), buffer.peak());
    Ok(())
}

/// Render a binaural beat glide.
pub fn binaural(out: &Path, seconds: f64, base: f32, from: f32, to: f32) -> Result<()> {
    info!("Rendering binaural glide {} Hz -> {} Hz over {:.1}s", from, to, seconds);

    let config = EngineConfig::default();
    let context = AudioContext::new(config.sample_rate)?;
    // Offline: the clock stays put and blocks are rendered by timestamp
    context.suspend();
    let start = context.current_time();

    let mixer = LayerMixer::new(context.clone(), &config.mixer).into_shared();
    let synth = BinauralSynthesizer::new(context.clone(), Arc::clone(&mixer));
    synth.start(base, from, 1.0);
    synth.shift_beat_frequency(to, seconds);

    let total_frames = (seconds * config.sample_rate as f64).round() as usize;
    let mut interleaved = Vec::with_capacity(total_frames * 2);
    let mut block = vec![0.0_f32; RENDER_BLOCK_FRAMES * 2];
    let mut rendered = 0;
    while rendered < total_frames {
        let frames = RENDER_BLOCK_FRAMES.min(total_frames - rendered);
        let block = &mut block[..frames * 2];
        let time = start + rendered as f64 / config.sample_rate as f64;
        if let Ok(mut mixer) = mixer.lock() {
            mixer.render(time, block);
        }
        interleaved.extend_from_slice(block);
        rendered += frames;
    }
    synth.stop();
    context.close();

    let buffer = AudioBuffer::from_interleaved(&interleaved, ChannelLayout::Stereo, config.sample_rate)?;
    export_wav(&buffer, out)?;

    println!("Binaural glide written: {}", out.display());
    Ok(())
}

/// List the soundscapes in a directory.
pub fn list_soundscapes(dir: &Path) -> Result<()> {
    let store = DirectorySoundscapes::new(dir);
    let ids = store.available();

    if ids.is_empty() {
        println!("No soundscapes in {}", dir.display());
        return Ok(());
    }

    println!("Soundscapes in {}:", store.root().display());
    for id in ids {
        println!("  {}", id);
    }
    Ok(())
}
