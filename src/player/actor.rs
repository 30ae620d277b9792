//! Player task
//!
//! All queue state lives on one task. Commands, fetch completions, segment
//! end and gap deadlines, and the progress tick are multiplexed with
//! `select!`, so handlers never race each other.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{LayerLevels, PlayerConfig};
use crate::engine::{AudioBuffer, AudioContext};
use crate::error::{Result, ReverieError};
use crate::mixer::{ducked_level, scaled_target, LayerMixer, SharedMixer};
use crate::player::state::{PlaybackObserver, PlaybackSnapshot, PlayerPhase};
use crate::segment::{InstructionAction, LayerName, Segment, SonicInstruction};
use crate::source::SegmentSource;
use crate::synth::BinauralSynthesizer;

// ============================================================================
// Messages
// ============================================================================

pub(crate) enum Command {
    PlayQueue {
        segments: Vec<Segment>,
        streaming: bool,
        observer: Box<dyn PlaybackObserver>,
        reply: oneshot::Sender<Result<()>>,
    },
    Append {
        segments: Vec<Segment>,
        reply: oneshot::Sender<()>,
    },
    SetStreaming {
        streaming: bool,
        reply: oneshot::Sender<()>,
    },
    Pause {
        reply: oneshot::Sender<()>,
    },
    Resume {
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    SetLevel {
        layer: LayerName,
        value: f32,
        reply: oneshot::Sender<()>,
    },
}

enum Wake {
    Fetched {
        index: usize,
        offset: f64,
        result: Result<Arc<AudioBuffer>>,
    },
    SegmentEnded {
        index: usize,
    },
    GapElapsed {
        next: usize,
    },
}

enum Event {
    Command(Command),
    Wake(Wake),
    Tick,
    Shutdown,
}

/// The one timed action the player is waiting on
enum Pending {
    None,
    Fetch {
        index: usize,
        offset: f64,
        handle: JoinHandle<Result<Arc<AudioBuffer>>>,
    },
    SegmentEnd {
        index: usize,
        deadline: Instant,
    },
    Gap {
        next: usize,
        deadline: Instant,
    },
}

impl Pending {
    async fn wait(&mut self) -> Wake {
        match self {
            Pending::None => std::future::pending().await,
            Pending::Fetch {
                index,
                offset,
                handle,
            } => {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(ReverieError::decode(format!("segment task failed: {}", e))),
                };
                Wake::Fetched {
                    index: *index,
                    offset: *offset,
                    result,
                }
            }
            Pending::SegmentEnd { index, deadline } => {
                time::sleep_until(*deadline).await;
                Wake::SegmentEnded { index: *index }
            }
            Pending::Gap { next, deadline } => {
                time::sleep_until(*deadline).await;
                Wake::GapElapsed { next: *next }
            }
        }
    }

    fn cancel(&mut self) {
        if let Pending::Fetch { handle, .. } = self {
            handle.abort();
        }
        *self = Pending::None;
    }
}

// ============================================================================
// Queue entries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryStatus {
    Queued,
    Played,
    Failed,
}

struct Entry {
    segment: Segment,
    /// Estimated until decoded, then measured
    duration: f64,
    status: EntryStatus,
}

impl Entry {
    fn new(segment: Segment) -> Self {
        Self {
            duration: segment.estimated_duration.max(0.0),
            segment,
            status: EntryStatus::Queued,
        }
    }
}

// ============================================================================
// Actor
// ============================================================================

pub(crate) struct PlayerActor {
    context: AudioContext,
    mixer: SharedMixer,
    binaural: Option<BinauralSynthesizer>,
    source: Arc<SegmentSource>,
    config: PlayerConfig,
    levels: LayerLevels,
    rng: StdRng,

    commands: mpsc::UnboundedReceiver<Command>,
    snapshot_tx: watch::Sender<PlaybackSnapshot>,
    observer: Option<Box<dyn PlaybackObserver>>,

    queue: Vec<Entry>,
    phase: PlayerPhase,
    pending: Pending,
    streaming: bool,
    current_index: usize,

    /// Context time the audible segment (re)started at
    started_at: f64,
    /// Offset into the segment it (re)started from
    start_offset: f64,
    paused_offset: f64,
    announced: Option<usize>,
    completed_elapsed: f64,
    /// Progress only moves forward while the known total stays the same
    high_water: f64,
    high_water_total: f64,
    completion_reported: bool,
    ducked: bool,
}

impl PlayerActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        context: AudioContext,
        mixer: SharedMixer,
        binaural: Option<BinauralSynthesizer>,
        source: Arc<SegmentSource>,
        config: PlayerConfig,
        levels: LayerLevels,
        commands: mpsc::UnboundedReceiver<Command>,
        snapshot_tx: watch::Sender<PlaybackSnapshot>,
    ) -> Self {
        Self {
            context,
            mixer,
            binaural,
            source,
            config,
            levels,
            rng: StdRng::from_entropy(),
            commands,
            snapshot_tx,
            observer: None,
            queue: Vec::new(),
            phase: PlayerPhase::Idle,
            pending: Pending::None,
            streaming: false,
            current_index: 0,
            started_at: 0.0,
            start_offset: 0.0,
            paused_offset: 0.0,
            announced: None,
            completed_elapsed: 0.0,
            high_water: 0.0,
            high_water_total: 0.0,
            completion_reported: false,
            ducked: false,
        }
    }

    pub(crate) async fn run(mut self) {
        let period = Duration::from_millis(self.config.progress_interval_ms.max(1));
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let ticking = matches!(
                self.phase,
                PlayerPhase::PlayingSegment { .. } | PlayerPhase::Gap { .. }
            );

            let event = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => Event::Command(command),
                    None => Event::Shutdown,
                },
                wake = self.pending.wait() => Event::Wake(wake),
                _ = ticker.tick(), if ticking => Event::Tick,
            };

            match event {
                Event::Command(command) => self.handle_command(command),
                Event::Wake(wake) => {
                    self.handle_wake(wake);
                    self.publish();
                }
                Event::Tick => {
                    let snapshot = self.publish();
                    if let Some(observer) = self.observer.as_mut() {
                        observer.on_progress(&snapshot);
                    }
                }
                Event::Shutdown => break,
            }
        }

        self.reset_session();
        debug!("player task finished");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::PlayQueue {
                segments,
                streaming,
                observer,
                reply,
            } => {
                let result = self.play_queue(segments, streaming, observer);
                self.acknowledge(reply, result);
            }
            Command::Append { segments, reply } => {
                self.append(segments);
                self.acknowledge(reply, ());
            }
            Command::SetStreaming { streaming, reply } => {
                self.set_streaming(streaming);
                self.acknowledge(reply, ());
            }
            Command::Pause { reply } => {
                self.pause();
                self.acknowledge(reply, ());
            }
            Command::Resume { reply } => {
                self.resume();
                self.acknowledge(reply, ());
            }
            Command::Stop { reply } => {
                self.stop();
                self.acknowledge(reply, ());
            }
            Command::SetLevel {
                layer,
                value,
                reply,
            } => {
                self.set_level(layer, value);
                self.acknowledge(reply, ());
            }
        }
    }

    /// Reply only after the new state is visible to readers
    fn acknowledge<T>(&mut self, reply: oneshot::Sender<T>, value: T) {
        self.publish();
        let _ = reply.send(value);
    }

    fn handle_wake(&mut self, wake: Wake) {
        self.pending = Pending::None;
        match wake {
            Wake::Fetched {
                index,
                offset,
                result,
            } => match result {
                Ok(buffer) => self.begin_playback(index, offset, buffer),
                Err(e) => {
                    warn!(index, error = %e, "segment unavailable, skipping");
                    if let Some(entry) = self.queue.get_mut(index) {
                        entry.status = EntryStatus::Failed;
                    }
                    self.start_segment(index + 1, 0.0);
                }
            },
            Wake::SegmentEnded { index } => self.finish_segment(index),
            Wake::GapElapsed { next } => self.start_segment(next, 0.0),
        }
    }

    // ========================================================================
    // Session commands
    // ========================================================================

    fn play_queue(
        &mut self,
        segments: Vec<Segment>,
        streaming: bool,
        observer: Box<dyn PlaybackObserver>,
    ) -> Result<()> {
        if segments.is_empty() && !streaming {
            return Err(ReverieError::NoSegments);
        }

        self.reset_session();
        self.queue = segments.into_iter().map(Entry::new).collect();
        self.streaming = streaming;
        self.observer = Some(observer);
        info!(segments = self.queue.len(), streaming, "session queue started");

        self.start_segment(0, 0.0);
        Ok(())
    }

    fn append(&mut self, segments: Vec<Segment>) {
        if matches!(self.phase, PlayerPhase::Idle | PlayerPhase::Complete) {
            warn!(count = segments.len(), phase = %self.phase, "append ignored, no open session");
            return;
        }

        let first_new = self.queue.len();
        self.queue.extend(segments.into_iter().map(Entry::new));
        debug!(
            first_new,
            total = self.queue.len(),
            "segments appended to queue"
        );

        if self.phase == PlayerPhase::WaitingForMore && first_new < self.queue.len() {
            self.start_segment(first_new, 0.0);
        }
    }

    fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
        if !streaming && self.phase == PlayerPhase::WaitingForMore {
            self.complete();
        }
    }

    fn pause(&mut self) {
        match self.phase {
            PlayerPhase::PlayingSegment { index } => {
                let offset = match self.pending {
                    Pending::SegmentEnd { .. } => self.elapsed_in_segment(index),
                    Pending::Fetch { offset, .. } => offset,
                    _ => 0.0,
                };
                self.halt_voice();
                self.paused_offset = offset;
                self.phase = PlayerPhase::Paused { index };
                info!(index, offset, "playback paused");
            }
            PlayerPhase::Gap { next } => {
                self.halt_voice();
                self.paused_offset = 0.0;
                self.phase = PlayerPhase::Paused { index: next };
                info!(next, "playback paused between segments");
            }
            _ => debug!(phase = %self.phase, "pause ignored"),
        }
    }

    fn resume(&mut self) {
        match self.phase {
            PlayerPhase::Paused { index } => {
                let offset = self.paused_offset;
                info!(index, offset, "playback resumed");
                self.start_segment(index, offset);
            }
            _ => debug!(phase = %self.phase, "resume ignored"),
        }
    }

    fn stop(&mut self) {
        self.reset_session();
        self.source.clear_cache();
        info!("playback stopped");
    }

    fn set_level(&mut self, layer: LayerName, value: f32) {
        self.levels.set(layer, value);
        let level = self.levels.get(layer);
        let duck_factor = self.config.duck_factor;
        let ducked = self.ducked;
        self.with_mixer(|mixer| {
            let applied = if ducked && layer == mixer.bed_layer() {
                ducked_level(level, duck_factor)
            } else {
                level
            };
            mixer.fade_to(layer, applied);
        });
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn start_segment(&mut self, index: usize, offset: f64) {
        self.current_index = index;
        if index >= self.queue.len() {
            if self.streaming {
                self.phase = PlayerPhase::WaitingForMore;
                debug!(index, "queue drained, waiting for more segments");
            } else {
                self.complete();
            }
            return;
        }

        self.phase = PlayerPhase::PlayingSegment { index };
        let segment = self.queue[index].segment.clone();
        let source = Arc::clone(&self.source);
        debug!(index, segment = %segment.id, offset, "loading segment");
        let handle = tokio::spawn(async move { source.fetch_and_decode(&segment).await });
        self.pending = Pending::Fetch {
            index,
            offset,
            handle,
        };
    }

    fn begin_playback(&mut self, index: usize, offset: f64, buffer: Arc<AudioBuffer>) {
        let Some(entry) = self.queue.get_mut(index) else {
            return;
        };
        let duration = buffer.duration_secs();
        entry.duration = duration;
        let offset = offset.clamp(0.0, duration);

        let voice_level = self.levels.get(LayerName::Voice);
        let levels = self.levels;
        let duck_factor = self.config.duck_factor;
        let duck_ramp = self.config.duck_ramp_secs;
        self.with_mixer(|mixer| {
            let bed = mixer.bed_layer();
            mixer.set_volume(bed, ducked_level(levels.get(bed), duck_factor), duck_ramp);
            mixer.play_buffer_from(LayerName::Voice, buffer, voice_level, false, offset);
        });
        self.ducked = true;

        self.started_at = self.context.current_time();
        self.start_offset = offset;

        if self.announced != Some(index) {
            self.announced = Some(index);
            let segment = self.queue[index].segment.clone();
            info!(index, segment = %segment.id, duration, "segment started");
            if let Some(observer) = self.observer.as_mut() {
                observer.on_segment_change(index, &segment);
            }
            for instruction in &segment.instructions {
                self.apply_instruction(instruction);
            }
        }

        let remaining = (duration - offset).max(0.0);
        self.pending = Pending::SegmentEnd {
            index,
            deadline: Instant::now() + Duration::from_secs_f64(remaining),
        };
    }

    fn apply_instruction(&self, instruction: &SonicInstruction) {
        match instruction.action {
            InstructionAction::FadeVolume => {
                let levels = self.levels;
                self.with_mixer(|mixer| {
                    // Atmosphere fades follow the bed onto the texture layer
                    let layer = match instruction.layer {
                        LayerName::Atmosphere => mixer.bed_layer(),
                        other => other,
                    };
                    let target = scaled_target(instruction.value, levels.get(layer));
                    mixer.set_volume(layer, target, instruction.duration_secs);
                });
            }
            InstructionAction::SetBinauralFrequency => {
                let shifted = self
                    .binaural
                    .as_ref()
                    .map(|b| b.shift_beat_frequency(instruction.value, instruction.duration_secs))
                    .unwrap_or(false);
                if !shifted {
                    debug!(beat_hz = instruction.value, "beat shift skipped, no tone");
                }
            }
            InstructionAction::Wait => {}
        }
    }

    fn finish_segment(&mut self, index: usize) {
        self.with_mixer(|mixer| {
            mixer.stop_layer(LayerName::Voice);
        });
        self.restore_bed();

        if let Some(entry) = self.queue.get_mut(index) {
            entry.status = EntryStatus::Played;
            self.completed_elapsed += entry.duration;
        }
        debug!(index, "segment finished");

        let next = index + 1;
        if next < self.queue.len() {
            let gap = self.gap_duration();
            debug!(next, gap, "gap before next segment");
            self.phase = PlayerPhase::Gap { next };
            self.pending = Pending::Gap {
                next,
                deadline: Instant::now() + Duration::from_secs_f64(gap),
            };
        } else if self.streaming {
            self.current_index = next;
            self.phase = PlayerPhase::WaitingForMore;
            debug!("queue drained, waiting for more segments");
        } else {
            self.current_index = next;
            self.complete();
        }
    }

    fn complete(&mut self) {
        if self.completion_reported {
            return;
        }
        self.pending.cancel();
        self.restore_bed();
        self.phase = PlayerPhase::Complete;
        self.current_index = self.queue.len();
        self.completion_reported = true;

        let snapshot = self.publish();
        info!(
            segments = snapshot.total_segments,
            failed = snapshot.segments_failed,
            "session complete"
        );
        if let Some(observer) = self.observer.as_mut() {
            observer.on_progress(&snapshot);
            observer.on_complete();
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn with_mixer<R>(&self, f: impl FnOnce(&mut LayerMixer) -> R) -> Option<R> {
        self.mixer.lock().ok().map(|mut mixer| f(&mut *mixer))
    }

    /// Cancel whatever is pending and silence the voice layer
    fn halt_voice(&mut self) {
        self.pending.cancel();
        self.with_mixer(|mixer| {
            mixer.stop_layer(LayerName::Voice);
        });
    }

    fn restore_bed(&mut self) {
        if !self.ducked {
            return;
        }
        self.ducked = false;
        let levels = self.levels;
        let ramp = self.config.restore_ramp_secs;
        self.with_mixer(|mixer| {
            let bed = mixer.bed_layer();
            mixer.set_volume(bed, levels.get(bed), ramp);
        });
    }

    fn reset_session(&mut self) {
        self.halt_voice();
        self.restore_bed();
        self.queue.clear();
        self.phase = PlayerPhase::Idle;
        self.streaming = false;
        self.current_index = 0;
        self.started_at = 0.0;
        self.start_offset = 0.0;
        self.paused_offset = 0.0;
        self.announced = None;
        self.completed_elapsed = 0.0;
        self.high_water = 0.0;
        self.high_water_total = 0.0;
        self.completion_reported = false;
        self.observer = None;
    }

    fn gap_duration(&mut self) -> f64 {
        let jitter = self.config.gap_jitter_secs;
        let extra = if jitter > 0.0 {
            self.rng.gen_range(0.0..=jitter)
        } else {
            0.0
        };
        self.config.gap_base_secs + extra
    }

    fn elapsed_in_segment(&self, index: usize) -> f64 {
        let duration = self.queue.get(index).map(|e| e.duration).unwrap_or(0.0);
        (self.context.current_time() - self.started_at + self.start_offset).clamp(0.0, duration)
    }

    fn snapshot(&mut self) -> PlaybackSnapshot {
        let in_segment = match self.phase {
            PlayerPhase::PlayingSegment { index }
                if matches!(self.pending, Pending::SegmentEnd { .. }) =>
            {
                self.elapsed_in_segment(index)
            }
            PlayerPhase::Paused { .. } => self.paused_offset,
            _ => 0.0,
        };
        let elapsed = self.completed_elapsed + in_segment;
        let total: f64 = self
            .queue
            .iter()
            .filter(|e| e.status != EntryStatus::Failed)
            .map(|e| e.duration)
            .sum();

        let raw = if total > 0.0 {
            (elapsed / total * 100.0).min(100.0)
        } else {
            0.0
        };
        if (total - self.high_water_total).abs() > 1e-9 {
            // Appends, decodes and failures move the total; recompute from scratch
            self.high_water_total = total;
            self.high_water = raw;
        } else {
            self.high_water = self.high_water.max(raw);
        }

        PlaybackSnapshot {
            phase: self.phase,
            is_playing: self.phase.is_active(),
            is_paused: matches!(self.phase, PlayerPhase::Paused { .. }),
            current_segment_index: self.current_index,
            total_segments: self.queue.len(),
            progress_percent: self.high_water,
            current_time_seconds: elapsed,
            total_duration_seconds: total,
            segments_failed: self
                .queue
                .iter()
                .filter(|e| e.status == EntryStatus::Failed)
                .count(),
            streaming: self.streaming,
        }
    }

    fn publish(&mut self) -> PlaybackSnapshot {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_replace(snapshot.clone());
        snapshot
    }
}
