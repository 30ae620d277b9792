//! Segment Queue Player
//!
//! Plays an ordered queue of spoken segments on the voice layer with
//! natural pauses between them, ducks the background bed under the voice,
//! runs each segment's sonic instructions, and reports progress.
//!
//! The queue state machine runs on its own task. [`SegmentQueuePlayer`]
//! is the handle; its async methods return once the command was applied.
//!
//! ```text
//! Idle -> PlayingSegment(0) -> Gap(1) -> PlayingSegment(1) -> ... -> Complete
//!                  |                                  |
//!                  +-- Paused(i) <-> PlayingSegment(i)+-- WaitingForMore (streaming)
//! ```

mod actor;
mod state;

pub use state::{
    ChannelObserver, NoopObserver, PlaybackObserver, PlaybackSnapshot, PlayerEvent, PlayerPhase,
};

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::config::{LayerLevels, PlayerConfig};
use crate::engine::AudioContext;
use crate::error::{Result, ReverieError};
use crate::mixer::SharedMixer;
use crate::segment::{LayerName, Segment};
use crate::source::SegmentSource;
use crate::synth::BinauralSynthesizer;

use actor::{Command, PlayerActor};

/// Handle to the player task
///
/// Dropping the handle stops playback and ends the task.
pub struct SegmentQueuePlayer {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<PlaybackSnapshot>,
}

impl SegmentQueuePlayer {
    /// Spawn the player task
    ///
    /// # Arguments
    /// * `context` - Clock for segment timing
    /// * `mixer` - Mixer owning the voice and bed layers
    /// * `source` - Fetches and caches segment audio
    /// * `binaural` - Tone that beat-shift instructions glide, if any
    /// * `config` - Gap and ducking settings
    /// * `levels` - User level of every layer
    pub fn spawn(
        context: AudioContext,
        mixer: SharedMixer,
        source: Arc<SegmentSource>,
        binaural: Option<BinauralSynthesizer>,
        config: PlayerConfig,
        levels: LayerLevels,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(PlaybackSnapshot::default());
        let actor = PlayerActor::new(
            context,
            mixer,
            binaural,
            source,
            config,
            levels,
            receiver,
            snapshot_tx,
        );
        tokio::spawn(actor.run());

        Self {
            commands,
            snapshot,
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(command(reply)).ok()?;
        response.await.ok()
    }

    /// Replace any session with `segments` and start the first one
    ///
    /// With `streaming` set the queue may start empty and grow through
    /// [`append_to_queue`](Self::append_to_queue).
    ///
    /// # Errors
    /// * `NoSegments` - The queue is empty and not streaming
    /// * `Context` - The player task is gone
    pub async fn play_queue(
        &self,
        segments: Vec<Segment>,
        streaming: bool,
        observer: impl PlaybackObserver + 'static,
    ) -> Result<()> {
        let observer: Box<dyn PlaybackObserver> = Box::new(observer);
        self.request(|reply| Command::PlayQueue {
            segments,
            streaming,
            observer,
            reply,
        })
        .await
        .unwrap_or_else(|| Err(ReverieError::context("player task has stopped")))
    }

    /// Add segments to the end of the queue
    ///
    /// A player waiting for more starts the first new segment at once.
    pub async fn append_to_queue(&self, segments: Vec<Segment>) {
        self.request(|reply| Command::Append { segments, reply })
            .await;
    }

    /// Declare whether more segments may still arrive
    pub async fn set_streaming(&self, streaming: bool) {
        self.request(|reply| Command::SetStreaming { streaming, reply })
            .await;
    }

    pub async fn pause(&self) {
        self.request(|reply| Command::Pause { reply }).await;
    }

    pub async fn resume(&self) {
        self.request(|reply| Command::Resume { reply }).await;
    }

    /// End the session without completing it
    pub async fn stop(&self) {
        self.request(|reply| Command::Stop { reply }).await;
    }

    /// Change a layer's user level, respecting ducking
    pub async fn set_level(&self, layer: LayerName, value: f32) {
        self.request(|reply| Command::SetLevel {
            layer,
            value,
            reply,
        })
        .await;
    }

    /// Latest published snapshot
    pub fn state(&self) -> PlaybackSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that sees every snapshot the player publishes
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until the session completes or is stopped
    pub async fn finished(&self) -> PlaybackSnapshot {
        let mut receiver = self.snapshot.clone();
        let snapshot = match receiver
            .wait_for(|s| matches!(s.phase, PlayerPhase::Complete | PlayerPhase::Idle))
            .await
        {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.state(),
        };
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MixerConfig;
    use crate::engine::{encode_wav, AudioBuffer, ChannelLayout};
    use crate::mixer::LayerMixer;
    use crate::segment::SonicInstruction;
    use crate::source::MemoryFetcher;
    use approx::assert_relative_eq;
    use std::time::Duration;
    use tokio::time::Instant;

    const RATE: u32 = 8000;

    fn wav(seconds: f64) -> Vec<u8> {
        let n = (seconds * RATE as f64) as usize;
        let mut buffer = AudioBuffer::new(n, ChannelLayout::Mono, RATE);
        buffer.channel_mut(0).fill(0.2);
        encode_wav(&buffer).unwrap()
    }

    fn fixed_gap() -> PlayerConfig {
        PlayerConfig {
            gap_base_secs: 2.0,
            gap_jitter_secs: 0.0,
            ..PlayerConfig::default()
        }
    }

    struct Rig {
        context: AudioContext,
        mixer: SharedMixer,
        fetcher: Arc<MemoryFetcher>,
        player: SegmentQueuePlayer,
    }

    fn rig(config: PlayerConfig) -> Rig {
        let context = AudioContext::new(RATE).unwrap();
        let mixer = LayerMixer::new(context.clone(), &MixerConfig::default()).into_shared();
        let fetcher = Arc::new(MemoryFetcher::new());
        let source = Arc::new(SegmentSource::new(fetcher.clone()));
        let player = SegmentQueuePlayer::spawn(
            context.clone(),
            mixer.clone(),
            source,
            None,
            config,
            LayerLevels::default(),
        );
        Rig {
            context,
            mixer,
            fetcher,
            player,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_without_streaming_is_rejected() {
        let rig = rig(fixed_gap());
        let err = rig
            .player
            .play_queue(Vec::new(), false, NoopObserver)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NO_SEGMENTS");
        assert_eq!(rig.player.state().phase, PlayerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_segment_end_moves_into_gap() {
        let rig = rig(fixed_gap());
        rig.fetcher.insert("a", wav(1.0));
        rig.fetcher.insert("b", wav(1.0));
        let segments = vec![Segment::new("a", "one"), Segment::new("b", "two")];
        rig.player
            .play_queue(segments, false, NoopObserver)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(rig.player.state().phase, PlayerPhase::PlayingSegment { index: 0 });
        assert!(rig.mixer.lock().unwrap().is_active(LayerName::Voice));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(rig.player.state().phase, PlayerPhase::Gap { next: 1 });
        assert!(!rig.mixer.lock().unwrap().is_active(LayerName::Voice));
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_ducks_bed_and_restores() {
        let rig = rig(fixed_gap());
        rig.fetcher.insert("a", wav(1.0));

        let bed = Arc::new(crate::engine::decode_wav(&wav(4.0)).unwrap());
        rig.mixer
            .lock()
            .unwrap()
            .play_buffer(LayerName::Atmosphere, bed, 0.5, true);

        rig.player
            .play_queue(vec![Segment::new("a", "")], false, NoopObserver)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        let ducked = rig.mixer.lock().unwrap().volume(LayerName::Atmosphere);
        assert_relative_eq!(ducked, 0.3, epsilon = 0.02);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let restored = rig.mixer.lock().unwrap().volume(LayerName::Atmosphere);
        assert_relative_eq!(restored, 0.5, epsilon = 0.02);
        assert_eq!(rig.player.state().phase, PlayerPhase::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fade_instruction_scales_by_user_level() {
        let rig = rig(fixed_gap());
        rig.fetcher.insert("a", wav(3.0));
        rig.mixer.lock().unwrap().play_buffer(
            LayerName::Texture,
            Arc::new(AudioBuffer::new(RATE as usize, ChannelLayout::Stereo, RATE)),
            0.35,
            true,
        );

        let segment =
            Segment::new("a", "").with_instruction(SonicInstruction::fade(LayerName::Texture, 0.5, 1.0));
        rig.player
            .play_queue(vec![segment], false, NoopObserver)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        // 0.5 of the configured 0.35
        let volume = rig.mixer.lock().unwrap().volume(LayerName::Texture);
        assert_relative_eq!(volume, 0.175, epsilon = 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_returns_to_idle_without_completion() {
        let rig = rig(fixed_gap());
        rig.fetcher.insert("a", wav(2.0));
        let (observer, mut events) = ChannelObserver::new();
        rig.player
            .play_queue(vec![Segment::new("a", "")], false, observer)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        rig.player.stop().await;
        assert_eq!(rig.player.state().phase, PlayerPhase::Idle);
        assert!(!rig.mixer.lock().unwrap().is_active(LayerName::Voice));

        tokio::time::sleep(Duration::from_secs(5)).await;
        while let Ok(event) = events.try_recv() {
            assert_ne!(event, PlayerEvent::Complete);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_resolves_on_complete() {
        let rig = rig(fixed_gap());
        rig.fetcher.insert("a", wav(1.0));
        let start = Instant::now();
        rig.player
            .play_queue(vec![Segment::new("a", "")], false, NoopObserver)
            .await
            .unwrap();
        let snapshot = rig.player.finished().await;
        assert_eq!(snapshot.phase, PlayerPhase::Complete);
        assert_relative_eq!(snapshot.progress_percent, 100.0);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(rig.context.current_time() >= 1.0);
    }
}
