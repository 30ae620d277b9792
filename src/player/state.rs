//! Player state and observer hooks

use std::fmt;

use tokio::sync::mpsc;

use crate::segment::Segment;

/// Where the segment queue player is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerPhase {
    /// No session; `play_queue` starts one
    #[default]
    Idle,
    /// Segment `index` is loading or audible
    PlayingSegment { index: usize },
    /// Pause between segments before `next` starts
    Gap { next: usize },
    /// Queue exhausted but the producer may append more
    WaitingForMore,
    /// Stopped at an offset inside segment `index`
    Paused { index: usize },
    /// Every segment has played or been skipped
    Complete,
}

impl PlayerPhase {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlayerPhase::PlayingSegment { .. } | PlayerPhase::Gap { .. } | PlayerPhase::WaitingForMore
        )
    }
}

impl fmt::Display for PlayerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerPhase::Idle => write!(f, "idle"),
            PlayerPhase::PlayingSegment { index } => write!(f, "playing-segment({})", index),
            PlayerPhase::Gap { next } => write!(f, "gap-before({})", next),
            PlayerPhase::WaitingForMore => write!(f, "waiting-for-more"),
            PlayerPhase::Paused { index } => write!(f, "paused({})", index),
            PlayerPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Point-in-time view of playback for the UI
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackSnapshot {
    pub phase: PlayerPhase,
    pub is_playing: bool,
    pub is_paused: bool,
    pub current_segment_index: usize,
    pub total_segments: usize,
    /// 0 to 100, never decreasing within a session
    pub progress_percent: f64,
    pub current_time_seconds: f64,
    pub total_duration_seconds: f64,
    /// Segments skipped because they could not be fetched or decoded
    pub segments_failed: usize,
    pub streaming: bool,
}

impl PlaybackSnapshot {
    /// True when a finished session produced no audible segment
    pub fn nothing_played(&self) -> bool {
        self.phase == PlayerPhase::Complete
            && self.total_segments > 0
            && self.segments_failed == self.total_segments
    }
}

/// Callbacks fired by the player
///
/// All methods run on the player task and must not block.
pub trait PlaybackObserver: Send {
    /// Periodic while a segment or gap is in progress
    fn on_progress(&mut self, _state: &PlaybackSnapshot) {}

    /// When a segment starts; not repeated when it resumes after a pause
    fn on_segment_change(&mut self, _index: usize, _segment: &Segment) {}

    /// Once, when the session completes
    fn on_complete(&mut self) {}
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NoopObserver;

impl PlaybackObserver for NoopObserver {}

/// Observer callbacks as messages
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Progress(PlaybackSnapshot),
    SegmentChanged { index: usize, segment_id: String },
    Complete,
}

/// Forwards callbacks over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<PlayerEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl PlaybackObserver for ChannelObserver {
    fn on_progress(&mut self, state: &PlaybackSnapshot) {
        let _ = self.sender.send(PlayerEvent::Progress(state.clone()));
    }

    fn on_segment_change(&mut self, index: usize, segment: &Segment) {
        let _ = self.sender.send(PlayerEvent::SegmentChanged {
            index,
            segment_id: segment.id.clone(),
        });
    }

    fn on_complete(&mut self) {
        let _ = self.sender.send(PlayerEvent::Complete);
    }
}
