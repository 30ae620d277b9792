//! CLI Module
//!
//! Command-line interface for rendering Reverie sessions offline.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Reverie - progressive meditation playback engine
#[derive(Parser, Debug)]
#[command(name = "reverie")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Play a segment manifest and render the mix
    #[command(name = "play")]
    Play {
        /// JSON array of segments; relative audio paths resolve against it
        #[arg(short, long)]
        manifest: PathBuf,

        /// Directory of `<id>.wav` soundscapes
        #[arg(long)]
        soundscapes: Option<PathBuf>,

        /// Soundscape id for the atmosphere layer
        #[arg(short, long)]
        atmosphere: Option<String>,

        /// Write the rendered mix to this WAV file
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Engine configuration JSON
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Feed segments one at a time with this delay, as a generator would
        #[arg(long)]
        stream_interval_ms: Option<u64>,

        /// Preferences file for layer volumes
        #[arg(long)]
        prefs: Option<PathBuf>,
    },

    /// Write a looping pink-noise bed
    #[command(name = "texture")]
    Texture {
        /// Output WAV file
        #[arg(short, long)]
        out: PathBuf,

        /// Length in seconds
        #[arg(short, long, default_value_t = 2.0)]
        seconds: f64,

        /// Loudness in dBFS RMS
        #[arg(long, default_value_t = -18.0, allow_hyphen_values = true)]
        rms_db: f32,
    },

    /// Render a binaural beat glide
    #[command(name = "binaural")]
    Binaural {
        /// Output WAV file
        #[arg(short, long)]
        out: PathBuf,

        /// Length in seconds; the glide spans all of it
        #[arg(short, long, default_value_t = 30.0)]
        seconds: f64,

        /// Left-ear carrier frequency in Hz
        #[arg(long, default_value_t = 110.0)]
        base: f32,

        /// Beat frequency at the start
        #[arg(long, default_value_t = 14.0)]
        from: f32,

        /// Beat frequency at the end
        #[arg(long, default_value_t = 2.0)]
        to: f32,
    },

    /// List the soundscapes in a directory
    #[command(name = "soundscapes")]
    Soundscapes {
        /// Soundscape directory
        dir: PathBuf,
    },
}
