use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Package a new video; fails if a package with the same name exists
    Ingest {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Split every audio stream into its own playlist
        #[arg(long)]
        extract_audio_tracks: bool,
    },

    /// Reprocess an existing video file, replacing any previous package
    Process {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Split every audio stream into its own playlist
        #[arg(long)]
        extract_audio_tracks: bool,

        /// Delete the input file once packaging succeeded
        #[arg(long)]
        delete_source: bool,
    },

    /// List complete packages
    List {
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy one file out of a package
    Fetch {
        /// Package name
        #[arg(short, long)]
        package: String,

        /// Path inside the package, e.g. audio_track_1/playlist.m3u8
        #[arg(long)]
        path: String,

        /// Destination file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Attach an SRT subtitle file to a package
    AttachSubtitle {
        /// Package name
        #[arg(short, long)]
        package: String,

        /// Subtitle file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Check that ffmpeg and ffprobe are available
    Check,

    /// Serve the catalog and package files over HTTP
    Serve {
        /// Address to bind, overrides the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Write the default configuration
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "hlspack.toml")]
        output: PathBuf,
    },
}
