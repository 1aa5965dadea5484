//! Stream layout of a source file, parsed from `ffprobe -show_streams` JSON.

use serde::{Deserialize, Serialize};

use crate::error::{PackagerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Data,
    Attachment,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Index of the stream in the source container
    pub index: u32,
    pub kind: StreamKind,
    pub codec_name: Option<String>,
    pub language: Option<String>,
}

/// Streams available in one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProbe {
    pub streams: Vec<StreamInfo>,
}

impl StreamProbe {
    pub fn new(mut streams: Vec<StreamInfo>) -> Self {
        streams.sort_by_key(|s| s.index);
        Self { streams }
    }

    /// Convenience constructor: one video stream followed by `audio` audio streams
    pub fn with_audio_streams(audio: usize) -> Self {
        let mut streams = vec![StreamInfo {
            index: 0,
            kind: StreamKind::Video,
            codec_name: Some("h264".to_string()),
            language: None,
        }];
        streams.extend((0..audio).map(|i| StreamInfo {
            index: i as u32 + 1,
            kind: StreamKind::Audio,
            codec_name: Some("aac".to_string()),
            language: None,
        }));
        Self::new(streams)
    }

    pub fn video_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(|s| s.kind == StreamKind::Video)
    }

    /// Audio streams in original index order
    pub fn audio_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(|s| s.kind == StreamKind::Audio)
    }

    pub fn audio_count(&self) -> usize {
        self.audio_streams().count()
    }

    pub fn has_video(&self) -> bool {
        self.video_streams().next().is_some()
    }
}

// ffprobe JSON structures

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: Option<StreamKind>,
    codec_name: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
}

/// Parse ffprobe output. A file without a video stream cannot be packaged.
pub fn parse_ffprobe_json(json: &str) -> Result<StreamProbe> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| PackagerError::ProbeFailed(format!("Unreadable ffprobe output: {}", e)))?;

    let streams = output
        .streams
        .into_iter()
        .map(|s| StreamInfo {
            index: s.index,
            kind: s.codec_type.unwrap_or(StreamKind::Unknown),
            codec_name: s.codec_name,
            language: s.tags.language,
        })
        .collect();

    let probe = StreamProbe::new(streams);
    if !probe.has_video() {
        return Err(PackagerError::ProbeFailed("No video stream found".to_string()));
    }

    Ok(probe)
}
