//! Source media probing.
//!
//! Runs ffprobe against the primary input to collect the video facts needed
//! for `auto` frame-rate snapping and the audio facts driving the flac
//! preset's codec selection. Probe failure is recoverable: callers fall back
//! to [`MediaInfo::default`] and log a warning.

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe command failed to execute.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// Failed to parse ffprobe JSON output.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// IO error during probe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata extracted from the first video and audio streams of an input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaInfo {
    /// Container frame count of the first video stream.
    pub nb_frames: u64,
    /// Base frame rate as a rational (numerator, denominator).
    pub r_frame_rate: (u32, u32),
    /// Duration in seconds.
    pub duration: f64,
    /// Sample format of the first audio stream (e.g. "s16", "fltp").
    pub sample_fmt: String,
    pub sample_rate: u32,
    pub bits_per_sample: u32,
    pub bits_per_raw_sample: u32,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            nb_frames: 0,
            r_frame_rate: (0, 1),
            duration: 0.0,
            sample_fmt: String::new(),
            sample_rate: 0,
            bits_per_sample: 0,
            bits_per_raw_sample: 0,
        }
    }
}

impl MediaInfo {
    /// Frame rate as a float, or 0 when the denominator is zero.
    pub fn frame_rate(&self) -> f64 {
        if self.r_frame_rate.1 == 0 {
            0.0
        } else {
            f64::from(self.r_frame_rate.0) / f64::from(self.r_frame_rate.1)
        }
    }
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
    }

    // ffprobe reports most numeric stream fields as strings.
    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub nb_frames: Option<String>,
        pub r_frame_rate: Option<String>,
        pub duration: Option<String>,
        pub sample_fmt: Option<String>,
        pub sample_rate: Option<String>,
        pub bits_per_sample: Option<u32>,
        pub bits_per_raw_sample: Option<String>,
    }
}

fn run_ffprobe(path: &Path, stream_selector: &str) -> Result<String, ProbeError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "0",
            "-select_streams",
            stream_selector,
            "-show_streams",
            "-print_format",
            "json",
        ])
        .arg(path)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Probes the first video and audio streams of `path`.
pub fn probe_media(path: &Path) -> Result<MediaInfo, ProbeError> {
    let mut info = MediaInfo::default();

    let video_json = run_ffprobe(path, "v:0")?;
    apply_video_stream(&mut info, &video_json)?;

    let audio_json = run_ffprobe(path, "a:0")?;
    apply_audio_stream(&mut info, &audio_json)?;

    Ok(info)
}

/// Parses a rational like "24000/1001" or "25"; a missing denominator is 1.
fn parse_rational(value: &str) -> (u32, u32) {
    let mut parts = value.split('/');
    let num = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);
    let den = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(1);
    (num, den)
}

/// Fills the video fields of `info` from ffprobe JSON output.
pub fn apply_video_stream(info: &mut MediaInfo, json_str: &str) -> Result<(), ProbeError> {
    let parsed: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    if let Some(stream) = parsed.streams.unwrap_or_default().into_iter().next() {
        if let Some(rate) = stream.r_frame_rate.as_deref() {
            info.r_frame_rate = parse_rational(rate);
        }
        info.nb_frames = stream
            .nb_frames
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        info.duration = stream
            .duration
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
    }
    Ok(())
}

/// Fills the audio fields of `info` from ffprobe JSON output.
pub fn apply_audio_stream(info: &mut MediaInfo, json_str: &str) -> Result<(), ProbeError> {
    let parsed: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    if let Some(stream) = parsed.streams.unwrap_or_default().into_iter().next() {
        info.sample_fmt = stream.sample_fmt.unwrap_or_default();
        info.sample_rate = stream
            .sample_rate
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        info.bits_per_sample = stream.bits_per_sample.unwrap_or(0);
        info.bits_per_raw_sample = stream
            .bits_per_raw_sample
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_video_stream_parses_fields() {
        let json = r#"{
            "streams": [{
                "r_frame_rate": "24000/1001",
                "nb_frames": "34047",
                "duration": "1420.127000"
            }]
        }"#;
        let mut info = MediaInfo::default();
        apply_video_stream(&mut info, json).unwrap();
        assert_eq!(info.r_frame_rate, (24000, 1001));
        assert_eq!(info.nb_frames, 34047);
        assert!((info.duration - 1420.127).abs() < 1e-6);
    }

    #[test]
    fn test_apply_audio_stream_parses_fields() {
        let json = r#"{
            "streams": [{
                "sample_fmt": "s32",
                "sample_rate": "96000",
                "bits_per_sample": 0,
                "bits_per_raw_sample": "24"
            }]
        }"#;
        let mut info = MediaInfo::default();
        apply_audio_stream(&mut info, json).unwrap();
        assert_eq!(info.sample_fmt, "s32");
        assert_eq!(info.sample_rate, 96000);
        assert_eq!(info.bits_per_raw_sample, 24);
    }

    #[test]
    fn test_empty_streams_leave_defaults() {
        let mut info = MediaInfo::default();
        apply_video_stream(&mut info, r#"{"streams": []}"#).unwrap();
        apply_audio_stream(&mut info, r#"{}"#).unwrap();
        assert_eq!(info, MediaInfo::default());
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let mut info = MediaInfo::default();
        let err = apply_video_stream(&mut info, "not json").unwrap_err();
        assert!(matches!(err, ProbeError::ParseError(_)));
    }

    #[test]
    fn test_frame_rate_float() {
        let info = MediaInfo {
            r_frame_rate: (24000, 1001),
            ..MediaInfo::default()
        };
        assert!((info.frame_rate() - 23.976).abs() < 0.001);
        assert_eq!(MediaInfo::default().frame_rate(), 0.0);
    }

    #[test]
    fn test_parse_rational_without_denominator() {
        assert_eq!(parse_rational("25"), (25, 1));
        assert_eq!(parse_rational("30000/1001"), (30000, 1001));
        assert_eq!(parse_rational("garbage"), (0, 1));
    }
}
