//! Preset, audio codec, and container vocabulary.
//!
//! Parsing is lenient: an unknown identifier logs an error and falls back to
//! the documented default instead of aborting the request.

use std::fmt;

/// x264 preset tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum X264Tier {
    Fast,
    Slow,
}

/// x265 preset tiers, ordered fastest to slowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum X265Tier {
    Fast4,
    Fast3,
    Fast2,
    Fast,
    Slow,
    Full,
}

/// Encoding preset selected for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// User-supplied command template
    Custom,
    /// Stream copy without re-encoding
    Copy,
    /// Lossless audio extraction
    Flac,
    X264(X264Tier),
    X265(X265Tier),
}

impl Preset {
    /// All recognized preset identifiers.
    pub const IDS: &'static [&'static str] = &[
        "custom",
        "copy",
        "flac",
        "x264fast",
        "x264slow",
        "x265fast4",
        "x265fast3",
        "x265fast2",
        "x265fast",
        "x265slow",
        "x265full",
    ];

    /// Parses a preset identifier, falling back to `custom` on anything
    /// unrecognized.
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "custom" => Preset::Custom,
            "copy" => Preset::Copy,
            "flac" => Preset::Flac,
            "x264fast" => Preset::X264(X264Tier::Fast),
            "x264slow" => Preset::X264(X264Tier::Slow),
            "x265fast4" => Preset::X265(X265Tier::Fast4),
            "x265fast3" => Preset::X265(X265Tier::Fast3),
            "x265fast2" => Preset::X265(X265Tier::Fast2),
            "x265fast" => Preset::X265(X265Tier::Fast),
            "x265slow" => Preset::X265(X265Tier::Slow),
            "x265full" => Preset::X265(X265Tier::Full),
            other => {
                tracing::error!(
                    "'{}' is not a valid preset, set to default value 'custom'. Valid options are: {:?}",
                    other,
                    Preset::IDS
                );
                Preset::Custom
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Custom => "custom",
            Preset::Copy => "copy",
            Preset::Flac => "flac",
            Preset::X264(X264Tier::Fast) => "x264fast",
            Preset::X264(X264Tier::Slow) => "x264slow",
            Preset::X265(X265Tier::Fast4) => "x265fast4",
            Preset::X265(X265Tier::Fast3) => "x265fast3",
            Preset::X265(X265Tier::Fast2) => "x265fast2",
            Preset::X265(X265Tier::Fast) => "x265fast",
            Preset::X265(X265Tier::Slow) => "x265slow",
            Preset::X265(X265Tier::Full) => "x265full",
        }
    }
}

impl Default for Preset {
    fn default() -> Self {
        Preset::Custom
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audio encoder applied to the audio branch of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Copy,
    Libopus,
}

impl AudioCodec {
    /// Parses an audio codec name, falling back to `copy` on anything
    /// unrecognized.
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "copy" => AudioCodec::Copy,
            "libopus" => AudioCodec::Libopus,
            other => {
                tracing::error!(
                    "'{}' is not a valid audio codec, set to default value 'copy'. Valid options are: [\"copy\", \"libopus\"]",
                    other
                );
                AudioCodec::Copy
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCodec::Copy => "copy",
            AudioCodec::Libopus => "libopus",
        }
    }
}

impl Default for AudioCodec {
    fn default() -> Self {
        AudioCodec::Copy
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output container handled by the post-processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Mkv,
}

impl Container {
    /// Parses a container name, falling back to `mkv` on anything
    /// unrecognized.
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "mp4" => Container::Mp4,
            "mkv" => Container::Mkv,
            other => {
                tracing::error!(
                    "'{}' is not a valid container, set to default value 'mkv'. Valid options are: [\"mp4\", \"mkv\"]",
                    other
                );
                Container::Mkv
            }
        }
    }

    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mkv => "mkv",
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Container::Mkv
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_presets() {
        assert_eq!(Preset::parse_lenient("copy"), Preset::Copy);
        assert_eq!(Preset::parse_lenient("flac"), Preset::Flac);
        assert_eq!(Preset::parse_lenient("x264fast"), Preset::X264(X264Tier::Fast));
        assert_eq!(Preset::parse_lenient("x265slow"), Preset::X265(X265Tier::Slow));
        assert_eq!(Preset::parse_lenient("x265fast4"), Preset::X265(X265Tier::Fast4));
    }

    #[test]
    fn test_unknown_preset_falls_back_to_custom() {
        assert_eq!(Preset::parse_lenient("av1ultra"), Preset::Custom);
        assert_eq!(Preset::parse_lenient(""), Preset::Custom);
    }

    #[test]
    fn test_preset_roundtrip_through_as_str() {
        for id in Preset::IDS {
            assert_eq!(Preset::parse_lenient(id).as_str(), *id);
        }
    }

    #[test]
    fn test_unknown_audio_codec_falls_back_to_copy() {
        assert_eq!(AudioCodec::parse_lenient("aac"), AudioCodec::Copy);
        assert_eq!(AudioCodec::parse_lenient("libopus"), AudioCodec::Libopus);
    }

    #[test]
    fn test_unknown_container_falls_back_to_mkv() {
        assert_eq!(Container::parse_lenient("webm"), Container::Mkv);
        assert_eq!(Container::parse_lenient("mp4"), Container::Mp4);
        assert_eq!(Container::Mp4.extension(), "mp4");
    }
}
