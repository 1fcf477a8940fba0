//! Per-job input facts derived before command assembly.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::params::ParameterSet;
use crate::probe::MediaInfo;

/// Everything about one input that command assembly needs besides the
/// option map itself.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFacts {
    /// Primary input path.
    pub input: PathBuf,
    /// The input is consumed through a vapoursynth pipe.
    pub is_pipe_input: bool,
    /// Explicit pipe script, when the input itself is not a `.vpy` file.
    pub pipe_script: Option<String>,
    /// Frame rate forced on the output, already snapped when `auto`.
    pub forced_fps: Option<String>,
    /// Probed source metadata. Defaults when probing was skipped or failed.
    pub media: MediaInfo,
    /// Per-job ffmpeg progress log.
    pub progress_log: PathBuf,
    /// Per-job ffmpeg report log.
    pub report_log: PathBuf,
}

impl InputFacts {
    /// Derives the facts for one input. `job_id` keys the log file names so
    /// concurrent jobs never share a log.
    pub fn derive(input: &Path, options: &ParameterSet, media: MediaInfo, job_id: Uuid) -> Self {
        let pipe_script = options.get_non_empty("pipe").map(|s| s.to_string());
        if let Some(script) = pipe_script.as_deref() {
            if !Path::new(script).exists() {
                tracing::error!("The file \"{}\" does not exist", script);
            }
        }
        let is_vpy = input
            .extension()
            .map(|ext| ext == "vpy")
            .unwrap_or(false);
        let is_pipe_input = is_vpy || pipe_script.is_some();

        let forced_fps = forced_frame_rate(options, &media);

        let tmp = std::env::temp_dir();
        InputFacts {
            input: input.to_path_buf(),
            is_pipe_input,
            pipe_script,
            forced_fps,
            media,
            progress_log: tmp.join(format!("riprun-progress-{}.log", job_id)),
            report_log: tmp.join(format!("riprun-report-{}.log", job_id)),
        }
    }
}

/// Resolves the `r`/`fps` option. A literal value passes through verbatim;
/// `auto` snaps the probed rate to a canonical NTSC rational when it falls
/// inside a 0.001 window, otherwise the probed decimal value is used.
pub fn forced_frame_rate(options: &ParameterSet, media: &MediaInfo) -> Option<String> {
    let value = options
        .get_non_empty("r")
        .or_else(|| options.get_non_empty("fps"))?;
    if value == "auto" {
        Some(snap_frame_rate(media.frame_rate()))
    } else {
        Some(value.to_string())
    }
}

/// Snaps a measured frame rate to its canonical rational form.
pub fn snap_frame_rate(rate: f64) -> String {
    if rate > 23.975 && rate < 23.977 {
        "24000/1001".to_string()
    } else if rate > 29.969 && rate < 29.971 {
        "30000/1001".to_string()
    } else if rate > 47.951 && rate < 47.953 {
        "48000/1001".to_string()
    } else if rate > 59.939 && rate < 59.941 {
        "60000/1001".to_string()
    } else {
        rate.to_string()
    }
}
