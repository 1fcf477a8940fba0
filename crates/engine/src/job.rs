//! Job definitions and shared progress state.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::facts::InputFacts;
use crate::params::ParameterSet;
use crate::plan::CommandPlan;
use crate::preset::Preset;

/// Live progress of a running job, updated by the progress monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Total frames of the source, when known.
    pub frame_count: u64,
    /// Total duration of the source in seconds, when known.
    pub duration: f64,
    /// Frames written so far.
    pub frame: u64,
    /// Current output frame rate.
    pub fps: f64,
    /// Output timestamp in microseconds.
    pub out_time_us: i64,
    /// Encoding speed relative to realtime.
    pub speed: f64,
    /// The encoder reported a terminal progress marker.
    pub finished: bool,
}

/// Progress handle shared between a job and its monitor task.
pub type SharedProgress = Arc<Mutex<ProgressRecord>>;

/// One expanded unit of work: a fully resolved command plan bound to
/// concrete inputs and an output name.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    /// Primary input first; auxiliary inputs follow.
    pub inputs: Vec<PathBuf>,
    /// Final output file name without directory or suffix.
    pub output_prefix: String,
    pub output_dir: PathBuf,
    pub preset: Preset,
    /// The request's option map.
    pub options: ParameterSet,
    /// Resolved encoder parameters.
    pub params: ParameterSet,
    pub plan: CommandPlan,
    pub facts: InputFacts,
    /// Creation timestamp in epoch milliseconds.
    pub created_at_ms: u64,
    pub progress: SharedProgress,
}

impl Job {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        inputs: Vec<PathBuf>,
        output_prefix: String,
        output_dir: PathBuf,
        preset: Preset,
        options: ParameterSet,
        params: ParameterSet,
        plan: CommandPlan,
        facts: InputFacts,
    ) -> Self {
        Self {
            id,
            inputs,
            output_prefix,
            output_dir,
            preset,
            options,
            params,
            plan,
            facts,
            created_at_ms: current_timestamp_ms(),
            progress: Arc::new(Mutex::new(ProgressRecord::default())),
        }
    }

    /// Primary input of the job.
    pub fn primary_input(&self) -> &PathBuf {
        &self.inputs[0]
    }

    /// Final output file name, suffix included.
    pub fn output_name(&self) -> String {
        format!("{}{}", self.output_prefix, self.plan.output_suffix)
    }

    /// One-line description for queue listings.
    pub fn describe(&self) -> String {
        format!(
            "-i {} -o {} -o:dir {} -preset {}",
            self.inputs
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("::"),
            self.output_prefix,
            self.output_dir.display(),
            self.preset
        )
    }
}

/// Current time in epoch milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
