//! riprun
//!
//! Command-driven media transcoding front end: expands requests into a job
//! queue and drives external encoder command chains to completion.

pub mod expand;
pub mod facts;
pub mod job;
pub mod orchestrator;
pub mod params;
pub mod plan;
pub mod preset;
pub mod probe;
pub mod progress;
pub mod queue;
pub mod report;
pub mod runlock;

pub use riprun_config as config;
pub use riprun_config::Settings;

pub use expand::{expand, ExpandError, Request};
pub use facts::{snap_frame_rate, InputFacts};
pub use job::{Job, ProgressRecord, SharedProgress};
pub use orchestrator::{Orchestrator, RunError, RunOutcome};
pub use params::{resolve, ParameterSet};
pub use plan::{assemble, CommandPlan, PlanError};
pub use preset::{AudioCodec, Container, Preset};
pub use probe::{probe_media, MediaInfo, ProbeError};
pub use progress::{monitor, parse_progress, tail_lines, ProgressUpdate};
pub use queue::{JobQueue, QueueError};
pub use report::{drain_report_log, Reporter, RunTally};
pub use runlock::{lock_path_for, LockError, LockInfo, RunLock};
