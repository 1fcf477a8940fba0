//! Progress monitoring of ffmpeg's `-progress` log.
//!
//! ffmpeg appends a block of `key=value` lines ending in `progress=...`
//! roughly once a second. The monitor tails the log backwards in fixed
//! chunks until it has enough lines for one complete block, parses the
//! block, and publishes it to the job's shared [`ProgressRecord`]. A
//! missing log file is retried silently; any `progress` value other than
//! `continue` is terminal.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use riprun_config::ProgressConfig;

use crate::job::SharedProgress;

/// One parsed progress block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub frame: u64,
    pub fps: f64,
    pub out_time_us: i64,
    pub speed: f64,
    pub finished: bool,
}

/// Reads the trailing lines of a file by stepping backwards in
/// `chunk_bytes` increments until at least `min_lines` lines are available
/// or the start of the file is reached.
pub fn tail_lines(path: &Path, chunk_bytes: u64, min_lines: usize) -> std::io::Result<Vec<String>> {
    let mut file = std::fs::File::open(path)?;
    let total = file.metadata()?.len();
    let mut pos = total;

    loop {
        let step = chunk_bytes.min(pos);
        pos -= step;
        file.seek(SeekFrom::Start(pos))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let lines: Vec<String> = buf.lines().map(|l| l.to_string()).collect();
        if lines.len() >= min_lines || pos == 0 {
            return Ok(lines);
        }
    }
}

/// Parses the last `min_lines` lines of a progress log into an update.
/// Returns `None` when no `progress` marker is present yet.
pub fn parse_progress(lines: &[String], min_lines: usize) -> Option<ProgressUpdate> {
    let start = lines.len().saturating_sub(min_lines);
    let mut fields: Vec<(&str, &str)> = Vec::new();
    for line in &lines[start..] {
        if let Some((k, v)) = line.trim().split_once('=') {
            fields.push((k, v));
        }
    }
    let get = |key: &str| fields.iter().rev().find(|(k, _)| *k == key).map(|(_, v)| *v);

    let marker = get("progress")?;
    let out_time_us = get("out_time_us").unwrap_or("");
    let speed = get("speed").unwrap_or("").trim_end_matches('x');

    Some(ProgressUpdate {
        frame: get("frame").and_then(|v| v.trim().parse().ok()).unwrap_or(0),
        fps: get("fps").and_then(|v| v.trim().parse().ok()).unwrap_or(0.0),
        out_time_us: if out_time_us == "N/A" {
            0
        } else {
            out_time_us.trim().parse().unwrap_or(0)
        },
        speed: if speed == "N/A" {
            0.0
        } else {
            speed.trim().parse().unwrap_or(0.0)
        },
        finished: marker != "continue",
    })
}

/// Polls a progress log until the encoder writes a terminal marker,
/// publishing each update into `shared`. Intended to be spawned as a task
/// and aborted by the caller once the encoding process has exited.
pub async fn monitor(path: PathBuf, shared: SharedProgress, config: ProgressConfig) {
    let mut ticker =
        tokio::time::interval(std::time::Duration::from_secs(config.poll_interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let lines = match tail_lines(&path, config.chunk_bytes.max(1), config.min_lines) {
            Ok(lines) => lines,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::error!("failed to read progress log {}: {}", path.display(), e);
                continue;
            }
        };

        if let Some(update) = parse_progress(&lines, config.min_lines) {
            let finished = update.finished;
            if let Ok(mut record) = shared.lock() {
                record.frame = update.frame;
                record.fps = update.fps;
                record.out_time_us = update.out_time_us;
                record.speed = update.speed;
                record.finished = finished;
            }
            if finished {
                break;
            }
        }
    }
}
