//! The job queue.
//!
//! A plain ordered list with 1-based user-facing indices, matching how the
//! queue is addressed from the command line. Sorting orders by the joined
//! input paths, either lexically or naturally (digit runs compared as
//! numbers).

use std::cmp::Ordering;

use thiserror::Error;

use crate::job::Job;

/// Error type for queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A 1-based index was outside the queue.
    #[error("index {index} is out of range for a queue of {len}")]
    OutOfRange { index: usize, len: usize },
}

/// Ordered list of jobs awaiting execution.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Vec<Job>,
}

/// One piece of a natural sort key. Numbers order before text so that
/// digit runs compare numerically against each other.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum NaturalPart {
    Number(u128),
    Text(String),
}

/// Splits a string into alternating text and digit runs.
fn natural_key(s: &str) -> Vec<NaturalPart> {
    let mut parts = Vec::new();
    let mut buf = String::new();
    let mut digits = false;
    for ch in s.chars() {
        if ch.is_ascii_digit() != digits && !buf.is_empty() {
            parts.push(finish_part(std::mem::take(&mut buf), digits));
        }
        digits = ch.is_ascii_digit();
        buf.push(ch);
    }
    if !buf.is_empty() {
        parts.push(finish_part(buf, digits));
    }
    parts
}

fn finish_part(buf: String, digits: bool) -> NaturalPart {
    if digits {
        // Truncation is fine: digit runs past u128 range fall back to text.
        match buf.parse::<u128>() {
            Ok(n) => NaturalPart::Number(n),
            Err(_) => NaturalPart::Text(buf),
        }
    } else {
        NaturalPart::Text(buf.to_lowercase())
    }
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a).cmp(&natural_key(b))
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, job: Job) {
        tracing::info!(job_id = %job.id, "queued: {}", job.describe());
        self.jobs.push(job);
    }

    pub fn extend(&mut self, jobs: impl IntoIterator<Item = Job>) {
        for job in jobs {
            self.append(job);
        }
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Removes all jobs from the queue, handing them to the caller.
    pub fn drain_all(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.jobs)
    }

    /// Deletes the job at a 1-based position. Later jobs keep their
    /// relative order and shift up by one.
    pub fn delete_at(&mut self, index: usize) -> Result<Job, QueueError> {
        if index == 0 || index > self.jobs.len() {
            return Err(QueueError::OutOfRange {
                index,
                len: self.jobs.len(),
            });
        }
        Ok(self.jobs.remove(index - 1))
    }

    /// Swaps two jobs by their 1-based positions. A zero, negative, or
    /// out-of-range index leaves the queue unchanged and logs a warning.
    pub fn swap(&mut self, a: i64, b: i64) -> bool {
        let len = self.jobs.len() as i64;
        if a < 1 || b < 1 || a > len || b > len {
            tracing::warn!(
                "swap indices {} and {} out of range for a queue of {}, leaving unchanged",
                a,
                b,
                len
            );
            return false;
        }
        self.jobs.swap((a - 1) as usize, (b - 1) as usize);
        true
    }

    fn sort_key(job: &Job) -> String {
        job.inputs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("::")
    }

    /// Sorts by the joined input paths, comparing digit runs numerically.
    pub fn sort_natural(&mut self, reverse: bool) {
        self.jobs
            .sort_by(|x, y| natural_cmp(&Self::sort_key(x), &Self::sort_key(y)));
        if reverse {
            self.jobs.reverse();
        }
    }

    /// Sorts by the joined input paths as plain strings.
    pub fn sort_lexical(&mut self, reverse: bool) {
        self.jobs.sort_by(|x, y| Self::sort_key(x).cmp(&Self::sort_key(y)));
        if reverse {
            self.jobs.reverse();
        }
    }

    /// Numbered listing of the queue contents.
    pub fn describe(&self) -> String {
        let mut out = format!("job queue ({}):", self.jobs.len());
        for (i, job) in self.jobs.iter().enumerate() {
            out.push_str(&format!("\n  {}. {}", i + 1, job.describe()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::tests::job_with_input;

    fn queue_of(inputs: &[&str]) -> JobQueue {
        let mut queue = JobQueue::new();
        for input in inputs {
            queue.append(job_with_input(input));
        }
        queue
    }

    fn input_names(queue: &JobQueue) -> Vec<String> {
        queue
            .jobs()
            .iter()
            .map(|j| j.primary_input().display().to_string())
            .collect()
    }

    #[test]
    fn test_natural_sort_orders_digit_runs_numerically() {
        let mut queue = queue_of(&["a10.mkv", "a2.mkv", "a1.mkv"]);
        queue.sort_natural(false);
        assert_eq!(input_names(&queue), vec!["a1.mkv", "a2.mkv", "a10.mkv"]);
    }

    #[test]
    fn test_natural_sort_reverse() {
        let mut queue = queue_of(&["a1.mkv", "a10.mkv", "a2.mkv"]);
        queue.sort_natural(true);
        assert_eq!(input_names(&queue), vec!["a10.mkv", "a2.mkv", "a1.mkv"]);
    }

    #[test]
    fn test_natural_sort_is_case_insensitive() {
        let mut queue = queue_of(&["B2.mkv", "b10.mkv", "a5.mkv"]);
        queue.sort_natural(false);
        assert_eq!(input_names(&queue), vec!["a5.mkv", "B2.mkv", "b10.mkv"]);
    }

    #[test]
    fn test_lexical_sort_orders_digit_runs_as_text() {
        let mut queue = queue_of(&["a10.mkv", "a2.mkv", "a1.mkv"]);
        queue.sort_lexical(false);
        assert_eq!(input_names(&queue), vec!["a1.mkv", "a10.mkv", "a2.mkv"]);
    }

    #[test]
    fn test_delete_at_keeps_later_order() {
        let mut queue = queue_of(&["a.mkv", "b.mkv", "c.mkv"]);
        let removed = queue.delete_at(2).unwrap();
        assert_eq!(removed.primary_input().display().to_string(), "b.mkv");
        assert_eq!(input_names(&queue), vec!["a.mkv", "c.mkv"]);
    }

    #[test]
    fn test_delete_at_rejects_zero_and_out_of_range() {
        let mut queue = queue_of(&["a.mkv"]);
        assert!(matches!(
            queue.delete_at(0),
            Err(QueueError::OutOfRange { index: 0, .. })
        ));
        assert!(queue.delete_at(2).is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_swap_valid_indices() {
        let mut queue = queue_of(&["a.mkv", "b.mkv", "c.mkv"]);
        assert!(queue.swap(1, 3));
        assert_eq!(input_names(&queue), vec!["c.mkv", "b.mkv", "a.mkv"]);
    }

    #[test]
    fn test_swap_zero_or_negative_leaves_unchanged() {
        let mut queue = queue_of(&["a.mkv", "b.mkv"]);
        assert!(!queue.swap(0, 2));
        assert!(!queue.swap(-1, 1));
        assert_eq!(input_names(&queue), vec!["a.mkv", "b.mkv"]);
    }

    #[test]
    fn test_swap_out_of_range_leaves_unchanged() {
        let mut queue = queue_of(&["a.mkv", "b.mkv"]);
        assert!(!queue.swap(1, 3));
        assert_eq!(input_names(&queue), vec!["a.mkv", "b.mkv"]);
    }

    #[test]
    fn test_drain_all_empties_queue() {
        let mut queue = queue_of(&["a.mkv", "b.mkv"]);
        let jobs = queue.drain_all();
        assert_eq!(jobs.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_describe_numbers_from_one() {
        let queue = queue_of(&["a.mkv"]);
        let listing = queue.describe();
        assert!(listing.starts_with("job queue (1):"));
        assert!(listing.contains("\n  1. "));
    }

    #[test]
    fn test_natural_key_mixed_segments() {
        assert_eq!(natural_cmp("ep2", "ep10"), Ordering::Less);
        assert_eq!(natural_cmp("ep10", "ep10"), Ordering::Equal);
        assert_eq!(natural_cmp("10", "a"), Ordering::Less);
    }
}
