//! Request expansion: one command-line request becomes zero or more jobs.
//!
//! Expansion applies the output-name iterator mini-language, resolves the
//! subtitle selection mode (single path, `::`-separated list, or `auto`
//! discovery), and produces a fully resolved [`Job`] per variant.

use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use thiserror::Error;
use uuid::Uuid;
use walkdir::WalkDir;

use riprun_config::Settings;

use crate::facts::InputFacts;
use crate::job::Job;
use crate::params::{self, ParameterSet};
use crate::plan::{self, PlanError};
use crate::preset::Preset;
use crate::probe::{self, MediaInfo};
use crate::report::Reporter;

/// One request as parsed from the command line.
#[derive(Debug, Clone)]
pub struct Request {
    /// Raw input path entries; each may carry `?`-joined auxiliary inputs.
    pub inputs: Vec<String>,
    /// Output name pattern, iterator tokens included. Defaults to the
    /// input's stem when absent.
    pub output_base: Option<String>,
    /// Output directory; the working directory when absent.
    pub output_dir: Option<PathBuf>,
    pub preset: Preset,
    pub options: ParameterSet,
}

/// Error type for request expansion.
#[derive(Debug, Error)]
pub enum ExpandError {
    /// The output name contains a character invalid in file names.
    #[error("illegal character in output name \"{0}\"")]
    IllegalOutputName(String),

    /// Command assembly failed.
    #[error(transparent)]
    Plan(#[from] PlanError),
}

const ILLEGAL_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Removes `?{...}` iterator tokens, leaving the literal remainder.
pub fn strip_iterator_tokens(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find("?{") {
        out.push_str(&rest[..open]);
        match rest[open..].find('}') {
            Some(close) => rest = &rest[open + close + 1..],
            None => {
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Validates an output name pattern. Iterator tokens are stripped first, so
/// the `?` and `{`/`}` of a token never count as illegal.
pub fn validate_output_base(pattern: &str) -> Result<(), ExpandError> {
    let literal = strip_iterator_tokens(pattern);
    if literal.contains(ILLEGAL_NAME_CHARS) {
        return Err(ExpandError::IllegalOutputName(literal));
    }
    Ok(())
}

fn format_time_token(fmt: &str, now: &DateTime<Local>) -> String {
    let items: Vec<Item> = StrftimeItems::new(fmt).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        tracing::error!("invalid time format in iterator token: {}", fmt);
        return String::new();
    }
    now.format_with_items(items.into_iter()).to_string()
}

fn format_counter_token(spec: &str, index: usize) -> String {
    let mut start: i64 = 0;
    let mut padding: usize = 0;
    let mut increment: i64 = 1;
    for part in spec.split(',').filter(|s| !s.is_empty()) {
        let Some((key, value)) = part.split_once('=') else {
            tracing::error!("malformed iterator token: ?{{{}}}", spec);
            return String::new();
        };
        let parsed = value.trim().parse::<i64>();
        match (key.trim(), parsed) {
            ("start", Ok(v)) => start = v,
            ("padding", Ok(v)) if v >= 0 => padding = v as usize,
            ("increment", Ok(v)) => increment = v,
            _ => {
                tracing::error!("malformed iterator token: ?{{{}}}", spec);
                return String::new();
            }
        }
    }
    let value = start + index as i64 * increment;
    format!("{:0width$}", value, width = padding)
}

/// Substitutes every `?{...}` token for the input at position `index`.
pub fn substitute_iterators(pattern: &str, index: usize, now: &DateTime<Local>) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find("?{") {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        match tail.find('}') {
            Some(close) => {
                let spec = &tail[2..close];
                if let Some(fmt) = spec.strip_prefix("time:") {
                    out.push_str(&format_time_token(fmt, now));
                } else {
                    out.push_str(&format_counter_token(spec, index));
                }
                rest = &tail[close + 1..];
            }
            None => {
                out.push_str(tail);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Strips every extension from a file name: `ep01.sc.ass` becomes `ep01`.
fn strip_all_extensions(name: &str) -> &str {
    let start = usize::from(name.starts_with('.'));
    match name[start..].find('.') {
        Some(pos) => &name[..start + pos],
        None => name,
    }
}

/// Stem of a path with a single extension removed.
fn single_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Scans `dir` for subtitle files whose fully stripped name starts with the
/// input's fully stripped name. `filters` restricts matches to specific
/// secondary extensions (`ep01.sc.ass` has secondary extension `sc`).
fn discover_subtitles(
    input: &Path,
    dir: &Path,
    filters: &[&str],
    extensions: &[String],
) -> Vec<PathBuf> {
    let input_name = input
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = strip_all_extensions(&input_name).to_string();

    let mut found = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some((stem, ext)) = name.rsplit_once('.') else {
            continue;
        };
        if !extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            continue;
        }
        if !stem.starts_with(prefix.as_str()) {
            continue;
        }
        if !filters.is_empty() {
            let secondary = stem.rsplit_once('.').map(|(_, s)| s).unwrap_or("");
            if !filters.contains(&secondary) {
                continue;
            }
        }
        found.push(entry.into_path());
    }
    found.sort();
    found
}

/// Output-name suffix contributed by a subtitle variant: the subtitle's
/// secondary extension when it has one, otherwise its whole stem.
fn subtitle_variant_suffix(sub: &Path) -> String {
    let stem = single_stem(sub);
    match stem.rsplit_once('.') {
        Some((_, secondary)) if !secondary.is_empty() => format!(".{}", secondary),
        _ => stem,
    }
}

fn probe_if_needed(request: &Request, input: &Path, reporter: &Reporter) -> MediaInfo {
    let fps = request
        .options
        .get_non_empty("r")
        .or_else(|| request.options.get_non_empty("fps"));
    let needs_probe = request.preset == Preset::Flac || fps == Some("auto");
    if !needs_probe {
        return MediaInfo::default();
    }
    match probe::probe_media(input) {
        Ok(info) => info,
        Err(e) => {
            reporter.warn(format!("probe of {} failed: {}", input.display(), e));
            MediaInfo::default()
        }
    }
}

fn build_job(
    request: &Request,
    inputs: Vec<PathBuf>,
    output_prefix: String,
    output_dir: &Path,
    options: ParameterSet,
    reporter: &Reporter,
) -> Result<Job, ExpandError> {
    let id = Uuid::new_v4();
    let primary = inputs[0].clone();
    let media = probe_if_needed(request, &primary, reporter);
    let facts = InputFacts::derive(&primary, &options, media, id);
    let resolved = params::resolve(request.preset, &options);
    let plan = plan::assemble(request.preset, &options, &resolved, &facts)?;
    Ok(Job::new(
        id,
        inputs,
        output_prefix,
        output_dir.to_path_buf(),
        request.preset,
        options,
        resolved,
        plan,
        facts,
    ))
}

/// Expands a request into jobs. Subtitle `auto` discovery that matches
/// nothing produces zero jobs for that input and a warning.
pub fn expand(
    request: &Request,
    settings: &Settings,
    reporter: &Reporter,
) -> Result<Vec<Job>, ExpandError> {
    if let Some(base) = request.output_base.as_deref() {
        validate_output_base(base)?;
    }
    if request.inputs.is_empty() {
        reporter.warn("input file number == 0");
        return Ok(Vec::new());
    }

    let output_dir = request
        .output_dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    // Captured once so time tokens agree across every input of the request.
    let now = Local::now();

    let mut jobs = Vec::new();
    for (index, raw_input) in request.inputs.iter().enumerate() {
        let mut options = request.options.clone();

        let output_base = request
            .output_base
            .as_deref()
            .map(|base| substitute_iterators(base, index, &now));

        if let Some(chapters) = request.options.get_non_empty("chapters") {
            let chapters = substitute_iterators(chapters, index, &now);
            if !Path::new(&chapters).is_file() {
                reporter.warn(format!("the chapters file {} does not exist", chapters));
            }
            options.set("chapters", &chapters);
        }

        // `?` joins auxiliary inputs onto the primary one.
        let inputs: Vec<PathBuf> = raw_input.split('?').map(PathBuf::from).collect();
        for path in &inputs {
            if !path.exists() {
                reporter.warn(format!("the file \"{}\" does not exist", path.display()));
            }
        }
        let input_stem = single_stem(&inputs[0]);

        let sub_option = options.get_non_empty("sub").map(|s| s.to_string());
        match sub_option {
            Some(sub) => {
                let mode: Vec<&str> = sub.split(':').collect();
                let sub_list: Vec<PathBuf> = if mode[0] == "auto" {
                    discover_subtitles(
                        &inputs[0],
                        &output_dir,
                        &mode[1..],
                        &settings.subtitle.extensions,
                    )
                } else {
                    sub.split("::").map(|s| PathBuf::from(s.trim())).collect()
                };

                match sub_list.len() {
                    0 => {
                        reporter.warn(format!(
                            "no subtitle file matched -sub auto for {} in {}",
                            raw_input,
                            output_dir.display()
                        ));
                    }
                    1 => {
                        options.set("sub", &sub_list[0].display().to_string());
                        let prefix = output_base.clone().unwrap_or_else(|| input_stem.clone());
                        jobs.push(build_job(
                            request,
                            inputs.clone(),
                            prefix,
                            &output_dir,
                            options.clone(),
                            reporter,
                        )?);
                    }
                    _ => {
                        for sub_path in &sub_list {
                            let mut variant = options.clone();
                            variant.set("sub", &sub_path.display().to_string());
                            let prefix = format!(
                                "{}{}",
                                output_base.as_deref().unwrap_or(&input_stem),
                                subtitle_variant_suffix(sub_path)
                            );
                            jobs.push(build_job(
                                request,
                                inputs.clone(),
                                prefix,
                                &output_dir,
                                variant,
                                reporter,
                            )?);
                        }
                    }
                }
            }
            None => {
                let prefix = output_base.unwrap_or_else(|| input_stem.clone());
                jobs.push(build_job(
                    request,
                    inputs,
                    prefix,
                    &output_dir,
                    options,
                    reporter,
                )?);
            }
        }
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(inputs: &[&str], output: Option<&str>, dir: Option<&Path>) -> Request {
        Request {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            output_base: output.map(String::from),
            output_dir: dir.map(Path::to_path_buf),
            preset: Preset::Copy,
            options: ParameterSet::new(),
        }
    }

    #[test]
    fn test_counter_iterator_over_three_inputs() {
        let req = request(
            &["a.mkv", "b.mkv", "c.mkv"],
            Some("name--?{start=1,padding=2}"),
            None,
        );
        let reporter = Reporter::new();
        let jobs = expand(&req, &Settings::default(), &reporter).unwrap();
        let prefixes: Vec<_> = jobs.iter().map(|j| j.output_prefix.clone()).collect();
        assert_eq!(prefixes, vec!["name--01", "name--02", "name--03"]);
    }

    #[test]
    fn test_counter_iterator_increment() {
        let req = request(&["a.mkv", "b.mkv"], Some("?{start=5,increment=10}"), None);
        let reporter = Reporter::new();
        let jobs = expand(&req, &Settings::default(), &reporter).unwrap();
        let prefixes: Vec<_> = jobs.iter().map(|j| j.output_prefix.clone()).collect();
        assert_eq!(prefixes, vec!["5", "15"]);
    }

    #[test]
    fn test_time_iterator_is_identical_across_inputs() {
        let req = request(&["a.mkv", "b.mkv"], Some("v?{time:%Y%m%d}"), None);
        let reporter = Reporter::new();
        let jobs = expand(&req, &Settings::default(), &reporter).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].output_prefix, jobs[1].output_prefix);
        assert!(jobs[0].output_prefix.starts_with('v'));
        assert_eq!(jobs[0].output_prefix.len(), 1 + 8);
    }

    #[test]
    fn test_malformed_iterator_substitutes_empty() {
        assert_eq!(substitute_iterators("x?{bogus}y", 0, &Local::now()), "xy");
        assert_eq!(
            substitute_iterators("x?{start=notanumber}", 0, &Local::now()),
            "x"
        );
    }

    #[test]
    fn test_iterator_token_without_close_is_literal() {
        assert_eq!(substitute_iterators("a?{start=1", 0, &Local::now()), "a?{start=1");
    }

    #[test]
    fn test_illegal_output_name_rejected() {
        let req = request(&["a.mkv"], Some("bad<name"), None);
        let reporter = Reporter::new();
        let err = expand(&req, &Settings::default(), &reporter).unwrap_err();
        assert!(matches!(err, ExpandError::IllegalOutputName(_)));
    }

    #[test]
    fn test_iterator_tokens_are_not_illegal() {
        assert!(validate_output_base("ep?{start=1,padding=2}").is_ok());
        assert!(validate_output_base("literal?question").is_err());
    }

    #[test]
    fn test_missing_output_base_uses_input_stem() {
        let req = request(&["ep01.mkv"], None, None);
        let reporter = Reporter::new();
        let jobs = expand(&req, &Settings::default(), &reporter).unwrap();
        assert_eq!(jobs[0].output_prefix, "ep01");
        assert_eq!(jobs[0].output_name(), "ep01.rip.mkv");
    }

    #[test]
    fn test_copy_request_end_to_end_names() {
        let mut req = request(&["in.mkv"], Some("out"), None);
        req.options.set("c:a", "copy");
        let reporter = Reporter::new();
        let jobs = expand(&req, &Settings::default(), &reporter).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].output_name(), "out.va.mkv");
        assert!(jobs[0].plan.encoder_template.contains("-c copy"));
    }

    #[test]
    fn test_auxiliary_inputs_split_on_question_mark() {
        let dir = TempDir::new().unwrap();
        let req = request(&["a.mkv?fonts.ass"], Some("out"), Some(dir.path()));
        let reporter = Reporter::new();
        let jobs = expand(&req, &Settings::default(), &reporter).unwrap();
        assert_eq!(jobs[0].inputs.len(), 2);
        assert_eq!(jobs[0].primary_input(), &PathBuf::from("a.mkv"));
    }

    #[test]
    fn test_sub_auto_zero_match_warns_and_produces_no_jobs() {
        let dir = TempDir::new().unwrap();
        let mut req = request(&["ep01.mkv"], None, Some(dir.path()));
        req.options.set("sub", "auto");
        let reporter = Reporter::new();
        let jobs = expand(&req, &Settings::default(), &reporter).unwrap();
        assert!(jobs.is_empty());
        assert_eq!(reporter.snapshot().warnings, 1 + 1); // missing input + no match
    }

    #[test]
    fn test_sub_auto_discovers_matching_variants() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ep01.sc.ass"), "").unwrap();
        std::fs::write(dir.path().join("ep01.tc.ass"), "").unwrap();
        std::fs::write(dir.path().join("ep02.sc.ass"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let mut req = request(&["ep01.mkv"], None, Some(dir.path()));
        // Burn-in only applies to the video encoding presets.
        req.preset = Preset::X264(crate::preset::X264Tier::Fast);
        req.options.set("sub", "auto");
        let reporter = Reporter::new();
        let jobs = expand(&req, &Settings::default(), &reporter).unwrap();

        let mut prefixes: Vec<_> = jobs.iter().map(|j| j.output_prefix.clone()).collect();
        prefixes.sort();
        assert_eq!(prefixes, vec!["ep01.sc", "ep01.tc"]);
        for job in &jobs {
            let sub = job.options.get("sub").unwrap();
            assert!(sub.ends_with(".ass"));
            assert!(job.plan.encoder_template.contains("ass="));
        }
    }

    #[test]
    fn test_sub_auto_secondary_extension_filter() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ep01.sc.ass"), "").unwrap();
        std::fs::write(dir.path().join("ep01.tc.ass"), "").unwrap();

        let mut req = request(&["ep01.mkv"], None, Some(dir.path()));
        req.options.set("sub", "auto:sc");
        let reporter = Reporter::new();
        let jobs = expand(&req, &Settings::default(), &reporter).unwrap();
        assert_eq!(jobs.len(), 1);
        // A single match keeps the base name unsuffixed.
        assert_eq!(jobs[0].output_prefix, "ep01");
        assert!(jobs[0]
            .options
            .get("sub")
            .unwrap()
            .ends_with("ep01.sc.ass"));
    }

    #[test]
    fn test_sub_auto_single_match_keeps_base_name() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ep01.sc.ass"), "").unwrap();

        let mut req = request(&["ep01.mkv"], Some("out"), Some(dir.path()));
        req.options.set("sub", "auto");
        let reporter = Reporter::new();
        let jobs = expand(&req, &Settings::default(), &reporter).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].output_prefix, "out");
    }

    #[test]
    fn test_sub_list_produces_one_job_per_entry() {
        let req = {
            let mut r = request(&["ep01.mkv"], Some("out"), None);
            r.options.set("sub", "subs/ep01.sc.ass::subs/ep01.tc.ass");
            r
        };
        let reporter = Reporter::new();
        let jobs = expand(&req, &Settings::default(), &reporter).unwrap();
        assert_eq!(jobs.len(), 2);
        let prefixes: Vec<_> = jobs.iter().map(|j| j.output_prefix.clone()).collect();
        assert_eq!(prefixes, vec!["out.sc", "out.tc"]);
    }

    #[test]
    fn test_sub_single_path_passes_through() {
        let mut req = request(&["ep01.mkv"], Some("out"), None);
        req.options.set("sub", "ep01.ass");
        let reporter = Reporter::new();
        let jobs = expand(&req, &Settings::default(), &reporter).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].output_prefix, "out");
        assert_eq!(jobs[0].options.get("sub"), Some("ep01.ass"));
    }

    #[test]
    fn test_empty_inputs_warns() {
        let req = request(&[], Some("out"), None);
        let reporter = Reporter::new();
        let jobs = expand(&req, &Settings::default(), &reporter).unwrap();
        assert!(jobs.is_empty());
        assert_eq!(reporter.snapshot().warnings, 1);
    }

    #[test]
    fn test_strip_all_extensions() {
        assert_eq!(strip_all_extensions("ep01.sc.ass"), "ep01");
        assert_eq!(strip_all_extensions("plain"), "plain");
        assert_eq!(strip_all_extensions(".hidden.txt"), ".hidden");
    }
}
