//! Command template assembly.
//!
//! [`assemble`] turns a preset, the request's option map, the resolved
//! encoder parameters, and the per-input facts into a [`CommandPlan`]:
//! shell command templates holding `{input}` / `{output}` placeholders that
//! are substituted only at execution time by [`CommandPlan::render`].

use thiserror::Error;

use crate::facts::InputFacts;
use crate::params::ParameterSet;
use crate::preset::{AudioCodec, Container, Preset};

/// Error type for command assembly.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A custom template referenced an option that was never supplied.
    #[error("custom template references unknown option '{0}'")]
    MissingTemplateKey(String),
}

/// Assembled command templates for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPlan {
    /// Encoder stage with `{input}` / `{output}` placeholders.
    pub encoder_template: String,
    /// Container post-processing stage, appended to the encoder stage.
    /// Empty for presets without container handling.
    pub post_template: String,
    /// Suffix of the final output file name, including the leading dot
    /// when non-empty.
    pub output_suffix: String,
    /// The input is consumed through a vapoursynth pipe.
    pub pipe_input: bool,
    /// The job carries an audio branch.
    pub has_audio: bool,
    /// Target container, when post-processing applies.
    pub container: Option<Container>,
}

impl CommandPlan {
    /// Substitutes the concrete input and output paths into the templates.
    pub fn render(&self, input: &str, output: &str) -> String {
        let mut cmd = self.encoder_template.clone();
        if !self.post_template.is_empty() {
            cmd.push_str(&self.post_template);
        }
        cmd.replace("{input}", input).replace("{output}", output)
    }
}

/// Escapes a subtitle path for use inside an ffmpeg filter argument.
fn escape_subtitle_path(path: &str) -> String {
    format!("'{}'", path.replace('\\', "/").replace(':', "\\:"))
}

/// Substitutes `{key}` placeholders from the option map, leaving `{input}`
/// and `{output}` untouched for [`CommandPlan::render`].
fn substitute_options(template: &str, options: &ParameterSet) -> Result<String, PlanError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        match tail.find('}') {
            Some(close) => {
                let key = &tail[1..close];
                if key == "input" || key == "output" {
                    out.push_str(&tail[..=close]);
                } else if let Some(value) = options.get(key) {
                    out.push_str(value);
                } else {
                    return Err(PlanError::MissingTemplateKey(key.to_string()));
                }
                rest = &tail[close + 1..];
            }
            None => {
                out.push_str(tail);
                return Ok(out);
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Unescapes the quote conventions of a custom template: a `''''` prefix
/// disables doubled-quote replacement, otherwise `''` becomes `"`; the
/// `\34/` and `\39/` escapes always become `"` and `'`.
fn unescape_custom_template(raw: &str) -> String {
    let s = if let Some(stripped) = raw.strip_prefix("''''") {
        stripped.to_string()
    } else {
        raw.replace("''", "\"")
    };
    s.replace("\\34/", "\"").replace("\\39/", "'")
}

/// Maps an ffprobe sample format to the pcm codec used for flac extraction.
fn pcm_codec_for(sample_fmt: &str, bits_per_sample: u32, bits_per_raw_sample: u32) -> &'static str {
    if bits_per_raw_sample == 24 || bits_per_sample == 24 {
        return "pcm_s24le";
    }
    match sample_fmt {
        "u8" | "u8p" => "pcm_u8",
        "s16" | "s16p" => "pcm_s16le",
        _ => "pcm_s32le",
    }
}

/// Assembles the command plan for one job.
pub fn assemble(
    preset: Preset,
    options: &ParameterSet,
    params: &ParameterSet,
    facts: &InputFacts,
) -> Result<CommandPlan, PlanError> {
    let is_pipe = facts.is_pipe_input;

    let mut ff_inputs: Vec<String> = if is_pipe {
        vec!["-".to_string()]
    } else {
        vec!["\"{input}\"".to_string()]
    };
    let mut stream_maps: Vec<String> = vec!["0:v".to_string()];

    let mut vf: Vec<String> = options
        .get_non_empty("vf")
        .map(|s| s.split(',').map(|p| p.to_string()).collect())
        .unwrap_or_default();

    let sub_escaped = options
        .get_non_empty("sub")
        .map(escape_subtitle_path);
    if let Some(sub) = &sub_escaped {
        // Burn-in always goes after any explicit filters.
        vf.push(format!("ass={}", sub));
    }

    // Audio branch
    let has_audio = options.get_non_empty("c:a").is_some();
    let audio_option = if let Some(raw_codec) = options.get_non_empty("c:a") {
        let codec = AudioCodec::parse_lenient(raw_codec);
        if is_pipe {
            // The pipe carries video only; audio comes from a second input.
            ff_inputs.push("\"{input}\"".to_string());
            stream_maps.push("1:a".to_string());
        } else {
            stream_maps.push("0:a".to_string());
        }
        format!(
            "-c:a {} -b:a {} ",
            codec.as_str(),
            options.get_non_empty("b:a").unwrap_or("160k")
        )
    } else {
        String::new()
    };

    // Container post-processing
    let container = options.get_non_empty("muxer").map(Container::parse_lenient);
    let post_template = match container {
        Some(Container::Mp4) => {
            let fps_flag = facts
                .forced_fps
                .as_deref()
                .map(|fps| format!("-r 0:{} ", fps))
                .unwrap_or_default();
            format!(
                " && mp4box -add \"{{output}}\" -new \"{{output}}\" && mp4fpsmod {}-i \"{{output}}\"",
                fps_flag
            )
        }
        Some(Container::Mkv) => {
            let fps_flags = facts
                .forced_fps
                .as_deref()
                .map(|fps| {
                    format!(
                        "--default-duration 0:{}fps --fix-bitstream-timing-information 0:1 ",
                        fps
                    )
                })
                .unwrap_or_default();
            format!(
                " && mkvpropedit \"{{output}}\" --add-track-statistics-tags \
                 && mkvmerge -o \"{{output}}.temp.mkv\" \"{{output}}\" \
                 && mkvmerge -o \"{{output}}\" {}--default-track-flag 0 \"{{output}}.temp.mkv\" \
                 && rm -f \"{{output}}.temp.mkv\"",
                fps_flags
            )
        }
        None => String::new(),
    };

    // Vapoursynth pipe prefix
    let mut pipe_gvars: Vec<(String, String)> = options
        .get("pipe:gvar")
        .unwrap_or("")
        .split(':')
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            s.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect();
    if let Some(sub) = &sub_escaped {
        pipe_gvars.push(("subtitle".to_string(), sub.clone()));
    }
    let gvar_args = pipe_gvars
        .iter()
        .map(|(k, v)| format!("-a \"{}={}\"", k, v))
        .collect::<Vec<_>>()
        .join(" ");

    let is_vpy = facts
        .input
        .extension()
        .map(|ext| ext == "vpy")
        .unwrap_or(false);
    let vspipe_prefix = if is_vpy {
        format!("vspipe -c y4m {} \"{{input}}\" - | ", gvar_args)
    } else if let Some(script) = facts.pipe_script.as_deref() {
        format!(
            "vspipe -c y4m {} -a \"input={{input}}\" \"{}\" - | ",
            gvar_args, script
        )
    } else {
        String::new()
    };

    let hwaccel = options
        .get_non_empty("hwaccel")
        .map(|v| format!("-hwaccel {}", v))
        .unwrap_or_default();

    // ffmpeg passthrough parameters
    let ffparams_ff = options
        .get_non_empty("ff-params:ff")
        .or_else(|| options.get("ff-params"))
        .unwrap_or("")
        .to_string();
    let mut ffparams_in = options.get("ff-params:in").unwrap_or("").to_string();
    let mut ffparams_out = options.get("ff-params:out").unwrap_or("").to_string();
    if let Some(ss) = options.get_non_empty("ss") {
        ffparams_in.push_str(&format!(" -ss {}", ss));
    }
    if let Some(t) = options.get_non_empty("t") {
        ffparams_out.push_str(&format!(" -t {}", t));
    }
    if let Some(p) = options.get_non_empty("v:preset") {
        ffparams_out.push_str(&format!(" -preset {}", p));
    }

    let header = format!(
        "ffmpeg -progress \"{}\" -report {} {}",
        facts.progress_log.display(),
        ffparams_ff,
        ffparams_in
    );

    let input_args = ff_inputs
        .iter()
        .map(|s| format!("-i {}", s))
        .collect::<Vec<_>>()
        .join(" ");
    let map_args = stream_maps
        .iter()
        .map(|s| format!("-map {}", s))
        .collect::<Vec<_>>()
        .join(" ");
    let vf_arg = if vf.is_empty() {
        String::new()
    } else {
        format!(" -vf \"{}\" ", vf.join(","))
    };

    let (encoder_template, output_suffix, post_template) = match preset {
        Preset::Custom => {
            let template = options
                .get_non_empty("custom:format")
                .or_else(|| options.get_non_empty("custom:template"))
                .or_else(|| options.get_non_empty("custom"));
            let encoder = match template {
                Some(raw) => substitute_options(&unescape_custom_template(raw), options)?,
                None => {
                    tracing::warn!(
                        "The preset custom must have custom:format or custom:template"
                    );
                    String::new()
                }
            };
            let suffix = options
                .get_non_empty("custom:suffix")
                .map(|s| format!(".{}", s))
                .unwrap_or_default();
            (encoder, suffix, String::new())
        }

        Preset::Copy => {
            let encoder = format!(
                "{} {} -i \"{{input}}\" -c copy {} {} {} \"{{output}}\"",
                header, hwaccel, map_args, audio_option, ffparams_out
            );
            let ext = container.unwrap_or_default().extension();
            let suffix = if has_audio {
                format!(".va.{}", ext)
            } else {
                format!(".rip.{}", ext)
            };
            (encoder, suffix, post_template)
        }

        Preset::Flac => {
            let media = &facts.media;
            let pcm = pcm_codec_for(
                &media.sample_fmt,
                media.bits_per_sample,
                media.bits_per_raw_sample,
            );
            let lpc_order = if media.sample_rate > 48000 { 19 } else { 12 };
            let encoder = format!(
                "{} -i \"{{input}}\" -map 0:a:0 -c:a {} {} \"{{output}}.temp.wav\" \
                 && flac -j 32 -8 -e -p -l {} -o \"{{output}}\" \"{{output}}.temp.wav\" \
                 && rm -f \"{{output}}.temp.wav\"",
                header, pcm, ffparams_out, lpc_order
            );
            (encoder, ".flac".to_string(), String::new())
        }

        Preset::X264(_) | Preset::X265(_) => {
            let (codec, params_flag, pix_fmt) = match preset {
                Preset::X264(_) => ("libx264", "-x264-params", "-pix_fmt yuv420p"),
                _ => ("libx265", "-x265-params", "-pix_fmt yuv420p10le"),
            };
            let pix_fmt = if is_pipe { "" } else { pix_fmt };
            let encoder = format!(
                "{}{} {} {} {} {} -c:v {} {} {} \"{}\" {}{} \"{{output}}\"",
                vspipe_prefix,
                header,
                hwaccel,
                input_args,
                map_args,
                audio_option,
                codec,
                pix_fmt,
                params_flag,
                params.join_colon(),
                ffparams_out,
                vf_arg
            );
            let ext = container.unwrap_or_default().extension();
            let suffix = if has_audio {
                format!(".va.{}", ext)
            } else {
                format!(".rip.{}", ext)
            };
            (encoder, suffix, post_template)
        }
    };

    Ok(CommandPlan {
        encoder_template,
        post_template,
        output_suffix,
        pipe_input: is_pipe,
        has_audio,
        container,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;
    use crate::probe::MediaInfo;
    use proptest::prelude::*;
    use std::path::Path;
    use uuid::Uuid;

    fn facts_for(input: &str, options: &ParameterSet, media: MediaInfo) -> InputFacts {
        InputFacts::derive(Path::new(input), options, media, Uuid::new_v4())
    }

    fn assemble_for(preset: Preset, options: &ParameterSet, input: &str) -> CommandPlan {
        let params = params::resolve(preset, options);
        let facts = facts_for(input, options, MediaInfo::default());
        assemble(preset, options, &params, &facts).unwrap()
    }

    #[test]
    fn test_copy_plan_basic() {
        let plan = assemble_for(Preset::Copy, &ParameterSet::new(), "in.mkv");
        assert!(plan.encoder_template.contains("-c copy"));
        assert!(plan.encoder_template.contains("-map 0:v"));
        assert!(plan.encoder_template.starts_with("ffmpeg -progress"));
        assert!(plan.post_template.is_empty());
        assert_eq!(plan.output_suffix, ".rip.mkv");
        assert!(!plan.has_audio);
    }

    #[test]
    fn test_copy_plan_with_audio_branch() {
        let mut options = ParameterSet::new();
        options.set("c:a", "libopus");
        let plan = assemble_for(Preset::Copy, &options, "in.mkv");
        assert!(plan.encoder_template.contains("-c:a libopus -b:a 160k"));
        assert!(plan.encoder_template.contains("-map 0:a"));
        assert_eq!(plan.output_suffix, ".va.mkv");
        assert!(plan.has_audio);
    }

    #[test]
    fn test_invalid_audio_codec_degrades_to_copy() {
        let mut options = ParameterSet::new();
        options.set("c:a", "aac");
        let plan = assemble_for(Preset::Copy, &options, "in.mkv");
        assert!(plan.encoder_template.contains("-c:a copy"));
    }

    #[test]
    fn test_audio_bitrate_override() {
        let mut options = ParameterSet::new();
        options.set("c:a", "libopus");
        options.set("b:a", "192k");
        let plan = assemble_for(Preset::Copy, &options, "in.mkv");
        assert!(plan.encoder_template.contains("-b:a 192k"));
    }

    #[test]
    fn test_x265_plan_carries_params() {
        let plan = assemble_for(Preset::X265(crate::preset::X265Tier::Slow), &ParameterSet::new(), "in.mkv");
        assert!(plan.encoder_template.contains("-c:v libx265"));
        assert!(plan.encoder_template.contains("-pix_fmt yuv420p10le"));
        assert!(plan.encoder_template.contains("-x265-params"));
        assert!(plan.encoder_template.contains("crf=19"));
        assert!(plan.encoder_template.contains("merange=57"));
        assert_eq!(plan.output_suffix, ".rip.mkv");
    }

    #[test]
    fn test_x264_plan_carries_params() {
        let plan = assemble_for(Preset::X264(crate::preset::X264Tier::Fast), &ParameterSet::new(), "in.mkv");
        assert!(plan.encoder_template.contains("-c:v libx264"));
        assert!(plan.encoder_template.contains("-pix_fmt yuv420p"));
        assert!(plan.encoder_template.contains("crf=20"));
        assert!(plan.encoder_template.contains("threads=auto"));
    }

    #[test]
    fn test_vpy_input_uses_pipe() {
        let options = ParameterSet::new();
        let plan = assemble_for(Preset::X265(crate::preset::X265Tier::Fast), &options, "clip.vpy");
        assert!(plan.pipe_input);
        assert!(plan.encoder_template.starts_with("vspipe -c y4m"));
        assert!(plan.encoder_template.contains("-i -"));
        // No pixel format forcing when the pipe supplies frames
        assert!(!plan.encoder_template.contains("-pix_fmt"));
    }

    #[test]
    fn test_pipe_audio_maps_second_input() {
        let mut options = ParameterSet::new();
        options.set("c:a", "libopus");
        let plan = assemble_for(Preset::X265(crate::preset::X265Tier::Fast), &options, "clip.vpy");
        assert!(plan.encoder_template.contains("-map 1:a"));
        assert!(plan.encoder_template.contains("-i \"{input}\""));
    }

    #[test]
    fn test_pipe_gvars_forwarded() {
        let mut options = ParameterSet::new();
        options.set("pipe", "filter.vpy");
        options.set("pipe:gvar", "w=1920:h=1080");
        let plan = assemble_for(Preset::X265(crate::preset::X265Tier::Fast), &options, "in.mkv");
        assert!(plan.encoder_template.contains("-a \"w=1920\""));
        assert!(plan.encoder_template.contains("-a \"h=1080\""));
        assert!(plan.encoder_template.contains("-a \"input={input}\""));
        assert!(plan.encoder_template.contains("\"filter.vpy\""));
    }

    #[test]
    fn test_subtitle_burn_in_appended_last() {
        let mut options = ParameterSet::new();
        options.set("vf", "crop=1920:800,scale=1280:720");
        options.set("sub", "ep01.ass");
        let plan = assemble_for(Preset::X264(crate::preset::X264Tier::Fast), &options, "in.mkv");
        assert!(plan
            .encoder_template
            .contains("-vf \"crop=1920:800,scale=1280:720,ass='ep01.ass'\""));
    }

    #[test]
    fn test_subtitle_path_escaping() {
        let mut options = ParameterSet::new();
        options.set("sub", "C:\\subs\\ep01.ass");
        let plan = assemble_for(Preset::X264(crate::preset::X264Tier::Fast), &options, "in.mkv");
        assert!(plan.encoder_template.contains("ass='C\\:/subs/ep01.ass'"));
    }

    #[test]
    fn test_trim_passthrough() {
        let mut options = ParameterSet::new();
        options.set("ss", "00:01:00");
        options.set("t", "30");
        let plan = assemble_for(Preset::Copy, &options, "in.mkv");
        assert!(plan.encoder_template.contains("-ss 00:01:00"));
        assert!(plan.encoder_template.contains("-t 30"));
    }

    #[test]
    fn test_mp4_post_stage_with_forced_fps() {
        let mut options = ParameterSet::new();
        options.set("muxer", "mp4");
        options.set("r", "24000/1001");
        let plan = assemble_for(Preset::X265(crate::preset::X265Tier::Fast), &options, "in.mkv");
        assert_eq!(plan.container, Some(Container::Mp4));
        assert!(plan.post_template.contains("mp4box -add"));
        assert!(plan.post_template.contains("mp4fpsmod -r 0:24000/1001"));
        assert_eq!(plan.output_suffix, ".rip.mp4");
    }

    #[test]
    fn test_mkv_post_stage() {
        let mut options = ParameterSet::new();
        options.set("muxer", "mkv");
        options.set("fps", "auto");
        let mut media = MediaInfo::default();
        media.r_frame_rate = (24000, 1001);
        let params = params::resolve(Preset::Copy, &options);
        let facts = facts_for("in.mkv", &options, media);
        let plan = assemble(Preset::Copy, &options, &params, &facts).unwrap();
        assert!(plan.post_template.contains("mkvpropedit"));
        assert!(plan
            .post_template
            .contains("--default-duration 0:24000/1001fps"));
        assert!(plan.post_template.contains("rm -f \"{output}.temp.mkv\""));
    }

    #[test]
    fn test_unknown_container_defaults_to_mkv() {
        let mut options = ParameterSet::new();
        options.set("muxer", "webm");
        let plan = assemble_for(Preset::Copy, &options, "in.mkv");
        assert_eq!(plan.container, Some(Container::Mkv));
        assert_eq!(plan.output_suffix, ".rip.mkv");
    }

    #[test]
    fn test_flac_codec_selection() {
        let mut media = MediaInfo::default();
        media.sample_fmt = "s16".to_string();
        media.sample_rate = 44100;
        let options = ParameterSet::new();
        let params = params::resolve(Preset::Flac, &options);
        let facts = facts_for("in.flac.wav", &options, media);
        let plan = assemble(Preset::Flac, &options, &params, &facts).unwrap();
        assert!(plan.encoder_template.contains("-c:a pcm_s16le"));
        assert!(plan.encoder_template.contains("-l 12"));
        assert_eq!(plan.output_suffix, ".flac");
        assert!(plan.encoder_template.contains("rm -f \"{output}.temp.wav\""));
    }

    #[test]
    fn test_flac_high_rate_and_24_bit() {
        let mut media = MediaInfo::default();
        media.sample_fmt = "s32".to_string();
        media.sample_rate = 96000;
        media.bits_per_raw_sample = 24;
        let options = ParameterSet::new();
        let params = params::resolve(Preset::Flac, &options);
        let facts = facts_for("in.wav", &options, media);
        let plan = assemble(Preset::Flac, &options, &params, &facts).unwrap();
        assert!(plan.encoder_template.contains("-c:a pcm_s24le"));
        assert!(plan.encoder_template.contains("-l 19"));
    }

    #[test]
    fn test_custom_template_substitution() {
        let mut options = ParameterSet::new();
        options.set("custom:format", "x265 --crf {crf} -o ''{output}'' ''{input}''");
        options.set("crf", "16.5");
        options.set("custom:suffix", "hevc");
        let plan = assemble_for(Preset::Custom, &options, "in.mkv");
        assert_eq!(
            plan.encoder_template,
            "x265 --crf 16.5 -o \"{output}\" \"{input}\""
        );
        assert_eq!(plan.output_suffix, ".hevc");
    }

    #[test]
    fn test_custom_quad_quote_prefix_disables_doubling() {
        let mut options = ParameterSet::new();
        options.set("custom", "''''echo ''literal''");
        let plan = assemble_for(Preset::Custom, &options, "in.mkv");
        assert_eq!(plan.encoder_template, "echo ''literal''");
    }

    #[test]
    fn test_custom_numeric_escapes() {
        let mut options = ParameterSet::new();
        options.set("custom:template", "echo \\34/hi\\34/ \\39/there\\39/");
        let plan = assemble_for(Preset::Custom, &options, "in.mkv");
        assert_eq!(plan.encoder_template, "echo \"hi\" 'there'");
    }

    #[test]
    fn test_custom_missing_template_is_empty() {
        let mut options = ParameterSet::new();
        options.set("custom:suffix", "out");
        let plan = assemble_for(Preset::Custom, &options, "in.mkv");
        assert!(plan.encoder_template.is_empty());
        assert_eq!(plan.output_suffix, ".out");
    }

    #[test]
    fn test_custom_unknown_key_is_error() {
        let mut options = ParameterSet::new();
        options.set("custom:format", "encode --q {quality}");
        let params = params::resolve(Preset::Custom, &options);
        let facts = facts_for("in.mkv", &options, MediaInfo::default());
        let err = assemble(Preset::Custom, &options, &params, &facts).unwrap_err();
        assert!(matches!(err, PlanError::MissingTemplateKey(k) if k == "quality"));
    }

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let plan = CommandPlan {
            encoder_template: "enc \"{input}\" \"{output}\"".to_string(),
            post_template: " && fix \"{output}\"".to_string(),
            output_suffix: ".rip.mkv".to_string(),
            pipe_input: false,
            has_audio: false,
            container: Some(Container::Mkv),
        };
        let cmd = plan.render("a.mkv", "b.rip.mkv");
        assert_eq!(cmd, "enc \"a.mkv\" \"b.rip.mkv\" && fix \"b.rip.mkv\"");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_x265_command_carries_all_resolved_params(
            crf in "[1-4][0-9]",
            subme in "[0-7]",
        ) {
            let mut options = ParameterSet::new();
            options.set("crf", &crf);
            options.set("subme", &subme);
            let preset = Preset::X265(crate::preset::X265Tier::Fast2);
            let resolved = params::resolve(preset, &options);
            let facts = facts_for("in.mkv", &options, MediaInfo::default());
            let plan = assemble(preset, &options, &resolved, &facts).unwrap();

            for (key, value) in resolved.iter() {
                prop_assert!(
                    plan.encoder_template.contains(&format!("{}={}", key, value)),
                    "missing {}={}",
                    key,
                    value
                );
            }
        }

        #[test]
        fn prop_render_leaves_no_placeholders(
            input in "[a-z]{1,8}\\.mkv",
            output in "[a-z]{1,8}\\.rip\\.mkv",
        ) {
            let mut options = ParameterSet::new();
            options.set("muxer", "mkv");
            let plan = assemble_for(Preset::Copy, &options, "in.mkv");
            let cmd = plan.render(&input, &output);
            prop_assert!(!cmd.contains("{input}"), "input placeholder not substituted");
            prop_assert!(!cmd.contains("{output}"), "output placeholder not substituted");
            prop_assert!(cmd.contains(&output));
        }
    }
}
