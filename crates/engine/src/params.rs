//! Encoder parameter resolution.
//!
//! A [`ParameterSet`] is an ordered key/value map: the first insertion fixes
//! a key's position and later writes replace the value in place, so the
//! joined parameter string stays stable across override layers.
//!
//! [`resolve`] merges up to four layers for the x264/x265 families:
//! family defaults, tier defaults, user overrides (only keys already present
//! and only non-empty values), and finally the raw `x264-params` /
//! `x265-params` block where the last token wins.

use crate::preset::{Preset, X264Tier, X265Tier};

/// Ordered key/value pairs with in-place replacement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: Vec<(String, String)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a key, replacing the value in place if the key already exists.
    pub fn set(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
        } else {
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value for `key` only if it is present and non-empty.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Joins all entries as `key=value` tokens separated by colons.
    pub fn join_colon(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Applies a raw colon-separated `key=value` block. Later tokens win,
    /// including over earlier tokens in the same block. Tokens without `=`
    /// are ignored.
    pub fn apply_raw_block(&mut self, block: &str) {
        for token in block.split(':').filter(|s| !s.is_empty()) {
            if let Some((k, v)) = token.split_once('=') {
                self.set(k, v);
            }
        }
    }
}

impl FromIterator<(String, String)> for ParameterSet {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut set = ParameterSet::new();
        for (k, v) in iter {
            set.set(&k, &v);
        }
        set
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for ParameterSet {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        let mut set = ParameterSet::new();
        for (k, v) in iter {
            set.set(k, v);
        }
        set
    }
}

/// Shared x264 defaults common to both tiers.
const X264_FAMILY: &[(&str, &str)] = &[
    ("threads", "auto"),
    ("psy-rd", "0.6,0.15"),
    ("qcomp", "0.66"),
    ("keyint", "250"),
    ("qpmin", "8"),
    ("qpmax", "32"),
    ("min-keyint", "2"),
    ("weightb", "1"),
];

const X264_FAST: &[(&str, &str)] = &[
    ("crf", "20"),
    ("deblock", "0,0"),
    ("bframes", "8"),
    ("ref", "4"),
    ("subme", "5"),
    ("me", "hex"),
    ("merange", "16"),
    ("aq-mode", "1"),
    ("rc-lookahead", "60"),
    ("trellis", "1"),
    ("fast-pskip", "1"),
];

const X264_SLOW: &[(&str, &str)] = &[
    ("crf", "21"),
    ("deblock", "-1,-1"),
    ("bframes", "16"),
    ("ref", "8"),
    ("subme", "7"),
    ("me", "umh"),
    ("merange", "24"),
    ("aq-mode", "3"),
    ("rc-lookahead", "120"),
    ("trellis", "2"),
    ("fast-pskip", "0"),
];

/// x265 family defaults applied before any tier table.
const X265_FAMILY: &[(&str, &str)] = &[
    ("crf", "20"),
    ("qpmin", "6"),
    ("qpmax", "32"),
    ("rd", "3"),
    ("psy-rd", "2"),
    ("rdoq-level", "0"),
    ("psy-rdoq", "0"),
    ("qcomp", "0.68"),
    ("keyint", "250"),
    ("min-keyint", "2"),
    ("deblock", "0,0"),
    ("me", "umh"),
    ("merange", "57"),
    ("hme", "1"),
    ("hme-search", "hex,hex,hex"),
    ("hme-range", "16,57,92"),
    ("aq-mode", "2"),
    ("aq-strength", "1"),
    ("tu-intra-depth", "1"),
    ("tu-inter-depth", "1"),
    ("limit-tu", "0"),
    ("bframes", "16"),
    ("ref", "8"),
    ("subme", "2"),
    ("open-gop", "1"),
    ("gop-lookahead", "0"),
    ("rc-lookahead", "20"),
    ("rect", "0"),
    ("amp", "0"),
    ("cbqpoffs", "0"),
    ("crqpoffs", "0"),
    ("ipratio", "1.4"),
    ("pbratio", "1.3"),
    ("early-skip", "1"),
    ("ctu", "64"),
    ("min-cu-size", "8"),
    ("max-tu-size", "32"),
    ("level-idc", "0"),
    ("sao", "0"),
    ("weightb", "1"),
    ("info", "1"),
];

const X265_FAST4: &[(&str, &str)] = &[
    ("crf", "18"),
    ("qpmin", "12"),
    ("qpmax", "28"),
    ("rd", "2"),
    ("rdoq-level", "1"),
    ("me", "hex"),
    ("merange", "57"),
    ("hme-search", "hex,hex,hex"),
    ("hme-range", "16,32,48"),
    ("aq-mode", "1"),
    ("tu-intra-depth", "1"),
    ("tu-inter-depth", "1"),
    ("limit-tu", "4"),
    ("bframes", "8"),
    ("ref", "6"),
    ("subme", "3"),
    ("open-gop", "0"),
    ("gop-lookahead", "0"),
    ("rc-lookahead", "48"),
    ("cbqpoffs", "-1"),
    ("crqpoffs", "-1"),
    ("pbratio", "1.28"),
];

const X265_FAST3: &[(&str, &str)] = &[
    ("crf", "18"),
    ("qpmin", "12"),
    ("qpmax", "28"),
    ("rdoq-level", "1"),
    ("deblock", "-0.5,-0.5"),
    ("me", "hex"),
    ("merange", "57"),
    ("hme-search", "hex,hex,hex"),
    ("hme-range", "16,32,57"),
    ("aq-mode", "3"),
    ("tu-intra-depth", "2"),
    ("tu-inter-depth", "2"),
    ("limit-tu", "4"),
    ("bframes", "12"),
    ("ref", "6"),
    ("subme", "3"),
    ("open-gop", "0"),
    ("gop-lookahead", "0"),
    ("rc-lookahead", "120"),
    ("cbqpoffs", "-1"),
    ("crqpoffs", "-1"),
    ("pbratio", "1.27"),
];

const X265_FAST2: &[(&str, &str)] = &[
    ("crf", "18"),
    ("qpmin", "12"),
    ("qpmax", "28"),
    ("rdoq-level", "2"),
    ("deblock", "-1,-1"),
    ("me", "hex"),
    ("merange", "57"),
    ("hme-search", "hex,hex,hex"),
    ("hme-range", "16,57,92"),
    ("aq-mode", "3"),
    ("tu-intra-depth", "3"),
    ("tu-inter-depth", "2"),
    ("limit-tu", "4"),
    ("ref", "6"),
    ("subme", "4"),
    ("open-gop", "0"),
    ("gop-lookahead", "0"),
    ("rc-lookahead", "192"),
    ("cbqpoffs", "-1"),
    ("crqpoffs", "-1"),
    ("pbratio", "1.25"),
];

const X265_FAST: &[(&str, &str)] = &[
    ("crf", "19"),
    ("qpmin", "12"),
    ("qpmax", "28"),
    ("psy-rd", "1.8"),
    ("rdoq-level", "2"),
    ("psy-rdoq", "0.4"),
    ("keyint", "312"),
    ("deblock", "-1,-1"),
    ("me", "umh"),
    ("merange", "57"),
    ("hme-search", "umh,hex,hex"),
    ("hme-range", "16,57,92"),
    ("aq-mode", "4"),
    ("tu-intra-depth", "4"),
    ("tu-inter-depth", "3"),
    ("limit-tu", "4"),
    ("subme", "5"),
    ("gop-lookahead", "8"),
    ("rc-lookahead", "216"),
    ("cbqpoffs", "-2"),
    ("crqpoffs", "-2"),
    ("pbratio", "1.2"),
];

const X265_SLOW: &[(&str, &str)] = &[
    ("crf", "19"),
    ("qpmin", "12"),
    ("qpmax", "28"),
    ("rd", "5"),
    ("psy-rd", "1.8"),
    ("rdoq-level", "2"),
    ("psy-rdoq", "0.4"),
    ("qcomp", "0.7"),
    ("keyint", "312"),
    ("deblock", "-1,-1"),
    ("me", "umh"),
    ("merange", "57"),
    ("hme-search", "umh,hex,hex"),
    ("hme-range", "16,57,184"),
    ("aq-mode", "4"),
    ("aq-strength", "1"),
    ("tu-intra-depth", "4"),
    ("tu-inter-depth", "3"),
    ("limit-tu", "2"),
    ("subme", "6"),
    ("gop-lookahead", "14"),
    ("rc-lookahead", "250"),
    ("rect", "1"),
    ("min-keyint", "2"),
    ("cbqpoffs", "-2"),
    ("crqpoffs", "-2"),
    ("pbratio", "1.2"),
    ("early-skip", "0"),
];

const X265_FULL: &[(&str, &str)] = &[
    ("crf", "17"),
    ("qpmin", "3"),
    ("qpmax", "20"),
    ("psy-rd", "2.2"),
    ("rd", "5"),
    ("rdoq-level", "2"),
    ("psy-rdoq", "1.6"),
    ("qcomp", "0.72"),
    ("keyint", "266"),
    ("min-keyint", "2"),
    ("deblock", "-1,-1"),
    ("me", "umh"),
    ("merange", "160"),
    ("hme-search", "full,umh,hex"),
    ("hme-range", "16,92,320"),
    ("aq-mode", "4"),
    ("aq-strength", "1.2"),
    ("tu-intra-depth", "4"),
    ("tu-inter-depth", "4"),
    ("limit-tu", "2"),
    ("bframes", "16"),
    ("ref", "8"),
    ("subme", "7"),
    ("open-gop", "1"),
    ("gop-lookahead", "14"),
    ("rc-lookahead", "250"),
    ("rect", "1"),
    ("amp", "1"),
    ("cbqpoffs", "-3"),
    ("crqpoffs", "-3"),
    ("ipratio", "1.43"),
    ("pbratio", "1.2"),
    ("early-skip", "0"),
];

fn apply_table(set: &mut ParameterSet, table: &[(&str, &str)]) {
    for (k, v) in table {
        set.set(k, v);
    }
}

/// Overlays user-supplied values onto keys already present in the set.
/// Empty values never override a default.
fn apply_overrides(set: &mut ParameterSet, options: &ParameterSet) {
    let keys: Vec<String> = set.iter().map(|(k, _)| k.to_string()).collect();
    for key in keys {
        if let Some(value) = options.get_non_empty(&key) {
            let value = value.to_string();
            set.set(&key, &value);
        }
    }
}

/// Resolves the final encoder parameter set for a preset.
///
/// Presets without an encoder parameter block (`custom`, `copy`, `flac`)
/// resolve to an empty set.
pub fn resolve(preset: Preset, options: &ParameterSet) -> ParameterSet {
    let mut set = ParameterSet::new();
    match preset {
        Preset::Custom | Preset::Copy | Preset::Flac => {}
        Preset::X264(tier) => {
            apply_table(&mut set, X264_FAMILY);
            apply_table(
                &mut set,
                match tier {
                    X264Tier::Fast => X264_FAST,
                    X264Tier::Slow => X264_SLOW,
                },
            );
            apply_overrides(&mut set, options);
            if let Some(block) = options.get("x264-params") {
                set.apply_raw_block(block);
            }
        }
        Preset::X265(tier) => {
            apply_table(&mut set, X265_FAMILY);
            apply_table(
                &mut set,
                match tier {
                    X265Tier::Fast4 => X265_FAST4,
                    X265Tier::Fast3 => X265_FAST3,
                    X265Tier::Fast2 => X265_FAST2,
                    X265Tier::Fast => X265_FAST,
                    X265Tier::Slow => X265_SLOW,
                    X265Tier::Full => X265_FULL,
                },
            );
            apply_overrides(&mut set, options);
            if let Some(block) = options.get("x265-params") {
                set.apply_raw_block(block);
            }
            // Hierarchical motion estimation off drops its companion knobs.
            if set.get("hme").unwrap_or("0") == "0" {
                set.remove("hme-search");
                set.remove("hme-range");
            }
        }
    }
    set
}
