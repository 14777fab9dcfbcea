use regex::Regex;
use std::sync::OnceLock;

use crate::utils::tail_chars;

/// Characters of raw output the detectors look at.
pub const DETECTION_WINDOW: usize = 2000;

fn osc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)?").expect("valid OSC regex"))
}

fn cursor_forward_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[\d*C").expect("valid cursor regex"))
}

fn csi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").expect("valid CSI regex"))
}

fn short_escape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\x1b(?:[()*+][0-9A-Za-z]|[@-Z\\-_=>78])").expect("valid escape regex")
    })
}

fn control_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\x00-\x08\x0b-\x1f\x7f]").expect("valid control regex"))
}

/// Cursor-forward becomes one space; every other escape sequence and C0
/// control except newline and tab is removed.
pub fn normalize(text: &str) -> String {
    let text = osc_regex().replace_all(text, "");
    let text = cursor_forward_regex().replace_all(&text, " ");
    let text = csi_regex().replace_all(&text, "");
    let text = short_escape_regex().replace_all(&text, "");
    control_regex().replace_all(&text, "").into_owned()
}

/// Normalised trailing window of raw terminal output.
pub fn detection_window(raw: &str) -> String {
    normalize(tail_chars(raw, DETECTION_WINDOW))
}
