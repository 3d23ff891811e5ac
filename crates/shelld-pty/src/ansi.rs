use std::sync::OnceLock;

use regex::Regex;

fn csi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("CSI regex is valid"))
}

/// Strip ANSI CSI escape sequences (cursor moves, colors) from a line of PTY
/// output, used by `getOutput` unless the caller asked for raw bytes back.
pub fn strip_csi(input: &str) -> String {
    csi_regex().replace_all(input, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_codes() {
        let raw = "\x1b[31mred\x1b[0m text";
        assert_eq!(strip_csi(raw), "red text");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(strip_csi("no escapes here"), "no escapes here");
    }
}
