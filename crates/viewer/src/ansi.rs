//! ANSI line renderer: raw text with SGR escape sequences to styled
//! segments.
//!
//! Style state accumulates across codes within one line and resets on SGR
//! `0`; a line never inherits state from the previous line, matching how
//! test-runner colorizers reset per line. Non-SGR escape sequences are
//! stripped. Pure function, no state kept between calls.

use serde::{Deserialize, Serialize};

/// A terminal color as selected by SGR codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    /// Palette color 0-15 (standard + bright) or 16-255 (indexed)
    Indexed(u8),
    /// 24-bit truecolor
    Rgb(u8, u8, u8),
}

/// Accumulated text attributes for a segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub dim: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    pub fg: Option<Color>,
    pub bg: Option<Color>,
}

/// A run of text sharing one style
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub style: TextStyle,
}

/// Render one raw line into styled segments.
///
/// Empty input yields no segments; input without escapes yields a single
/// default-styled segment.
pub fn render_line(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut style = TextStyle::default();
    let mut text = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            text.push(c);
            continue;
        }
        match chars.peek() {
            Some('[') => {
                chars.next();
                let mut params = String::new();
                let mut terminator = None;
                for p in chars.by_ref() {
                    // CSI final bytes are 0x40..=0x7e
                    if ('@'..='~').contains(&p) {
                        terminator = Some(p);
                        break;
                    }
                    params.push(p);
                }
                if terminator == Some('m') {
                    if !text.is_empty() {
                        segments.push(Segment {
                            text: std::mem::take(&mut text),
                            style,
                        });
                    }
                    apply_sgr(&mut style, &params);
                }
                // Any other CSI sequence (cursor movement, erase) is dropped
            }
            Some(']') => {
                // OSC sequence: skip to BEL or ST
                chars.next();
                while let Some(p) = chars.next() {
                    if p == '\u{07}' {
                        break;
                    }
                    if p == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {
                // Two-byte escape; drop the follow-up character
                chars.next();
            }
        }
    }

    if !text.is_empty() {
        segments.push(Segment { text, style });
    }
    segments
}

/// Plain text of a line with every escape sequence removed, for search and
/// clipboard use
pub fn strip(raw: &str) -> String {
    render_line(raw).into_iter().map(|s| s.text).collect()
}

fn apply_sgr(style: &mut TextStyle, params: &str) {
    let codes: Vec<u16> = params
        .split(';')
        .map(|p| p.parse().unwrap_or(0))
        .collect();
    // An empty parameter list means reset, same as `0`
    let codes = if codes.is_empty() { vec![0] } else { codes };

    let mut i = 0;
    while i < codes.len() {
        match codes[i] {
            0 => *style = TextStyle::default(),
            1 => style.bold = true,
            2 => style.dim = true,
            3 => style.italic = true,
            4 => style.underline = true,
            22 => {
                style.bold = false;
                style.dim = false;
            }
            23 => style.italic = false,
            24 => style.underline = false,
            30..=37 => style.fg = Some(Color::Indexed((codes[i] - 30) as u8)),
            39 => style.fg = None,
            40..=47 => style.bg = Some(Color::Indexed((codes[i] - 40) as u8)),
            49 => style.bg = None,
            90..=97 => style.fg = Some(Color::Indexed((codes[i] - 90 + 8) as u8)),
            100..=107 => style.bg = Some(Color::Indexed((codes[i] - 100 + 8) as u8)),
            38 | 48 => {
                let target_fg = codes[i] == 38;
                let color = match codes.get(i + 1) {
                    Some(&5) => {
                        let c = codes.get(i + 2).map(|&n| Color::Indexed(n as u8));
                        i += 2;
                        c
                    }
                    Some(&2) => {
                        let c = match (codes.get(i + 2), codes.get(i + 3), codes.get(i + 4)) {
                            (Some(&r), Some(&g), Some(&b)) => {
                                Some(Color::Rgb(r as u8, g as u8, b as u8))
                            }
                            _ => None,
                        };
                        i += 4;
                        c
                    }
                    _ => None,
                };
                if let Some(color) = color {
                    if target_fg {
                        style.fg = Some(color);
                    } else {
                        style.bg = Some(color);
                    }
                }
            }
            // Unrecognized codes are ignored
            _ => {}
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line_is_one_default_segment() {
        let segments = render_line("hello world");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "hello world");
        assert_eq!(segments[0].style, TextStyle::default());
    }

    #[test]
    fn test_empty_line_has_no_segments() {
        assert!(render_line("").is_empty());
    }

    #[test]
    fn test_bold_red_then_reset() {
        let segments = render_line("\x1b[1;31mFAIL\x1b[0m rest");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "FAIL");
        assert!(segments[0].style.bold);
        assert_eq!(segments[0].style.fg, Some(Color::Indexed(1)));
        assert_eq!(segments[1].text, " rest");
        assert_eq!(segments[1].style, TextStyle::default());
    }

    #[test]
    fn test_style_accumulates_within_line() {
        let segments = render_line("\x1b[2ma\x1b[32mb");
        assert_eq!(segments.len(), 2);
        assert!(segments[0].style.dim);
        assert!(segments[1].style.dim, "dim persists until reset");
        assert_eq!(segments[1].style.fg, Some(Color::Indexed(2)));
    }

    #[test]
    fn test_bright_and_indexed_and_truecolor() {
        let segments = render_line("\x1b[96ma\x1b[38;5;208mb\x1b[48;2;1;2;3mc");
        assert_eq!(segments[0].style.fg, Some(Color::Indexed(14)));
        assert_eq!(segments[1].style.fg, Some(Color::Indexed(208)));
        assert_eq!(segments[2].style.bg, Some(Color::Rgb(1, 2, 3)));
    }

    #[test]
    fn test_empty_sgr_means_reset() {
        let segments = render_line("\x1b[31ma\x1b[mb");
        assert_eq!(segments[1].style, TextStyle::default());
    }

    #[test]
    fn test_non_sgr_sequences_are_stripped() {
        let segments = render_line("a\x1b[2Kb\x1b]0;title\x07c");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "abc");
    }

    #[test]
    fn test_unknown_codes_are_ignored() {
        let segments = render_line("\x1b[7;99mx");
        assert_eq!(segments[0].text, "x");
        assert_eq!(segments[0].style, TextStyle::default());
    }

    #[test]
    fn test_strip_removes_all_escapes() {
        assert_eq!(strip("\x1b[1;31mFAIL\x1b[0m rest"), "FAIL rest");
        assert_eq!(strip("plain"), "plain");
    }

    #[test]
    fn test_truncated_escape_does_not_panic() {
        assert!(render_line("tail\x1b").len() == 1);
        assert_eq!(render_line("tail\x1b[31")[0].text, "tail");
    }
}
