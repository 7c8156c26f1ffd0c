use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Terminal column width of a string (CJK and emoji count as two).
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

const ELLIPSIS: char = '…';

/// Truncate `s` to at most `max_width` columns, ending with `…` when cut.
///
/// Borrows when the string already fits. Zero-width characters never cause
/// truncation on their own.
pub fn fit_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width == 0 {
        return Cow::Borrowed("");
    }

    // Leave one column for the ellipsis.
    let budget = max_width - 1;
    let mut used = 0;
    let mut out = String::with_capacity(s.len().min(max_width * 4));
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push(ELLIPSIS);
    Cow::Owned(out)
}

/// Remove terminal control characters and ANSI escape sequences from text
/// received over the network before it reaches the terminal.
///
/// Keeps tab and newline; drops carriage return and every other C0/C1
/// control, CSI sequences (`ESC [ ... final`) and OSC sequences
/// (`ESC ] ... BEL` or `ESC ] ... ESC \`).
pub fn sanitize(s: &str) -> Cow<'_, str> {
    let dirty = s
        .chars()
        .any(|c| c.is_control() && c != '\t' && c != '\n');
    if !dirty {
        return Cow::Borrowed(s);
    }

    enum State {
        Text,
        Escape,
        Csi,
        Osc,
        OscEscape,
    }

    let mut out = String::with_capacity(s.len());
    let mut state = State::Text;
    for c in s.chars() {
        state = match state {
            State::Text => match c {
                '\x1b' => State::Escape,
                '\t' | '\n' => {
                    out.push(c);
                    State::Text
                }
                c if c.is_control() => State::Text,
                c => {
                    out.push(c);
                    State::Text
                }
            },
            State::Escape => match c {
                '[' => State::Csi,
                ']' => State::Osc,
                // Bare ESC: drop it, keep the following character if printable.
                c if c.is_control() => State::Text,
                c => {
                    out.push(c);
                    State::Text
                }
            },
            State::Csi => {
                if ('\x40'..='\x7e').contains(&c) {
                    State::Text
                } else {
                    State::Csi
                }
            }
            State::Osc => match c {
                '\x07' => State::Text,
                '\x1b' => State::OscEscape,
                _ => State::Osc,
            },
            State::OscEscape => match c {
                '\\' => State::Text,
                _ => State::Osc,
            },
        };
    }
    Cow::Owned(out)
}

/// Greedy word wrap into at most `max_lines` lines of `width` columns.
///
/// Words wider than a line are split by character. When text remains after
/// the last line, that line is ended with `…`.
pub fn wrap_lines(text: &str, width: usize, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    if width == 0 || max_lines == 0 {
        return lines;
    }

    let mut truncated = false;
    'paragraphs: for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut line_width = 0;

        for word in paragraph.split_whitespace() {
            let word_width = display_width(word);
            let sep = usize::from(line_width > 0);

            if line_width + sep + word_width <= width {
                if sep == 1 {
                    line.push(' ');
                }
                line.push_str(word);
                line_width += sep + word_width;
                continue;
            }

            if line_width > 0 {
                if lines.len() + 1 == max_lines {
                    lines.push(line);
                    truncated = true;
                    break 'paragraphs;
                }
                lines.push(std::mem::take(&mut line));
                line_width = 0;
            }

            for c in word.chars() {
                let w = c.width().unwrap_or(0);
                if line_width + w > width {
                    if lines.len() + 1 == max_lines {
                        lines.push(line);
                        truncated = true;
                        break 'paragraphs;
                    }
                    lines.push(std::mem::take(&mut line));
                    line_width = 0;
                }
                line.push(c);
                line_width += w;
            }
        }

        if lines.len() == max_lines {
            truncated = true;
            break;
        }
        lines.push(line);
    }

    // Trailing blank lines add nothing to a card.
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    if truncated {
        if let Some(last) = lines.last_mut() {
            let cut = fit_width(last, width.saturating_sub(1)).into_owned();
            *last = format!("{cut}{ELLIPSIS}");
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fit_width_borrows_when_short() {
        assert!(matches!(fit_width("otter", 10), Cow::Borrowed("otter")));
        assert!(matches!(fit_width("otter", 5), Cow::Borrowed(_)));
    }

    #[test]
    fn test_fit_width_truncates_with_ellipsis() {
        assert_eq!(fit_width("sea otter", 5), "sea …");
        assert_eq!(fit_width("sea otter", 1), "…");
        assert_eq!(fit_width("sea otter", 0), "");
    }

    #[test]
    fn test_fit_width_wide_chars() {
        // Each CJK character is two columns; the third would overflow.
        let out = fit_width("水獺水獺", 6);
        assert_eq!(out, "水獺…");
        assert!(display_width(&out) <= 6);
    }

    #[test]
    fn test_sanitize_clean_text_borrows() {
        assert!(matches!(sanitize("hello\tworld\n"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_sanitize_strips_sequences() {
        assert_eq!(sanitize("\x1b[31mred\x1b[0m"), "red");
        assert_eq!(sanitize("\x1b]0;title\x07after"), "after");
        assert_eq!(sanitize("\x1b]8;;http://x\x1b\\link"), "link");
        assert_eq!(sanitize("a\x00b\x7fc\rd"), "abcd");
        assert_eq!(sanitize("\x1bxyz"), "xyz");
    }

    #[test]
    fn test_sanitize_keeps_unicode() {
        assert_eq!(sanitize("🦦\x1b[1m ottér"), "🦦 ottér");
    }

    #[test]
    fn test_wrap_lines_greedy() {
        let lines = wrap_lines("the quick brown fox jumps", 10, 5);
        assert_eq!(lines, vec!["the quick", "brown fox", "jumps"]);
    }

    #[test]
    fn test_wrap_lines_truncates_last_line() {
        let lines = wrap_lines("the quick brown fox jumps", 10, 2);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with('…'));
        assert!(lines.iter().all(|l| display_width(l) <= 10));
    }

    #[test]
    fn test_wrap_lines_splits_long_word() {
        let lines = wrap_lines("abcdefghij", 4, 5);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_wrap_lines_preserves_paragraphs() {
        let lines = wrap_lines("one\n\ntwo", 10, 5);
        assert_eq!(lines, vec!["one", "", "two"]);
    }

    #[test]
    fn test_wrap_lines_degenerate() {
        assert!(wrap_lines("text", 0, 3).is_empty());
        assert!(wrap_lines("text", 3, 0).is_empty());
        assert!(wrap_lines("", 10, 3).is_empty());
    }
}
