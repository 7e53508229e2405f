//! Bracket/string/comment-aware text helpers (§4.1).
//!
//! The lexer in [`super::lexer`] is the thing that actually turns source text
//! into tokens for the grammar in [`super::rule`]/[`super::expr`] to consume.
//! This module is the lower-level scanner §4.1 describes directly: a single
//! left-to-right pass tracking a state stack, exposed as the standalone
//! helpers other passes occasionally need (stripping comments before an
//! error snippet, splitting `@DefineFlag`-style annotation argument lists on
//! a separator without tripping over nested brackets, …).

/// What the scanner's state-stack top currently is. Bracket matching only
/// applies while this is [`ScanState::Code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    LineComment,
    BlockComment,
    StringSingle,
    StringDouble,
    StringTriple,
    Backtick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Ok,
    /// A closing bracket didn't match the innermost open one.
    Unmatched,
    /// A `"`-string hit end-of-line before its closing quote.
    EolInString,
}

/// One event per character: the byte index, the running bracket depth (only
/// meaningful in [`ScanState::Code`]) and whether this character kept
/// scanning valid.
struct ScanEvent {
    index: usize,
    depth: i32,
    status: ScanStatus,
}

fn scan(text: &str) -> Vec<ScanEvent> {
    let mut events = Vec::with_capacity(text.len());
    let mut stack: Vec<ScanState> = vec![ScanState::Code];
    let mut bracket_stack: Vec<char> = Vec::new();
    let bytes: Vec<char> = text.chars().collect();
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i];
        let top = *stack.last().unwrap();
        let mut status = ScanStatus::Ok;

        match top {
            ScanState::Code => {
                if c == '#' {
                    stack.push(ScanState::LineComment);
                } else if c == '/' && bytes.get(i + 1) == Some(&'*') {
                    stack.push(ScanState::BlockComment);
                    i += 1;
                } else if bytes[i..].starts_with(&['"', '"', '"']) {
                    stack.push(ScanState::StringTriple);
                    i += 2;
                } else if c == '"' {
                    stack.push(ScanState::StringDouble);
                } else if c == '\'' {
                    stack.push(ScanState::StringSingle);
                } else if c == '`' {
                    stack.push(ScanState::Backtick);
                } else if matches!(c, '(' | '[' | '{') {
                    bracket_stack.push(c);
                } else if matches!(c, ')' | ']' | '}') {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        '}' => '{',
                        _ => unreachable!(),
                    };
                    match bracket_stack.pop() {
                        Some(open) if open == expected => {}
                        _ => status = ScanStatus::Unmatched,
                    }
                }
            }
            ScanState::LineComment => {
                if c == '\n' {
                    stack.pop();
                }
            }
            ScanState::BlockComment => {
                if c == '*' && bytes.get(i + 1) == Some(&'/') {
                    stack.pop();
                    i += 1;
                }
            }
            ScanState::StringDouble | ScanState::StringSingle => {
                let quote = if top == ScanState::StringDouble { '"' } else { '\'' };
                if c == '\\' {
                    i += 1; // skip escaped char
                } else if c == '\n' {
                    status = ScanStatus::EolInString;
                } else if c == quote {
                    stack.pop();
                }
            }
            ScanState::StringTriple => {
                if c == '\\' {
                    i += 1;
                } else if bytes[i..].starts_with(&['"', '"', '"']) {
                    stack.pop();
                    i += 2;
                }
            }
            ScanState::Backtick => {
                if c == '`' {
                    stack.pop();
                }
            }
        }

        events.push(ScanEvent {
            index: i,
            depth: bracket_stack.len() as i32,
            status,
        });

        if status != ScanStatus::Ok {
            break;
        }

        i += 1;
    }

    events
}

/// `true` iff every bracket in `text` is matched (ignoring brackets that
/// appear inside comments or strings).
pub fn is_whole(text: &str) -> bool {
    let events = scan(text);
    events.last().map(|e| e.status == ScanStatus::Ok).unwrap_or(true)
        && events.iter().all(|e| e.status == ScanStatus::Ok)
}

/// Removes `#...\n` and `/*...*/` regions, preserving every other character
/// (including newlines, so later byte offsets still line up for
/// diagnostics).
pub fn remove_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut stack: Vec<ScanState> = vec![ScanState::Code];
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        let top = *stack.last().unwrap();
        match top {
            ScanState::Code => {
                if c == '#' {
                    stack.push(ScanState::LineComment);
                    i += 1;
                    continue;
                } else if c == '/' && chars.get(i + 1) == Some(&'*') {
                    stack.push(ScanState::BlockComment);
                    i += 2;
                    continue;
                } else if bytes_triple(&chars, i) {
                    stack.push(ScanState::StringTriple);
                    out.push(c);
                    out.push(c);
                    out.push(c);
                    i += 3;
                    continue;
                } else if c == '"' {
                    stack.push(ScanState::StringDouble);
                } else if c == '\'' {
                    stack.push(ScanState::StringSingle);
                } else if c == '`' {
                    stack.push(ScanState::Backtick);
                }
                out.push(c);
            }
            ScanState::LineComment => {
                if c == '\n' {
                    stack.pop();
                    out.push(c);
                }
            }
            ScanState::BlockComment => {
                if c == '*' && chars.get(i + 1) == Some(&'/') {
                    stack.pop();
                    i += 2;
                    continue;
                }
                if c == '\n' {
                    out.push(c);
                }
            }
            ScanState::StringDouble | ScanState::StringSingle => {
                let quote = if top == ScanState::StringDouble { '"' } else { '\'' };
                out.push(c);
                if c == '\\' {
                    if let Some(next) = chars.get(i + 1) {
                        out.push(*next);
                    }
                    i += 2;
                    continue;
                } else if c == quote {
                    stack.pop();
                }
            }
            ScanState::StringTriple => {
                out.push(c);
                if bytes_triple(&chars, i) {
                    stack.pop();
                    out.push(chars[i + 1]);
                    out.push(chars[i + 2]);
                    i += 3;
                    continue;
                }
            }
            ScanState::Backtick => {
                out.push(c);
                if c == '`' {
                    stack.pop();
                }
            }
        }
        i += 1;
    }

    out
}

fn bytes_triple(chars: &[char], i: usize) -> bool {
    chars.get(i) == Some(&'"') && chars.get(i + 1) == Some(&'"') && chars.get(i + 2) == Some(&'"')
}

/// Splits `text` on `separator` only where the scanner's bracket depth is 0
/// and we're not inside a string/comment. A run of the separator character
/// immediately adjacent to another occurrence of it is not treated as a
/// split point — this is what lets `Split(s, '|')` avoid cutting `||` in two.
pub fn split(text: &str, separator: char) -> Vec<String> {
    let events = scan(text);
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let depth = events.get(i).map(|e| e.depth).unwrap_or(0);
        let at_top_level_code = depth == 0;
        if at_top_level_code && chars[i] == separator {
            let prev_is_sep = i > 0 && chars[i - 1] == separator;
            let next_is_sep = chars.get(i + 1) == Some(&separator);
            if !prev_is_sep && !next_is_sep {
                pieces.push(chars[start..i].iter().collect());
                start = i + 1;
            }
        }
        i += 1;
    }
    pieces.push(chars[start..].iter().collect());
    pieces
}

/// Splits on runs of ASCII whitespace at depth 0.
pub fn split_on_whitespace(text: &str) -> Vec<String> {
    let events = scan(text);
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut cur = String::new();
    for (i, c) in chars.iter().enumerate() {
        let depth = events.get(i).map(|e| e.depth).unwrap_or(0);
        if depth == 0 && c.is_whitespace() {
            if !cur.is_empty() {
                pieces.push(std::mem::take(&mut cur));
            }
        } else {
            cur.push(*c);
        }
    }
    if !cur.is_empty() {
        pieces.push(cur);
    }
    pieces
}

/// Removes leading/trailing ASCII spaces, then removes one matched pair of
/// enclosing parentheses if the whole trimmed string is exactly `(...)`
/// (i.e. the opening paren's matching close is the string's last
/// character, not some earlier one — `(a)(b)` is left alone).
pub fn strip(text: &str) -> String {
    let mut s = text.trim().to_string();
    loop {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() < 2 || chars[0] != '(' || *chars.last().unwrap() != ')' {
            break;
        }
        let events = scan(&s);
        // depth after consuming the opening '(' is 1; find the first later
        // index where depth returns to 0 — that must be the final ')'.
        let closes_at_end = events
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, e)| e.depth == 0)
            .map(|(i, _)| i == chars.len() - 1)
            .unwrap_or(false);
        if !closes_at_end {
            break;
        }
        s = chars[1..chars.len() - 1].iter().collect::<String>().trim().to_string();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_line_and_block_comments() {
        assert_eq!(remove_comments("a # comment\nb"), "a \nb");
        assert_eq!(remove_comments("a /* block */ b"), "a  b");
    }

    #[test]
    fn split_respects_brackets() {
        assert_eq!(split("a(b,c),d", ','), vec!["a(b,c)", "d"]);
    }

    #[test]
    fn split_on_pipe_ignores_double_pipe() {
        assert_eq!(split("a || b | c", '|'), vec!["a || b ", " c"]);
    }

    #[test]
    fn is_whole_detects_mismatch() {
        assert!(is_whole("f(a, [b, c])"));
        assert!(!is_whole("f(a, [b, c)"));
    }

    #[test]
    fn strings_do_not_affect_bracket_depth() {
        assert!(is_whole("f(\")\")"));
    }
}
