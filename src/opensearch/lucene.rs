//! Rust `regex` syntax to the Lucene regular-expression subset.
//!
//! `regexp` only prefilters candidates, so the translation may widen a
//! pattern but should not narrow it:
//!
//! | Rust | Lucene |
//! |------|--------|
//! | `\d` `\w` `\s` | ASCII classes `[0-9]`, `[a-zA-Z0-9_]`, whitespace |
//! | `\D` `\W` `\S` | negated ASCII classes |
//! | `\n` `\t` `\x41` `\u{e9}` | the literal character |
//! | `^` `$` `\b` `\B` `\A` `\z` | empty group `()` |
//! | `\p{..}`, POSIX and set-operation classes | `.` |
//! | `(?:..)` `(?P<name>..)` | plain group |
//! | `(?i)` | `case_insensitive` on the query |
//! | lazy `*?` `+?` `??` | greedy form |
//!
//! ASCII punctuation is always escaped, so Lucene's optional operators
//! (`#`, `@`, `&`, `~`, `<>`) and its `"` quoting never apply. Verbose mode
//! (`(?x)`) is not translated.

const DIGIT: &str = "0-9";
const WORD: &str = "a-zA-Z0-9_";
const SPACE: &str = " \t\n\r\u{b}\u{c}";

/// Lucene form of `pattern`, and whether an inline flag asked for
/// case-insensitive matching. `None` when the pattern cannot be expressed.
pub(crate) fn translate(pattern: &str) -> Option<(String, bool)> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut case_insensitive = false;
    let mut after_repeat = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let mut repeat = false;
        match c {
            '?' if after_repeat => i += 1,
            '(' if chars.get(i + 1) == Some(&'?') => {
                let group = parse_group(&chars, i + 2)?;
                if group.verbose {
                    return None;
                }
                case_insensitive |= group.case_insensitive;
                if group.opens {
                    out.push('(');
                }
                i = group.next;
            }
            '*' | '+' | '?' | '|' | '.' | '(' | ')' => {
                out.push(c);
                repeat = matches!(c, '*' | '+' | '?');
                i += 1;
            }
            '{' => {
                let end = chars[i..].iter().position(|&ch| ch == '}')? + i;
                out.extend(&chars[i..=end]);
                repeat = true;
                i = end + 1;
            }
            '^' | '$' => {
                out.push_str("()");
                i += 1;
            }
            '\\' => {
                let (escape, next) = parse_escape(&chars, i + 1);
                match escape {
                    Escape::Char(ch) => push_literal(&mut out, ch),
                    Escape::Members(set) => {
                        out.push('[');
                        out.push_str(set);
                        out.push(']');
                    }
                    Escape::NotMembers(set) => {
                        out.push_str("[^");
                        out.push_str(set);
                        out.push(']');
                    }
                    Escape::Assertion => out.push_str("()"),
                    Escape::Any => out.push('.'),
                }
                i = next;
            }
            '[' => {
                let end = class_end(&chars, i)?;
                match translate_class(&chars[i + 1..end - 1]) {
                    Some(class) => out.push_str(&class),
                    None => out.push('.'),
                }
                i = end;
            }
            _ => {
                push_literal(&mut out, c);
                i += 1;
            }
        }
        after_repeat = repeat;
    }
    Some((out, case_insensitive))
}

enum Escape {
    Char(char),
    Members(&'static str),
    NotMembers(&'static str),
    Assertion,
    Any,
}

/// Parses the escape whose letter is at `i`; returns it and the index after it.
fn parse_escape(chars: &[char], i: usize) -> (Escape, usize) {
    let Some(&c) = chars.get(i) else {
        return (Escape::Char('\\'), i);
    };
    let next = i + 1;
    let escape = match c {
        'd' => Escape::Members(DIGIT),
        'w' => Escape::Members(WORD),
        's' => Escape::Members(SPACE),
        'D' => Escape::NotMembers(DIGIT),
        'W' => Escape::NotMembers(WORD),
        'S' => Escape::NotMembers(SPACE),
        'n' => Escape::Char('\n'),
        't' => Escape::Char('\t'),
        'r' => Escape::Char('\r'),
        'f' => Escape::Char('\u{c}'),
        'v' => Escape::Char('\u{b}'),
        'a' => Escape::Char('\u{7}'),
        'b' | 'B' | 'A' | 'z' | '<' | '>' => {
            if chars.get(next) == Some(&'{') {
                return (Escape::Assertion, skip_braces(chars, next));
            }
            Escape::Assertion
        }
        'p' | 'P' => {
            if chars.get(next) == Some(&'{') {
                return (Escape::Any, skip_braces(chars, next));
            }
            return (Escape::Any, next + 1);
        }
        'x' | 'u' | 'U' => {
            let width = match c {
                'x' => 2,
                'u' => 4,
                _ => 8,
            };
            let (digits, after) = if chars.get(next) == Some(&'{') {
                let end = skip_braces(chars, next);
                (&chars[next + 1..end.saturating_sub(1).max(next + 1)], end)
            } else {
                let end = (next + width).min(chars.len());
                (&chars[next..end], end)
            };
            let hex: String = digits.iter().collect();
            let escape = u32::from_str_radix(&hex, 16)
                .ok()
                .and_then(char::from_u32)
                .map_or(Escape::Any, Escape::Char);
            return (escape, after);
        }
        c if c.is_ascii_alphanumeric() => Escape::Any,
        c => Escape::Char(c),
    };
    (escape, next)
}

/// Index after the `}` closing the brace at `open`.
fn skip_braces(chars: &[char], open: usize) -> usize {
    chars[open..]
        .iter()
        .position(|&c| c == '}')
        .map_or(chars.len(), |p| open + p + 1)
}

/// Index after the `]` closing the class opened at `open`.
fn class_end(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' => depth += 1,
            ']' if i > open + 1 && !(i == open + 2 && chars[open + 1] == '^') => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// `[...]` for the class body `body`, or `None` if Lucene has no equivalent.
fn translate_class(body: &[char]) -> Option<String> {
    let (negated, body) = match body.first() {
        Some('^') => (true, &body[1..]),
        _ => (false, body),
    };
    let mut members = String::new();
    let mut i = 0;
    while i < body.len() {
        let c = body[i];
        match c {
            '[' => return None,
            '&' | '-' | '~' if body.get(i + 1) == Some(&c) => return None,
            '-' if i > 0 && i + 1 < body.len() => members.push('-'),
            '\\' => {
                let (escape, next) = parse_escape(body, i + 1);
                match escape {
                    Escape::Char(ch) => push_literal(&mut members, ch),
                    Escape::Members(set) => members.push_str(set),
                    _ => return None,
                }
                i = next;
                continue;
            }
            _ => push_literal(&mut members, c),
        }
        i += 1;
    }
    Some(format!("[{}{}]", if negated { "^" } else { "" }, members))
}

struct Group {
    opens: bool,
    case_insensitive: bool,
    verbose: bool,
    next: usize,
}

/// Parses the group prefix starting after `(?`.
fn parse_group(chars: &[char], start: usize) -> Option<Group> {
    if matches!(chars.get(start), Some('P') | Some('<')) {
        let close = chars[start..].iter().position(|&c| c == '>')? + start;
        return Some(Group {
            opens: true,
            case_insensitive: false,
            verbose: false,
            next: close + 1,
        });
    }
    let end = chars[start..].iter().position(|&c| c == ')' || c == ':')? + start;
    let enabled: String = chars[start..end].iter().take_while(|&&c| c != '-').collect();
    Some(Group {
        opens: chars[end] == ':',
        case_insensitive: enabled.contains('i'),
        verbose: enabled.contains('x'),
        next: end + 1,
    })
}

fn push_literal(out: &mut String, c: char) {
    if c.is_ascii_punctuation() {
        out.push('\\');
    }
    out.push(c);
}
