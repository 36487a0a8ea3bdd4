//! Source Preprocessor.
//!
//! Splits a snippet into logical statements with a line scanner that tracks
//! brace/paren/bracket depth. This is a heuristic, not a parser: it never
//! fails, and unbalanced input ends up as one trailing statement.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static OUTPUT_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bconsole\s*\.\s*(?:log|info|warn|error)\s*\(").expect("invalid output call pattern")
});

static ANY_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w$)\]]\s*\(").expect("invalid call pattern"));

static LEADING_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:const|let|var|function|class|if|for|while|do|switch|try|return|throw|import|export|async|break|continue)\b",
    )
    .expect("invalid keyword pattern")
});

static CONTINUATION_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:else|catch|finally)\b").expect("invalid continuation pattern"));

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=").expect("invalid declaration pattern")
});

static FUNCTION_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:function\s*\*?|class)\s+([A-Za-z_$][\w$]*)").expect("invalid function pattern")
});

/// A heuristically delimited chunk of source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatement {
    /// Original lines, as typed
    pub raw_text: String,
    /// 1-based, inclusive
    pub start_line: u32,
    pub end_line: u32,
    /// Comment-stripped text with each line trimmed; the basis of identity
    pub code: String,
    /// `hash32(code)`
    pub content_hash: u32,
    /// Contains a `console.log/info/warn/error(` call
    pub produces_output: bool,
    /// Names bound by `const/let/var NAME =`, `function NAME` or `class NAME`
    pub declared: Vec<String>,
}

impl SourceStatement {
    pub fn contains_line(&self, line: u32) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }
}

/// Replaceable statement splitting strategy
pub trait StatementSplitter: Send + Sync {
    fn split(&self, source: &str) -> Vec<SourceStatement>;
}

/// Depth-counting splitter
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicSplitter;

/// 32-bit polynomial hash (`h * 31 + unit`) over UTF-16 code units
pub fn hash32(text: &str) -> u32 {
    text.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
        .unsigned_abs()
}

/// Removes line and block comments, keeping string and template contents
pub fn strip_comments(source: &str) -> String {
    let mut lex = Lex::Code;
    let mut depth = 0;
    source
        .lines()
        .map(|line| scan_line(line, &mut lex, &mut depth).stripped)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Number of console output calls outside strings and comments
pub fn output_call_count(source: &str) -> usize {
    let mut lex = Lex::Code;
    let mut depth = 0;
    source
        .lines()
        .map(|line| OUTPUT_CALL.find_iter(&scan_line(line, &mut lex, &mut depth).masked).count())
        .sum()
}

fn line_number(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Code,
    BlockComment,
    Template,
}

struct ScannedLine {
    /// Comments removed, strings kept
    stripped: String,
    /// Comments removed, string contents removed
    masked: String,
}

fn scan_line(line: &str, lex: &mut Lex, depth: &mut u32) -> ScannedLine {
    let mut stripped = String::with_capacity(line.len());
    let mut masked = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match *lex {
            Lex::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    *lex = Lex::Code;
                    stripped.push(' ');
                    masked.push(' ');
                }
            }
            Lex::Template => {
                stripped.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        stripped.push(escaped);
                    }
                } else if c == '`' {
                    masked.push('`');
                    *lex = Lex::Code;
                }
            }
            Lex::Code => match c {
                '/' if chars.peek() == Some(&'/') => break,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    *lex = Lex::BlockComment;
                }
                '"' | '\'' => {
                    stripped.push(c);
                    masked.push(c);
                    while let Some(s) = chars.next() {
                        stripped.push(s);
                        if s == '\\' {
                            if let Some(escaped) = chars.next() {
                                stripped.push(escaped);
                            }
                        } else if s == c {
                            break;
                        }
                    }
                    masked.push(c);
                }
                '`' => {
                    stripped.push(c);
                    masked.push(c);
                    *lex = Lex::Template;
                }
                _ => {
                    match c {
                        '{' | '(' | '[' => *depth += 1,
                        '}' | ')' | ']' => *depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    stripped.push(c);
                    masked.push(c);
                }
            },
        }
    }

    ScannedLine { stripped, masked }
}

/// Line that extends the previous statement rather than starting one
fn is_continuation(code: &str) -> bool {
    if code.starts_with("++") || code.starts_with("--") {
        return false;
    }
    code.starts_with(['.', '?', ':', ',', ')', ']', '}', '+', '-', '*', '%', '=', '<', '>', '&', '|', '^'])
        || CONTINUATION_KEYWORD.is_match(code)
}

fn ends_with_operator(code: &str) -> bool {
    if code.ends_with("++") || code.ends_with("--") {
        return false;
    }
    code.ends_with("=>")
        || code.ends_with(['=', ',', '+', '-', '*', '/', '%', '&', '|', '?', ':', '.', '(', '[', '{'])
}

/// `if (...)`, `for (...)` or `while (...)` with the body on a later line
fn is_open_control_header(masked: &str) -> bool {
    let code = masked.trim();
    let Some(rest) = ["else if", "if", "for", "while"]
        .iter()
        .find_map(|keyword| code.strip_prefix(keyword))
    else {
        return false;
    };
    let rest = rest.trim_start();
    if !rest.starts_with('(') {
        return false;
    }

    let mut depth = 0u32;
    for (i, c) in rest.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1 == rest.len();
                }
            }
            _ => {}
        }
    }
    false
}

/// The statement cannot end on this line
fn expects_more(code: &str, masked: &str) -> bool {
    ends_with_operator(code) || is_open_control_header(masked) || code == "else"
}

/// Closing heuristic for a line at depth zero
fn closes(code: &str, masked: &str) -> bool {
    if code.ends_with(';') || code.ends_with('}') {
        return true;
    }
    if expects_more(code, masked) {
        return false;
    }
    OUTPUT_CALL.is_match(masked)
        || LEADING_KEYWORD.is_match(code)
        || (!ANY_CALL.is_match(masked) && !masked.contains(['{', '}']))
}

struct Pending {
    start_line: u32,
    end_line: u32,
    raw: Vec<String>,
    code: Vec<String>,
    masked: String,
    expects_more: bool,
}

impl Pending {
    fn new(line: u32) -> Self {
        Self {
            start_line: line,
            end_line: line,
            raw: vec![],
            code: vec![],
            masked: String::new(),
            expects_more: false,
        }
    }

    fn push(&mut self, raw: &str, scanned: &ScannedLine, line: u32) {
        self.raw.push(raw.to_string());
        let code = scanned.stripped.trim();
        if !code.is_empty() {
            self.code.push(code.to_string());
        }
        self.masked.push_str(&scanned.masked);
        self.masked.push('\n');
        self.expects_more = !code.is_empty() && expects_more(code, &scanned.masked);
        self.end_line = line;
    }

    fn finish(self) -> SourceStatement {
        let code = self.code.join("\n");
        let mut declared = vec![];
        for captures in DECLARATION
            .captures_iter(&self.masked)
            .chain(FUNCTION_DECLARATION.captures_iter(&self.masked))
        {
            let name = captures[1].to_string();
            if !declared.contains(&name) {
                declared.push(name);
            }
        }

        SourceStatement {
            raw_text: self.raw.join("\n"),
            start_line: self.start_line,
            end_line: self.end_line,
            content_hash: hash32(&code),
            produces_output: OUTPUT_CALL.is_match(&self.masked),
            code,
            declared,
        }
    }
}

impl StatementSplitter for HeuristicSplitter {
    fn split(&self, source: &str) -> Vec<SourceStatement> {
        let mut done: Vec<Pending> = vec![];
        let mut pending: Option<Pending> = None;
        let mut lex = Lex::Code;
        let mut depth = 0u32;

        for (index, raw) in source.lines().enumerate() {
            let line = line_number(index);
            let inside = pending.is_some() && (depth > 0 || lex == Lex::Template);
            let scanned = scan_line(raw, &mut lex, &mut depth);
            let code = scanned.stripped.trim();

            if !inside {
                if code.is_empty() {
                    continue;
                }
                if is_continuation(code) || pending.as_ref().is_some_and(|p| p.expects_more) {
                    if pending.is_none() {
                        pending = done.pop();
                    }
                } else if let Some(finished) = pending.take() {
                    done.push(finished);
                }
            }

            let current = pending.get_or_insert_with(|| Pending::new(line));
            current.push(raw, &scanned, line);

            if depth == 0 && lex == Lex::Code && closes(code, &scanned.masked) {
                done.extend(pending.take());
            }
        }

        done.extend(pending);
        done.into_iter().map(Pending::finish).collect()
    }
}
