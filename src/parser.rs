//! Turns one line of input into a chain of [`Stage`]s.
//!
//! Parsing never fails: malformed input degrades into a no-op or best-effort
//! stage, and anything that cannot be executed is rejected later by the
//! orchestrator.

use crate::stage::{OutputMode, OutputRedirect, Stage};
use tracing::trace;

const PIPE: &str = "|";
const BACKGROUND: &str = "&";
const AUTOCOMPLETE_MARKER: char = '?';
const BACKGROUND_MARKER: char = '&';

fn is_splitter(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Splits `line` on runs of spaces and tabs. Quoted text keeps its whitespace;
/// an unterminated quote extends to the end of the line.
struct Tokenizer<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(line: &'a str) -> Self {
        Tokenizer { line, pos: 0 }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.line[self.pos..];
        let skipped = rest.len() - rest.trim_start_matches(is_splitter).len();
        let start = self.pos + skipped;
        if start >= self.line.len() {
            self.pos = self.line.len();
            return None;
        }

        let mut quote: Option<char> = None;
        let mut end = self.line.len();
        for (offset, c) in self.line[start..].char_indices() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None if c == '"' || c == '\'' => quote = Some(c),
                None if is_splitter(c) => {
                    end = start + offset;
                    break;
                }
                None => {}
            }
        }

        self.pos = end;
        Some(&self.line[start..end])
    }
}

/// Strips one pair of matching quotes wrapping the whole token.
///
/// Tokens of length two or less (such as `""`) are kept verbatim.
fn unquote(token: &str) -> &str {
    let bytes = token.as_bytes();
    let len = bytes.len();
    if len > 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[len - 1] == bytes[0] {
        &token[1..len - 1]
    } else {
        token
    }
}

/// Parses a complete input line.
///
/// A trailing `?` marks the line for autocompletion and a trailing `&` sends the
/// whole pipeline to the background; both markers are removed before
/// tokenizing.
pub fn parse(line: &str) -> Stage {
    let mut line = line.trim();

    let mut requests_autocomplete = false;
    if let Some(stripped) = line.strip_suffix(AUTOCOMPLETE_MARKER) {
        requests_autocomplete = true;
        line = stripped.trim_end();
    }
    let mut runs_in_background = false;
    if let Some(stripped) = line.strip_suffix(BACKGROUND_MARKER) {
        runs_in_background = true;
        line = stripped.trim_end();
    }

    // Stages are linked from the back so the chain is built without recursion.
    let mut chain: Option<Stage> = None;
    for segment in split_pipeline(line).into_iter().rev() {
        let mut stage = parse_stage(&segment);
        match chain.take() {
            Some(next) => stage.next = Some(Box::new(next)),
            None => stage.runs_in_background = runs_in_background,
        }
        chain = Some(stage);
    }

    let mut chain = chain.unwrap_or_default();
    chain.requests_autocomplete = requests_autocomplete;
    trace!(
        program = %chain.program_name,
        stages = chain.len(),
        background = runs_in_background,
        "parsed line"
    );
    chain
}

/// Groups the tokens of `line` into one segment per pipeline stage. There is
/// always at least one segment, and every `|` adds one even when nothing
/// follows it.
fn split_pipeline(line: &str) -> Vec<Vec<&str>> {
    let mut segments = vec![Vec::new()];
    for token in Tokenizer::new(line) {
        if token == PIPE {
            segments.push(Vec::new());
        } else if let Some(segment) = segments.last_mut() {
            segment.push(token);
        }
    }
    segments
}

/// Parses the tokens of one stage.
fn parse_stage(segment: &[&str]) -> Stage {
    let mut stage = Stage::default();
    let mut tokens = segment.iter().copied();

    let Some(program) = tokens.next() else {
        return stage;
    };
    stage.program_name = unquote(program).to_string();
    stage.arguments.push(stage.program_name.clone());

    while let Some(arg) = tokens.next() {
        if arg == BACKGROUND {
            continue;
        }

        if let Some(target) = arg.strip_prefix('<') {
            stage.stdin_redirect = Some(redirect_target(target, &mut tokens));
        } else if let Some(target) = arg.strip_prefix(">>") {
            stage.stdout_redirect = Some(OutputRedirect {
                path: redirect_target(target, &mut tokens),
                mode: OutputMode::Append,
            });
        } else if let Some(target) = arg.strip_prefix('>') {
            stage.stdout_redirect = Some(OutputRedirect {
                path: redirect_target(target, &mut tokens),
                mode: OutputMode::Truncate,
            });
        } else {
            stage.arguments.push(unquote(arg).to_string());
        }
    }

    stage
}

/// Resolves the target of a redirection operator. An operator written apart from
/// its target (`> out.txt`) takes the following token of the same stage; at the
/// end of a stage the target stays empty.
fn redirect_target<'a>(attached: &str, tokens: &mut impl Iterator<Item = &'a str>) -> String {
    let attached = attached.trim();
    if !attached.is_empty() {
        return unquote(attached).trim().to_string();
    }
    tokens
        .next()
        .map(|token| unquote(token).trim().to_string())
        .unwrap_or_default()
}
