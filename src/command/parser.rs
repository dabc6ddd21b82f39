// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command parsing: free text, pre-split string arrays, and structured
//! JSON nodes all produce the same typed [`Command`].
//!
//! Free-text syntax: optional flag prefixes, a command name, then
//! positional arguments as tokens. Tokens may be bare, double-quoted with
//! escapes, single-quoted literals, `[bracket balanced]`, `%N%`-prefixed
//! counted text, or custom-quoted with a backtick plus any delimiter
//! character. `;` chains commands, and a trailing `#comment` (but not
//! `##...`) is captured as a description.

use thiserror::Error;

use super::table::{self, CommandDef};
use super::types::{flags, ArgValue};
use crate::log::LogHandle;

/// One parsed, typed, executable command.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub args: Vec<ArgValue>,
    pub flags: u32,
    /// The unparsed source text, kept for diagnostics.
    pub original: Option<String>,
    /// Trailing `#comment` text, if any.
    pub desc: Option<String>,
    /// Sub-commands of a `;` chain. Empty for plain commands.
    pub subs: Vec<Command>,
}

impl Command {
    /// Name of the wrapper command holding a `;` chain.
    pub const LIST: &'static str = "command-list";

    pub fn is_list(&self) -> bool {
        self.name == Self::LIST
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no command given")]
    Empty,
    #[error("command '{0}' not found")]
    UnknownCommand(String),
    #[error("command '{cmd}': argument {index} ({name}): {reason}")]
    BadArgument {
        cmd: &'static str,
        index: usize,
        name: &'static str,
        reason: String,
    },
    #[error("command '{0}': missing required argument '{1}'")]
    MissingArgument(&'static str, &'static str),
    #[error("command '{0}' takes at most {1} arguments")]
    TooManyArguments(&'static str, usize),
    #[error("command '{0}': unknown named argument '{1}'")]
    UnknownNamedArgument(&'static str, String),
    #[error("command '{0}' does not accept named arguments")]
    NoNamedArguments(&'static str),
    #[error("unterminated {0}")]
    Unterminated(&'static str),
    #[error("invalid escape sequence '\\{0}'")]
    BadEscape(char),
    #[error("counted token: {0}")]
    BadCountedToken(String),
    #[error("extra text after command: '{0}'")]
    TrailingText(String),
    #[error("expected {0}, got {1}")]
    BadNode(&'static str, String),
}

/// Parse a free-text command line. Failures are reported as a single
/// error-level message on `log`, attributed to `location`.
pub fn parse_str(log: &LogHandle, input: &str, location: &str) -> Result<Command, ParseError> {
    parse_str_inner(input).map_err(|e| {
        crate::log_error!(log, "{location}: command parse error: {e}\n");
        e
    })
}

/// Parse a command from pre-split words, e.g. an argv tail. No quoting,
/// separators or comments apply; each word is one token.
pub fn parse_strv(log: &LogHandle, words: &[&str]) -> Result<Command, ParseError> {
    parse_strv_inner(words).map_err(|e| {
        crate::log_error!(log, "command parse error: {e}\n");
        e
    })
}

/// Parse a structured command node: a string (reparsed as free text), an
/// array (name and positional arguments), or an object (named arguments
/// bound to declared parameter names).
pub fn parse_node(log: &LogHandle, node: &serde_json::Value) -> Result<Command, ParseError> {
    parse_node_inner(node).map_err(|e| {
        crate::log_error!(log, "command parse error: {e}\n");
        e
    })
}

fn parse_str_inner(input: &str) -> Result<Command, ParseError> {
    let mut scan = Scanner::new(input);
    let mut cmds = Vec::new();
    let mut desc = None;
    loop {
        cmds.push(parse_one(&mut scan)?);
        match scan.next()? {
            Tok::End => break,
            Tok::Separator => {
                // Allow a trailing separator or a comment after it.
                match scan.peek()? {
                    Tok::End => break,
                    Tok::Comment(c) => {
                        desc = Some(c);
                        break;
                    }
                    _ => continue,
                }
            }
            Tok::Comment(c) => {
                desc = Some(c);
                break;
            }
            Tok::Text(t) => return Err(ParseError::TrailingText(t)),
        }
    }

    let mut cmd = if cmds.len() == 1 {
        cmds.pop().expect("one element")
    } else {
        Command {
            name: Command::LIST.to_string(),
            args: Vec::new(),
            flags: cmds[0].flags,
            original: None,
            desc: None,
            subs: cmds,
        }
    };
    cmd.original = Some(input.trim().to_string());
    cmd.desc = desc.map(|d| d.trim().to_string());
    Ok(cmd)
}

fn parse_strv_inner(words: &[&str]) -> Result<Command, ParseError> {
    let mut flags = flags::DEFAULT;
    let mut iter = words.iter();
    let name = loop {
        match iter.next() {
            None => return Err(ParseError::Empty),
            Some(w) => {
                if !flags::apply_prefix(&mut flags, w) {
                    break *w;
                }
            }
        }
    };
    let def = lookup(name)?;
    let mut args = Vec::new();
    for w in iter {
        let slot = arg_slot(def, args.len())?;
        let value = slot
            .typ
            .parse(w)
            .map_err(|reason| bad_arg(def, args.len(), reason))?;
        args.push(value);
    }
    finish(def, flags, args)
}

fn parse_node_inner(node: &serde_json::Value) -> Result<Command, ParseError> {
    use serde_json::Value;
    match node {
        Value::String(s) => parse_str_inner(s),
        Value::Array(items) => {
            let mut flags = flags::DEFAULT;
            let mut iter = items.iter();
            let name = loop {
                match iter.next() {
                    None => return Err(ParseError::Empty),
                    Some(Value::String(s)) => {
                        if !flags::apply_prefix(&mut flags, s) {
                            break s.as_str();
                        }
                    }
                    Some(other) => {
                        return Err(ParseError::BadNode("command name string", other.to_string()))
                    }
                }
            };
            let def = lookup(name)?;
            let mut args = Vec::new();
            for item in iter {
                let slot = arg_slot(def, args.len())?;
                let value = slot
                    .typ
                    .coerce(item)
                    .map_err(|reason| bad_arg(def, args.len(), reason))?;
                args.push(value);
            }
            finish(def, flags, args)
        }
        Value::Object(map) => {
            let name = map
                .get("name")
                .and_then(Value::as_str)
                .ok_or(ParseError::BadNode("a 'name' string field", node.to_string()))?;
            let def = lookup(name)?;
            if def.vararg {
                return Err(ParseError::NoNamedArguments(def.name));
            }
            let mut flags = flags::DEFAULT;
            if let Some(list) = map.get("_flags") {
                let items = list
                    .as_array()
                    .ok_or_else(|| ParseError::BadNode("a '_flags' array", list.to_string()))?;
                for item in items {
                    let s = item
                        .as_str()
                        .ok_or_else(|| ParseError::BadNode("a flag name string", item.to_string()))?;
                    if !flags::apply_prefix(&mut flags, s) {
                        return Err(ParseError::BadNode("a known flag name", s.to_string()));
                    }
                }
            }
            let mut args: Vec<Option<ArgValue>> = vec![None; def.args.len()];
            for (key, value) in map {
                if key == "name" || key == "_flags" {
                    continue;
                }
                let idx = def
                    .args
                    .iter()
                    .position(|a| a.name == key)
                    .ok_or_else(|| ParseError::UnknownNamedArgument(def.name, key.clone()))?;
                let bound = def.args[idx]
                    .typ
                    .coerce(value)
                    .map_err(|reason| bad_arg(def, idx, reason))?;
                args[idx] = Some(bound);
            }
            let mut out = Vec::with_capacity(args.len());
            for (idx, slot) in args.into_iter().enumerate() {
                match slot {
                    Some(v) => out.push(v),
                    // Let finish() fill defaults or report the gap, but only
                    // trailing gaps can be represented positionally.
                    None => {
                        for later in &def.args[idx..] {
                            if later.required {
                                return Err(ParseError::MissingArgument(def.name, later.name));
                            }
                        }
                        break;
                    }
                }
            }
            finish(def, flags, out)
        }
        other => Err(ParseError::BadNode(
            "a string, array or object",
            other.to_string(),
        )),
    }
}

fn lookup(name: &str) -> Result<&'static CommandDef, ParseError> {
    table::lookup(name).ok_or_else(|| ParseError::UnknownCommand(name.to_string()))
}

fn arg_slot(def: &'static CommandDef, index: usize) -> Result<&'static table::ArgDef, ParseError> {
    if index < def.args.len() {
        return Ok(&def.args[index]);
    }
    if def.vararg {
        // The last declared parameter repeats.
        return def
            .args
            .last()
            .ok_or(ParseError::TooManyArguments(def.name, 0));
    }
    Err(ParseError::TooManyArguments(def.name, def.args.len()))
}

fn bad_arg(def: &'static CommandDef, index: usize, reason: String) -> ParseError {
    let name = def.args[index.min(def.args.len() - 1)].name;
    ParseError::BadArgument { cmd: def.name, index: index + 1, name, reason }
}

/// Common tail of all three entry points: fill defaults, check required
/// parameters, resolve behavior flags from the definition.
fn finish(def: &'static CommandDef, mut flags: u32, mut args: Vec<ArgValue>) -> Result<Command, ParseError> {
    for slot in def.args.iter().skip(args.len()) {
        match slot.default {
            Some(d) => args.push(d.to_value()),
            None if slot.required => {
                return Err(ParseError::MissingArgument(def.name, slot.name))
            }
            // Optional vararg tail: zero occurrences is fine.
            None => {}
        }
    }
    if flags & (flags::ASYNC | flags::SYNC) == 0 && def.default_async {
        flags |= flags::ASYNC;
    }
    if def.allow_auto_repeat {
        flags |= flags::ALLOW_REPEAT;
    }
    Ok(Command {
        name: def.name.to_string(),
        args,
        flags,
        original: None,
        desc: None,
        subs: Vec::new(),
    })
}

/// Parse flag prefixes, name and positional arguments of one command,
/// stopping before `;`, `#` or end of input.
fn parse_one(scan: &mut Scanner<'_>) -> Result<Command, ParseError> {
    let mut flags = flags::DEFAULT;
    let name = loop {
        match scan.next()? {
            Tok::Text(t) => {
                if !flags::apply_prefix(&mut flags, &t) {
                    break t;
                }
            }
            _ => return Err(ParseError::Empty),
        }
    };
    let def = lookup(&name)?;
    let mut args = Vec::new();
    loop {
        let mark = scan.mark();
        match scan.next()? {
            Tok::Text(t) => {
                let slot = arg_slot(def, args.len())?;
                let value = slot
                    .typ
                    .parse(&t)
                    .map_err(|reason| bad_arg(def, args.len(), reason))?;
                args.push(value);
            }
            _ => {
                scan.rewind(mark);
                break;
            }
        }
    }
    finish(def, flags, args)
}

#[derive(Debug, PartialEq)]
enum Tok {
    Text(String),
    Separator,
    Comment(String),
    End,
}

struct Scanner<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(s: &'a str) -> Self {
        Scanner { s, pos: 0 }
    }

    fn mark(&self) -> usize {
        self.pos
    }

    fn rewind(&mut self, mark: usize) {
        self.pos = mark;
    }

    fn peek(&mut self) -> Result<Tok, ParseError> {
        let mark = self.pos;
        let tok = self.next()?;
        self.pos = mark;
        Ok(tok)
    }

    fn rest(&self) -> &'a str {
        &self.s[self.pos..]
    }

    fn bump(&mut self, n: usize) {
        self.pos += n;
    }

    fn next(&mut self) -> Result<Tok, ParseError> {
        while self.rest().starts_with([' ', '\t', '\r', '\n']) {
            self.bump(1);
        }
        let rest = self.rest();
        let Some(first) = rest.chars().next() else {
            return Ok(Tok::End);
        };
        match first {
            ';' => {
                self.bump(1);
                Ok(Tok::Separator)
            }
            '#' if !rest.starts_with("##") => {
                // Comment runs to the end of the input line.
                self.pos = self.s.len();
                Ok(Tok::Comment(rest[1..].to_string()))
            }
            '"' => self.quoted(),
            '\'' => self.single_quoted(),
            '[' => self.bracketed(),
            '%' => self.counted(),
            '`' => self.custom_quoted(),
            _ => Ok(self.bare()),
        }
    }

    /// Double-quoted token with backslash escapes.
    fn quoted(&mut self) -> Result<Tok, ParseError> {
        self.bump(1);
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.bump(i + 1);
                    return Ok(Tok::Text(out));
                }
                '\\' => {
                    let Some((_, esc)) = chars.next() else { break };
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'e' => out.push('\x1b'),
                        '"' | '\'' | '\\' => out.push(esc),
                        'x' => {
                            let hex: String = chars.by_ref().take(2).map(|(_, c)| c).collect();
                            let code = u8::from_str_radix(&hex, 16)
                                .map_err(|_| ParseError::BadEscape('x'))?;
                            out.push(code as char);
                        }
                        other => return Err(ParseError::BadEscape(other)),
                    }
                }
                _ => out.push(c),
            }
        }
        Err(ParseError::Unterminated("double-quoted token"))
    }

    /// Single-quoted token: everything literal until the closing quote.
    fn single_quoted(&mut self) -> Result<Tok, ParseError> {
        self.bump(1);
        match self.rest().find('\'') {
            Some(end) => {
                let text = self.rest()[..end].to_string();
                self.bump(end + 1);
                Ok(Tok::Text(text))
            }
            None => Err(ParseError::Unterminated("single-quoted token")),
        }
    }

    /// `[...]` token: text between balanced brackets, nesting preserved.
    fn bracketed(&mut self) -> Result<Tok, ParseError> {
        self.bump(1);
        let mut depth = 1usize;
        for (i, c) in self.rest().char_indices() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        let text = self.rest()[..i].to_string();
                        self.bump(i + 1);
                        return Ok(Tok::Text(text));
                    }
                }
                _ => {}
            }
        }
        Err(ParseError::Unterminated("bracketed token"))
    }

    /// `%N%text` token: exactly N bytes of text, uninterpreted.
    fn counted(&mut self) -> Result<Tok, ParseError> {
        self.bump(1);
        let digits = self.rest().find(|c: char| !c.is_ascii_digit()).unwrap_or(self.rest().len());
        if digits == 0 || !self.rest()[digits..].starts_with('%') {
            return Err(ParseError::BadCountedToken(
                "expected %<byte count>%".to_string(),
            ));
        }
        let n: usize = self.rest()[..digits]
            .parse()
            .map_err(|_| ParseError::BadCountedToken("length does not fit".to_string()))?;
        self.bump(digits + 1);
        let body = self.rest();
        if body.len() < n {
            return Err(ParseError::BadCountedToken(format!(
                "{n} bytes requested, {} available",
                body.len()
            )));
        }
        let Some(text) = body.get(..n) else {
            return Err(ParseError::BadCountedToken(
                "length splits a UTF-8 sequence".to_string(),
            ));
        };
        let text = text.to_string();
        self.bump(n);
        Ok(Tok::Text(text))
    }

    /// Backtick custom quote: the character after the backtick delimits the
    /// token, so any quoting character not in the payload can be picked.
    fn custom_quoted(&mut self) -> Result<Tok, ParseError> {
        self.bump(1);
        let mut chars = self.rest().char_indices();
        let Some((_, delim)) = chars.next() else {
            return Err(ParseError::Unterminated("custom-quoted token"));
        };
        let start = delim.len_utf8();
        match self.rest()[start..].find(delim) {
            Some(end) => {
                let text = self.rest()[start..start + end].to_string();
                self.bump(start + end + delim.len_utf8());
                Ok(Tok::Text(text))
            }
            None => Err(ParseError::Unterminated("custom-quoted token")),
        }
    }

    /// Bare token: runs until whitespace or a command separator. `#` only
    /// starts a comment at a token boundary, not inside one.
    fn bare(&mut self) -> Tok {
        let end = self
            .rest()
            .find([' ', '\t', '\r', '\n', ';'])
            .unwrap_or(self.rest().len());
        let text = self.rest()[..end].to_string();
        self.bump(end);
        Tok::Text(text)
    }
}
