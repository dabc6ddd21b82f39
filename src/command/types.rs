// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Argument types and values for commands.
//!
//! Every declared command parameter has an [`ArgType`] that knows how to
//! parse itself from token text, coerce itself from a structured JSON value,
//! and print itself back out. Printing then parsing a value yields the same
//! value.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Int,
    Float,
    Double,
    Str,
    /// Comma-separated list of strings.
    StrList,
    /// Comma-separated `key=value` pairs.
    KeyValList,
    /// One of a fixed set of names.
    Choice(&'static [&'static str]),
    /// Boolean: `yes`/`no` (also `true`/`false` on input).
    Flag,
    /// Arbitrary structured value, passed through as-is.
    Node,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int(i64),
    Float(f32),
    Double(f64),
    Str(String),
    StrList(Vec<String>),
    KeyValList(Vec<(String, String)>),
    Flag(bool),
    Node(Value),
}

impl ArgType {
    pub const fn name(self) -> &'static str {
        match self {
            ArgType::Int => "Integer",
            ArgType::Float => "Float",
            ArgType::Double => "Double",
            ArgType::Str => "String",
            ArgType::StrList => "String list",
            ArgType::KeyValList => "Key/value list",
            ArgType::Choice(_) => "Choice",
            ArgType::Flag => "Flag",
            ArgType::Node => "Node",
        }
    }

    /// Parse token text. The error string describes what was expected.
    pub fn parse(self, s: &str) -> Result<ArgValue, String> {
        match self {
            ArgType::Int => s
                .parse::<i64>()
                .map(ArgValue::Int)
                .map_err(|_| format!("'{s}' is not an integer")),
            ArgType::Float => s
                .parse::<f32>()
                .map(ArgValue::Float)
                .map_err(|_| format!("'{s}' is not a number")),
            ArgType::Double => s
                .parse::<f64>()
                .map(ArgValue::Double)
                .map_err(|_| format!("'{s}' is not a number")),
            ArgType::Str => Ok(ArgValue::Str(s.to_string())),
            ArgType::StrList => Ok(ArgValue::StrList(if s.is_empty() {
                Vec::new()
            } else {
                s.split(',').map(str::to_string).collect()
            })),
            ArgType::KeyValList => {
                let mut pairs = Vec::new();
                for part in s.split(',') {
                    if part.is_empty() {
                        continue;
                    }
                    let (k, v) = part
                        .split_once('=')
                        .ok_or_else(|| format!("'{part}' is missing '='"))?;
                    pairs.push((k.to_string(), v.to_string()));
                }
                Ok(ArgValue::KeyValList(pairs))
            }
            ArgType::Choice(choices) => {
                if choices.contains(&s) {
                    Ok(ArgValue::Str(s.to_string()))
                } else {
                    Err(format!("'{s}' is not one of {}", choices.join("/")))
                }
            }
            ArgType::Flag => match s {
                "yes" | "true" => Ok(ArgValue::Flag(true)),
                "no" | "false" => Ok(ArgValue::Flag(false)),
                _ => Err(format!("'{s}' is not yes/no")),
            },
            ArgType::Node => Ok(ArgValue::Node(Value::String(s.to_string()))),
        }
    }

    /// Bind a structured value directly to this type. Strings fall back to
    /// [`ArgType::parse`], so both `5` and `"5"` satisfy an integer slot.
    pub fn coerce(self, v: &Value) -> Result<ArgValue, String> {
        if self == ArgType::Node {
            return Ok(ArgValue::Node(v.clone()));
        }
        match (self, v) {
            (_, Value::String(s)) => self.parse(s),
            (ArgType::Int, Value::Number(n)) => n
                .as_i64()
                .map(ArgValue::Int)
                .ok_or_else(|| format!("{n} is not an integer")),
            (ArgType::Float, Value::Number(n)) => n
                .as_f64()
                .map(|f| ArgValue::Float(f as f32))
                .ok_or_else(|| format!("{n} is not a number")),
            (ArgType::Double, Value::Number(n)) => n
                .as_f64()
                .map(ArgValue::Double)
                .ok_or_else(|| format!("{n} is not a number")),
            (ArgType::Str, Value::Number(n)) => Ok(ArgValue::Str(n.to_string())),
            (ArgType::Flag, Value::Bool(b)) => Ok(ArgValue::Flag(*b)),
            (ArgType::StrList, Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => out.push(s.clone()),
                        other => return Err(format!("{other} is not a string")),
                    }
                }
                Ok(ArgValue::StrList(out))
            }
            (ArgType::KeyValList, Value::Object(map)) => {
                let mut out = Vec::with_capacity(map.len());
                for (k, v) in map {
                    match v {
                        Value::String(s) => out.push((k.clone(), s.clone())),
                        other => return Err(format!("{other} is not a string")),
                    }
                }
                Ok(ArgValue::KeyValList(out))
            }
            (t, other) => Err(format!("{other} does not fit type {}", t.name())),
        }
    }
}

impl ArgValue {
    /// Print the value back to token text. Inverse of [`ArgType::parse`].
    pub fn print(&self) -> String {
        match self {
            ArgValue::Int(v) => v.to_string(),
            ArgValue::Float(v) => v.to_string(),
            ArgValue::Double(v) => v.to_string(),
            ArgValue::Str(s) => s.clone(),
            ArgValue::StrList(items) => items.join(","),
            ArgValue::KeyValList(pairs) => pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
            ArgValue::Flag(b) => if *b { "yes" } else { "no" }.to_string(),
            ArgValue::Node(v) => v.to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// Command behavior flags, combined into a bitset on each parsed command.
pub mod flags {
    /// Never show feedback on the OSD.
    pub const OSD_NO: u32 = 0x01;
    /// Use the command's default OSD behavior.
    pub const OSD_AUTO: u32 = 0x02;
    /// Show a bar-style OSD if applicable.
    pub const OSD_BAR: u32 = 0x04;
    /// Show a text message OSD if applicable.
    pub const OSD_MSG: u32 = 0x08;
    pub const OSD_MASK: u32 = 0x0f;
    /// Expand property templates in string arguments before execution.
    pub const EXPAND_PROPERTIES: u32 = 0x10;
    /// Command may auto-repeat while a key is held down.
    pub const ALLOW_REPEAT: u32 = 0x20;
    /// Run without blocking the issuer.
    pub const ASYNC: u32 = 0x40;
    /// Wait for completion before replying.
    pub const SYNC: u32 = 0x80;

    pub const DEFAULT: u32 = OSD_AUTO | EXPAND_PROPERTIES;

    /// Apply one prefix token to the flag set. Returns false when the token
    /// is not a known prefix (it is the command name, then).
    pub fn apply_prefix(flags: &mut u32, token: &str) -> bool {
        let set_osd = |flags: &mut u32, v: u32| *flags = (*flags & !OSD_MASK) | v;
        match token {
            "no-osd" => set_osd(flags, OSD_NO),
            "osd-bar" => set_osd(flags, OSD_BAR),
            "osd-msg" => set_osd(flags, OSD_MSG),
            "osd-msg-bar" => set_osd(flags, OSD_BAR | OSD_MSG),
            "osd-auto" => set_osd(flags, OSD_AUTO),
            "expand-properties" => *flags |= EXPAND_PROPERTIES,
            "raw" => *flags &= !EXPAND_PROPERTIES,
            "repeatable" => *flags |= ALLOW_REPEAT,
            "async" => *flags = (*flags & !SYNC) | ASYNC,
            "sync" => *flags = (*flags & !ASYNC) | SYNC,
            _ => return false,
        }
        true
    }
}
