// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The static command table: every command name the parser accepts, with
//! its typed parameter list and default behavior flags.

use super::types::{ArgType, ArgValue};

/// Default value for an optional parameter, in const-constructible form.
#[derive(Debug, Clone, Copy)]
pub enum DefaultVal {
    Int(i64),
    Double(f64),
    Str(&'static str),
    Flag(bool),
}

impl DefaultVal {
    pub fn to_value(self) -> ArgValue {
        match self {
            DefaultVal::Int(v) => ArgValue::Int(v),
            DefaultVal::Double(v) => ArgValue::Double(v),
            DefaultVal::Str(s) => ArgValue::Str(s.to_string()),
            DefaultVal::Flag(b) => ArgValue::Flag(b),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArgDef {
    pub name: &'static str,
    pub typ: ArgType,
    pub required: bool,
    /// Filled in for omitted optional parameters. Non-vararg optional
    /// parameters always carry one.
    pub default: Option<DefaultVal>,
}

#[derive(Debug, Clone, Copy)]
pub struct CommandDef {
    pub name: &'static str,
    pub args: &'static [ArgDef],
    /// The last parameter may repeat any number of times.
    pub vararg: bool,
    /// Executes without blocking the issuer unless `sync` is forced.
    pub default_async: bool,
    /// May auto-repeat when bound to a held-down key.
    pub allow_auto_repeat: bool,
}

const fn req(name: &'static str, typ: ArgType) -> ArgDef {
    ArgDef { name, typ, required: true, default: None }
}

const fn opt(name: &'static str, typ: ArgType, default: DefaultVal) -> ArgDef {
    ArgDef { name, typ, required: false, default: Some(default) }
}

const fn cmd(name: &'static str, args: &'static [ArgDef]) -> CommandDef {
    CommandDef { name, args, vararg: false, default_async: false, allow_auto_repeat: false }
}

const fn repeatable(name: &'static str, args: &'static [ArgDef]) -> CommandDef {
    CommandDef { name, args, vararg: false, default_async: false, allow_auto_repeat: true }
}

const fn vararg(name: &'static str, args: &'static [ArgDef], default_async: bool) -> CommandDef {
    CommandDef { name, args, vararg: true, default_async, allow_auto_repeat: false }
}

/// Trailing repeated parameter of a vararg command; may occur zero times.
const fn rest(name: &'static str, typ: ArgType) -> ArgDef {
    ArgDef { name, typ, required: false, default: None }
}

pub static COMMANDS: &[CommandDef] = &[
    cmd("ignore", &[]),
    cmd("quit", &[opt("code", ArgType::Int, DefaultVal::Int(0))]),
    cmd("set", &[req("name", ArgType::Str), req("value", ArgType::Str)]),
    cmd("get-property", &[req("name", ArgType::Str)]),
    repeatable(
        "add",
        &[
            req("name", ArgType::Str),
            opt("value", ArgType::Double, DefaultVal::Double(1.0)),
        ],
    ),
    repeatable(
        "cycle",
        &[
            req("name", ArgType::Str),
            opt("direction", ArgType::Choice(&["up", "down"]), DefaultVal::Str("up")),
        ],
    ),
    cmd(
        "multiply",
        &[req("name", ArgType::Str), req("value", ArgType::Double)],
    ),
    cmd("print-text", &[req("text", ArgType::Str)]),
    repeatable(
        "show-text",
        &[
            req("text", ArgType::Str),
            opt("duration", ArgType::Int, DefaultVal::Int(-1)),
            opt("level", ArgType::Int, DefaultVal::Int(0)),
        ],
    ),
    repeatable("show-progress", &[]),
    vararg("run", &[req("command", ArgType::Str)], true),
    vararg("script-message", &[rest("args", ArgType::Str)], false),
    vararg(
        "script-message-to",
        &[req("target", ArgType::Str), rest("args", ArgType::Str)],
        false,
    ),
    cmd("keypress", &[req("name", ArgType::Str)]),
    cmd(
        "enable-section",
        &[
            req("name", ArgType::Str),
            opt(
                "flags",
                ArgType::Choice(&["default", "exclusive", "allow-hide-cursor", "allow-vo-dragging"]),
                DefaultVal::Str("default"),
            ),
        ],
    ),
    cmd("disable-section", &[req("name", ArgType::Str)]),
    cmd(
        "define-section",
        &[
            req("name", ArgType::Str),
            req("contents", ArgType::Str),
            opt("flags", ArgType::Choice(&["default", "force"]), DefaultVal::Str("default")),
        ],
    ),
    cmd("write-watch-later-config", &[]),
    cmd(
        "load-config",
        &[
            req("path", ArgType::Str),
            opt("mode", ArgType::Choice(&["merge", "replace"]), DefaultVal::Str("merge")),
        ],
    ),
    cmd("set-option", &[req("name", ArgType::Str), req("value", ArgType::Node)]),
];

/// Look up a command definition. Underscores are aliases for hyphens, so
/// `show_text` finds `show-text`.
pub fn lookup(name: &str) -> Option<&'static CommandDef> {
    let find = |n: &str| COMMANDS.iter().find(|c| c.name == n);
    if let Some(def) = find(name) {
        return Some(def);
    }
    if name.contains('_') {
        return find(&name.replace('_', "-"));
    }
    None
}
