// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed command parsing.
//!
//! Commands arrive as free text (key bindings, IPC lines), pre-split word
//! arrays, or structured JSON nodes; all three paths validate against the
//! static [`table::COMMANDS`] table and produce the same [`Command`].

mod parser;
mod table;
mod types;

pub use parser::{parse_node, parse_str, parse_strv, Command, ParseError};
pub use table::{lookup, ArgDef, CommandDef, DefaultVal, COMMANDS};
pub use types::{flags, ArgType, ArgValue};
