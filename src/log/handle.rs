// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-module logging handles.
//!
//! A handle names one module (its prefix), caches the module's effective
//! level, and owns the carryover buffer for messages that do not end in a
//! newline. Handles are cheap to create and form a naming hierarchy through
//! [`LogHandle::new_child`]; there is no parent link at runtime, children
//! only extend the verbose prefix path.

use std::fmt;
use std::sync::atomic::{AtomicI8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use super::level::{Level, LEVEL_NONE};
use super::root::LogRoot;

pub struct LogHandle {
    /// `None` for the null handle, which swallows everything.
    root: Option<Arc<LogRoot>>,
    /// Short display prefix for terminal lines. `None` on the top-level
    /// handle and on anonymous children.
    prefix: Option<String>,
    /// Full path used for override matching and file/buffer attribution,
    /// e.g. `ipc/session`.
    verbose_prefix: String,
    /// Cached effective level; valid while `seen_generation` matches the
    /// root's reload counter.
    max_level: AtomicI8,
    /// Cached terminal threshold, captured before sink widening.
    term_level: AtomicI8,
    seen_generation: AtomicU64,
    /// Carryover for messages without a trailing newline. Only touched by
    /// the dispatcher, under the root lock.
    pub(crate) partial: Mutex<String>,
}

impl LogHandle {
    pub(crate) fn root(root: &Arc<LogRoot>) -> LogHandle {
        LogHandle {
            root: Some(Arc::clone(root)),
            prefix: None,
            verbose_prefix: "global".to_string(),
            max_level: AtomicI8::new(LEVEL_NONE),
            term_level: AtomicI8::new(LEVEL_NONE),
            seen_generation: AtomicU64::new(0),
            partial: Mutex::new(String::new()),
        }
    }

    /// The always-available handle that accepts and discards everything.
    /// Lets module code log unconditionally before logging is set up.
    pub fn null() -> &'static LogHandle {
        static NULL: OnceLock<LogHandle> = OnceLock::new();
        NULL.get_or_init(|| LogHandle {
            root: None,
            prefix: None,
            verbose_prefix: String::new(),
            max_level: AtomicI8::new(LEVEL_NONE),
            term_level: AtomicI8::new(LEVEL_NONE),
            seen_generation: AtomicU64::new(0),
            partial: Mutex::new(String::new()),
        })
    }

    /// Derive a handle for a submodule. `name` extends the verbose prefix
    /// path; `None` keeps the parent's path and display prefix (an
    /// anonymous alias with its own carryover buffer). A leading `!` hides
    /// the display prefix while keeping the qualified path for verbose and
    /// file output; a leading `/` shows the bare name instead of the
    /// qualified path.
    pub fn new_child(&self, name: Option<&str>) -> LogHandle {
        let Some(root) = &self.root else {
            // Children of the null handle are equally inert.
            return LogHandle {
                root: None,
                prefix: None,
                verbose_prefix: String::new(),
                max_level: AtomicI8::new(LEVEL_NONE),
                term_level: AtomicI8::new(LEVEL_NONE),
                seen_generation: AtomicU64::new(0),
                partial: Mutex::new(String::new()),
            };
        };
        let (prefix, verbose_prefix) = match name {
            Some(name) => {
                let (bare, hidden, unqualified) = if let Some(rest) = name.strip_prefix('!') {
                    (rest, true, false)
                } else if let Some(rest) = name.strip_prefix('/') {
                    (rest, false, true)
                } else {
                    (name, false, false)
                };
                let qualified = match self.prefix.as_deref() {
                    Some(parent) => format!("{parent}/{bare}"),
                    None => bare.to_string(),
                };
                let prefix = if hidden {
                    None
                } else if unqualified {
                    Some(bare.to_string())
                } else {
                    Some(qualified.clone())
                };
                // An empty display prefix is unset, never an empty bracket.
                let prefix = prefix.filter(|p| !p.is_empty());
                let verbose_prefix = if qualified.is_empty() {
                    "global".to_string()
                } else {
                    qualified
                };
                (prefix, verbose_prefix)
            }
            None => (self.prefix.clone(), self.verbose_prefix.clone()),
        };
        LogHandle {
            root: Some(Arc::clone(root)),
            prefix,
            verbose_prefix,
            max_level: AtomicI8::new(LEVEL_NONE),
            term_level: AtomicI8::new(LEVEL_NONE),
            seen_generation: AtomicU64::new(0),
            partial: Mutex::new(String::new()),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn verbose_prefix(&self) -> &str {
        self.verbose_prefix.as_str()
    }

    /// Would a message at `level` be emitted anywhere right now?
    ///
    /// Fast path: two relaxed atomic loads. The root lock is only taken
    /// when the root's reload counter moved since the last refresh. The
    /// check-then-refresh is racy by design: a concurrent reconfigure can
    /// make the answer stale for one message, never wrong for longer.
    #[inline]
    pub fn test(&self, level: Level) -> bool {
        let Some(root) = &self.root else {
            return false;
        };
        let gen = root.generation.load(Ordering::Relaxed);
        if self.seen_generation.load(Ordering::Relaxed) != gen {
            self.refresh(root);
        }
        level.as_i8() <= self.max_level.load(Ordering::Relaxed)
    }

    fn refresh(&self, root: &Arc<LogRoot>) {
        let snap = root.resolve_levels(&self.verbose_prefix);
        self.max_level.store(snap.max, Ordering::Relaxed);
        self.term_level.store(snap.term, Ordering::Relaxed);
        self.seen_generation.store(snap.generation, Ordering::Relaxed);
    }

    pub(crate) fn terminal_level(&self) -> i8 {
        self.term_level.load(Ordering::Relaxed)
    }

    /// Format and dispatch a message. Usually invoked through the
    /// level-named macros rather than directly.
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.test(level) {
            return;
        }
        // test() returned true, so a root exists.
        let Some(root) = &self.root else { return };
        // The carryover buffer is merged in by the dispatcher under the
        // root lock, keeping concurrent emits on one handle ordered.
        root.dispatch(self, level, args.to_string());
    }

    /// Terminate a displayed status line, if any. Call before writing to
    /// the terminal outside of this logging system.
    pub fn flush_status_line(&self) {
        if let Some(root) = &self.root {
            root.flush_status_line();
        }
    }
}

impl fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHandle")
            .field("verbose_prefix", &self.verbose_prefix)
            .field("null", &self.root.is_none())
            .finish()
    }
}
