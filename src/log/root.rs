// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Process-wide logging root: shared configuration, output files, buffer
//! sinks and the message dispatcher.
//!
//! All slow-path state lives behind one mutex. Handles cache their effective
//! level in atomics and only take the mutex when the root's reload counter
//! tells them their cache is stale, so the `is enabled?` test stays
//! lock-free in the common case.

use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use anyhow::Context;
use chrono::Local;

use super::buffer::{BufferFilter, LogBuffer};
use super::handle::LogHandle;
use super::level::{self, Level, LEVEL_MAX, LEVEL_NONE};
use crate::config::LogConfig;

pub struct LogRoot {
    pub(crate) state: Mutex<RootState>,
    /// Reload counter. Bumped on every configuration change; handles compare
    /// it against their cached snapshot before trusting their level cache.
    /// Starts at 1 so a fresh handle (cached 0) always recomputes first.
    pub(crate) generation: AtomicU64,
    /// Time base for log file and stats timestamps.
    start: Instant,
}

pub(crate) struct RootState {
    verbosity: i32,
    quiet: bool,
    module_names: bool,
    show_time: bool,
    use_terminal: bool,
    color: bool,
    /// stderr is a terminal, so the status line can use control sequences.
    term_status: bool,
    force_stderr: bool,
    /// (pattern, threshold) pairs. Last match wins.
    overrides: Vec<(String, i8)>,
    log_file: Option<(PathBuf, File)>,
    stats_file: Option<(PathBuf, File)>,
    buffers: Vec<Arc<LogBuffer>>,
    /// Rows occupied by the currently displayed status block.
    status_lines: usize,
    /// High-water mark of status block height, for bottom-anchoring.
    blank_lines: usize,
}

/// Planned change to one file sink, computed outside the state lock.
enum SinkUpdate {
    Keep,
    Close,
    Open(PathBuf, File),
}

impl LogRoot {
    /// Create the root and its top-level handle. The handle covers messages
    /// that belong to no specific module; children are split off it with
    /// [`LogHandle::new_child`].
    pub fn new() -> (Arc<LogRoot>, LogHandle) {
        let root = Arc::new(LogRoot {
            state: Mutex::new(RootState {
                verbosity: 0,
                quiet: false,
                module_names: false,
                show_time: false,
                use_terminal: true,
                color: io::stdout().is_terminal(),
                term_status: io::stderr().is_terminal(),
                force_stderr: false,
                overrides: Vec::new(),
                log_file: None,
                stats_file: None,
                buffers: Vec::new(),
                status_lines: 0,
                blank_lines: 0,
            }),
            generation: AtomicU64::new(1),
            start: Instant::now(),
        });
        let handle = LogHandle::root(&root);
        (root, handle)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RootState> {
        self.state.lock().unwrap()
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Apply a configuration snapshot. Level-affecting fields always take
    /// effect; file sinks are reopened only when their path changed. An
    /// unopenable file or a bad level name is reported through `log` and
    /// skipped, it does not fail the rest of the reconfiguration.
    pub fn reconfigure(self: &Arc<Self>, cfg: &LogConfig, log: &LogHandle) {
        let mut overrides = Vec::with_capacity(cfg.msg_levels.len());
        let mut errors: Vec<anyhow::Error> = Vec::new();
        for (pattern, name) in &cfg.msg_levels {
            match Level::threshold_from_str(name) {
                Some(t) => overrides.push((pattern.clone(), t)),
                None => errors.push(anyhow::anyhow!(
                    "invalid message level '{name}' for module '{pattern}'"
                )),
            }
        }

        // Current sink paths are read first so files can be opened outside
        // the lock; only the swap below is locked.
        let (cur_log, cur_stats) = {
            let state = self.lock();
            (
                state.log_file.as_ref().map(|(p, _)| p.clone()),
                state.stats_file.as_ref().map(|(p, _)| p.clone()),
            )
        };
        let log_update = plan_sink(cur_log.as_ref(), cfg.log_file.as_ref(), &mut errors);
        let stats_update = plan_sink(cur_stats.as_ref(), cfg.stats_file.as_ref(), &mut errors);

        {
            let mut state = self.lock();
            state.verbosity = cfg.verbosity;
            state.quiet = cfg.quiet;
            state.module_names = cfg.module_names;
            state.show_time = cfg.show_time;
            state.use_terminal = cfg.use_terminal;
            if cfg.use_terminal {
                state.color = cfg.color && io::stdout().is_terminal();
                state.term_status = io::stderr().is_terminal();
            }
            state.overrides = overrides;
            match log_update {
                SinkUpdate::Keep => {}
                SinkUpdate::Close => state.log_file = None,
                SinkUpdate::Open(p, f) => state.log_file = Some((p, f)),
            }
            match stats_update {
                SinkUpdate::Keep => {}
                SinkUpdate::Close => state.stats_file = None,
                SinkUpdate::Open(p, f) => state.stats_file = Some((p, f)),
            }
        }
        self.bump_generation();

        for e in errors {
            crate::log_error!(log, "{e:#}");
        }
    }

    /// Route even non-error output to stderr. Used when stdout carries
    /// machine-readable payload.
    pub fn set_force_stderr(&self, force: bool) {
        self.lock().force_stderr = force;
        self.bump_generation();
    }

    pub fn has_log_file(&self) -> bool {
        self.lock().log_file.is_some()
    }

    /// True while a status block is being displayed on the terminal.
    pub fn has_status_line(&self) -> bool {
        self.lock().status_lines > 0
    }

    /// Terminate a displayed status line with a newline so subsequent
    /// direct terminal output does not overwrite it.
    pub fn flush_status_line(&self) {
        self.lock().flush_status_locked();
    }

    /// Register a buffer sink. Widens effective levels on the next test.
    pub fn register_buffer(
        self: &Arc<Self>,
        capacity: usize,
        filter: BufferFilter,
        wakeup: Option<Box<dyn Fn() + Send + Sync>>,
    ) -> Arc<LogBuffer> {
        let buffer = Arc::new(LogBuffer::new(capacity, filter, wakeup));
        self.lock().buffers.push(Arc::clone(&buffer));
        self.bump_generation();
        buffer
    }

    /// Remove a buffer sink and drain anything still queued.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is not registered with this root; that is a
    /// use-after-unregister bug in the caller.
    pub fn unregister_buffer(self: &Arc<Self>, buffer: &Arc<LogBuffer>) {
        {
            let mut state = self.lock();
            let idx = state
                .buffers
                .iter()
                .position(|b| Arc::ptr_eq(b, buffer))
                .expect("unregistering a log buffer that is not registered");
            state.buffers.remove(idx);
        }
        self.bump_generation();
        buffer.clear();
    }

    /// Compute the (overall, terminal) thresholds for one module prefix
    /// under the current configuration. Called by handles on a stale cache.
    pub(crate) fn resolve_levels(&self, verbose_prefix: &str) -> LevelSnapshot {
        let state = self.lock();
        let mut lev = (Level::Status.as_i8() as i32 + state.verbosity)
            .clamp(LEVEL_NONE as i32, Level::Trace.as_i8() as i32) as i8;
        if state.quiet {
            lev = lev.min(Level::Warn.as_i8());
        }
        for (pattern, threshold) in &state.overrides {
            if pattern_matches(pattern, verbose_prefix) {
                lev = *threshold;
            }
        }
        // The terminal threshold is fixed before sinks widen the overall
        // level, so sinks never cause extra terminal output.
        let term = lev;
        let mut max = lev;
        for buffer in &state.buffers {
            max = max.max(buffer.threshold(term));
        }
        if state.log_file.is_some() {
            max = max.max(Level::Debug.as_i8());
        }
        if state.stats_file.is_some() {
            max = max.max(LEVEL_MAX);
        }
        // Pair the cache with the counter value current while the lock is
        // held, so a concurrent reconfigure forces another refresh.
        let generation = self.generation.load(Ordering::Relaxed);
        LevelSnapshot { max, term, generation }
    }

    /// Dispatch one formatted message. The handle's partial-line carryover
    /// is prepended here, under the root lock, so two threads sharing a
    /// handle cannot interleave a complete line between a fragment and its
    /// continuation.
    pub(crate) fn dispatch(&self, handle: &LogHandle, level: Level, text: String) {
        let mut state = self.lock();

        let mut text = {
            let mut partial = handle.partial.lock().unwrap();
            if partial.is_empty() {
                text
            } else {
                let mut merged = std::mem::take(&mut *partial);
                merged.push_str(&text);
                merged
            }
        };

        if level == Level::Stats {
            if let Some((_, file)) = &mut state.stats_file {
                let us = self.start.elapsed().as_micros() as u64;
                let _ = writeln!(file, "{us} {}", text.trim_end_matches('\n'));
                let _ = file.flush();
            }
            // Buffers that opted into stats get the line as well.
            state.write_sinks(self, handle, level, &text);
            return;
        }

        let term_level = handle.terminal_level();
        let to_term = state.use_terminal && term_level >= level.as_i8();

        if level == Level::Status {
            // A status update nobody would see is dropped wholesale, so the
            // terminal is not cleared and redrawn for nothing.
            if to_term {
                state.dispatch_status(handle, &text);
                let body = text.strip_suffix('\n').unwrap_or(&text);
                for row in body.split('\n') {
                    state.write_sinks(self, handle, level, &format!("{row}\n"));
                }
            }
            return;
        }

        while let Some(pos) = text.find('\n') {
            let line: String = text.drain(..=pos).collect();
            if to_term {
                // Scroll a displayed status block out of the way instead of
                // overwriting it.
                state.flush_status_locked();
                state.write_term(level, &format!("{}\n", state.render_line(handle, level, &line)));
            }
            state.write_sinks(self, handle, level, &line);
        }
        if !text.is_empty() {
            *handle.partial.lock().unwrap() = text;
        }
    }
}

impl RootState {
    /// Render and display a whole status block, replacing the previous one.
    /// Status text is never carried over between calls.
    fn dispatch_status(&mut self, handle: &LogHandle, text: &str) {
        let body = text.strip_suffix('\n').unwrap_or(text);
        let rows: Vec<&str> = body.split('\n').collect();

        if self.term_status {
            self.prepare_status_locked(rows.len());
            let mut out = String::new();
            for (i, row) in rows.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                out.push_str(&self.render_line(handle, Level::Status, row));
                out.push_str("\x1b[K");
            }
            out.push('\r');
            self.write_term(Level::Status, &out);
        } else {
            // Dumb terminal or a pipe: plain newline-terminated output.
            let mut out = String::new();
            for row in &rows {
                out.push_str(&self.render_line(handle, Level::Status, row));
                out.push('\n');
            }
            self.write_term(Level::Status, &out);
        }
    }

    /// Fan one complete, newline-terminated line out to the log file and
    /// all accepting buffer sinks.
    fn write_sinks(&mut self, root: &LogRoot, handle: &LogHandle, level: Level, line: &str) {
        if level.as_i8() <= Level::Debug.as_i8() {
            let secs = root.start.elapsed().as_secs_f64();
            let tag = level.file_tag();
            let prefix = handle.verbose_prefix();
            if let Some((_, file)) = &mut self.log_file {
                let _ = write!(file, "[{secs:8.3}][{tag}][{prefix}] {line}");
            }
        }
        // Each terminal-tracking buffer filters at the emitting handle's
        // own terminal threshold, so module overrides stay per module.
        let term_level = handle.terminal_level();
        for buffer in &self.buffers {
            if buffer.accepts(level, term_level) {
                buffer.dispatch(handle.verbose_prefix(), level, line);
            }
        }
    }

    /// Render one line for the terminal: timestamp, prefix, colors. No
    /// terminator.
    fn render_line(&self, handle: &LogHandle, level: Level, line: &str) -> String {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let mut out = String::with_capacity(line.len() + 32);

        if self.show_time && level != Level::Status {
            out.push_str(&format!("[{}] ", Local::now().format("%H:%M:%S%.3f")));
        }

        if level >= Level::Verbose || self.module_names {
            let name = handle.verbose_prefix();
            if self.color {
                out.push_str(level::prefix_color(name));
            }
            out.push_str(&format!("[{name:>16}] "));
            if self.color {
                out.push_str(level::TERM_RESET);
            }
        } else if let Some(prefix) = handle.prefix() {
            out.push_str(&format!("[{prefix}] "));
        }

        let color = if self.color { level.term_color() } else { None };
        if let Some(c) = color {
            out.push_str(c);
            out.push_str(line);
            out.push_str(level::TERM_RESET);
        } else {
            out.push_str(line);
        }
        out
    }

    /// Write already-rendered terminal output to the right stream.
    fn write_term(&self, level: Level, rendered: &str) {
        if self.force_stderr || level == Level::Status {
            let _ = io::stderr().write_all(rendered.as_bytes());
            let _ = io::stderr().flush();
        } else {
            let _ = io::stdout().write_all(rendered.as_bytes());
            let _ = io::stdout().flush();
        }
    }

    /// Clear the previous status block and reserve room for the new one so
    /// the block stays anchored to the bottom of the terminal.
    fn prepare_status_locked(&mut self, new_lines: usize) {
        let old_lines = self.status_lines;
        if new_lines == 0 && old_lines == 0 {
            return;
        }
        let clear = new_lines.max(old_lines);
        let mut seq = String::from("\r\x1b[K");
        for _ in 1..clear.min(old_lines.max(1)) {
            seq.push_str("\x1b[A\r\x1b[K");
        }
        // Reserve rows when the new block is shorter than the tallest one
        // seen, keeping it bottom-anchored.
        for _ in new_lines..self.blank_lines.min(clear) {
            seq.push('\n');
        }
        let _ = io::stderr().write_all(seq.as_bytes());
        self.status_lines = new_lines;
        self.blank_lines = self.blank_lines.max(new_lines);
    }

    fn flush_status_locked(&mut self) {
        if self.status_lines > 0 {
            let _ = io::stderr().write_all(b"\n");
            let _ = io::stderr().flush();
        }
        self.status_lines = 0;
        self.blank_lines = 0;
    }
}

/// Decide what to do with a file sink given its current and wanted paths.
/// Open failures land in `errors` and leave the sink closed.
fn plan_sink(
    current: Option<&PathBuf>,
    want: Option<&PathBuf>,
    errors: &mut Vec<anyhow::Error>,
) -> SinkUpdate {
    if current == want {
        return SinkUpdate::Keep;
    }
    let Some(path) = want else {
        return SinkUpdate::Close;
    };
    let opened = File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("can't open log file {}", path.display()));
    match opened {
        Ok(file) => SinkUpdate::Open(path.clone(), file),
        Err(e) => {
            errors.push(e);
            SinkUpdate::Close
        }
    }
}

/// `pattern` selects `name` when it is `"all"`, equals the name, or is a
/// path prefix of it ending at a `/` boundary.
fn pattern_matches(pattern: &str, name: &str) -> bool {
    if pattern == "all" || pattern == name {
        return true;
    }
    name.strip_prefix(pattern)
        .is_some_and(|rest| rest.starts_with('/'))
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LevelSnapshot {
    pub max: i8,
    pub term: i8,
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matching_boundaries() {
        assert!(pattern_matches("all", "anything"));
        assert!(pattern_matches("ipc", "ipc"));
        assert!(pattern_matches("ipc", "ipc/session"));
        assert!(!pattern_matches("ipc", "ipcx"));
        assert!(!pattern_matches("ipc/session", "ipc"));
    }

    #[test]
    fn defaults_resolve_to_status() {
        let (root, _log) = LogRoot::new();
        let snap = root.resolve_levels("mod");
        assert_eq!(snap.max, Level::Status.as_i8());
        assert_eq!(snap.term, Level::Status.as_i8());
    }

    #[test]
    fn quiet_clamps_and_verbosity_raises() {
        let (root, log) = LogRoot::new();
        let mut cfg = LogConfig::default();
        cfg.verbosity = 2;
        root.reconfigure(&cfg, &log);
        assert_eq!(root.resolve_levels("mod").max, Level::Debug.as_i8());

        cfg.quiet = true;
        root.reconfigure(&cfg, &log);
        assert_eq!(root.resolve_levels("mod").max, Level::Warn.as_i8());
    }

    #[test]
    fn verbosity_clamps_at_trace() {
        let (root, log) = LogRoot::new();
        let mut cfg = LogConfig::default();
        cfg.verbosity = 100;
        root.reconfigure(&cfg, &log);
        assert_eq!(root.resolve_levels("mod").max, Level::Trace.as_i8());
    }

    #[test]
    fn last_matching_override_wins() {
        let (root, log) = LogRoot::new();
        let mut cfg = LogConfig::default();
        cfg.msg_levels = vec![
            ("all".into(), "none".into()),
            ("ipc".into(), "debug".into()),
            ("ipc/session".into(), "error".into()),
        ];
        root.reconfigure(&cfg, &log);
        assert_eq!(root.resolve_levels("other").max, LEVEL_NONE);
        assert_eq!(root.resolve_levels("ipc").max, Level::Debug.as_i8());
        assert_eq!(root.resolve_levels("ipc/parse").max, Level::Debug.as_i8());
        assert_eq!(root.resolve_levels("ipc/session").max, Level::Error.as_i8());
    }

    #[test]
    fn buffer_widens_but_terminal_threshold_stays() {
        let (root, log) = LogRoot::new();
        let mut cfg = LogConfig::default();
        cfg.msg_levels = vec![("all".into(), "error".into())];
        root.reconfigure(&cfg, &log);
        let buffer = root.register_buffer(16, BufferFilter::AtMost(Level::Trace), None);
        let snap = root.resolve_levels("mod");
        assert_eq!(snap.max, Level::Trace.as_i8());
        assert_eq!(snap.term, Level::Error.as_i8());
        root.unregister_buffer(&buffer);
        assert_eq!(root.resolve_levels("mod").max, Level::Error.as_i8());
    }

    #[test]
    fn bad_level_names_are_skipped_not_fatal() {
        let (root, log) = LogRoot::new();
        let mut cfg = LogConfig::default();
        cfg.msg_levels = vec![
            ("ipc".into(), "extremely-loud".into()),
            ("all".into(), "error".into()),
        ];
        root.reconfigure(&cfg, &log);
        // The valid entry still applies.
        assert_eq!(root.resolve_levels("ipc").max, Level::Error.as_i8());
    }

    #[test]
    fn reconfigure_bumps_generation() {
        let (root, log) = LogRoot::new();
        let before = root.generation.load(Ordering::Relaxed);
        root.reconfigure(&LogConfig::default(), &log);
        assert!(root.generation.load(Ordering::Relaxed) > before);
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn unregister_foreign_buffer_panics() {
        let (root, _log) = LogRoot::new();
        let foreign = Arc::new(LogBuffer::new(4, BufferFilter::TrackTerminal, None));
        root.unregister_buffer(&foreign);
    }
}
