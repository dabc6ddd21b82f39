// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end tests of the logging core through its public API: level
//! resolution, reconfiguration, file sinks and capture buffers.

use logmux::config::LogConfig;
use logmux::log::{BufferFilter, Level, LogRoot, OVERFLOW_PREFIX};
use logmux::{log_debug, log_error, log_info, log_stats, log_status, log_verbose, log_warn};

fn quiet_terminal() -> LogConfig {
    // Tests should not spray stderr.
    LogConfig {
        use_terminal: false,
        color: false,
        ..LogConfig::default()
    }
}

#[test]
fn default_thresholds_match_the_level_table() {
    let (_root, log) = LogRoot::new();
    let h = log.new_child(Some("mod"));
    assert!(h.test(Level::Fatal));
    assert!(h.test(Level::Error));
    assert!(h.test(Level::Warn));
    assert!(h.test(Level::Info));
    assert!(h.test(Level::Status));
    assert!(!h.test(Level::Verbose));
    assert!(!h.test(Level::Debug));
    assert!(!h.test(Level::Trace));
    assert!(!h.test(Level::Stats));
}

#[test]
fn verbosity_shifts_quiet_clamps() {
    let (root, log) = LogRoot::new();
    let h = log.new_child(Some("mod"));

    let mut cfg = quiet_terminal();
    cfg.verbosity = 1;
    root.reconfigure(&cfg, &log);
    assert!(h.test(Level::Verbose));
    assert!(!h.test(Level::Debug));

    cfg.quiet = true;
    root.reconfigure(&cfg, &log);
    assert!(h.test(Level::Warn));
    assert!(!h.test(Level::Info));
}

#[test]
fn override_list_is_ordered_and_path_aware() {
    let (root, log) = LogRoot::new();
    let mut cfg = quiet_terminal();
    cfg.msg_levels = vec![
        ("all".into(), "error".into()),
        ("net".into(), "trace".into()),
        ("net/http".into(), "none".into()),
    ];
    root.reconfigure(&cfg, &log);

    let other = log.new_child(Some("audio"));
    let net = log.new_child(Some("net"));
    let dns = net.new_child(Some("dns"));
    let http = net.new_child(Some("http"));

    assert!(!other.test(Level::Warn));
    assert!(other.test(Level::Error));
    assert!(net.test(Level::Trace));
    assert!(dns.test(Level::Trace), "children inherit via path prefix");
    assert!(!http.test(Level::Fatal), "'none' silences the subtree");
}

#[test]
fn reconfiguration_reaches_existing_handles() {
    let (root, log) = LogRoot::new();
    let h = log.new_child(Some("mod"));
    assert!(!h.test(Level::Debug));

    let mut cfg = quiet_terminal();
    cfg.verbosity = 2;
    root.reconfigure(&cfg, &log);
    assert!(h.test(Level::Debug), "existing handles see new config");

    root.reconfigure(&quiet_terminal(), &log);
    assert!(!h.test(Level::Debug), "and see it again when lowered");
}

#[test]
fn identical_reconfiguration_keeps_open_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");

    let (root, log) = LogRoot::new();
    let mut cfg = quiet_terminal();
    cfg.verbosity = 1;
    cfg.log_file = Some(path.clone());
    root.reconfigure(&cfg, &log);

    let h = log.new_child(Some("mod"));
    assert!(h.test(Level::Debug));
    assert!(!h.test(Level::Trace));

    // An unchanged path keeps the already-open handle. With the file
    // unlinked, a reopen would recreate the path; a kept handle writes to
    // the old inode and the path stays gone.
    std::fs::remove_file(&path).unwrap();
    root.reconfigure(&cfg, &log);
    log_warn!(h, "still going\n");
    assert!(!path.exists(), "unchanged log file path was reopened");
    assert!(h.test(Level::Debug));
    assert!(!h.test(Level::Trace));
}

#[test]
fn log_file_gets_timestamped_tagged_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");

    let (root, log) = LogRoot::new();
    let mut cfg = quiet_terminal();
    cfg.log_file = Some(path.clone());
    root.reconfigure(&cfg, &log);

    let h = log.new_child(Some("engine"));
    log_warn!(h, "spinning down\n");
    log_debug!(h, "details: {}\n", 42);
    // Opening a log file widens the effective level up to debug.
    assert!(h.test(Level::Debug));
    assert!(!h.test(Level::Trace));

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("][w][engine] spinning down"), "{}", lines[0]);
    assert!(lines[1].ends_with("][d][engine] details: 42"), "{}", lines[1]);
    // Each line starts with a bracketed elapsed-seconds timestamp.
    for line in lines {
        assert!(line.starts_with('['), "{line}");
        let ts = &line[1..line.find(']').unwrap()];
        assert!(ts.trim().parse::<f64>().is_ok(), "bad timestamp in {line}");
    }
}

#[test]
fn stats_lines_only_reach_the_stats_file() {
    let dir = tempfile::tempdir().unwrap();
    let stats_path = dir.path().join("stats.log");
    let log_path = dir.path().join("out.log");

    let (root, log) = LogRoot::new();
    let mut cfg = quiet_terminal();
    cfg.stats_file = Some(stats_path.clone());
    cfg.log_file = Some(log_path.clone());
    root.reconfigure(&cfg, &log);

    let h = log.new_child(Some("perf"));
    assert!(h.test(Level::Stats));
    log_stats!(h, "frame 16.6\n");

    let stats = std::fs::read_to_string(&stats_path).unwrap();
    let (us, text) = stats.trim_end().split_once(' ').unwrap();
    assert!(us.parse::<u64>().is_ok());
    assert_eq!(text, "frame 16.6");
    // The regular log file never sees stats samples.
    assert_eq!(std::fs::read_to_string(&log_path).unwrap(), "");
}

#[test]
fn printed_status_lines_reach_file_and_buffer_sinks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");

    let (root, log) = LogRoot::new();
    let mut cfg = quiet_terminal();
    cfg.use_terminal = true;
    cfg.log_file = Some(path.clone());
    root.reconfigure(&cfg, &log);
    let buffer = root.register_buffer(8, BufferFilter::AtMost(Level::Trace), None);

    let h = log.new_child(Some("av"));
    log_status!(h, "AV: 00:00:01\n");

    let entry = buffer.read().unwrap();
    assert_eq!(entry.level, Level::Status);
    assert_eq!(entry.text, "AV: 00:00:01\n");
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("][s][av] AV: 00:00:01"), "{contents}");
    root.unregister_buffer(&buffer);
}

#[test]
fn terminal_tracking_follows_the_emitting_handle() {
    let (root, log) = LogRoot::new();
    let mut cfg = quiet_terminal();
    cfg.msg_levels = vec![
        ("all".into(), "error".into()),
        ("loud".into(), "info".into()),
    ];
    root.reconfigure(&cfg, &log);
    let buffer = root.register_buffer(8, BufferFilter::TrackTerminal, None);

    let loud = log.new_child(Some("loud"));
    let other = log.new_child(Some("other"));
    assert!(loud.test(Level::Info));
    // A refresh of another, quieter handle must not narrow the capture of
    // this one.
    assert!(!other.test(Level::Info));

    log_info!(loud, "heard\n");
    assert_eq!(buffer.read().unwrap().text, "heard\n");
    log_info!(other, "suppressed\n");
    assert!(buffer.read().is_none());
    root.unregister_buffer(&buffer);
}

#[test]
fn partial_lines_are_per_handle() {
    let (root, log) = LogRoot::new();
    root.reconfigure(&quiet_terminal(), &log);
    let buffer = root.register_buffer(16, BufferFilter::AtMost(Level::Debug), None);

    let a = log.new_child(Some("a"));
    let b = log.new_child(Some("b"));
    log_info!(a, "interleaved ");
    log_info!(b, "other ");
    log_info!(a, "halves\n");
    log_info!(b, "message\n");

    let first = buffer.read().unwrap();
    assert_eq!((first.prefix.as_str(), first.text.as_str()), ("a", "interleaved halves\n"));
    let second = buffer.read().unwrap();
    assert_eq!((second.prefix.as_str(), second.text.as_str()), ("b", "other message\n"));
    root.unregister_buffer(&buffer);
}

#[test]
fn overflowing_buffer_leaves_a_marker_and_recovers() {
    let (root, log) = LogRoot::new();
    root.reconfigure(&quiet_terminal(), &log);
    let buffer = root.register_buffer(4, BufferFilter::AtMost(Level::Debug), None);

    let h = log.new_child(Some("spam"));
    for i in 0..10 {
        log_info!(h, "message {i}\n");
    }
    assert_eq!(buffer.read().unwrap().text, "message 0\n");
    assert_eq!(buffer.read().unwrap().text, "message 1\n");
    assert_eq!(buffer.read().unwrap().text, "message 2\n");
    let marker = buffer.read().unwrap();
    assert!(marker.is_overflow());
    assert_eq!(marker.prefix, OVERFLOW_PREFIX);
    assert_eq!(marker.level, Level::Fatal);
    assert!(buffer.read().is_none());

    // Once drained, new messages flow again.
    log_info!(h, "after drain\n");
    assert_eq!(buffer.read().unwrap().text, "after drain\n");
    root.unregister_buffer(&buffer);
}

#[test]
fn terminal_tracking_buffer_follows_reconfiguration() {
    let (root, log) = LogRoot::new();
    root.reconfigure(&quiet_terminal(), &log);
    let buffer = root.register_buffer(16, BufferFilter::TrackTerminal, None);

    let h = log.new_child(Some("mod"));
    log_verbose!(h, "too detailed\n");
    assert!(buffer.read().is_none(), "verbose is above the terminal level");
    log_info!(h, "visible\n");
    assert_eq!(buffer.read().unwrap().text, "visible\n");

    let mut cfg = quiet_terminal();
    cfg.verbosity = 1;
    root.reconfigure(&cfg, &log);
    log_verbose!(h, "now visible\n");
    assert_eq!(buffer.read().unwrap().text, "now visible\n");
    root.unregister_buffer(&buffer);
}

#[test]
fn wakeup_fires_once_per_line() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let (root, log) = LogRoot::new();
    root.reconfigure(&quiet_terminal(), &log);
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let buffer = root.register_buffer(
        16,
        BufferFilter::AtMost(Level::Debug),
        Some(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })),
    );
    let h = log.new_child(Some("mod"));
    log_info!(h, "one\ntwo\n");
    assert_eq!(count.load(Ordering::SeqCst), 2, "one wakeup per line");
    root.unregister_buffer(&buffer);
}

#[test]
fn level_test_is_usable_across_threads() {
    use std::sync::Arc;

    let (root, log) = LogRoot::new();
    root.reconfigure(&quiet_terminal(), &log);
    let buffer = root.register_buffer(1 << 12, BufferFilter::AtMost(Level::Debug), None);
    let log = Arc::new(log);

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let log = Arc::clone(&log);
            std::thread::spawn(move || {
                let h = log.new_child(Some("worker"));
                for i in 0..100 {
                    log_error!(h, "t{t} m{i}\n");
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }

    let mut seen = 0;
    while let Some(entry) = buffer.read() {
        assert!(!entry.is_overflow());
        assert!(entry.text.starts_with('t'));
        seen += 1;
    }
    assert_eq!(seen, 400);
    root.unregister_buffer(&buffer);
}

#[test]
fn stats_reach_opted_in_buffers_without_a_stats_file() {
    let (root, log) = LogRoot::new();
    root.reconfigure(&quiet_terminal(), &log);
    let stats_buf = root.register_buffer(8, BufferFilter::AtMost(Level::Stats), None);
    let debug_buf = root.register_buffer(8, BufferFilter::AtMost(Level::Debug), None);

    let h = log.new_child(Some("perf"));
    assert!(h.test(Level::Stats), "a stats sink widens the handle");
    log_stats!(h, "frame 16.6\n");

    let entry = stats_buf.read().unwrap();
    assert_eq!(entry.level, Level::Stats);
    assert_eq!(entry.text, "frame 16.6\n");
    assert!(debug_buf.read().is_none(), "stats stays opt-in");
    root.unregister_buffer(&stats_buf);
    root.unregister_buffer(&debug_buf);
}

#[test]
fn carryover_merges_across_threads() {
    use std::sync::Arc;

    let (root, log) = LogRoot::new();
    root.reconfigure(&quiet_terminal(), &log);
    let buffer = root.register_buffer(8, BufferFilter::AtMost(Level::Debug), None);
    let h = Arc::new(log.new_child(Some("mod")));

    // The fragment's carryover must be picked up by a completion emitted
    // from a different thread.
    let frag = Arc::clone(&h);
    std::thread::spawn(move || log_info!(frag, "abc")).join().unwrap();
    assert!(buffer.read().is_none());
    let done = Arc::clone(&h);
    std::thread::spawn(move || log_info!(done, "def\n")).join().unwrap();

    assert_eq!(buffer.read().unwrap().text, "abcdef\n");
    assert!(buffer.read().is_none());
    root.unregister_buffer(&buffer);
}

#[test]
fn warn_filtered_buffer_sees_only_severe_lines() {
    let (root, log) = LogRoot::new();
    let mut cfg = quiet_terminal();
    cfg.verbosity = 1;
    root.reconfigure(&cfg, &log);

    let a = log.new_child(Some("a"));
    let h = a.new_child(Some("b"));
    assert!(h.test(Level::Verbose));

    let buffer = root.register_buffer(2, BufferFilter::AtMost(Level::Warn), None);
    log_error!(h, "broken\n");
    log_info!(h, "routine\n");

    let entry = buffer.read().unwrap();
    assert_eq!(entry.level, Level::Error);
    assert_eq!(entry.prefix, "a/b");
    assert_eq!(entry.text, "broken\n");
    assert!(buffer.read().is_none());
    root.unregister_buffer(&buffer);
}

// The whole lifecycle in one pass: configure, capture, reconfigure wider,
// overflow, drain, unregister.
#[test]
fn capture_session_lifecycle() {
    let (root, log) = LogRoot::new();
    let mut cfg = quiet_terminal();
    cfg.msg_levels = vec![("all".into(), "warn".into())];
    root.reconfigure(&cfg, &log);

    let h = log.new_child(Some("app"));
    assert!(!h.test(Level::Info));

    let buffer = root.register_buffer(8, BufferFilter::AtMost(Level::Verbose), None);
    assert!(h.test(Level::Verbose), "registration widens the handle");

    log_info!(h, "captured despite terminal override\n");
    log_verbose!(h, "also captured\n");
    log_debug!(h, "not captured\n");

    assert_eq!(buffer.read().unwrap().text, "captured despite terminal override\n");
    assert_eq!(buffer.read().unwrap().text, "also captured\n");
    assert!(buffer.read().is_none());

    root.unregister_buffer(&buffer);
    assert!(!h.test(Level::Info), "unregistration narrows again");
}
