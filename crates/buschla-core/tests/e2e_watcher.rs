/// End-to-end watcher integration tests.
///
/// These tests run the real `buschla-watcher` worker binary against real
/// temporary directories and talk to it over the real pipe, so they cover
/// the handshake, inotify subscriptions, the wire format and the build
/// reaction in one go.
///
/// The worker adds its watches asynchronously after spawn, so every test
/// keeps rewriting its file until the matching event shows up rather than
/// assuming the first write is seen.
use buschla_core::watcher::{
    DirWatcher, ReactionConfig, WatchConfig, WatcherEvent, WorkerCommand, WorkerHandshake,
};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ── Helpers ──────────────────────────────────────────────────────────────────

const DEADLINE: Duration = Duration::from_secs(10);
const TOUCH_EVERY: Duration = Duration::from_millis(200);

fn worker_command() -> WorkerCommand {
    WorkerCommand::new(env!("CARGO_BIN_EXE_buschla-watcher"))
}

fn watch(dirs: &[&Path], reaction: Option<ReactionConfig>) -> DirWatcher {
    let mut config = match reaction {
        Some(r) => WatchConfig::new().with_reaction(r),
        None => WatchConfig::new().without_reaction(),
    };
    for dir in dirs {
        config.append_directory(*dir).unwrap();
    }
    DirWatcher::spawn(config, &worker_command()).expect("failed to spawn worker")
}

/// Rewrite `file` every [`TOUCH_EVERY`] and poll until `wanted` matches an
/// event. Panics after [`DEADLINE`] or if the channel closes first.
fn touch_until(
    watcher: &mut DirWatcher,
    file: &Path,
    mut wanted: impl FnMut(&WatcherEvent) -> bool,
) -> WatcherEvent {
    let deadline = Instant::now() + DEADLINE;
    let mut next_touch = Instant::now();
    loop {
        assert!(
            Instant::now() < deadline,
            "no matching event for '{}' within {:?}",
            file.display(),
            DEADLINE
        );
        if Instant::now() >= next_touch {
            fs::write(file, b"// touched\n").unwrap();
            next_touch = Instant::now() + TOUCH_EVERY;
        }
        while let Some(event) = watcher.poll_event() {
            if wanted(&event) {
                return event;
            }
        }
        assert!(!watcher.is_closed(), "channel closed while waiting");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn is_change_of(path: &Path) -> impl FnMut(&WatcherEvent) -> bool + '_ {
    move |event| matches!(event, WatcherEvent::FileChanged { paths } if paths.iter().any(|p| p == path))
}

fn is_report(event: &WatcherEvent) -> bool {
    matches!(event, WatcherEvent::ReactionReport { .. })
}

fn wait_closed(watcher: &mut DirWatcher) {
    let deadline = Instant::now() + DEADLINE;
    while !watcher.is_closed() {
        assert!(Instant::now() < deadline, "channel never closed");
        let _ = watcher.poll_event();
        std::thread::sleep(Duration::from_millis(10));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// A header written in a watched directory arrives as its full path.
#[test]
fn file_change_reports_full_path() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let mut watcher = watch(&[tmp.path()], None);
    let file = tmp.path().join("foo.h");

    let event = touch_until(&mut watcher, &file, is_change_of(&file));
    match event {
        WatcherEvent::FileChanged { paths } => {
            assert!(paths.iter().all(|p| p == &file), "unexpected paths {paths:?}");
        }
        other => panic!("expected FileChanged, got {other:?}"),
    }
}

/// Changes in each of several directories are attributed to the right one.
#[test]
fn multiple_directories_are_resolved() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    let mut watcher = watch(&[a.path(), b.path()], None);
    assert_eq!(
        watcher.directories(),
        &[a.path().to_path_buf(), b.path().to_path_buf()]
    );

    let in_b = b.path().join("b.txt");
    touch_until(&mut watcher, &in_b, is_change_of(&in_b));
    let in_a = a.path().join("a.txt");
    touch_until(&mut watcher, &in_a, is_change_of(&in_a));
}

/// A directory that cannot be watched is skipped; the rest still work.
#[test]
fn missing_directory_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("does-not-exist");
    let mut watcher = watch(&[missing.as_path(), tmp.path()], None);

    let file = tmp.path().join("still.cpp");
    touch_until(&mut watcher, &file, is_change_of(&file));
    assert!(!watcher.is_closed());
}

/// Changing a Makefile runs the build and reports its real exit status.
#[test]
fn makefile_change_reports_exit_status() {
    let tmp = TempDir::new().unwrap();
    let reaction = ReactionConfig {
        working_dir: Some(tmp.path().to_path_buf()),
        ..ReactionConfig::with_command("echo failing build; exit 3")
    };
    let mut watcher = watch(&[tmp.path()], Some(reaction));

    let event = touch_until(&mut watcher, &tmp.path().join("Makefile"), is_report);
    match event {
        WatcherEvent::ReactionReport {
            exit_status,
            output,
        } => {
            assert_eq!(exit_status, 3);
            assert!(output.contains("failing build"), "output was {output:?}");
        }
        other => panic!("expected ReactionReport, got {other:?}"),
    }
}

/// A successful build reports exit 0 and exactly what it printed.
#[test]
fn successful_build_reports_output() {
    let tmp = TempDir::new().unwrap();
    let mut watcher = watch(
        &[tmp.path()],
        Some(ReactionConfig::with_command("printf 'build ok'")),
    );

    let event = touch_until(&mut watcher, &tmp.path().join("main.cpp"), is_report);
    assert_eq!(
        event,
        WatcherEvent::ReactionReport {
            exit_status: 0,
            output: "build ok".into()
        }
    );
}

/// The FileChanged event for a triggering file precedes its report.
#[test]
fn change_is_delivered_before_report() {
    let tmp = TempDir::new().unwrap();
    let mut watcher = watch(&[tmp.path()], Some(ReactionConfig::with_command("true")));
    let file = tmp.path().join("app.h");

    let mut seen_change = false;
    touch_until(&mut watcher, &file, |event| match event {
        WatcherEvent::FileChanged { paths } => {
            seen_change |= paths.contains(&file);
            false
        }
        WatcherEvent::ReactionReport { .. } => {
            assert!(seen_change, "report arrived before the change");
            true
        }
    });
}

/// Files outside the trigger list are reported but never build.
#[test]
fn non_trigger_file_does_not_build() {
    let tmp = TempDir::new().unwrap();
    let mut watcher = watch(
        &[tmp.path()],
        Some(ReactionConfig::with_command("printf 'should not run'")),
    );
    let file = tmp.path().join("notes.txt");
    touch_until(&mut watcher, &file, is_change_of(&file));

    let quiet_until = Instant::now() + Duration::from_secs(1);
    while Instant::now() < quiet_until {
        if let Some(event) = watcher.poll_event() {
            assert!(!is_report(&event), "unexpected build: {event:?}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Once the worker dies the watcher closes and stays silent.
#[test]
fn worker_exit_closes_channel() {
    let tmp = TempDir::new().unwrap();
    let mut watcher = watch(&[tmp.path()], None);
    let file = tmp.path().join("alive.h");
    touch_until(&mut watcher, &file, is_change_of(&file));

    let pid = watcher.worker_pid().expect("worker pid");
    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
    wait_closed(&mut watcher);

    for _ in 0..10 {
        assert!(watcher.poll_event().is_none());
        assert!(watcher.is_closed());
    }
}

/// Shutdown closes the watcher at once and can be repeated.
#[test]
fn shutdown_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let mut watcher = watch(&[tmp.path()], None);
    assert!(watcher.worker_pid().is_some());

    watcher.shutdown();
    assert!(watcher.is_closed());
    assert!(watcher.poll_event().is_none());
    assert!(watcher.worker_pid().is_none());

    watcher.shutdown();
    assert!(watcher.is_closed());
}

/// The worker exits on SIGTERM, which closes the channel from its side.
#[test]
fn worker_stops_on_sigterm() {
    let tmp = TempDir::new().unwrap();
    let mut watcher = watch(&[tmp.path()], None);
    let file = tmp.path().join("ready.h");
    touch_until(&mut watcher, &file, is_change_of(&file));

    let pid = watcher.worker_pid().expect("worker pid");
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).unwrap();
    wait_closed(&mut watcher);
}

/// An empty config starts a worker that simply never reports anything.
#[test]
fn empty_config_stays_quiet() {
    let mut watcher = watch(&[], None);
    let until = Instant::now() + Duration::from_millis(500);
    while Instant::now() < until {
        assert!(watcher.poll_event().is_none());
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!watcher.is_closed());
}

/// A watcher spawned on a short-lived thread keeps working after that
/// thread exits, as long as the process that owns it is alive.
#[test]
fn watcher_survives_its_spawning_thread() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().to_path_buf();
    let mut watcher = std::thread::spawn(move || watch(&[dir.as_path()], None))
        .join()
        .expect("spawning thread panicked");

    // Give a parent-death signal time to arrive if one is coming.
    std::thread::sleep(Duration::from_millis(500));

    let file = tmp.path().join("y.h");
    touch_until(&mut watcher, &file, is_change_of(&file));
    assert!(!watcher.is_closed());
}

/// Closing the worker's stdin stands in for the controller process exiting;
/// the worker must notice and stop on its own.
#[test]
fn worker_stops_when_controller_stdin_closes() {
    let tmp = TempDir::new().unwrap();
    let mut config = WatchConfig::new().without_reaction();
    config.append_directory(tmp.path()).unwrap();
    let handshake = WorkerHandshake {
        controller_pid: std::process::id(),
        config,
    };

    let mut worker = Command::new(env!("CARGO_BIN_EXE_buschla-watcher"))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn worker");
    let mut stdin = worker.stdin.take().expect("worker stdin");
    serde_json::to_writer(&mut stdin, &handshake).unwrap();
    stdin.write_all(b"\n").unwrap();

    // Still running while the lifeline is held.
    std::thread::sleep(Duration::from_millis(500));
    assert!(worker.try_wait().unwrap().is_none(), "worker exited early");

    drop(stdin);
    let deadline = Instant::now() + DEADLINE;
    let status = loop {
        if let Some(status) = worker.try_wait().unwrap() {
            break status;
        }
        assert!(Instant::now() < deadline, "worker outlived its lifeline");
        std::thread::sleep(Duration::from_millis(20));
    };
    assert!(status.success(), "worker exited with {status}");
}

/// Two files written back to back arrive in write order, whether they
/// share one notification batch or not.
#[test]
fn back_to_back_writes_keep_their_order() {
    let tmp = TempDir::new().unwrap();
    let mut watcher = watch(&[tmp.path()], None);

    // Make sure the watch is live before the writes that matter.
    let warm_up = tmp.path().join("warm-up.txt");
    touch_until(&mut watcher, &warm_up, is_change_of(&warm_up));

    let first = tmp.path().join("first.h");
    let second = tmp.path().join("second.h");
    fs::write(&first, b"1\n").unwrap();
    fs::write(&second, b"2\n").unwrap();

    let mut seen: Vec<PathBuf> = Vec::new();
    let deadline = Instant::now() + DEADLINE;
    while !seen.contains(&second) {
        assert!(Instant::now() < deadline, "missing changes, saw {seen:?}");
        while let Some(event) = watcher.poll_event() {
            if let WatcherEvent::FileChanged { paths } = event {
                seen.extend(paths.into_iter().filter(|p| p == &first || p == &second));
            }
        }
        assert!(!watcher.is_closed(), "channel closed while waiting");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(seen, vec![first, second]);
}
