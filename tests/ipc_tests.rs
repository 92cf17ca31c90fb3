//! End-to-end tests of the control and event sockets driving the coordinator
//! against an in-memory display.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Local, NaiveTime};
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;

use hyprsunset::backend::DisplaySync;
use hyprsunset::color::{ColorSettings, ColorState, Matrix3, compute};
use hyprsunset::core::scheduler;
use hyprsunset::core::shared::{ProfileSource, Shared};
use hyprsunset::core::{Context, Coordinator, CoordinatorParams};
use hyprsunset::ipc::{ControlChannel, EventChannel};
use hyprsunset::logger::Log;
use hyprsunset::schedule::{ProfileTime, ScheduledProfile, Timetable};

/// Records every commit with the matrices staged for it.
#[derive(Clone, Default)]
struct MockDisplay {
    commits: Arc<Mutex<Vec<Vec<(u32, Matrix3)>>>>,
    staged: Vec<(u32, Matrix3)>,
}

impl DisplaySync for MockDisplay {
    fn outputs(&self) -> Vec<u32> {
        vec![1, 2]
    }

    fn set_matrix_for_output(&mut self, output: u32, matrix: &Matrix3) -> Result<()> {
        self.staged.push((output, *matrix));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        self.commits.lock().unwrap().push(staged);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

struct Daemon {
    dir: TempDir,
    shared: Arc<Shared>,
    commits: Arc<Mutex<Vec<Vec<(u32, Matrix3)>>>>,
    coordinator: JoinHandle<Result<()>>,
    control: JoinHandle<()>,
    events: JoinHandle<()>,
    scheduler: JoinHandle<()>,
}

impl Daemon {
    fn start(settings: ColorSettings, config_path: Option<PathBuf>) -> Self {
        Self::launch(settings, config_path, Timetable::default())
    }

    fn launch(settings: ColorSettings, config_path: Option<PathBuf>, timetable: Timetable) -> Self {
        Log::set_enabled(false);

        let dir = tempfile::tempdir().unwrap();
        let color = ColorState::new(settings, 1.0).unwrap();
        let shared = Arc::new(Shared::new(
            color,
            timetable,
            ProfileSource::default(),
        ));

        let control = ControlChannel::bind(&dir.path().join("control.sock"))
            .unwrap()
            .spawn(shared.clone())
            .unwrap();
        let (notifier, events) = EventChannel::bind(&dir.path().join("events.sock"))
            .unwrap()
            .spawn()
            .unwrap();

        let display = MockDisplay::default();
        let commits = display.commits.clone();
        let coordinator = {
            let shared = shared.clone();
            thread::spawn(move || {
                let mut coordinator = Coordinator::new(CoordinatorParams {
                    display: Box::new(display),
                    shared,
                    notifier: Some(notifier),
                    context: Context::new(config_path),
                });
                let result = coordinator.run();
                coordinator.finish();
                result
            })
        };

        let scheduler = scheduler::spawn(shared.clone()).unwrap();

        Self {
            dir,
            shared,
            commits,
            coordinator,
            control,
            events,
            scheduler,
        }
    }

    fn control_path(&self) -> PathBuf {
        self.dir.path().join("control.sock")
    }

    fn event_path(&self) -> PathBuf {
        self.dir.path().join("events.sock")
    }

    fn request(&self, text: &str) -> String {
        request(&self.control_path(), text)
    }

    /// Connect a subscriber and give the event thread time to accept it.
    fn subscribe(&self) -> BufReader<UnixStream> {
        let stream = UnixStream::connect(self.event_path()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        thread::sleep(Duration::from_millis(600));
        BufReader::new(stream)
    }

    fn commit_count(&self) -> usize {
        self.commits.lock().unwrap().len()
    }

    fn last_commit(&self) -> Vec<(u32, Matrix3)> {
        self.commits.lock().unwrap().last().cloned().unwrap_or_default()
    }

    fn stop(self) -> TempDir {
        self.shared.request_terminate();
        self.scheduler.join().unwrap();
        self.coordinator.join().unwrap().unwrap();
        self.control.join().unwrap();
        self.events.join().unwrap();
        self.dir
    }
}

fn request(path: &Path, text: &str) -> String {
    let mut stream = UnixStream::connect(path).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(text.as_bytes()).unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).unwrap();
    reply
}

fn read_line(reader: &mut BufReader<UnixStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line
}

fn settings(temperature: u32) -> ColorSettings {
    ColorSettings {
        temperature,
        gamma: 1.0,
        identity: false,
    }
}

#[test]
fn test_mutation_is_pushed_before_reply() {
    let daemon = Daemon::start(settings(6000), None);

    assert_eq!(daemon.request("temperature 4000"), "ok");

    // The reply is only sent after the push, so it must be visible already
    let expected = compute(&settings(4000), 1.0).unwrap();
    assert_eq!(daemon.commit_count(), 1);
    assert_eq!(daemon.last_commit(), vec![(1, expected), (2, expected)]);

    assert_eq!(daemon.request("temperature"), "4000");
    daemon.stop();
}

#[test]
fn test_queries_and_rejections_do_not_push() {
    let daemon = Daemon::start(settings(5000), None);

    assert_eq!(daemon.request("gamma"), "100");
    assert_eq!(daemon.request("identity get"), "false");
    assert_eq!(daemon.request("saturation 50"), "invalid command");
    assert!(
        daemon
            .request("temperature 25000")
            .starts_with("Invalid temperature")
    );
    // Setting the value already in effect is accepted without a push
    assert_eq!(daemon.request("temperature 5000"), "ok");

    assert_eq!(daemon.commit_count(), 0);
    daemon.stop();
}

#[test]
fn test_requests_are_serialized() {
    let daemon = Daemon::start(settings(6000), None);
    let path = daemon.control_path();

    let clients: Vec<_> = (0..8)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || request(&path, "temperature +100"))
        })
        .collect();
    for client in clients {
        assert_eq!(client.join().unwrap(), "ok");
    }

    assert_eq!(daemon.request("temperature"), "6800");
    assert_eq!(daemon.commit_count(), 8);
    daemon.stop();
}

#[test]
fn test_subscribers_receive_changes_and_shutdown() {
    let daemon = Daemon::start(settings(6000), None);
    let mut first = daemon.subscribe();
    let mut second = daemon.subscribe();

    assert_eq!(daemon.request("temperature 3500"), "ok");
    assert_eq!(daemon.request("identity"), "ok");

    for reader in [&mut first, &mut second] {
        assert_eq!(read_line(reader), "temperature>>3500\n");
        assert_eq!(read_line(reader), "identity>>true\n");
    }

    let dir = daemon.stop();
    assert_eq!(read_line(&mut first), "shutdown>>\n");

    // Both sockets are cleaned up on exit
    assert!(!dir.path().join("control.sock").exists());
    assert!(!dir.path().join("events.sock").exists());
}

#[test]
fn test_config_reload_installs_new_schedule() {
    let config_dir = tempfile::tempdir().unwrap();
    let config_path = config_dir.path().join("hyprsunset.toml");
    fs::write(
        &config_path,
        r#"
        [[profile]]
        time = "00:00"
        temperature = 3000
        gamma = 0.9
        "#,
    )
    .unwrap();

    let daemon = Daemon::start(settings(6000), Some(config_path.clone()));
    let mut events = daemon.subscribe();

    daemon.shared.request_config_reload();

    assert_eq!(read_line(&mut events), "reload>>1\n");
    assert_eq!(read_line(&mut events), "profile>>00:00\n");
    assert_eq!(read_line(&mut events), "temperature>>3000\n");
    assert_eq!(read_line(&mut events), "gamma>>90\n");
    assert_eq!(daemon.request("temperature"), "3000");

    // A broken file keeps the running schedule
    fs::write(&config_path, "max_gamma = \"lots\"").unwrap();
    thread::sleep(Duration::from_millis(600));
    daemon.shared.request_config_reload();
    assert_eq!(daemon.request("temperature"), "3000");
    assert_eq!(daemon.shared.lock().generation, 1);

    daemon.stop();
}

fn clock_profile(at: NaiveTime, temperature: u32) -> ScheduledProfile {
    ScheduledProfile {
        at,
        source: ProfileTime::Clock(at),
        settings: settings(temperature),
    }
}

#[test]
fn test_scheduled_switch_is_pushed_and_announced() {
    let now = Local::now().time();
    let next_at = now + ChronoDuration::seconds(3);
    let timetable = Timetable::from_entries(vec![
        clock_profile(now - ChronoDuration::seconds(1), 3000),
        clock_profile(next_at, 4500),
    ]);

    let daemon = Daemon::launch(settings(3000), None, timetable);
    let mut events = daemon.subscribe();
    assert_eq!(daemon.commit_count(), 0);

    assert_eq!(
        read_line(&mut events),
        format!("profile>>{}\n", next_at.format("%H:%M"))
    );
    assert_eq!(read_line(&mut events), "temperature>>4500\n");

    let expected = compute(&settings(4500), 1.0).unwrap();
    assert_eq!(daemon.commit_count(), 1);
    assert_eq!(daemon.last_commit(), vec![(1, expected), (2, expected)]);
    assert_eq!(daemon.request("temperature"), "4500");

    daemon.stop();
}
