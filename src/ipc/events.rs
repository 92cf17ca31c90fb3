//! Broadcast event channel.
//!
//! Subscribers connect to the event socket and receive one line per notice:
//! `name>>payload\n`. The channel never reads requests from them.
//!
//! All sockets are non-blocking and owned by a single thread. A write that
//! would block queues the message for that subscriber; the poll loop asks for
//! write readiness only while a queue is non-empty. A subscriber that falls
//! [`MAX_QUEUED_EVENTS`] messages behind, or whose socket errors, is dropped.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use crate::color::ColorSettings;
use crate::common::constants::{IPC_POLL_MS, MAX_QUEUED_EVENTS};

/// An externally visible state change.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub name: String,
    pub payload: String,
}

impl Notice {
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }

    /// Notices for every setting that differs between `before` and `after`.
    pub fn for_change(before: &ColorSettings, after: &ColorSettings) -> Vec<Notice> {
        let mut notices = Vec::new();
        if before.temperature != after.temperature {
            notices.push(Notice::new("temperature", after.temperature.to_string()));
        }
        if before.gamma != after.gamma {
            let percent = (after.gamma * 100.0 * 100.0).round() / 100.0;
            notices.push(Notice::new("gamma", format!("{percent}")));
        }
        if before.identity != after.identity {
            notices.push(Notice::new("identity", after.identity.to_string()));
        }
        notices
    }

    /// Wire form: exactly one line, newlines in the payload become spaces.
    pub fn to_line(&self) -> String {
        format!("{}>>{}\n", self.name, self.payload.replace('\n', " "))
    }
}

/// Handle used by the coordinator to publish notices.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    sender: Sender<Notice>,
}

impl EventNotifier {
    pub fn send(&self, notice: Notice) {
        // The event thread is gone only during shutdown
        let _ = self.sender.send(notice);
    }
}

/// Why a subscriber was dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
enum DropReason {
    Overflow,
    WriteError,
    Disconnected,
}

struct Subscriber {
    stream: UnixStream,
    queue: VecDeque<Vec<u8>>,
    /// Bytes of the front message already written.
    offset: usize,
}

impl Subscriber {
    /// Write immediately or queue. Order is preserved: once something is
    /// queued, new messages go behind it.
    fn offer(&mut self, message: &[u8]) -> Result<(), DropReason> {
        if !self.queue.is_empty() {
            if self.queue.len() >= MAX_QUEUED_EVENTS {
                return Err(DropReason::Overflow);
            }
            self.queue.push_back(message.to_vec());
            return Ok(());
        }

        match self.stream.write(message) {
            Ok(n) if n == message.len() => Ok(()),
            Ok(n) => {
                self.queue.push_back(message[n..].to_vec());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                self.queue.push_back(message.to_vec());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => self.offer(message),
            Err(_) => Err(DropReason::WriteError),
        }
    }

    /// Write out as much of the queue as the socket accepts.
    fn flush(&mut self) -> Result<(), DropReason> {
        while let Some(front) = self.queue.front() {
            match self.stream.write(&front[self.offset..]) {
                Ok(0) => return Err(DropReason::WriteError),
                Ok(n) => {
                    self.offset += n;
                    if self.offset == front.len() {
                        self.queue.pop_front();
                        self.offset = 0;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return Err(DropReason::WriteError),
            }
        }
        Ok(())
    }

    /// Subscribers never send anything; readable means closed (or noise to discard).
    fn drain_input(&mut self) -> Result<(), DropReason> {
        let mut buf = [0u8; 256];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(DropReason::Disconnected),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return Err(DropReason::Disconnected),
            }
        }
    }
}

/// The set of connected subscribers and their queues.
#[derive(Default)]
pub struct EventHub {
    subscribers: Vec<Subscriber>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, stream: UnixStream) -> std::io::Result<()> {
        stream.set_nonblocking(true)?;
        self.subscribers.push(Subscriber {
            stream,
            queue: VecDeque::new(),
            offset: 0,
        });
        log_debug!("Event subscriber connected ({} total)", self.subscribers.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Messages waiting across all subscribers.
    pub fn queued(&self) -> usize {
        self.subscribers.iter().map(|s| s.queue.len()).sum()
    }

    /// Send `notice` to every subscriber, dropping the ones that fail.
    pub fn broadcast(&mut self, notice: &Notice) {
        let line = notice.to_line();
        let bytes = line.as_bytes();
        self.subscribers.retain_mut(|s| match s.offer(bytes) {
            Ok(()) => true,
            Err(reason) => {
                log_debug!("Dropping event subscriber: {:?}", reason);
                false
            }
        });
    }

    /// One poll pass over `listener` and all subscribers.
    fn poll_once(&mut self, listener: &UnixListener, timeout: PollTimeout) -> Result<()> {
        let revents: Vec<PollFlags> = {
            let mut fds = Vec::with_capacity(self.subscribers.len() + 1);
            fds.push(PollFd::new(listener.as_fd(), PollFlags::POLLIN));
            for s in &self.subscribers {
                let mut flags = PollFlags::POLLIN;
                if !s.queue.is_empty() {
                    flags |= PollFlags::POLLOUT;
                }
                fds.push(PollFd::new(s.stream.as_fd(), flags));
            }

            match poll(&mut fds, timeout) {
                Ok(_) => {}
                Err(Errno::EINTR) => return Ok(()),
                Err(e) => return Err(e).context("poll on event channel failed"),
            }
            fds.iter()
                .map(|fd| fd.revents().unwrap_or(PollFlags::empty()))
                .collect()
        };

        let mut events = revents[1..].iter();
        self.subscribers.retain_mut(|s| {
            let flags = events.next().copied().unwrap_or(PollFlags::empty());
            let result = if flags.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) {
                Err(DropReason::WriteError)
            } else {
                let read = if flags.intersects(PollFlags::POLLIN | PollFlags::POLLHUP) {
                    s.drain_input()
                } else {
                    Ok(())
                };
                read.and_then(|()| {
                    if flags.contains(PollFlags::POLLOUT) {
                        s.flush()
                    } else {
                        Ok(())
                    }
                })
            };
            match result {
                Ok(()) => true,
                Err(reason) => {
                    log_debug!("Dropping event subscriber: {:?}", reason);
                    false
                }
            }
        });

        if revents[0].contains(PollFlags::POLLIN) {
            self.accept_all(listener);
        }
        Ok(())
    }

    fn accept_all(&mut self, listener: &UnixListener) {
        loop {
            match listener.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = self.add(stream) {
                        log_warning!("Failed to configure event subscriber: {}", e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log_warning!("Failed to accept event subscriber: {}", e);
                    break;
                }
            }
        }
    }
}

/// The bound event socket, before its thread is started.
pub struct EventChannel {
    listener: UnixListener,
    path: PathBuf,
}

impl EventChannel {
    /// Bind the event socket at `path`, replacing a stale socket file.
    pub fn bind(path: &Path) -> Result<Self> {
        let listener = super::bind_listener(path)?;
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start the event thread. It exits once every [`EventNotifier`] has been
    /// dropped, after broadcasting whatever was sent before that.
    pub fn spawn(self) -> Result<(EventNotifier, JoinHandle<()>)> {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("event-channel".into())
            .spawn(move || self.run(receiver))
            .context("Failed to spawn event channel thread")?;
        Ok((EventNotifier { sender }, handle))
    }

    fn run(self, receiver: Receiver<Notice>) {
        let mut hub = EventHub::new();
        let timeout = PollTimeout::from(IPC_POLL_MS);

        loop {
            let mut disconnected = false;
            loop {
                match receiver.try_recv() {
                    Ok(notice) => hub.broadcast(&notice),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }

            if disconnected {
                break;
            }

            if let Err(e) = hub.poll_once(&self.listener, timeout) {
                log_error!("Event channel stopped: {:#}", e);
                break;
            }
        }

        log_debug!("Event channel closed ({} subscribers)", hub.len());
        super::remove_socket(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::io::BufReader;

    /// Fill the kernel buffer so that every further write would block.
    fn stall(stream: &UnixStream) {
        stream.set_nonblocking(true).unwrap();
        let chunk = [0u8; 4096];
        let mut writer = stream;
        while writer.write(&chunk).is_ok() {}
        while writer.write(&chunk[..1]).is_ok() {}
    }

    #[test]
    fn test_notice_line_format() {
        assert_eq!(Notice::new("gamma", "90").to_line(), "gamma>>90\n");
        assert_eq!(
            Notice::new("profile", "line one\nline two").to_line(),
            "profile>>line one line two\n"
        );
        assert_eq!(Notice::new("shutdown", "").to_line(), "shutdown>>\n");
    }

    #[test]
    fn test_notices_for_change() {
        let before = ColorSettings {
            temperature: 6000,
            gamma: 1.0,
            identity: false,
        };
        assert!(Notice::for_change(&before, &before).is_empty());

        let after = ColorSettings {
            temperature: 4000,
            gamma: 0.8,
            ..before
        };
        assert_eq!(
            Notice::for_change(&before, &after),
            vec![
                Notice::new("temperature", "4000"),
                Notice::new("gamma", "80"),
            ]
        );
    }

    #[test]
    fn test_broadcast_reaches_subscriber() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let mut hub = EventHub::new();
        hub.add(ours).unwrap();

        hub.broadcast(&Notice::new("temperature", "4000"));
        hub.broadcast(&Notice::new("identity", "true"));

        let mut reader = BufReader::new(theirs);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "temperature>>4000\n");
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "identity>>true\n");
        assert_eq!(hub.queued(), 0);
    }

    #[test]
    fn test_stalled_subscriber_dropped_after_queue_fills() {
        let (ours, _theirs) = UnixStream::pair().unwrap();
        stall(&ours);

        let mut hub = EventHub::new();
        hub.add(ours).unwrap();

        for i in 0..MAX_QUEUED_EVENTS {
            hub.broadcast(&Notice::new("temperature", i.to_string()));
        }
        assert_eq!(hub.len(), 1);
        assert_eq!(hub.queued(), MAX_QUEUED_EVENTS);

        hub.broadcast(&Notice::new("temperature", "overflow"));
        assert!(hub.is_empty());
    }

    #[test]
    fn test_stalled_subscriber_does_not_affect_others() {
        let (stalled, _keep) = UnixStream::pair().unwrap();
        stall(&stalled);
        let (healthy, healthy_peer) = UnixStream::pair().unwrap();

        let mut hub = EventHub::new();
        hub.add(stalled).unwrap();
        hub.add(healthy).unwrap();

        for _ in 0..=MAX_QUEUED_EVENTS {
            hub.broadcast(&Notice::new("gamma", "50"));
        }
        assert_eq!(hub.len(), 1);

        let mut reader = BufReader::new(healthy_peer);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "gamma>>50\n");
    }

    #[test]
    fn test_closed_subscriber_dropped_on_write() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        drop(theirs);

        let mut hub = EventHub::new();
        hub.add(ours).unwrap();
        hub.broadcast(&Notice::new("gamma", "100"));
        assert!(hub.is_empty());
    }

    #[test]
    fn test_queue_drains_when_reader_catches_up() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        stall(&ours);

        let mut hub = EventHub::new();
        hub.add(ours).unwrap();
        hub.broadcast(&Notice::new("temperature", "5000"));
        assert_eq!(hub.queued(), 1);

        // Drain the filler on another thread while the hub flushes
        let reader = thread::spawn(move || {
            let mut theirs = theirs;
            let mut buf = vec![0u8; 1 << 16];
            let mut seen = Vec::new();
            while !seen.ends_with(b"temperature>>5000\n") {
                let n = theirs.read(&mut buf).unwrap();
                assert!(n > 0);
                seen.extend_from_slice(&buf[..n]);
            }
        });

        let (_listener_dir, listener) = {
            let dir = tempfile::tempdir().unwrap();
            let listener = UnixListener::bind(dir.path().join("l.sock")).unwrap();
            listener.set_nonblocking(true).unwrap();
            (dir, listener)
        };
        while hub.queued() > 0 {
            hub.poll_once(&listener, PollTimeout::from(50u16)).unwrap();
        }
        reader.join().unwrap();
        assert_eq!(hub.len(), 1);
    }
}
