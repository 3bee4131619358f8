//! # Session
//!
//! Single owner of a [`Player`], its catalog and its device. Key listeners,
//! control surfaces and device threads never touch playback state: they hold a
//! [`SessionHandle`] and post [`Action`]s into the mailbox, which the session
//! folds into the player one at a time.
//!
//! ```no_run
//! use segue::catalog::Catalog;
//! use segue::config::PlayerConfig;
//! use segue::device::RecordingDevice;
//! use segue::player::{Action, Player};
//! use segue::session::{mailbox, LogSink, Session};
//!
//! let (handle, inbox) = mailbox();
//! let player = Player::new(&PlayerConfig::default());
//! let mut session = Session::new(player, Catalog::new(), RecordingDevice::new(), inbox)
//!     .with_sink(Box::new(LogSink));
//!
//! handle.send(Action::next());
//! handle.shutdown();
//! session.run();
//! ```

use crate::catalog::Catalog;
use crate::device::Device;
use crate::error::Notice;
use crate::player::{Action, Dispatch, Library, Notification, Player};
use crate::store::Snapshot;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

/// What travels through the mailbox.
#[derive(Debug, Clone)]
pub enum Message {
    Action(Action),
    Shutdown,
}

/// Cloneable sender side of a session mailbox.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: Sender<Message>,
}

impl SessionHandle {
    /// Enqueue an action. Returns `false` once the session is gone.
    pub fn send(&self, action: impl Into<Action>) -> bool {
        self.tx.send(Message::Action(action.into())).is_ok()
    }

    /// Ask the session loop to stop after the messages queued before this one.
    pub fn shutdown(&self) -> bool {
        self.tx.send(Message::Shutdown).is_ok()
    }
}

/// Receiving side, consumed by [`Session::new`].
#[derive(Debug)]
pub struct Mailbox {
    rx: Receiver<Message>,
}

impl Mailbox {
    #[cfg(test)]
    pub(crate) fn into_receiver(self) -> Receiver<Message> {
        self.rx
    }
}

/// Create a connected handle/mailbox pair.
#[must_use]
pub fn mailbox() -> (SessionHandle, Mailbox) {
    let (tx, rx) = mpsc::channel();
    (SessionHandle { tx }, Mailbox { rx })
}

/// One-way receiver of now-playing updates.
pub trait NowPlayingSink {
    fn notify(&mut self, notification: &Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NowPlayingSink for LogSink {
    fn notify(&mut self, notification: &Notification) {
        match notification {
            Notification::TrackChanged(track) => {
                info!("Now playing: {} - {} ({})", track.title, track.artist, track.id);
            }
            Notification::PositionState { position, duration } => {
                debug!("Position {position:.1}s / {duration:.1}s");
            }
            Notification::TransportChanged(state) => info!("Transport: {state}"),
            Notification::Warning(notice) => warn!("{notice}"),
        }
    }
}

/// Forwards notifications over a channel; a closed channel is ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Notification>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: Sender<Notification>) -> Self {
        Self { tx }
    }
}

impl NowPlayingSink for ChannelSink {
    fn notify(&mut self, notification: &Notification) {
        let _ = self.tx.send(notification.clone());
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NowPlayingSink for NullSink {
    fn notify(&mut self, _notification: &Notification) {}
}

/// Serialized owner of one playback session.
pub struct Session<D, R = StdRng> {
    player: Player<R>,
    catalog: Catalog,
    device: D,
    sink: Box<dyn NowPlayingSink + Send>,
    inbox: Receiver<Message>,
    stopped: bool,
}

impl<D: Device, R: Rng> Session<D, R> {
    #[must_use]
    pub fn new(player: Player<R>, catalog: Catalog, device: D, mailbox: Mailbox) -> Self {
        Self {
            player,
            catalog,
            device,
            sink: Box::new(NullSink),
            inbox: mailbox.rx,
            stopped: false,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn NowPlayingSink + Send>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn player(&self) -> &Player<R> {
        &self.player
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Whether a shutdown message was processed.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Dispatch directly, bypassing the mailbox.
    pub fn dispatch(&mut self, action: Action) -> Dispatch {
        let library = Library::new(&self.catalog);
        let report = self.player.dispatch(action, &library, &mut self.device);
        self.publish(&report);
        report
    }

    /// Reinstate a persisted snapshot.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Dispatch {
        let library = Library::new(&self.catalog);
        let report = snapshot.apply(&mut self.player, &library, &mut self.device);
        self.publish(&report);
        report
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.player)
    }

    fn publish(&mut self, report: &Dispatch) {
        for notification in &report.notifications {
            self.sink.notify(notification);
        }
        if let Some(Notice::NoCandidate) = report.notice {
            info!("Nothing playable to advance to");
        }
    }

    fn handle(&mut self, message: Message) -> Option<(Action, Dispatch)> {
        match message {
            Message::Action(action) => {
                let report = self.dispatch(action.clone());
                Some((action, report))
            }
            Message::Shutdown => {
                debug!("Session shutting down");
                self.stopped = true;
                None
            }
        }
    }

    /// Block for the next message and fold it in, returning the action with
    /// its report.
    ///
    /// Returns `None` on shutdown or once every handle is dropped.
    pub fn next_dispatch(&mut self) -> Option<(Action, Dispatch)> {
        if self.stopped {
            return None;
        }
        match self.inbox.recv() {
            Ok(message) => self.handle(message),
            Err(_) => {
                debug!("All session handles dropped");
                self.stopped = true;
                None
            }
        }
    }

    /// Process messages until shutdown. Returns how many actions ran.
    pub fn run(&mut self) -> usize {
        let mut processed = 0;
        while self.next_dispatch().is_some() {
            processed += 1;
        }
        processed
    }

    /// Process only what is already queued. Returns how many actions ran.
    pub fn drain(&mut self) -> usize {
        let mut processed = 0;
        while !self.stopped {
            match self.inbox.try_recv() {
                Ok(message) => {
                    if self.handle(message).is_some() {
                        processed += 1;
                    }
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Attribute, ItemId};
    use crate::config::PlayerConfig;
    use crate::device::{DeviceEvent, DeviceEventKind, RecordingDevice};
    use crate::player::TransportState;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        for i in 1..=3 {
            catalog.set_attribute(ItemId(i), "local_mp3", Attribute::text(format!("{i}.mp3")));
        }
        catalog
    }

    fn session() -> (Session<RecordingDevice>, SessionHandle) {
        let (handle, inbox) = mailbox();
        let config = PlayerConfig {
            seed: Some(11),
            ..PlayerConfig::default()
        };
        let session = Session::new(Player::new(&config), catalog(), RecordingDevice::new(), inbox);
        (session, handle)
    }

    #[test]
    fn drain_processes_in_order() {
        let (mut session, handle) = session();
        handle.send(Action::play(ItemId(2)));
        handle.send(DeviceEvent::new(ItemId(2), DeviceEventKind::Ready));
        handle.send(Action::pause());

        assert_eq!(session.drain(), 3);
        assert_eq!(session.player().transport(), TransportState::Paused);
        assert_eq!(session.player().state().current(), Some(ItemId(2)));
    }

    #[test]
    fn run_stops_on_shutdown() {
        let (mut session, handle) = session();
        handle.send(Action::next());
        handle.shutdown();
        handle.send(Action::next());

        assert_eq!(session.run(), 1);
        assert!(session.is_stopped());
        assert_eq!(session.device().loads().len(), 1);
    }

    #[test]
    fn run_stops_when_handles_dropped() {
        let (mut session, handle) = session();
        let other = handle.clone();
        handle.send(Action::play(ItemId(1)));
        drop(handle);
        other.send(Action::play(ItemId(3)));
        drop(other);

        assert_eq!(session.run(), 2);
        assert_eq!(session.player().history().last(), Some(ItemId(1)));
    }

    #[test]
    fn channel_sink_receives_notifications() {
        let (tx, rx) = mpsc::channel();
        let (session, handle) = session();
        let mut session = session.with_sink(Box::new(ChannelSink::new(tx)));

        handle.send(Action::play(ItemId(1)));
        session.drain();

        let received: Vec<Notification> = rx.try_iter().collect();
        assert!(matches!(received.first(), Some(Notification::TrackChanged(t)) if t.id == ItemId(1)));
        assert!(received.contains(&Notification::TransportChanged(TransportState::Loading)));
    }

    #[test]
    fn warnings_reach_the_sink() {
        let (tx, rx) = mpsc::channel();
        let (session, handle) = session();
        let mut session = session.with_sink(Box::new(ChannelSink::new(tx)));
        session.device_mut().disconnect(true);

        handle.send(Action::play(ItemId(1)));
        session.drain();

        let received: Vec<Notification> = rx.try_iter().collect();
        assert!(matches!(received.as_slice(), [Notification::Warning(_)]));
    }

    #[test]
    fn send_after_session_dropped_fails() {
        let (session, handle) = session();
        drop(session);
        assert!(!handle.send(Action::next()));
    }
}
