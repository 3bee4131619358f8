//! # Playback State Machine
//!
//! [`Player`] owns what is loaded, where the transport is and the listening
//! history. Every change goes through [`Player::dispatch`], which folds one
//! [`Action`] (a user request or a device event) into the state, issues the
//! matching commands to the [`Device`] and reports what a now-playing surface
//! should show.
//!
//! ## Transport states
//!
//! ```text
//! Idle --play--> Loading --ready--> Playing <--toggle--> Paused
//!                   ^                  |
//!                   +-----ended--------+   (auto-advance)
//! ```
//!
//! ## Atomicity
//!
//! Commands are issued before state is committed. When the device rejects a
//! command the action is reported as [`Notice::DeviceCommandFailed`] and
//! state, history and flags are left as they were. Nothing is retried.

use crate::catalog::{Catalog, ItemId, TrackInfo};
use crate::config::PlayerConfig;
use crate::device::{Device, DeviceCommand, DeviceEvent, DeviceEventKind};
use crate::embedding::EmbeddingStore;
use crate::error::Notice;
use crate::history::HistoryRing;
use crate::selector::Selector;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse transport state derived from the playback flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    Idle,
    Loading,
    Playing,
    Paused,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Current item and transport flags.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    current: Option<ItemId>,
    position: f64,
    duration: f64,
    paused: bool,
    loading: bool,
    looping: bool,
    pause_at_end: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current: None,
            position: 0.0,
            duration: 0.0,
            paused: true,
            loading: false,
            looping: false,
            pause_at_end: false,
        }
    }
}

impl PlaybackState {
    #[must_use]
    pub fn current(&self) -> Option<ItemId> {
        self.current
    }

    /// Transport position in seconds.
    #[must_use]
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Duration in seconds, 0 when unknown.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    #[must_use]
    pub fn pause_at_end(&self) -> bool {
        self.pause_at_end
    }

    #[must_use]
    pub fn transport(&self) -> TransportState {
        match self.current {
            None => TransportState::Idle,
            Some(_) if self.loading => TransportState::Loading,
            Some(_) if self.paused => TransportState::Paused,
            Some(_) => TransportState::Playing,
        }
    }

    /// Check the structural invariants of the flags.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let idle_ok = self.current.is_some() || (self.paused && !self.loading);
        let position_ok = self.position >= 0.0 && (self.duration <= 0.0 || self.position <= self.duration);
        idle_ok && position_ok && self.duration >= 0.0
    }

    fn clamp_position(&self, position: f64) -> f64 {
        let position = position.max(0.0);
        if self.duration > 0.0 {
            position.min(self.duration)
        } else {
            position
        }
    }
}

/// Everything that can be dispatched into the player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Action {
    /// Play an explicit item, or the selector's choice when `id` is `None`.
    /// Requesting the current item toggles pause.
    Play { id: Option<ItemId>, seek: Option<f64> },
    /// Pause now, or arm/disarm pausing at the end of the current item.
    Pause { pause_at_end: Option<bool> },
    Loop(bool),
    /// Absolute seek in seconds.
    Seek(f64),
    /// Relative seek; crossing either end changes track.
    SeekBy(f64),
    Previous,
    /// Pause/resume, or start something when nothing is loaded.
    TogglePlayback,
    Device(DeviceEvent),
}

impl Action {
    /// Advance to whatever the selector picks.
    #[must_use]
    pub fn next() -> Self {
        Self::Play { id: None, seek: None }
    }

    #[must_use]
    pub fn play(id: ItemId) -> Self {
        Self::Play {
            id: Some(id),
            seek: None,
        }
    }

    #[must_use]
    pub fn pause() -> Self {
        Self::Pause { pause_at_end: None }
    }
}

impl From<DeviceEvent> for Action {
    fn from(event: DeviceEvent) -> Self {
        Self::Device(event)
    }
}

/// One-way updates for a now-playing surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Notification {
    TrackChanged(TrackInfo),
    PositionState { position: f64, duration: f64 },
    TransportChanged(TransportState),
    Warning(Notice),
}

/// What a single dispatch produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    pub notifications: Vec<Notification>,
    /// Why the action was declined, or what went wrong after it was committed.
    pub notice: Option<Notice>,
}

impl Dispatch {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.notice.is_none()
    }
}

/// Read-only lookups a transition needs: the catalog and the embeddings.
#[derive(Clone, Copy)]
pub struct Library<'a> {
    pub catalog: &'a Catalog,
    pub embeddings: &'a dyn EmbeddingStore,
}

impl<'a> Library<'a> {
    /// Use the catalog's own `embedding` attributes.
    #[must_use]
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            embeddings: catalog,
        }
    }

    #[must_use]
    pub fn with_embeddings(mut self, embeddings: &'a dyn EmbeddingStore) -> Self {
        self.embeddings = embeddings;
        self
    }
}

type Step = Result<(), Notice>;

/// The playback state machine.
#[derive(Debug)]
pub struct Player<R = StdRng> {
    state: PlaybackState,
    history: HistoryRing,
    selector: Selector<R>,
    seek_step: f64,
}

impl Player<StdRng> {
    /// Build a player from configuration. A configured seed makes selection
    /// reproducible.
    #[must_use]
    pub fn new(config: &PlayerConfig) -> Self {
        let selector = match config.seed {
            Some(seed) => Selector::seeded(seed, config.policy),
            None => Selector::from_entropy(config.policy),
        };
        Self::with_selector(config, selector)
    }
}

impl<R: Rng> Player<R> {
    #[must_use]
    pub fn with_selector(config: &PlayerConfig, selector: Selector<R>) -> Self {
        Self {
            state: PlaybackState::default(),
            history: HistoryRing::new(config.history_size),
            selector,
            seek_step: config.seek_step,
        }
    }

    #[must_use]
    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    #[must_use]
    pub fn history(&self) -> &HistoryRing {
        &self.history
    }

    #[must_use]
    pub fn transport(&self) -> TransportState {
        self.state.transport()
    }

    /// Step used by keyboard-style relative seeks.
    #[must_use]
    pub fn seek_step(&self) -> f64 {
        self.seek_step
    }

    /// Fold one action into the state.
    pub fn dispatch<D>(&mut self, action: Action, library: &Library<'_>, device: &mut D) -> Dispatch
    where
        D: Device + ?Sized,
    {
        debug!("dispatch {action:?}");
        let before = (self.state.current, self.state.transport());
        let mut notifications = Vec::new();

        let outcome = match action {
            Action::Play { id, seek } => self.request_play(id, seek, library, device, &mut notifications),
            Action::Pause { pause_at_end } => self.request_pause(pause_at_end, device),
            Action::Loop(enabled) => self.request_loop(enabled, device),
            Action::Seek(position) => self.request_seek(position, device, &mut notifications),
            Action::SeekBy(delta) => self.request_seek_by(delta, library, device, &mut notifications),
            Action::Previous => self.request_previous(library, device, &mut notifications),
            Action::TogglePlayback => {
                let current = self.state.current;
                self.request_play(current, None, library, device, &mut notifications)
            }
            Action::Device(event) => self.device_event(event, library, device, &mut notifications),
        };

        self.finish(before, outcome, library, notifications)
    }

    /// Reinstate history and reopen `current` paused at `position`.
    ///
    /// Ids the catalog does not know are dropped; the history keeps its
    /// newest entries up to capacity.
    pub fn restore<D>(
        &mut self,
        history: impl IntoIterator<Item = ItemId>,
        current: Option<(ItemId, f64)>,
        library: &Library<'_>,
        device: &mut D,
    ) -> Dispatch
    where
        D: Device + ?Sized,
    {
        let before = (self.state.current, self.state.transport());
        let known = history.into_iter().filter(|&id| library.catalog.contains(id));
        self.history = HistoryRing::from_ids(known, self.history.capacity());
        self.state = PlaybackState {
            looping: self.state.looping,
            ..PlaybackState::default()
        };
        info!("Restored {} history entries", self.history.len());

        let mut notifications = Vec::new();
        let outcome = match current.filter(|(id, _)| library.catalog.contains(*id)) {
            Some((id, position)) => self.reopen_paused(id, position, library, device, &mut notifications),
            None => Ok(()),
        };

        self.finish(before, outcome, library, notifications)
    }

    fn finish(
        &self,
        (current_before, transport_before): (Option<ItemId>, TransportState),
        outcome: Step,
        library: &Library<'_>,
        mut notifications: Vec<Notification>,
    ) -> Dispatch {
        if let Some(current) = self.state.current.filter(|&c| Some(c) != current_before) {
            notifications.insert(0, Notification::TrackChanged(library.catalog.track_info(current)));
        }
        let transport = self.state.transport();
        if transport != transport_before {
            debug!("transport {transport_before} -> {transport}");
            notifications.push(Notification::TransportChanged(transport));
        }

        let notice = outcome.err();
        if let Some(notice) = notice.as_ref().filter(|n| n.is_warning()) {
            notifications.push(Notification::Warning(notice.clone()));
        }

        Dispatch { notifications, notice }
    }

    fn command<D>(device: &mut D, command: DeviceCommand) -> Step
    where
        D: Device + ?Sized,
    {
        debug!("device <- {command}");
        device.execute(&command).map_err(|err| {
            warn!("Device rejected {command}: {err}");
            Notice::device_failure(command, &err)
        })
    }

    fn position_state(&self) -> Notification {
        Notification::PositionState {
            position: self.state.position,
            duration: self.state.duration,
        }
    }

    /// Selector choice, treating the current item as already heard.
    fn choose_next(&mut self, library: &Library<'_>) -> Option<ItemId> {
        let mut heard = self.history.clone();
        if let Some(current) = self.state.current {
            heard.push(current);
        }
        let catalog = library.catalog;
        self.selector.select(
            catalog.items(),
            |id| catalog.is_playable(id),
            &heard,
            library.embeddings,
            self.state.current,
        )
    }

    fn request_play<D>(
        &mut self,
        id: Option<ItemId>,
        seek: Option<f64>,
        library: &Library<'_>,
        device: &mut D,
        out: &mut Vec<Notification>,
    ) -> Step
    where
        D: Device + ?Sized,
    {
        let target = match id {
            Some(id) => id,
            None => self.choose_next(library).ok_or(Notice::NoCandidate)?,
        };

        if Some(target) == self.state.current {
            return self.toggle(device);
        }

        self.load(target, seek, true, library, device, out)
    }

    fn toggle<D>(&mut self, device: &mut D) -> Step
    where
        D: Device + ?Sized,
    {
        if self.state.paused {
            Self::command(device, DeviceCommand::Play)?;
            self.state.paused = false;
        } else {
            Self::command(device, DeviceCommand::Pause)?;
            self.state.paused = true;
        }
        Ok(())
    }

    /// Load `target`; on success the previous item is recorded when
    /// `record_current` is set.
    fn load<D>(
        &mut self,
        target: ItemId,
        seek: Option<f64>,
        record_current: bool,
        library: &Library<'_>,
        device: &mut D,
        out: &mut Vec<Notification>,
    ) -> Step
    where
        D: Device + ?Sized,
    {
        let locator = library.catalog.source_locator(target).ok_or_else(|| {
            debug!("{target} has no streamable source");
            Notice::NoCandidate
        })?;
        Self::command(
            device,
            DeviceCommand::Load {
                item: target,
                locator,
            },
        )?;

        if record_current {
            if let Some(previous) = self.state.current {
                self.history.push(previous);
            }
        }
        info!("Loading {target}");
        self.state = PlaybackState {
            current: Some(target),
            position: 0.0,
            duration: library.catalog.duration(target).unwrap_or(0.0),
            paused: false,
            loading: true,
            looping: self.state.looping,
            pause_at_end: false,
        };

        // the load is committed at this point, a failed seek only warns
        let seeked = match seek.filter(|s| s.is_finite()) {
            Some(offset) => {
                let offset = self.state.clamp_position(offset);
                let result = Self::command(device, DeviceCommand::Seek(offset));
                if result.is_ok() {
                    self.state.position = offset;
                }
                result
            }
            None => Ok(()),
        };
        out.push(self.position_state());
        seeked
    }

    fn reopen_paused<D>(
        &mut self,
        id: ItemId,
        position: f64,
        library: &Library<'_>,
        device: &mut D,
        out: &mut Vec<Notification>,
    ) -> Step
    where
        D: Device + ?Sized,
    {
        let position = if position.is_finite() { position } else { 0.0 };
        let loaded = self.load(id, Some(position), false, library, device, out);
        // a rejected seek still leaves the item loaded, and it must not autoplay
        if self.state.current == Some(id) {
            self.state.paused = true;
        }
        loaded
    }

    fn request_pause<D>(&mut self, pause_at_end: Option<bool>, device: &mut D) -> Step
    where
        D: Device + ?Sized,
    {
        if let Some(flag) = pause_at_end {
            self.state.pause_at_end = flag;
            return Ok(());
        }
        if self.state.current.is_none() {
            return Ok(());
        }

        Self::command(device, DeviceCommand::Pause)?;
        self.state.paused = true;
        self.state.pause_at_end = false;
        Ok(())
    }

    fn request_loop<D>(&mut self, enabled: bool, device: &mut D) -> Step
    where
        D: Device + ?Sized,
    {
        Self::command(device, DeviceCommand::SetLoop(enabled))?;
        self.state.looping = enabled;
        Ok(())
    }

    fn request_seek<D>(&mut self, position: f64, device: &mut D, out: &mut Vec<Notification>) -> Step
    where
        D: Device + ?Sized,
    {
        if self.state.current.is_none() || !position.is_finite() {
            return Ok(());
        }

        let position = self.state.clamp_position(position);
        Self::command(device, DeviceCommand::Seek(position))?;
        self.state.position = position;
        out.push(self.position_state());
        Ok(())
    }

    fn request_seek_by<D>(
        &mut self,
        delta: f64,
        library: &Library<'_>,
        device: &mut D,
        out: &mut Vec<Notification>,
    ) -> Step
    where
        D: Device + ?Sized,
    {
        if self.state.current.is_none() {
            return self.request_play(None, None, library, device, out);
        }
        if !delta.is_finite() {
            return Ok(());
        }

        let target = self.state.position + delta;
        if self.state.duration > 0.0 && target >= self.state.duration {
            return self.request_play(None, None, library, device, out);
        }
        if target <= 0.0 {
            if self.history.can_go_back() {
                return self.request_previous(library, device, out);
            }
            return self.request_seek(0.0, device, out);
        }
        self.request_seek(target, device, out)
    }

    fn request_previous<D>(&mut self, library: &Library<'_>, device: &mut D, out: &mut Vec<Notification>) -> Step
    where
        D: Device + ?Sized,
    {
        while let Some(target) = self.history.last() {
            if !library.catalog.is_playable(target) {
                debug!("Skipping unplayable {target} in history");
                self.history.pop_last();
                continue;
            }
            self.load(target, None, false, library, device, out)?;
            self.history.pop_last();
            return Ok(());
        }
        Err(Notice::NoCandidate)
    }

    fn device_event<D>(
        &mut self,
        event: DeviceEvent,
        library: &Library<'_>,
        device: &mut D,
        out: &mut Vec<Notification>,
    ) -> Step
    where
        D: Device + ?Sized,
    {
        if Some(event.item) != self.state.current {
            debug!("Dropping {:?} for {} (current {:?})", event.kind, event.item, self.state.current);
            return Err(Notice::StaleEvent {
                expected: self.state.current,
                got: event.item,
            });
        }

        match event.kind {
            DeviceEventKind::Ready | DeviceEventKind::CanPlay => {
                self.state.loading = false;
                if self.state.paused {
                    return Ok(());
                }
                // a refused autoplay leaves the source loaded but not playing
                let started = Self::command(device, DeviceCommand::Play);
                if started.is_err() {
                    self.state.paused = true;
                }
                started
            }
            DeviceEventKind::Playing => {
                self.state.loading = false;
                Ok(())
            }
            DeviceEventKind::Paused => Ok(()),
            DeviceEventKind::Ended => self.ended(library, device, out),
            DeviceEventKind::Tick { position, duration } => {
                if duration.is_finite() && duration > 0.0 {
                    self.state.duration = duration;
                }
                if position.is_finite() {
                    self.state.position = self.state.clamp_position(position);
                }
                out.push(self.position_state());
                Ok(())
            }
        }
    }

    fn ended<D>(&mut self, library: &Library<'_>, device: &mut D, out: &mut Vec<Notification>) -> Step
    where
        D: Device + ?Sized,
    {
        if self.state.looping {
            return Ok(());
        }
        if self.state.pause_at_end {
            debug!("Pausing at end of {:?}", self.state.current);
            self.state.paused = true;
            self.state.pause_at_end = false;
            self.state.position = self.state.duration;
            return Ok(());
        }

        let Some(next) = self.choose_next(library) else {
            info!("Nothing left to play");
            self.state.paused = true;
            return Err(Notice::NoCandidate);
        };

        if Some(next) == self.state.current {
            info!("Restarting {next}");
            Self::command(device, DeviceCommand::Seek(0.0))?;
            self.state.position = 0.0;
            out.push(self.position_state());
            let started = Self::command(device, DeviceCommand::Play);
            self.state.paused = started.is_err();
            return started;
        }

        info!("Advancing to {next}");
        self.load(next, None, true, library, device, out)
    }
}
