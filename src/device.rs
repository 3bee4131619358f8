//! # Device Adapter Contract
//!
//! The audio transport is an external collaborator. The core only knows the
//! five commands below and the events the device reports back. Every event is
//! tagged with the item it concerns so the state machine can drop events that
//! belong to a load it has already superseded.
//!
//! `load` only prepares a source. Playback starts when the state machine
//! answers the device's `Ready`/`CanPlay` event with `play`.

use crate::catalog::ItemId;
use crate::error::DeviceError;
use serde::Serialize;
use std::fmt;

/// A transport command issued to the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DeviceCommand {
    Load { item: ItemId, locator: String },
    Play,
    Pause,
    Seek(f64),
    SetLoop(bool),
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { item, locator } => write!(f, "load {item} ({locator})"),
            Self::Play => f.write_str("play"),
            Self::Pause => f.write_str("pause"),
            Self::Seek(position) => write!(f, "seek to {position:.1}s"),
            Self::SetLoop(enabled) => write!(f, "set loop {enabled}"),
        }
    }
}

/// What the device reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DeviceEventKind {
    /// Source loaded and playable
    Ready,
    /// Enough data buffered to start
    CanPlay,
    Playing,
    Paused,
    /// Reached the end of the source
    Ended,
    /// Periodic progress report, seconds
    Tick { position: f64, duration: f64 },
}

/// An event together with the item it pertains to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeviceEvent {
    pub item: ItemId,
    pub kind: DeviceEventKind,
}

impl DeviceEvent {
    #[must_use]
    pub fn new(item: ItemId, kind: DeviceEventKind) -> Self {
        Self { item, kind }
    }
}

/// The audio transport the core commands.
pub trait Device {
    fn load(&mut self, item: ItemId, locator: &str) -> Result<(), DeviceError>;
    fn play(&mut self) -> Result<(), DeviceError>;
    fn pause(&mut self) -> Result<(), DeviceError>;
    fn seek(&mut self, position: f64) -> Result<(), DeviceError>;
    fn set_loop(&mut self, enabled: bool) -> Result<(), DeviceError>;

    /// Run a command value through the matching method.
    fn execute(&mut self, command: &DeviceCommand) -> Result<(), DeviceError> {
        match command {
            DeviceCommand::Load { item, locator } => self.load(*item, locator),
            DeviceCommand::Play => self.play(),
            DeviceCommand::Pause => self.pause(),
            DeviceCommand::Seek(position) => self.seek(*position),
            DeviceCommand::SetLoop(enabled) => self.set_loop(*enabled),
        }
    }
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn load(&mut self, item: ItemId, locator: &str) -> Result<(), DeviceError> {
        (**self).load(item, locator)
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        (**self).play()
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        (**self).pause()
    }

    fn seek(&mut self, position: f64) -> Result<(), DeviceError> {
        (**self).seek(position)
    }

    fn set_loop(&mut self, enabled: bool) -> Result<(), DeviceError> {
        (**self).set_loop(enabled)
    }
}

/// Device that accepts everything and remembers what it was told.
///
/// Commands can be made to fail to exercise rejection handling.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    commands: Vec<DeviceCommand>,
    reject_play: bool,
    reject_load: bool,
    reject_seek: bool,
    reject_all: bool,
}

impl RecordingDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse `play` (browser autoplay policies do this).
    pub fn reject_play(&mut self, reject: bool) {
        self.reject_play = reject;
    }

    pub fn reject_load(&mut self, reject: bool) {
        self.reject_load = reject;
    }

    pub fn reject_seek(&mut self, reject: bool) {
        self.reject_seek = reject;
    }

    /// Behave as if the device went away.
    pub fn disconnect(&mut self, gone: bool) {
        self.reject_all = gone;
    }

    #[must_use]
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    #[must_use]
    pub fn last_command(&self) -> Option<&DeviceCommand> {
        self.commands.last()
    }

    /// Items loaded so far, in order.
    #[must_use]
    pub fn loads(&self) -> Vec<ItemId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::Load { item, .. } => Some(*item),
                _ => None,
            })
            .collect()
    }

    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    fn record(&mut self, command: DeviceCommand, rejected: bool) -> Result<(), DeviceError> {
        if self.reject_all {
            return Err(DeviceError::Disconnected);
        }
        if rejected {
            return Err(DeviceError::Rejected(command.to_string()));
        }
        self.commands.push(command);
        Ok(())
    }
}

impl Device for RecordingDevice {
    fn load(&mut self, item: ItemId, locator: &str) -> Result<(), DeviceError> {
        let reject = self.reject_load;
        self.record(
            DeviceCommand::Load {
                item,
                locator: locator.to_string(),
            },
            reject,
        )
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        let reject = self.reject_play;
        self.record(DeviceCommand::Play, reject)
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        self.record(DeviceCommand::Pause, false)
    }

    fn seek(&mut self, position: f64) -> Result<(), DeviceError> {
        let reject = self.reject_seek;
        self.record(DeviceCommand::Seek(position), reject)
    }

    fn set_loop(&mut self, enabled: bool) -> Result<(), DeviceError> {
        self.record(DeviceCommand::SetLoop(enabled), false)
    }
}
