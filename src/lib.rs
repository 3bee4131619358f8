//! # Segue - Playback Continuity Engine
//!
//! Segue decides what plays next, given what was just heard and how items
//! relate by content, and it manages the lifecycle of the item currently
//! loaded on an audio device.
//!
//! ## Core modules
//!
//! - [`embedding`] - Content vectors and cosine similarity
//! - [`catalog`] - Read-only library snapshot (playability, sources, metadata)
//! - [`history`] - Bounded ring of recently played items
//! - [`selector`] - Next-item scoring and selection
//! - [`player`] - The playback state machine
//! - [`device`] - Device adapter contract
//! - [`session`] - Serialized mailbox feeding the state machine
//!
//! ### Supporting modules
//!
//! - [`store`] - Snapshot persistence (memory, SQLite)
//! - [`db`] - SQLite catalog loading
//! - [`simulator`] - Threaded fake device for demos and tests
//! - [`config`] - Configuration and data directory management
//! - [`cli`] / [`completion`] - Command-line interface
//!
//! ## Quick Start Example
//!
//! ```
//! use segue::catalog::{Attribute, Catalog, ItemId};
//! use segue::config::PlayerConfig;
//! use segue::device::{DeviceEvent, DeviceEventKind, RecordingDevice};
//! use segue::player::{Action, Library, Player, TransportState};
//!
//! let mut catalog = Catalog::new();
//! for id in 1..=3 {
//!     catalog.set_attribute(ItemId(id), "local_mp3", Attribute::text(format!("{id}.mp3")));
//! }
//! let library = Library::new(&catalog);
//! let mut device = RecordingDevice::new();
//! let mut player = Player::new(&PlayerConfig::default());
//!
//! player.dispatch(Action::play(ItemId(1)), &library, &mut device);
//! player.dispatch(DeviceEvent::new(ItemId(1), DeviceEventKind::Ready).into(), &library, &mut device);
//! assert_eq!(player.transport(), TransportState::Playing);
//!
//! // the track ends: the selector picks something other than item 1
//! player.dispatch(DeviceEvent::new(ItemId(1), DeviceEventKind::Ended).into(), &library, &mut device);
//! assert_ne!(player.state().current(), Some(ItemId(1)));
//! assert_eq!(player.history().last(), Some(ItemId(1)));
//! ```
//!
//! ## Selection
//!
//! Each playable candidate gets a small random term, loses a fixed penalty
//! when it is in the history, and gains its cosine similarity to the most
//! recently played item. The best score wins. See [`selector`].

pub mod catalog;
pub mod cli;
pub mod completion;
pub mod config;
pub mod db;
pub mod device;
pub mod embedding;
pub mod error;
pub mod history;
pub mod player;
pub mod selector;
pub mod session;
pub mod simulator;
pub mod store;
