//! Simulated audio device.
//!
//! Plays nothing, but behaves like a transport on a background thread: a load
//! reports `Ready`, playback reports a `Tick` per simulated second and `Ended`
//! at the end of the track. Events go into the session mailbox like a real
//! device's callbacks would.

use crate::catalog::{Catalog, ItemId};
use crate::device::{Device, DeviceEvent, DeviceEventKind};
use crate::error::DeviceError;
use crate::session::SessionHandle;
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Simulated length of items without a known duration, seconds.
pub const DEFAULT_TRACK_LENGTH: f64 = 30.0;

#[derive(Debug, Default)]
struct Transport {
    generation: AtomicU64,
    playing: AtomicBool,
    looping: AtomicBool,
    position_bits: AtomicU64,
}

impl Transport {
    fn position(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Acquire))
    }

    fn set_position(&self, position: f64) {
        self.position_bits.store(position.to_bits(), Ordering::Release);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }
}

/// Device that fakes playback on a thread per loaded track.
#[derive(Debug)]
pub struct SimulatedDevice {
    handle: SessionHandle,
    transport: Arc<Transport>,
    current: Option<(ItemId, f64)>,
    lengths: HashMap<ItemId, f64>,
    default_length: f64,
    time_scale: f64,
}

impl SimulatedDevice {
    #[must_use]
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            transport: Arc::new(Transport::default()),
            current: None,
            lengths: HashMap::new(),
            default_length: DEFAULT_TRACK_LENGTH,
            time_scale: 1.0,
        }
    }

    /// Speed factor: 60.0 plays a minute of audio per real second.
    #[must_use]
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        if time_scale.is_finite() && time_scale > 0.0 {
            self.time_scale = time_scale;
        }
        self
    }

    #[must_use]
    pub fn with_default_length(mut self, seconds: f64) -> Self {
        if seconds.is_finite() && seconds > 0.0 {
            self.default_length = seconds;
        }
        self
    }

    /// Take track lengths from the catalog's `duration` attributes.
    #[must_use]
    pub fn with_lengths_from(mut self, catalog: &Catalog) -> Self {
        self.lengths = catalog
            .items()
            .iter()
            .filter_map(|&id| catalog.duration(id).map(|d| (id, d)))
            .collect();
        self
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.time_scale)
    }

    fn emit(&self, kind: DeviceEventKind) -> Result<(), DeviceError> {
        let Some((item, _)) = self.current else {
            return Ok(());
        };
        if self.handle.send(DeviceEvent::new(item, kind)) {
            Ok(())
        } else {
            Err(DeviceError::Disconnected)
        }
    }

    fn spawn_track(&self, item: ItemId, length: f64) {
        let generation = self.transport.generation.load(Ordering::Acquire);
        let transport = Arc::clone(&self.transport);
        let handle = self.handle.clone();
        let interval = self.tick_interval();

        thread::spawn(move || loop {
            thread::sleep(interval);
            if !transport.is_current(generation) {
                trace!("{item} superseded, stopping its clock");
                return;
            }
            if !transport.playing.load(Ordering::Acquire) {
                continue;
            }

            let position = (transport.position() + 1.0).min(length);
            transport.set_position(position);
            let tick = DeviceEventKind::Tick {
                position,
                duration: length,
            };
            if !handle.send(DeviceEvent::new(item, tick)) {
                return;
            }

            if position >= length {
                if transport.looping.load(Ordering::Acquire) {
                    transport.set_position(0.0);
                    continue;
                }
                // stay parked on this item until a replay or the next load
                transport.playing.store(false, Ordering::Release);
                if !handle.send(DeviceEvent::new(item, DeviceEventKind::Ended)) {
                    return;
                }
            }
        });
    }
}

impl Device for SimulatedDevice {
    fn load(&mut self, item: ItemId, locator: &str) -> Result<(), DeviceError> {
        let length = self.lengths.get(&item).copied().unwrap_or(self.default_length);
        debug!("Simulating {item} from {locator} ({length:.0}s)");

        self.transport.generation.fetch_add(1, Ordering::AcqRel);
        self.transport.playing.store(false, Ordering::Release);
        self.transport.set_position(0.0);
        self.current = Some((item, length));

        self.emit(DeviceEventKind::Ready)?;
        self.spawn_track(item, length);
        Ok(())
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        self.transport.playing.store(true, Ordering::Release);
        self.emit(DeviceEventKind::Playing)
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        self.transport.playing.store(false, Ordering::Release);
        self.emit(DeviceEventKind::Paused)
    }

    fn seek(&mut self, position: f64) -> Result<(), DeviceError> {
        let length = self.current.map_or(0.0, |(_, length)| length);
        self.transport.set_position(position.clamp(0.0, length));
        Ok(())
    }

    fn set_loop(&mut self, enabled: bool) -> Result<(), DeviceError> {
        self.transport.looping.store(enabled, Ordering::Release);
        Ok(())
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        // retire the running clock thread
        self.transport.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Action;
    use crate::session::mailbox;
    use std::sync::mpsc::Receiver;

    fn next_event(rx: &Receiver<crate::session::Message>) -> Option<DeviceEvent> {
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(crate::session::Message::Action(Action::Device(event))) => Some(event),
            _ => None,
        }
    }

    #[test]
    fn load_reports_ready() {
        let (handle, inbox) = mailbox();
        let mut device = SimulatedDevice::new(handle).with_time_scale(1000.0);
        device.load(ItemId(4), "storage/4.mp3").expect("accepted");

        let rx = inbox.into_receiver();
        assert_eq!(next_event(&rx), Some(DeviceEvent::new(ItemId(4), DeviceEventKind::Ready)));
    }

    #[test]
    fn playing_track_ticks_then_ends() {
        let (handle, inbox) = mailbox();
        let mut device = SimulatedDevice::new(handle)
            .with_time_scale(1000.0)
            .with_default_length(3.0);
        device.load(ItemId(1), "storage/1.mp3").expect("accepted");
        device.play().expect("accepted");

        let rx = inbox.into_receiver();
        let mut kinds = Vec::new();
        while let Some(event) = next_event(&rx) {
            kinds.push(event.kind);
            if event.kind == DeviceEventKind::Ended {
                break;
            }
        }

        assert_eq!(kinds.first(), Some(&DeviceEventKind::Ready));
        assert_eq!(kinds.last(), Some(&DeviceEventKind::Ended));
        assert!(kinds.contains(&DeviceEventKind::Tick {
            position: 3.0,
            duration: 3.0
        }));
    }

    #[test]
    fn replay_after_end_keeps_clock_running() {
        let (handle, inbox) = mailbox();
        let mut device = SimulatedDevice::new(handle)
            .with_time_scale(1000.0)
            .with_default_length(2.0);
        device.load(ItemId(1), "storage/1.mp3").expect("accepted");
        device.play().expect("accepted");

        let rx = inbox.into_receiver();
        let mut ended = 0;
        while let Some(event) = next_event(&rx) {
            if event.kind == DeviceEventKind::Ended {
                ended += 1;
                if ended == 2 {
                    break;
                }
                device.seek(0.0).expect("accepted");
                device.play().expect("accepted");
            }
        }

        assert_eq!(ended, 2);
    }

    #[test]
    fn single_item_session_ends_repeatedly() {
        let mut catalog = Catalog::new();
        catalog.set_attribute(ItemId(1), "local_mp3", crate::catalog::Attribute::text("1.mp3"));
        catalog.set_attribute(ItemId(1), "duration", crate::catalog::Attribute::integer(2));

        let (handle, inbox) = mailbox();
        let device = SimulatedDevice::new(handle.clone())
            .with_time_scale(1000.0)
            .with_lengths_from(&catalog);
        let config = crate::config::PlayerConfig {
            seed: Some(5),
            ..crate::config::PlayerConfig::default()
        };
        let mut session = crate::session::Session::new(
            crate::player::Player::new(&config),
            catalog,
            device,
            inbox,
        );

        // guard against a stalled clock
        let watchdog = handle.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(5));
            watchdog.shutdown();
        });

        handle.send(Action::TogglePlayback);
        let mut ended = 0;
        while let Some((action, report)) = session.next_dispatch() {
            let is_end = matches!(
                action,
                Action::Device(DeviceEvent {
                    kind: DeviceEventKind::Ended,
                    ..
                })
            );
            if is_end && report.notice.is_none() {
                ended += 1;
                if ended == 2 {
                    break;
                }
            }
        }

        assert_eq!(ended, 2);
        assert_eq!(session.player().state().current(), Some(ItemId(1)));
    }

    #[test]
    fn load_after_session_gone_is_disconnected() {
        let (handle, inbox) = mailbox();
        drop(inbox);
        let mut device = SimulatedDevice::new(handle);
        assert_eq!(device.load(ItemId(1), "x"), Err(DeviceError::Disconnected));
    }
}
