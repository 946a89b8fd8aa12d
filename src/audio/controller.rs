//! Master volume controller.
//!
//! Owns the one bound playback endpoint and serializes every platform call
//! that touches it behind a single mutex. Device-change notifications arrive
//! on a channel and are applied by a watcher thread, which swaps the bound
//! endpoint under that same mutex, so a caller always talks to either the old
//! endpoint or the new one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, EndpointVolume};
use super::device::{
    clamp_percent, percent_to_scalar, scalar_to_percent, AudioError, DeviceDescriptor, DeviceEvent,
    DeviceState, SYNTHETIC_DEFAULT_ID,
};

/// How often the watcher thread checks for shutdown while idle.
const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The endpoint currently in use.
struct Binding<E> {
    device_id: String,
    endpoint: E,
}

struct Shared<B: AudioBackend> {
    backend: B,
    binding: Mutex<Option<Binding<B::Endpoint>>>,
    stopping: AtomicBool,
}

/// Thread-safe controller for the system master volume.
pub struct VolumeController<B: AudioBackend> {
    shared: Arc<Shared<B>>,
    subscription: Mutex<Option<B::Subscription>>,
    watcher: Option<JoinHandle<()>>,
}

impl<B: AudioBackend> VolumeController<B> {
    /// Bind the preferred device (or the system default) and start listening
    /// for device changes.
    ///
    /// Fails only when no endpoint at all can be bound. Failure to register
    /// for device notifications is logged and the controller works without
    /// hot-swap awareness.
    pub fn new(backend: B, preferred_device: Option<&str>) -> Result<Self, AudioError> {
        let _context = backend.enter_thread()?;
        let initial = match preferred_device {
            Some(device_id) => bind_device(&backend, device_id).or_else(|err| {
                warn!(device_id, %err, "preferred device unavailable, using default");
                bind_default(&backend)
            })?,
            None => bind_default(&backend)?,
        };
        info!(device_id = %initial.device_id, "bound playback endpoint");

        let shared = Arc::new(Shared {
            backend,
            binding: Mutex::new(Some(initial)),
            stopping: AtomicBool::new(false),
        });

        let (events_tx, events_rx) = mpsc::channel();
        let subscription = match shared.backend.subscribe(events_tx) {
            Ok(subscription) => Some(subscription),
            Err(err) => {
                warn!(%err, "device change notifications unavailable");
                None
            }
        };

        let watcher = if subscription.is_some() {
            let watched = Arc::clone(&shared);
            match thread::Builder::new()
                .name("device-watch".to_string())
                .spawn(move || watch_devices(watched, events_rx))
            {
                Ok(handle) => Some(handle),
                Err(err) => {
                    warn!(%err, "failed to spawn device watcher");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            shared,
            subscription: Mutex::new(subscription),
            watcher,
        })
    }

    /// Current master volume in percent. Returns 0 when nothing is bound or
    /// the platform call fails.
    pub fn get_volume(&self) -> u8 {
        self.shared.get_volume()
    }

    /// Set the master volume, clamping `level` to 0..=100. No-op when unbound.
    pub fn set_volume(&self, level: i32) {
        self.shared.set_volume(clamp_percent(level));
    }

    /// Raise the volume by `step` percent and return the level requested.
    ///
    /// This is a read followed by a separate write, not one atomic operation:
    /// a change made by another process between the two is overwritten.
    pub fn volume_up(&self, step: u32) -> u8 {
        let current = i32::from(self.get_volume());
        let target = clamp_percent(current.saturating_add(step_as_i32(step)));
        debug!(current, target, "volume up");
        self.shared.set_volume(target);
        target
    }

    /// Lower the volume by `step` percent and return the level requested.
    ///
    /// Same read-then-write caveat as [`volume_up`](Self::volume_up).
    pub fn volume_down(&self, step: u32) -> u8 {
        let current = i32::from(self.get_volume());
        let target = clamp_percent(current.saturating_sub(step_as_i32(step)));
        debug!(current, target, "volume down");
        self.shared.set_volume(target);
        target
    }

    /// Flip the mute state and return the new state. Returns `false` when
    /// nothing is bound or the platform call fails.
    pub fn toggle_mute(&self) -> bool {
        self.shared.with_endpoint("toggle_mute", false, |endpoint| {
            let muted = !endpoint.mute()?;
            endpoint.set_mute(muted)?;
            info!(muted, "toggled mute");
            Ok(muted)
        })
    }

    /// Current mute state; `false` when unbound.
    pub fn is_muted(&self) -> bool {
        self.shared
            .with_endpoint("is_muted", false, |endpoint| endpoint.mute())
    }

    /// Set the mute state. No-op when unbound.
    pub fn set_mute(&self, muted: bool) {
        self.shared.with_endpoint("set_mute", (), |endpoint| {
            endpoint.set_mute(muted)?;
            debug!(muted, "set mute");
            Ok(())
        });
    }

    /// Enumerate active playback devices, marking the current default.
    ///
    /// On enumeration failure a single synthetic default descriptor is
    /// returned instead.
    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.shared.list_devices()
    }

    /// Bind a specific device. When it cannot be bound, the system default is
    /// bound instead. Returns whether the requested device ended up bound.
    pub fn select_device(&self, device_id: &str) -> bool {
        self.shared.select_device(device_id)
    }

    /// Id of the bound endpoint, if any.
    pub fn bound_device_id(&self) -> Option<String> {
        self.shared
            .lock_binding()
            .as_ref()
            .map(|binding| binding.device_id.clone())
    }
}

impl<B: AudioBackend> Drop for VolumeController<B> {
    fn drop(&mut self) {
        self.shared.stopping.store(true, Ordering::Release);
        let subscription = self
            .subscription
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        drop(subscription.take());
        if let Some(handle) = self.watcher.take() {
            if handle.join().is_err() {
                error!("device watcher thread panicked");
            }
        }
    }
}

impl<B: AudioBackend> Shared<B> {
    fn lock_binding(&self) -> MutexGuard<'_, Option<Binding<B::Endpoint>>> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` against the bound endpoint while holding the lock. Failures
    /// are logged and replaced by `fallback`.
    fn with_endpoint<T>(
        &self,
        op: &'static str,
        fallback: T,
        f: impl FnOnce(&B::Endpoint) -> Result<T, AudioError>,
    ) -> T {
        let guard = self.lock_binding();
        match guard.as_ref() {
            Some(binding) => match f(&binding.endpoint) {
                Ok(value) => value,
                Err(err) => {
                    warn!(op, device_id = %binding.device_id, %err, "volume operation failed");
                    fallback
                }
            },
            None => {
                warn!(op, "no playback endpoint bound");
                fallback
            }
        }
    }

    fn get_volume(&self) -> u8 {
        self.with_endpoint("get_volume", 0, |endpoint| {
            endpoint.volume_scalar().map(scalar_to_percent)
        })
    }

    fn set_volume(&self, level: u8) {
        self.with_endpoint("set_volume", (), |endpoint| {
            endpoint.set_volume_scalar(percent_to_scalar(level))?;
            debug!(level, "set volume");
            Ok(())
        });
    }

    /// Replace the bound endpoint. The previous one is released after the
    /// lock is dropped.
    fn swap(&self, binding: Option<Binding<B::Endpoint>>) {
        let previous = {
            let mut guard = self.lock_binding();
            std::mem::replace(&mut *guard, binding)
        };
        drop(previous);
    }

    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        let enumerated = self.backend.enter_thread().and_then(|_context| {
            let devices = self.backend.enumerate()?;
            let default_id = self.backend.default_device_id().unwrap_or_else(|err| {
                warn!(%err, "failed to query default device");
                None
            });
            Ok(mark_default(devices, default_id.as_deref()))
        });

        match enumerated {
            Ok(devices) => {
                debug!(count = devices.len(), "enumerated playback devices");
                devices
            }
            Err(err) => {
                warn!(%err, "device enumeration failed");
                vec![DeviceDescriptor::synthetic_default()]
            }
        }
    }

    fn select_device(&self, device_id: &str) -> bool {
        let _context = match self.backend.enter_thread() {
            Ok(context) => context,
            Err(err) => {
                warn!(device_id, %err, "cannot switch device");
                return false;
            }
        };

        let requested = if device_id == SYNTHETIC_DEFAULT_ID {
            bind_default(&self.backend)
        } else {
            bind_device(&self.backend, device_id)
        };

        match requested {
            Ok(binding) => {
                info!(device_id = %binding.device_id, "switched playback device");
                self.swap(Some(binding));
                true
            }
            Err(err) => {
                warn!(device_id, %err, "failed to switch device, falling back to default");
                match bind_default(&self.backend) {
                    Ok(binding) => {
                        info!(device_id = %binding.device_id, "bound default playback device");
                        self.swap(Some(binding));
                    }
                    Err(err) => error!(%err, "default device unavailable, keeping current endpoint"),
                }
                false
            }
        }
    }

    fn handle_event(&self, event: DeviceEvent) {
        debug!(?event, "device event");
        match event {
            DeviceEvent::DefaultDeviceChanged {
                device_id: Some(device_id),
            } => self.rebind(Some(device_id.as_str())),
            DeviceEvent::DefaultDeviceChanged { device_id: None } => {
                warn!("no default playback device, releasing endpoint");
                self.swap(None);
            }
            DeviceEvent::DeviceRemoved { device_id } => {
                if self.is_bound_to(&device_id) {
                    info!(%device_id, "bound device removed");
                    self.rebind(None);
                }
            }
            DeviceEvent::DeviceStateChanged {
                device_id,
                new_state,
            } => {
                if new_state != DeviceState::Active && self.is_bound_to(&device_id) {
                    info!(%device_id, ?new_state, "bound device no longer active");
                    self.rebind(None);
                }
            }
            DeviceEvent::DeviceAdded { .. } => {}
        }
    }

    fn is_bound_to(&self, device_id: &str) -> bool {
        self.lock_binding()
            .as_ref()
            .is_some_and(|binding| binding.device_id == device_id)
    }

    /// Resolve a new endpoint on the calling thread and swap it in. The
    /// platform context is held only for the duration of the rebind.
    fn rebind(&self, device_id: Option<&str>) {
        let _context = match self.backend.enter_thread() {
            Ok(context) => context,
            Err(err) => {
                warn!(%err, "cannot rebind playback endpoint");
                return;
            }
        };

        let resolved = match device_id {
            Some(device_id) => bind_device(&self.backend, device_id).or_else(|err| {
                warn!(device_id, %err, "new default device unavailable, querying default");
                bind_default(&self.backend)
            }),
            None => bind_default(&self.backend),
        };

        match resolved {
            Ok(binding) => {
                info!(device_id = %binding.device_id, "rebound playback endpoint");
                self.swap(Some(binding));
            }
            Err(err) => warn!(%err, "failed to rebind playback endpoint"),
        }
    }
}

fn watch_devices<B: AudioBackend>(shared: Arc<Shared<B>>, events: Receiver<DeviceEvent>) {
    debug!("device watcher started");
    while !shared.stopping.load(Ordering::Acquire) {
        match events.recv_timeout(WATCH_POLL_INTERVAL) {
            Ok(event) => shared.handle_event(event),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("device watcher stopped");
}

fn bind_device<B: AudioBackend>(
    backend: &B,
    device_id: &str,
) -> Result<Binding<B::Endpoint>, AudioError> {
    let endpoint = backend.activate(device_id)?;
    Ok(Binding {
        device_id: device_id.to_string(),
        endpoint,
    })
}

fn bind_default<B: AudioBackend>(backend: &B) -> Result<Binding<B::Endpoint>, AudioError> {
    let (device_id, endpoint) = backend.activate_default()?;
    Ok(Binding {
        device_id,
        endpoint,
    })
}

/// Flag exactly one descriptor as default. Falls back to the first device
/// when the reported default is not among the active ones.
fn mark_default(mut devices: Vec<DeviceDescriptor>, default_id: Option<&str>) -> Vec<DeviceDescriptor> {
    let mut found = false;
    for device in &mut devices {
        device.is_default = !found && default_id == Some(device.id.as_str());
        found |= device.is_default;
    }
    if !found {
        if let Some(first) = devices.first_mut() {
            first.is_default = true;
        }
    }
    devices
}

fn step_as_i32(step: u32) -> i32 {
    i32::try_from(step).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::fake::FakeBackend;
    use std::time::Instant;

    fn controller(backend: &FakeBackend) -> VolumeController<FakeBackend> {
        VolumeController::new(backend.clone(), None).unwrap()
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn set_then_get_returns_clamped_level() {
        let backend = FakeBackend::with_devices(&[("spk", "Speakers")], "spk");
        let volume = controller(&backend);

        for (requested, expected) in [(-20, 0), (0, 0), (37, 37), (100, 100), (250, 100)] {
            volume.set_volume(requested);
            assert_eq!(volume.get_volume(), expected, "requested {requested}");
        }
    }

    #[test]
    fn up_then_down_returns_to_start() {
        let backend = FakeBackend::with_devices(&[("spk", "Speakers")], "spk");
        let volume = controller(&backend);
        volume.set_volume(50);

        assert_eq!(volume.volume_up(2), 52);
        assert_eq!(volume.get_volume(), 52);
        assert_eq!(volume.volume_down(2), 50);
        assert_eq!(volume.get_volume(), 50);
    }

    #[test]
    fn steps_clamp_at_the_boundaries() {
        let backend = FakeBackend::with_devices(&[("spk", "Speakers")], "spk");
        let volume = controller(&backend);

        volume.set_volume(99);
        assert_eq!(volume.volume_up(2), 100);
        assert_eq!(volume.get_volume(), 100);

        volume.set_volume(1);
        assert_eq!(volume.volume_down(2), 0);
        assert_eq!(volume.get_volume(), 0);

        assert_eq!(volume.volume_up(u32::MAX), 100);
    }

    #[test]
    fn toggle_mute_twice_restores_state() {
        let backend = FakeBackend::with_devices(&[("spk", "Speakers")], "spk");
        let volume = controller(&backend);
        let original = volume.is_muted();

        assert_eq!(volume.toggle_mute(), !original);
        assert_eq!(volume.is_muted(), !original);
        assert_eq!(volume.toggle_mute(), original);
        assert_eq!(volume.is_muted(), original);

        volume.set_mute(true);
        assert!(volume.is_muted());
    }

    #[test]
    fn platform_failures_return_safe_defaults() {
        let backend = FakeBackend::with_devices(&[("spk", "Speakers")], "spk");
        let volume = controller(&backend);
        volume.set_volume(40);
        backend.fail_endpoint_calls(true);

        assert_eq!(volume.get_volume(), 0);
        assert!(!volume.is_muted());
        assert!(!volume.toggle_mute());
        volume.set_volume(80);

        backend.fail_endpoint_calls(false);
        assert_eq!(volume.get_volume(), 40);
    }

    #[test]
    fn construction_fails_without_any_device() {
        let backend = FakeBackend::empty();
        assert!(matches!(
            VolumeController::new(backend, None),
            Err(AudioError::NoDefaultDevice)
        ));
    }

    #[test]
    fn preferred_device_is_bound_when_available() {
        let backend =
            FakeBackend::with_devices(&[("spk", "Speakers"), ("hp", "Headphones")], "spk");
        let volume = VolumeController::new(backend.clone(), Some("hp")).unwrap();
        assert_eq!(volume.bound_device_id().as_deref(), Some("hp"));

        let fallback = VolumeController::new(backend, Some("gone")).unwrap();
        assert_eq!(fallback.bound_device_id().as_deref(), Some("spk"));
    }

    #[test]
    fn list_marks_exactly_one_default() {
        let backend = FakeBackend::with_devices(
            &[("spk", "Speakers"), ("hp", "Headphones"), ("hdmi", "Monitor")],
            "hp",
        );
        let volume = controller(&backend);
        let devices = volume.list_devices();

        assert_eq!(devices.len(), 3);
        let defaults: Vec<_> = devices.iter().filter(|d| d.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, "hp");
        assert_eq!(defaults[0].name, "Headphones");
    }

    #[test]
    fn list_falls_back_to_synthetic_device() {
        let backend = FakeBackend::with_devices(&[("spk", "Speakers")], "spk");
        let volume = controller(&backend);
        backend.fail_enumeration(true);

        assert_eq!(volume.list_devices(), vec![DeviceDescriptor::synthetic_default()]);
    }

    #[test]
    fn mark_default_picks_first_when_default_missing() {
        let devices = vec![DeviceDescriptor::new("a", "A"), DeviceDescriptor::new("b", "B")];
        let marked = mark_default(devices, Some("zzz"));
        assert!(marked[0].is_default);
        assert!(!marked[1].is_default);

        assert!(mark_default(Vec::new(), None).is_empty());
    }

    #[test]
    fn select_device_rebinds() {
        let backend =
            FakeBackend::with_devices(&[("spk", "Speakers"), ("hp", "Headphones")], "spk");
        backend.set_device_scalar("hp", 0.25);
        let volume = controller(&backend);

        assert!(volume.select_device("hp"));
        assert_eq!(volume.bound_device_id().as_deref(), Some("hp"));
        assert_eq!(volume.get_volume(), 25);
    }

    #[test]
    fn select_unknown_device_falls_back_to_default() {
        let backend =
            FakeBackend::with_devices(&[("spk", "Speakers"), ("hp", "Headphones")], "spk");
        let volume = VolumeController::new(backend.clone(), Some("hp")).unwrap();

        assert!(!volume.select_device("missing"));
        assert_eq!(volume.bound_device_id().as_deref(), Some("spk"));
    }

    #[test]
    fn failed_selection_without_default_keeps_binding() {
        let backend =
            FakeBackend::with_devices(&[("spk", "Speakers"), ("hp", "Headphones")], "spk");
        let volume = VolumeController::new(backend.clone(), Some("hp")).unwrap();
        volume.set_volume(35);
        backend.fail_default_activation(true);

        assert!(!volume.select_device("missing"));
        assert_eq!(volume.bound_device_id().as_deref(), Some("hp"));
        assert_eq!(volume.get_volume(), 35);
    }

    #[test]
    fn select_synthetic_device_binds_default() {
        let backend =
            FakeBackend::with_devices(&[("spk", "Speakers"), ("hp", "Headphones")], "spk");
        let volume = VolumeController::new(backend, Some("hp")).unwrap();

        assert!(volume.select_device(SYNTHETIC_DEFAULT_ID));
        assert_eq!(volume.bound_device_id().as_deref(), Some("spk"));
    }

    #[test]
    fn default_change_event_rebinds() {
        let backend =
            FakeBackend::with_devices(&[("spk", "Speakers"), ("hp", "Headphones")], "spk");
        let volume = controller(&backend);

        backend.change_default("hp");
        assert!(wait_for(|| volume.bound_device_id().as_deref() == Some("hp")));
    }

    #[test]
    fn losing_the_default_releases_endpoint() {
        let backend = FakeBackend::with_devices(&[("spk", "Speakers")], "spk");
        let volume = controller(&backend);
        volume.set_volume(60);

        backend.clear_default();
        assert!(wait_for(|| volume.bound_device_id().is_none()));
        assert_eq!(volume.get_volume(), 0);
        assert!(!volume.is_muted());

        backend.change_default("spk");
        assert!(wait_for(|| volume.bound_device_id().as_deref() == Some("spk")));
        assert_eq!(volume.get_volume(), 60);
    }

    #[test]
    fn removing_bound_device_rebinds_to_default() {
        let backend =
            FakeBackend::with_devices(&[("spk", "Speakers"), ("hp", "Headphones")], "spk");
        let volume = VolumeController::new(backend.clone(), Some("hp")).unwrap();

        backend.remove_device("hp");
        assert!(wait_for(|| volume.bound_device_id().as_deref() == Some("spk")));
    }

    #[test]
    fn works_without_notifications() {
        let backend = FakeBackend::with_devices(&[("spk", "Speakers")], "spk");
        backend.fail_subscribe(true);
        let volume = controller(&backend);

        volume.set_volume(64);
        assert_eq!(volume.get_volume(), 64);
    }

    #[test]
    fn reads_during_rebind_see_old_or_new_endpoint() {
        let backend =
            FakeBackend::with_devices(&[("spk", "Speakers"), ("hp", "Headphones")], "spk");
        backend.set_device_scalar("spk", 0.30);
        backend.set_device_scalar("hp", 0.70);
        backend.set_call_delay(Duration::from_micros(200));
        let volume = Arc::new(controller(&backend));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let volume = Arc::clone(&volume);
                thread::spawn(move || {
                    (0..200)
                        .map(|_| volume.get_volume())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for i in 0..50 {
            backend.change_default(if i % 2 == 0 { "hp" } else { "spk" });
            thread::sleep(Duration::from_micros(300));
        }

        for reader in readers {
            for level in reader.join().unwrap() {
                assert!(level == 30 || level == 70, "torn read: {level}");
            }
        }
    }

    #[test]
    fn drop_stops_watcher() {
        let backend = FakeBackend::with_devices(&[("spk", "Speakers")], "spk");
        let volume = controller(&backend);
        drop(volume);

        assert!(!backend.has_live_subscription());
    }
}
