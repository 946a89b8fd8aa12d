//! Hotkey dispatch thread.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use super::{HotkeyError, HotkeyKey};

type Callback = Arc<dyn Fn() + Send + Sync>;
type CallbackMap = Arc<Mutex<HashMap<HotkeyKey, Callback>>>;

/// Blocking producer of key-down events.
pub trait KeyEventSource: Send + 'static {
    type Stopper: KeyEventStopper;

    /// Handle that wakes [`run`](Self::run) from another thread.
    fn stopper(&self) -> Self::Stopper;

    /// Block on the calling thread, passing the virtual-key code of every
    /// key press to `on_key`, until stopped.
    fn run(self, on_key: &mut dyn FnMut(u32)) -> Result<(), HotkeyError>;
}

/// Makes a running [`KeyEventSource`] return. Safe to call more than once and
/// before the source has started.
pub trait KeyEventStopper: Send + 'static {
    fn stop(&self);
}

struct Running {
    stopper: Box<dyn KeyEventStopper>,
    handle: JoinHandle<()>,
}

/// Maps hotkeys to callbacks and runs them on a dedicated thread.
pub struct HotkeyListener {
    callbacks: CallbackMap,
    running: Mutex<Option<Running>>,
}

impl Default for HotkeyListener {
    fn default() -> Self {
        Self::new()
    }
}

impl HotkeyListener {
    pub fn new() -> Self {
        Self {
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            running: Mutex::new(None),
        }
    }

    /// Bind `callback` to `key`, replacing any previous binding. Takes effect
    /// immediately, also while running.
    pub fn register(&self, key: HotkeyKey, callback: impl Fn() + Send + Sync + 'static) {
        lock(&self.callbacks).insert(key, Arc::new(callback));
        debug!(%key, "registered hotkey");
    }

    /// Remove the binding for `key`. Returns whether one existed.
    pub fn unregister(&self, key: HotkeyKey) -> bool {
        let removed = lock(&self.callbacks).remove(&key).is_some();
        debug!(%key, removed, "unregistered hotkey");
        removed
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Start dispatching events from `source` on a background thread. Does
    /// nothing if the listener is already running.
    pub fn start<S: KeyEventSource>(&self, source: S) -> Result<(), HotkeyError> {
        let mut running = lock(&self.running);
        if running.is_some() {
            warn!("hotkey listener already running");
            return Ok(());
        }

        let stopper = source.stopper();
        let callbacks = Arc::clone(&self.callbacks);
        let handle = thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                let mut on_key = |code: u32| dispatch(&callbacks, code);
                if let Err(err) = source.run(&mut on_key) {
                    error!(%err, "hotkey event loop exited with error");
                }
                debug!("hotkey event loop finished");
            })?;

        *running = Some(Running {
            stopper: Box::new(stopper),
            handle,
        });
        info!("hotkey listener started");
        Ok(())
    }

    /// Stop the event loop and wait for the thread to exit. No callback runs
    /// after this returns. Idempotent.
    pub fn stop(&self) {
        let Some(running) = lock(&self.running).take() else {
            return;
        };

        running.stopper.stop();
        if running.handle.thread().id() == thread::current().id() {
            // Called from a callback; the loop exits once it returns
            warn!("hotkey listener stopped from its own thread");
            return;
        }
        if running.handle.join().is_err() {
            error!("hotkey listener thread panicked");
        }
        info!("hotkey listener stopped");
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch(callbacks: &CallbackMap, code: u32) {
    let Some(key) = HotkeyKey::from_vk_code(code) else {
        return;
    };
    // Clone out so a callback can re-register without deadlocking
    let Some(callback) = lock(callbacks).get(&key).cloned() else {
        debug!(%key, "no callback bound");
        return;
    };

    debug!(%key, "hotkey pressed");
    if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
        error!(%key, "hotkey callback panicked");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::Duration;

    /// Key source driven by a channel; `None` stops it.
    pub(crate) struct ChannelKeySource {
        tx: Sender<Option<u32>>,
        rx: Receiver<Option<u32>>,
    }

    pub(crate) struct ChannelStopper(Sender<Option<u32>>);

    impl KeyEventStopper for ChannelStopper {
        fn stop(&self) {
            let _ = self.0.send(None);
        }
    }

    impl ChannelKeySource {
        pub(crate) fn new() -> (Self, Sender<Option<u32>>) {
            let (tx, rx) = mpsc::channel();
            (Self { tx: tx.clone(), rx }, tx)
        }
    }

    impl KeyEventSource for ChannelKeySource {
        type Stopper = ChannelStopper;

        fn stopper(&self) -> ChannelStopper {
            ChannelStopper(self.tx.clone())
        }

        fn run(self, on_key: &mut dyn FnMut(u32)) -> Result<(), HotkeyError> {
            while let Ok(Some(code)) = self.rx.recv() {
                on_key(code);
            }
            Ok(())
        }
    }

    const WAIT: Duration = Duration::from_secs(2);

    fn notify(tx: &Sender<&'static str>, label: &'static str) -> impl Fn() + Send + Sync {
        let tx = Mutex::new(tx.clone());
        move || {
            let _ = tx.lock().unwrap().send(label);
        }
    }

    #[test]
    fn pressed_keys_run_their_callbacks() {
        let listener = HotkeyListener::new();
        let (fired_tx, fired) = mpsc::channel();
        listener.register(HotkeyKey::F23, notify(&fired_tx, "down"));
        listener.register(HotkeyKey::F24, notify(&fired_tx, "up"));

        let (source, keys) = ChannelKeySource::new();
        listener.start(source).unwrap();

        keys.send(Some(0x87)).unwrap();
        keys.send(Some(0x86)).unwrap();
        assert_eq!(fired.recv_timeout(WAIT).unwrap(), "up");
        assert_eq!(fired.recv_timeout(WAIT).unwrap(), "down");

        listener.stop();
    }

    #[test]
    fn unrelated_and_unbound_keys_are_ignored() {
        let listener = HotkeyListener::new();
        let (fired_tx, fired) = mpsc::channel();
        listener.register(HotkeyKey::F24, notify(&fired_tx, "up"));

        let (source, keys) = ChannelKeySource::new();
        listener.start(source).unwrap();

        keys.send(Some(0x41)).unwrap();
        keys.send(Some(0x86)).unwrap();
        keys.send(Some(0x87)).unwrap();
        assert_eq!(fired.recv_timeout(WAIT).unwrap(), "up");
        assert!(fired.try_recv().is_err());

        listener.stop();
    }

    #[test]
    fn unregister_takes_effect_while_running() {
        let listener = HotkeyListener::new();
        let (fired_tx, fired) = mpsc::channel();
        listener.register(HotkeyKey::F24, notify(&fired_tx, "up"));
        listener.register(HotkeyKey::F23, notify(&fired_tx, "down"));

        let (source, keys) = ChannelKeySource::new();
        listener.start(source).unwrap();

        assert!(listener.unregister(HotkeyKey::F24));
        assert!(!listener.unregister(HotkeyKey::F24));
        keys.send(Some(0x87)).unwrap();
        keys.send(Some(0x86)).unwrap();
        assert_eq!(fired.recv_timeout(WAIT).unwrap(), "down");

        listener.stop();
    }

    #[test]
    fn panicking_callback_does_not_kill_listener() {
        let listener = HotkeyListener::new();
        let (fired_tx, fired) = mpsc::channel();
        listener.register(HotkeyKey::F23, || panic!("handler failure"));
        listener.register(HotkeyKey::F24, notify(&fired_tx, "up"));

        let (source, keys) = ChannelKeySource::new();
        listener.start(source).unwrap();

        keys.send(Some(0x86)).unwrap();
        keys.send(Some(0x87)).unwrap();
        assert_eq!(fired.recv_timeout(WAIT).unwrap(), "up");
        assert!(listener.is_running());

        listener.stop();
    }

    #[test]
    fn second_start_is_ignored() {
        let listener = HotkeyListener::new();
        let (first, _first_keys) = ChannelKeySource::new();
        let (second, _second_keys) = ChannelKeySource::new();

        listener.start(first).unwrap();
        listener.start(second).unwrap();
        assert!(listener.is_running());

        listener.stop();
        assert!(!listener.is_running());
    }

    #[test]
    fn stop_is_idempotent_and_silences_callbacks() {
        let listener = HotkeyListener::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        listener.register(HotkeyKey::F24, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        listener.stop();

        let (source, keys) = ChannelKeySource::new();
        listener.start(source).unwrap();
        listener.stop();
        listener.stop();

        let _ = keys.send(Some(0x87));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_restarts_after_stop() {
        let listener = HotkeyListener::new();
        let (fired_tx, fired) = mpsc::channel();
        listener.register(HotkeyKey::F23, notify(&fired_tx, "down"));

        let (source, _keys) = ChannelKeySource::new();
        listener.start(source).unwrap();
        listener.stop();

        let (source, keys) = ChannelKeySource::new();
        listener.start(source).unwrap();
        keys.send(Some(0x86)).unwrap();
        assert_eq!(fired.recv_timeout(WAIT).unwrap(), "down");
        listener.stop();
    }
}
