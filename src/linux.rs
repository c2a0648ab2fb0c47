//! Linux implementation using evdev.
//!
//! evdev gives read access to every keyboard under `/dev/input`, which works
//! on both X11 and Wayland, but it cannot withhold events from other
//! applications: a swallow verdict is logged and the keystroke is delivered
//! anyway. Events are read on a background thread, so the keyboard callback
//! runs there rather than on the installing thread.

use crate::error::PlatformError;
use crate::hotkey::Modifier;
use crate::key::{Key, KeyCode};
use crate::platform::{
    HookHandle, Interceptor, KeyboardCallback, MessageKind, ModifierSampler, RawKeyEvent, Verdict,
};
use anyhow::{anyhow, Context, Result};
use evdev::{AttributeSet, Device};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::collections::HashMap;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Minimum interval between keyboard rescans (shorter for better UX with BT keyboards)
const RESCAN_INTERVAL: Duration = Duration::from_secs(3);

/// Convert our platform-agnostic Key to evdev Key.
fn to_evdev_key(key: Key) -> evdev::Key {
    match key {
        Key::Backspace => evdev::Key::KEY_BACKSPACE,
        Key::Tab => evdev::Key::KEY_TAB,
        Key::Enter => evdev::Key::KEY_ENTER,
        Key::Pause => evdev::Key::KEY_PAUSE,
        Key::CapsLock => evdev::Key::KEY_CAPSLOCK,
        Key::Escape => evdev::Key::KEY_ESC,
        Key::Space => evdev::Key::KEY_SPACE,
        Key::PageUp => evdev::Key::KEY_PAGEUP,
        Key::PageDown => evdev::Key::KEY_PAGEDOWN,
        Key::End => evdev::Key::KEY_END,
        Key::Home => evdev::Key::KEY_HOME,
        Key::Left => evdev::Key::KEY_LEFT,
        Key::Up => evdev::Key::KEY_UP,
        Key::Right => evdev::Key::KEY_RIGHT,
        Key::Down => evdev::Key::KEY_DOWN,
        Key::PrintScreen => evdev::Key::KEY_SYSRQ,
        Key::Insert => evdev::Key::KEY_INSERT,
        Key::Delete => evdev::Key::KEY_DELETE,
        Key::Num0 => evdev::Key::KEY_0,
        Key::Num1 => evdev::Key::KEY_1,
        Key::Num2 => evdev::Key::KEY_2,
        Key::Num3 => evdev::Key::KEY_3,
        Key::Num4 => evdev::Key::KEY_4,
        Key::Num5 => evdev::Key::KEY_5,
        Key::Num6 => evdev::Key::KEY_6,
        Key::Num7 => evdev::Key::KEY_7,
        Key::Num8 => evdev::Key::KEY_8,
        Key::Num9 => evdev::Key::KEY_9,
        Key::A => evdev::Key::KEY_A,
        Key::B => evdev::Key::KEY_B,
        Key::C => evdev::Key::KEY_C,
        Key::D => evdev::Key::KEY_D,
        Key::E => evdev::Key::KEY_E,
        Key::F => evdev::Key::KEY_F,
        Key::G => evdev::Key::KEY_G,
        Key::H => evdev::Key::KEY_H,
        Key::I => evdev::Key::KEY_I,
        Key::J => evdev::Key::KEY_J,
        Key::K => evdev::Key::KEY_K,
        Key::L => evdev::Key::KEY_L,
        Key::M => evdev::Key::KEY_M,
        Key::N => evdev::Key::KEY_N,
        Key::O => evdev::Key::KEY_O,
        Key::P => evdev::Key::KEY_P,
        Key::Q => evdev::Key::KEY_Q,
        Key::R => evdev::Key::KEY_R,
        Key::S => evdev::Key::KEY_S,
        Key::T => evdev::Key::KEY_T,
        Key::U => evdev::Key::KEY_U,
        Key::V => evdev::Key::KEY_V,
        Key::W => evdev::Key::KEY_W,
        Key::X => evdev::Key::KEY_X,
        Key::Y => evdev::Key::KEY_Y,
        Key::Z => evdev::Key::KEY_Z,
        Key::F1 => evdev::Key::KEY_F1,
        Key::F2 => evdev::Key::KEY_F2,
        Key::F3 => evdev::Key::KEY_F3,
        Key::F4 => evdev::Key::KEY_F4,
        Key::F5 => evdev::Key::KEY_F5,
        Key::F6 => evdev::Key::KEY_F6,
        Key::F7 => evdev::Key::KEY_F7,
        Key::F8 => evdev::Key::KEY_F8,
        Key::F9 => evdev::Key::KEY_F9,
        Key::F10 => evdev::Key::KEY_F10,
        Key::F11 => evdev::Key::KEY_F11,
        Key::F12 => evdev::Key::KEY_F12,
        Key::F13 => evdev::Key::KEY_F13,
        Key::F14 => evdev::Key::KEY_F14,
        Key::F15 => evdev::Key::KEY_F15,
        Key::F16 => evdev::Key::KEY_F16,
        Key::F17 => evdev::Key::KEY_F17,
        Key::F18 => evdev::Key::KEY_F18,
        Key::F19 => evdev::Key::KEY_F19,
        Key::F20 => evdev::Key::KEY_F20,
        Key::F21 => evdev::Key::KEY_F21,
        Key::F22 => evdev::Key::KEY_F22,
        Key::F23 => evdev::Key::KEY_F23,
        Key::F24 => evdev::Key::KEY_F24,
        Key::NumLock => evdev::Key::KEY_NUMLOCK,
        Key::ScrollLock => evdev::Key::KEY_SCROLLLOCK,
        Key::VolumeMute => evdev::Key::KEY_MUTE,
        Key::VolumeDown => evdev::Key::KEY_VOLUMEDOWN,
        Key::VolumeUp => evdev::Key::KEY_VOLUMEUP,
        Key::MediaNext => evdev::Key::KEY_NEXTSONG,
        Key::MediaPrevious => evdev::Key::KEY_PREVIOUSSONG,
        Key::MediaStop => evdev::Key::KEY_STOPCD,
        Key::MediaPlayPause => evdev::Key::KEY_PLAYPAUSE,
    }
}

/// evdev scan code -> virtual-key code, for every key in the catalogue.
fn key_code_table() -> HashMap<u16, KeyCode> {
    Key::ALL
        .iter()
        .map(|key| (to_evdev_key(*key).code(), key.code()))
        .collect()
}

/// Find all keyboard devices in /dev/input.
pub fn find_keyboards() -> Result<Vec<Device>> {
    let mut keyboards = Vec::new();

    for entry in std::fs::read_dir("/dev/input").context("Failed to read /dev/input")? {
        let entry = entry?;
        let path = entry.path();

        if !path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false)
        {
            continue;
        }

        if let Ok(device) = Device::open(&path) {
            // Check if device supports keyboard keys
            if device
                .supported_keys()
                .map(|keys| keys.contains(evdev::Key::KEY_A))
                .unwrap_or(false)
            {
                log::debug!("Found keyboard: {:?} at {:?}", device.name(), path);
                keyboards.push(device);
            }
        }
    }

    if keyboards.is_empty() {
        Err(anyhow!(
            "No keyboards found. Make sure you're in the 'input' group or running as root."
        ))
    } else {
        Ok(keyboards)
    }
}

/// Set non-blocking mode on keyboard devices.
fn set_nonblocking(keyboards: &[Device]) -> Result<()> {
    for device in keyboards {
        let fd = device.as_raw_fd();
        let flags = fcntl(fd, FcntlArg::F_GETFL).context("Failed to get fd flags")?;
        let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
        fcntl(fd, FcntlArg::F_SETFL(flags)).context("Failed to set non-blocking")?;
    }
    Ok(())
}

fn would_block(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EAGAIN) || e.raw_os_error() == Some(libc::EWOULDBLOCK)
}

/// Drain any stale events so a freshly opened keyboard starts clean.
fn drain_events(keyboards: &mut [Device]) {
    for device in keyboards.iter_mut() {
        let device_name = device.name().map(String::from);
        loop {
            match device.fetch_events() {
                Ok(events) => {
                    let count = events.count();
                    if count == 0 {
                        break;
                    }
                    log::debug!("Drained {} stale events from {:?}", count, device_name);
                }
                Err(e) => {
                    if !would_block(&e) {
                        log::debug!("Error draining events from {:?}: {}", device_name, e);
                    }
                    break;
                }
            }
        }
    }
}

fn open_keyboards() -> Result<Vec<Device>> {
    let mut keyboards = find_keyboards()?;
    set_nonblocking(&keyboards)?;
    drain_events(&mut keyboards);
    Ok(keyboards)
}

fn message_kind(value: i32) -> Option<MessageKind> {
    match value {
        // 2 is autorepeat, reported as another key-down like Windows does
        1 | 2 => Some(MessageKind::KeyDown),
        0 => Some(MessageKind::KeyUp),
        _ => None,
    }
}

struct Reader {
    handle: HookHandle,
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Interceptor that feeds evdev key events into the keyboard callback.
#[derive(Default)]
pub struct EvdevInterceptor {
    reader: Option<Reader>,
    installs: u64,
}

impl EvdevInterceptor {
    /// Create an interceptor. Devices are opened on install.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Interceptor for EvdevInterceptor {
    fn install(&mut self, callback: KeyboardCallback) -> Result<HookHandle, PlatformError> {
        if self.reader.is_some() {
            return Err(PlatformError::new("evdev reader is already running"));
        }

        let keyboards = open_keyboards().map_err(|e| PlatformError::new(format!("{:#}", e)))?;
        log::info!("Listening on {} keyboard(s)", keyboards.len());

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("hotkey-hook-evdev".to_string())
            .spawn(move || read_keyboards(keyboards, callback, thread_running))
            .map_err(|e| PlatformError::new(format!("Failed to spawn evdev reader: {}", e)))?;

        self.installs += 1;
        let handle = HookHandle::new(self.installs);
        self.reader = Some(Reader {
            handle,
            running,
            thread,
        });
        Ok(handle)
    }

    fn uninstall(&mut self, handle: HookHandle) -> Result<(), PlatformError> {
        match &self.reader {
            Some(reader) if reader.handle == handle => {}
            _ => return Err(PlatformError::new("Unknown evdev hook handle")),
        }

        if let Some(reader) = self.reader.take() {
            reader.running.store(false, Ordering::SeqCst);
            if reader.thread.thread().id() == thread::current().id() {
                // Unhooked from inside the callback: the reader stops once the
                // callback returns, and cannot join itself.
                log::debug!("evdev reader detached from its own thread");
            } else if reader.thread.join().is_err() {
                // The reader exits within one poll interval; a panic there still means it is gone.
                log::warn!("evdev reader thread panicked");
            }
        }
        Ok(())
    }
}

impl Drop for EvdevInterceptor {
    fn drop(&mut self) {
        if let Some(reader) = &self.reader {
            reader.running.store(false, Ordering::SeqCst);
        }
    }
}

fn read_keyboards(
    mut keyboards: Vec<Device>,
    mut callback: KeyboardCallback,
    running: Arc<AtomicBool>,
) {
    let codes = key_code_table();
    let mut last_rescan = Instant::now();
    let mut had_error = false;

    while running.load(Ordering::Relaxed) {
        if had_error && last_rescan.elapsed() >= RESCAN_INTERVAL {
            log::info!("Keyboard error detected, rescanning devices...");
            // Give devices time to fully initialize (especially important for BT keyboards)
            thread::sleep(Duration::from_millis(100));
            match open_keyboards() {
                Ok(new_keyboards) => {
                    log::info!(
                        "Keyboards reconnected: found {} device(s)",
                        new_keyboards.len()
                    );
                    keyboards = new_keyboards;
                    had_error = false;
                }
                Err(e) => log::warn!("Failed to rescan keyboards: {:#}", e),
            }
            last_rescan = Instant::now();
        }

        for device in keyboards.iter_mut() {
            let events = match device.fetch_events() {
                Ok(events) => events,
                Err(e) => {
                    if !would_block(&e) {
                        log::debug!("Keyboard read error: {}", e);
                        had_error = true;
                    }
                    continue;
                }
            };

            for event in events {
                // A handler may have unhooked while this batch was being delivered
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let evdev::InputEventKind::Key(key) = event.kind() else {
                    continue;
                };
                let Some(kind) = message_kind(event.value()) else {
                    continue;
                };
                let Some(code) = codes.get(&key.code()) else {
                    continue;
                };

                let raw = RawKeyEvent::new(kind, *code);
                if callback(&raw) == Verdict::Swallow {
                    log::debug!("evdev cannot swallow {}, event was delivered", code);
                }
            }
        }

        thread::sleep(Duration::from_millis(10));
    }
}

/// Anything that can report which keys are held right now.
trait KeyStateSource: Send {
    fn key_state(&self) -> std::io::Result<AttributeSet<evdev::Key>>;
}

impl KeyStateSource for Device {
    fn key_state(&self) -> std::io::Result<AttributeSet<evdev::Key>> {
        self.get_key_state()
    }
}

type Opener<D> = Box<dyn Fn() -> Result<Vec<D>> + Send>;

/// Keyboards queried for modifier state. A device that stops answering
/// (unplugged, BT reconnect) triggers a reopen, rate limited like the
/// reader's rescan.
struct KeyStates<D> {
    devices: Vec<D>,
    open: Opener<D>,
    last_rescan: Option<Instant>,
}

impl<D: KeyStateSource> KeyStates<D> {
    fn new(devices: Vec<D>, open: Opener<D>) -> Self {
        Self {
            devices,
            open,
            last_rescan: None,
        }
    }

    /// `None` when a device failed and none reported the key held.
    fn query(&self, left: evdev::Key, right: evdev::Key) -> Option<bool> {
        let mut failed = false;
        for device in &self.devices {
            match device.key_state() {
                Ok(state) if state.contains(left) || state.contains(right) => return Some(true),
                Ok(_) => {}
                Err(e) => {
                    log::debug!("Failed to query key state: {}", e);
                    failed = true;
                }
            }
        }
        (!failed).then_some(false)
    }

    fn rescan(&mut self) -> bool {
        if self
            .last_rescan
            .is_some_and(|at| at.elapsed() < RESCAN_INTERVAL)
        {
            return false;
        }
        self.last_rescan = Some(Instant::now());

        match (self.open)() {
            Ok(devices) => {
                log::info!("Reopened {} keyboard(s) for modifier state", devices.len());
                self.devices = devices;
                true
            }
            Err(e) => {
                log::warn!("Failed to reopen keyboards for modifier state: {:#}", e);
                false
            }
        }
    }

    fn is_held(&mut self, left: evdev::Key, right: evdev::Key) -> bool {
        match self.query(left, right) {
            Some(held) => held,
            None if self.rescan() => self.query(left, right).unwrap_or(false),
            None => false,
        }
    }
}

fn modifier_keys(modifier: Modifier) -> (evdev::Key, evdev::Key) {
    match modifier {
        Modifier::Alt => (evdev::Key::KEY_LEFTALT, evdev::Key::KEY_RIGHTALT),
        Modifier::Control => (evdev::Key::KEY_LEFTCTRL, evdev::Key::KEY_RIGHTCTRL),
        Modifier::Shift => (evdev::Key::KEY_LEFTSHIFT, evdev::Key::KEY_RIGHTSHIFT),
    }
}

/// Reads live modifier state from the keyboards with `EVIOCGKEY`.
///
/// Holds its own device handles, reopened when a keyboard disappears.
pub struct EvdevModifierSampler {
    keyboards: Mutex<KeyStates<Device>>,
}

impl EvdevModifierSampler {
    /// Open every keyboard under /dev/input.
    pub fn open() -> Result<Self> {
        let keyboards = KeyStates::new(find_keyboards()?, Box::new(find_keyboards));
        Ok(Self {
            keyboards: Mutex::new(keyboards),
        })
    }
}

impl ModifierSampler for EvdevModifierSampler {
    fn is_pressed(&self, modifier: Modifier) -> bool {
        let (left, right) = modifier_keys(modifier);
        self.keyboards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_held(left, right)
    }
}
