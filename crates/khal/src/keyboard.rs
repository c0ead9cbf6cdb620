//! PS/2 keyboard input.
//!
//! Uses the `pc-keyboard` crate for scancode decoding via its three-layer
//! state machine: scancode decoder → modifier tracker → layout mapper.
//! Shift, CapsLock and extended (0xE0-prefixed) keys are handled by the
//! decoder; callers only see finished key presses.

use pc_keyboard::{DecodedKey, HandleControl, KeyCode, Keyboard, ScancodeSet1, layouts};
use spin::Mutex;
use x86_64::instructions::port::Port;

// ── PS/2 controller ports ─────────────────────────────────────────

/// Data port — scancodes are read from here.
const PS2_DATA: u16 = 0x60;

// ── Decoded keys ──────────────────────────────────────────────────

/// A decoded key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Printable character (affected by Shift / CapsLock).
    Char(char),
    /// Non-printable key (arrows, F-keys, ...).
    Raw(KeyCode),
}

type Decoder = Keyboard<layouts::Us104Key, ScancodeSet1>;

// ── Global keyboard state machine ─────────────────────────────────

static DECODER: Mutex<Option<Decoder>> = Mutex::new(None);

fn new_decoder() -> Decoder {
    Keyboard::new(
        ScancodeSet1::new(),
        layouts::Us104Key,
        HandleControl::MapLettersToUnicode,
    )
}

/// Initialise the keyboard state machine.
///
/// Must be called once before [`decode`]; scancodes fed earlier are dropped.
pub fn init() {
    *DECODER.lock() = Some(new_decoder());
}

/// Read the pending scancode from the PS/2 data port.
///
/// Reading also clears the controller's output buffer, which must happen
/// for every keyboard interrupt or the controller stops raising more.
pub fn read_scancode() -> u8 {
    let mut port = Port::<u8>::new(PS2_DATA);
    // SAFETY: reading the PS/2 data port has no effect beyond consuming
    // the byte the controller latched.
    unsafe { port.read() }
}

/// Feed one scancode byte into the state machine.
///
/// Returns the key once a press completes. Releases, modifier-only
/// presses and prefix bytes yield `None`.
pub fn decode(scancode: u8) -> Option<Key> {
    let mut guard = DECODER.lock();
    let decoder = guard.as_mut()?;
    feed(decoder, scancode)
}

fn feed(decoder: &mut Decoder, scancode: u8) -> Option<Key> {
    let event = decoder.add_byte(scancode).ok().flatten()?;
    match decoder.process_keyevent(event)? {
        DecodedKey::Unicode(ch) => Some(Key::Char(ch)),
        DecodedKey::RawKey(code) if is_modifier(code) => None,
        DecodedKey::RawKey(code) => Some(Key::Raw(code)),
    }
}

/// Keys that only change how later keys decode.
fn is_modifier(code: KeyCode) -> bool {
    matches!(
        code,
        KeyCode::LShift
            | KeyCode::RShift
            | KeyCode::LControl
            | KeyCode::RControl
            | KeyCode::LAlt
            | KeyCode::RAltGr
            | KeyCode::LWin
            | KeyCode::RWin
            | KeyCode::CapsLock
            | KeyCode::NumpadLock
            | KeyCode::ScrollLock
    )
}
