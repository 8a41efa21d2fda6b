//! Mouse and keyboard state folded into the `InputState` bitmask programs see.
//!
//! Bit layout: 0 left mouse, 1 middle mouse, 2 right mouse, 3 Space, 4 Up,
//! 5 Left, 6 Down, 7 Right, 8 W, 9 A, 10 S, 11 D.
use winit::dpi::PhysicalPosition;
use winit::event::{ElementState, KeyEvent, MouseButton};
use winit::keyboard::{KeyCode, PhysicalKey};

pub const MOUSE_LEFT: u32 = 1 << 0;
pub const MOUSE_MIDDLE: u32 = 1 << 1;
pub const MOUSE_RIGHT: u32 = 1 << 2;
pub const KEY_SPACE: u32 = 1 << 3;
pub const KEY_UP: u32 = 1 << 4;
pub const KEY_LEFT: u32 = 1 << 5;
pub const KEY_DOWN: u32 = 1 << 6;
pub const KEY_RIGHT: u32 = 1 << 7;
pub const KEY_W: u32 = 1 << 8;
pub const KEY_A: u32 = 1 << 9;
pub const KEY_S: u32 = 1 << 10;
pub const KEY_D: u32 = 1 << 11;

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct InputState {
    position: Option<PhysicalPosition<f64>>,
    bits: u32,
}

pub(crate) fn mouse_bit(button: MouseButton) -> Option<u32> {
    match button {
        MouseButton::Left => Some(MOUSE_LEFT),
        MouseButton::Middle => Some(MOUSE_MIDDLE),
        MouseButton::Right => Some(MOUSE_RIGHT),
        _ => None,
    }
}

/// Physical keys are used so WASD stays put on non-QWERTY layouts.
pub(crate) fn key_bit(code: KeyCode) -> Option<u32> {
    match code {
        KeyCode::Space => Some(KEY_SPACE),
        KeyCode::ArrowUp => Some(KEY_UP),
        KeyCode::ArrowLeft => Some(KEY_LEFT),
        KeyCode::ArrowDown => Some(KEY_DOWN),
        KeyCode::ArrowRight => Some(KEY_RIGHT),
        KeyCode::KeyW => Some(KEY_W),
        KeyCode::KeyA => Some(KEY_A),
        KeyCode::KeyS => Some(KEY_S),
        KeyCode::KeyD => Some(KEY_D),
        _ => None,
    }
}

impl InputState {
    pub fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) {
        self.position = Some(position);
    }

    pub fn handle_cursor_left(&mut self) {
        self.position = None;
    }

    pub fn handle_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if let Some(bit) = mouse_bit(button) {
            self.apply(bit, state);
        }
    }

    /// Returns true when the key is one programs can observe.
    pub fn handle_key(&mut self, event: &KeyEvent) -> bool {
        let PhysicalKey::Code(code) = event.physical_key else {
            return false;
        };
        match key_bit(code) {
            Some(bit) => {
                self.apply(bit, event.state);
                true
            }
            None => false,
        }
    }

    /// Drops every held key and button, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.bits = 0;
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Cursor position in render-target pixels (top-left origin), or the
    /// origin when the cursor is outside the window.
    pub fn mouse_position(&self) -> [f32; 2] {
        self.position
            .map(|pos| [pos.x as f32, pos.y as f32])
            .unwrap_or([0.0, 0.0])
    }

    fn apply(&mut self, bit: u32, state: ElementState) {
        match state {
            ElementState::Pressed => self.bits |= bit,
            ElementState::Released => self.bits &= !bit,
        }
    }
}
