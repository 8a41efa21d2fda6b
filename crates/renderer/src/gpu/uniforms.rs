use bytemuck::{Pod, Zeroable};

/// Per-frame program inputs, laid out to match the std140 `Constants` block
/// declared in `Common.glsl`:
///
/// ```glsl
/// uvec2 RenderSize; vec2 MousePosition; uint InputState; float Time;
/// ```
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Constants {
    pub render_size: [u32; 2],
    pub mouse_position: [f32; 2],
    pub input_state: u32,
    pub time: f32,
    pub _padding: [u32; 2],
}

unsafe impl Zeroable for Constants {}
unsafe impl Pod for Constants {}

impl Constants {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            render_size: [width, height],
            ..Self::default()
        }
    }

    pub fn set_render_size(&mut self, width: u32, height: u32) {
        self.render_size = [width, height];
    }

    pub fn set_mouse(&mut self, x: f32, y: f32) {
        self.mouse_position = [x, y];
    }

    pub fn set_input_state(&mut self, state: u32) {
        self.input_state = state;
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.time = seconds;
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

pub(crate) const CONSTANTS_SIZE: u64 = std::mem::size_of::<Constants>() as u64;

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn matches_std140_block_layout() {
        assert_eq!(offset_of!(Constants, render_size), 0);
        assert_eq!(offset_of!(Constants, mouse_position), 8);
        assert_eq!(offset_of!(Constants, input_state), 16);
        assert_eq!(offset_of!(Constants, time), 20);
        assert_eq!(CONSTANTS_SIZE, 32);
    }

    #[test]
    fn bytes_reflect_fields() {
        let mut constants = Constants::new(640, 480);
        constants.set_input_state(0b1001);
        constants.set_time(1.5);
        let bytes = constants.as_bytes();
        assert_eq!(&bytes[0..4], &640u32.to_ne_bytes());
        assert_eq!(&bytes[16..20], &9u32.to_ne_bytes());
        assert_eq!(&bytes[20..24], &1.5f32.to_ne_bytes());
    }
}
