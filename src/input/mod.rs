pub mod keymap;

pub use keymap::{
    encode_key, encode_mouse_default, encode_mouse_sgr, KeyCode, Modifiers, MouseButton,
    MouseEventKind,
};
