use bitflags::bitflags;

bitflags! {
    /// Modifier keys held during a key or mouse event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const SHIFT   = 1 << 0;
        const ALT     = 1 << 1;
        const CONTROL = 1 << 2;
    }
}

impl Modifiers {
    /// xterm's modifier parameter: `1 + Shift(1) + Alt(2) + Ctrl(4)`.
    fn param(self) -> u32 {
        1 + self.contains(Modifiers::SHIFT) as u32
            + if self.contains(Modifiers::ALT) { 2 } else { 0 }
            + if self.contains(Modifiers::CONTROL) { 4 } else { 0 }
    }
}

/// A non-printable key, independent of any particular encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Char(char),
    Enter,
    Backspace,
    Tab,
    Esc,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    Insert,
    Delete,
    PageUp,
    PageDown,
    F(u8),
}

/// Encode a key press into the byte sequence that should be written to the
/// PTY, honoring DECCKM (application cursor keys) for the arrow/Home/End
/// family. Key releases/repeats are the caller's concern; this only handles
/// the "send on press" path xterm-family terminals use.
pub fn encode_key(code: KeyCode, mods: Modifiers, application_cursor_keys: bool) -> Vec<u8> {
    let mod_param = mods.param();
    let alt_prefix = mods.contains(Modifiers::ALT);

    match code {
        KeyCode::Char(mut c) => {
            let mut out = Vec::new();
            if mods.contains(Modifiers::SHIFT) && c.is_ascii_lowercase() {
                c = c.to_ascii_uppercase();
            }
            if mods.contains(Modifiers::CONTROL) {
                if alt_prefix {
                    out.push(0x1b);
                }
                out.push(control_code_for(c));
                return out;
            }
            if alt_prefix {
                out.push(0x1b);
            }
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            out
        }
        KeyCode::Enter => {
            if mod_param > 1 {
                format!("\x1b[13;{}u", mod_param).into_bytes()
            } else if alt_prefix {
                vec![0x1b, b'\r']
            } else {
                vec![b'\r']
            }
        }
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Tab => {
            if mods.contains(Modifiers::SHIFT) {
                b"\x1b[Z".to_vec()
            } else {
                vec![b'\t']
            }
        }
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up | KeyCode::Down | KeyCode::Right | KeyCode::Left | KeyCode::Home | KeyCode::End => {
            let final_byte = match code {
                KeyCode::Up => b'A',
                KeyCode::Down => b'B',
                KeyCode::Right => b'C',
                KeyCode::Left => b'D',
                KeyCode::Home => b'H',
                KeyCode::End => b'F',
                _ => unreachable!(),
            };
            if mod_param == 1 {
                if application_cursor_keys {
                    vec![0x1b, b'O', final_byte]
                } else {
                    vec![0x1b, b'[', final_byte]
                }
            } else {
                format!("\x1b[1;{}{}", mod_param, final_byte as char).into_bytes()
            }
        }
        KeyCode::Insert => tilde_seq(2, mod_param),
        KeyCode::Delete => tilde_seq(3, mod_param),
        KeyCode::PageUp => tilde_seq(5, mod_param),
        KeyCode::PageDown => tilde_seq(6, mod_param),
        KeyCode::F(n) => encode_function_key(n, mod_param),
    }
}

fn encode_function_key(n: u8, mod_param: u32) -> Vec<u8> {
    if (1..=4).contains(&n) {
        let letter = match n {
            1 => b'P',
            2 => b'Q',
            3 => b'R',
            4 => b'S',
            _ => unreachable!(),
        };
        if mod_param == 1 {
            vec![0x1b, b'O', letter]
        } else {
            format!("\x1b[1;{}{}", mod_param, letter as char).into_bytes()
        }
    } else {
        let code = match n {
            5 => 15,
            6 => 17,
            7 => 18,
            8 => 19,
            9 => 20,
            10 => 21,
            11 => 23,
            12 => 24,
            13 => 25,
            14 => 26,
            15 => 28,
            16 => 29,
            17 => 31,
            18 => 32,
            19 => 33,
            20 => 34,
            _ => return Vec::new(),
        };
        if mod_param == 1 {
            format!("\x1b[{}~", code).into_bytes()
        } else {
            format!("\x1b[{};{}~", code, mod_param).into_bytes()
        }
    }
}

fn tilde_seq(code: u32, mod_param: u32) -> Vec<u8> {
    if mod_param == 1 {
        format!("\x1b[{}~", code).into_bytes()
    } else {
        format!("\x1b[{};{}~", code, mod_param).into_bytes()
    }
}

fn control_code_for(c: char) -> u8 {
    let upper = c.to_ascii_uppercase();
    if upper.is_ascii_uppercase() {
        (upper as u8) - b'A' + 1
    } else {
        match c {
            '[' => 0x1b,
            '\\' => 0x1c,
            ']' => 0x1d,
            '^' => 0x1e,
            '_' => 0x1f,
            '?' => 0x7f,
            _ => c as u8,
        }
    }
}

/// Mouse button identity for a press/release/drag event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

/// The kind of mouse activity being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventKind {
    Down(MouseButton),
    Up(MouseButton),
    Drag(MouseButton),
    Moved,
    ScrollUp,
    ScrollDown,
}

/// Encode a mouse event using SGR extended mouse reporting (mode 1006).
/// `col`/`row` are 0-based; SGR wants 1-based.
pub fn encode_mouse_sgr(kind: MouseEventKind, col: u16, row: u16, mods: Modifiers) -> Vec<u8> {
    let mod_offset = if mods.contains(Modifiers::SHIFT) { 4 } else { 0 }
        + if mods.contains(Modifiers::ALT) { 8 } else { 0 }
        + if mods.contains(Modifiers::CONTROL) { 16 } else { 0 };

    let (base_button, final_char) = match kind {
        MouseEventKind::Down(b) => (button_code(b), 'M'),
        MouseEventKind::Up(b) => (button_code(b), 'm'),
        MouseEventKind::Drag(b) => (button_code(b) + 32, 'M'),
        MouseEventKind::Moved => (3 + 32, 'M'),
        MouseEventKind::ScrollUp => (1 << 6, 'M'),
        MouseEventKind::ScrollDown => ((1 << 6) | 1, 'M'),
    };

    let button_code = base_button + mod_offset;
    format!(
        "\x1b[<{};{};{}{}",
        button_code,
        col as u32 + 1,
        row as u32 + 1,
        final_char
    )
    .into_bytes()
}

/// Encode a mouse event using the default/X10 mouse protocol: a fixed
/// three-byte payload `ESC [ M <btn+32> <col+32> <row+32>`. Coordinates
/// and the button byte are single bytes, so values are clipped to 223
/// (255 - 32) before encoding; releases don't carry button identity in
/// this protocol and always report as button 3. `col`/`row` are 0-based.
pub fn encode_mouse_default(kind: MouseEventKind, col: u16, row: u16, mods: Modifiers) -> Vec<u8> {
    let mod_offset = if mods.contains(Modifiers::SHIFT) { 4 } else { 0 }
        + if mods.contains(Modifiers::ALT) { 8 } else { 0 }
        + if mods.contains(Modifiers::CONTROL) { 16 } else { 0 };

    let base_button = match kind {
        MouseEventKind::Down(b) => button_code(b),
        MouseEventKind::Up(_) => 3,
        MouseEventKind::Drag(b) => button_code(b) + 32,
        MouseEventKind::Moved => 3 + 32,
        MouseEventKind::ScrollUp => 1 << 6,
        MouseEventKind::ScrollDown => (1 << 6) | 1,
    };

    let button_byte = (32 + base_button + mod_offset) as u8;
    let col_byte = (32 + (col as u32 + 1).min(223)) as u8;
    let row_byte = (32 + (row as u32 + 1).min(223)) as u8;

    vec![0x1b, b'[', b'M', button_byte, col_byte, row_byte]
}

fn button_code(button: MouseButton) -> u32 {
    match button {
        MouseButton::Left => 0,
        MouseButton::Middle => 1,
        MouseButton::Right => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_char_passes_through_utf8() {
        assert_eq!(encode_key(KeyCode::Char('a'), Modifiers::empty(), false), b"a");
        assert_eq!(encode_key(KeyCode::Char('€'), Modifiers::empty(), false), "€".as_bytes());
    }

    #[test]
    fn ctrl_letter_maps_to_control_code() {
        assert_eq!(
            encode_key(KeyCode::Char('c'), Modifiers::CONTROL, false),
            vec![0x03]
        );
    }

    #[test]
    fn alt_prefixes_with_escape() {
        assert_eq!(
            encode_key(KeyCode::Char('x'), Modifiers::ALT, false),
            vec![0x1b, b'x']
        );
    }

    #[test]
    fn arrow_keys_swap_between_normal_and_application_mode() {
        assert_eq!(
            encode_key(KeyCode::Up, Modifiers::empty(), false),
            b"\x1b[A"
        );
        assert_eq!(
            encode_key(KeyCode::Up, Modifiers::empty(), true),
            b"\x1bOA"
        );
    }

    #[test]
    fn arrow_key_with_modifier_uses_csi_1_param_form() {
        assert_eq!(
            encode_key(KeyCode::Right, Modifiers::SHIFT, true),
            b"\x1b[1;2C"
        );
    }

    #[test]
    fn function_keys_f1_through_f4_use_ss3() {
        assert_eq!(encode_key(KeyCode::F(1), Modifiers::empty(), false), b"\x1bOP");
        assert_eq!(encode_key(KeyCode::F(4), Modifiers::empty(), false), b"\x1bOS");
    }

    #[test]
    fn function_key_f5_uses_tilde_sequence() {
        assert_eq!(encode_key(KeyCode::F(5), Modifiers::empty(), false), b"\x1b[15~");
    }

    #[test]
    fn delete_and_insert_use_tilde_sequences() {
        assert_eq!(encode_key(KeyCode::Insert, Modifiers::empty(), false), b"\x1b[2~");
        assert_eq!(encode_key(KeyCode::Delete, Modifiers::empty(), false), b"\x1b[3~");
    }

    #[test]
    fn sgr_mouse_left_press_and_release() {
        assert_eq!(
            encode_mouse_sgr(MouseEventKind::Down(MouseButton::Left), 9, 4, Modifiers::empty()),
            b"\x1b[<0;10;5M"
        );
        assert_eq!(
            encode_mouse_sgr(MouseEventKind::Up(MouseButton::Left), 9, 4, Modifiers::empty()),
            b"\x1b[<0;10;5m"
        );
    }

    #[test]
    fn sgr_mouse_scroll_wheel() {
        assert_eq!(
            encode_mouse_sgr(MouseEventKind::ScrollUp, 0, 0, Modifiers::empty()),
            b"\x1b[<64;1;1M"
        );
    }

    #[test]
    fn default_mouse_press_and_release() {
        assert_eq!(
            encode_mouse_default(MouseEventKind::Down(MouseButton::Left), 9, 4, Modifiers::empty()),
            vec![0x1b, b'[', b'M', 32, 32 + 10, 32 + 5]
        );
        assert_eq!(
            encode_mouse_default(MouseEventKind::Up(MouseButton::Left), 9, 4, Modifiers::empty()),
            vec![0x1b, b'[', b'M', 32 + 3, 32 + 10, 32 + 5]
        );
    }

    #[test]
    fn default_mouse_clips_coordinates_to_223() {
        let bytes = encode_mouse_default(MouseEventKind::Moved, 500, 500, Modifiers::empty());
        assert_eq!(bytes[4], 32 + 223);
        assert_eq!(bytes[5], 32 + 223);
    }
}
