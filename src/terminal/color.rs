use serde::Serialize;

/// Terminal color representation supporting 16-color, 256-color, and truecolor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl Default for Color {
    fn default() -> Self {
        Color::Default
    }
}

/// Serializable color for IPC transport to the frontend.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SerializableColor {
    Default,
    Indexed { index: u8 },
    Rgb { r: u8, g: u8, b: u8 },
}

impl From<Color> for SerializableColor {
    fn from(c: Color) -> Self {
        match c {
            Color::Default => SerializableColor::Default,
            Color::Indexed(i) => SerializableColor::Indexed { index: i },
            Color::Rgb(r, g, b) => SerializableColor::Rgb { r, g, b },
        }
    }
}

/// The 6 intensity levels used by each channel of the 6x6x6 color cube
/// (indices 16-231). Fixed by the xterm-256color convention.
const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

/// Convert a 256-color index to an RGB tuple.
/// The first 16 are the standard ANSI colors (theme-dependent),
/// 16-231 are a 6x6x6 color cube, 232-255 are a grayscale ramp.
pub fn indexed_to_rgb(index: u8) -> (u8, u8, u8) {
    match index {
        // Standard ANSI colors (Tokyo Night palette)
        0 => (0x15, 0x16, 0x1e),   // black
        1 => (0xf7, 0x76, 0x8e),   // red
        2 => (0x9e, 0xce, 0x6a),   // green
        3 => (0xe0, 0xaf, 0x68),   // yellow
        4 => (0x7a, 0xa2, 0xf7),   // blue
        5 => (0xbb, 0x9a, 0xf7),   // magenta
        6 => (0x7d, 0xcf, 0xff),   // cyan
        7 => (0xa9, 0xb1, 0xd6),   // white
        8 => (0x41, 0x48, 0x68),   // bright black
        9 => (0xff, 0x9e, 0x9e),   // bright red
        10 => (0xb9, 0xf2, 0x7c),  // bright green
        11 => (0xff, 0x9e, 0x64),  // bright yellow
        12 => (0x82, 0xaa, 0xff),  // bright blue
        13 => (0xd4, 0xb0, 0xff),  // bright magenta
        14 => (0xa9, 0xe1, 0xff),  // bright cyan
        15 => (0xc0, 0xca, 0xf5),  // bright white
        // 6x6x6 color cube: index = 16 + 36*r + 6*g + b, each channel in [0, 5]
        16..=231 => {
            let idx = (index - 16) as usize;
            let r = idx / 36;
            let g = (idx % 36) / 6;
            let b = idx % 6;
            (CUBE_LEVELS[r], CUBE_LEVELS[g], CUBE_LEVELS[b])
        }
        // Grayscale ramp: 24 steps, 8 + 10*n
        232..=255 => {
            let v = 8 + 10 * (index - 232);
            (v, v, v)
        }
    }
}

/// Number of distinct palette entries for a given palette size selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub enum PaletteSize {
    Ansi16,
    Xterm256,
}

impl PaletteSize {
    pub fn len(self) -> usize {
        match self {
            PaletteSize::Ansi16 => 16,
            PaletteSize::Xterm256 => 256,
        }
    }
}

impl Default for PaletteSize {
    fn default() -> Self {
        PaletteSize::Xterm256
    }
}

/// Resolve a `Color` against a palette configuration (size + the relevant
/// default index, fg or bg depending on the caller) to a concrete RGB triple,
/// for rendering or IPC serialization.
pub fn resolve_rgb(color: Color, palette: PaletteSize, default_index: u8) -> (u8, u8, u8) {
    match color {
        Color::Default => indexed_to_rgb(default_index),
        Color::Indexed(i) => {
            let i = if (i as usize) < palette.len() { i } else { i % 16 };
            indexed_to_rgb(i)
        }
        Color::Rgb(r, g, b) => (r, g, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_base_corner_is_black() {
        assert_eq!(indexed_to_rgb(16), (0, 0, 0));
    }

    #[test]
    fn cube_opposite_corner_is_white() {
        assert_eq!(indexed_to_rgb(231), (255, 255, 255));
    }

    #[test]
    fn cube_uses_exact_xterm_levels() {
        // index 16 + 36*1 = 52 -> r level 1 (95), g=b=0
        assert_eq!(indexed_to_rgb(52), (95, 0, 0));
        // index 16 + 6*3 = 34 -> g level 3 (175)
        assert_eq!(indexed_to_rgb(34), (0, 175, 0));
    }

    #[test]
    fn grayscale_ramp_endpoints() {
        assert_eq!(indexed_to_rgb(232), (8, 8, 8));
        assert_eq!(indexed_to_rgb(255), (238, 238, 238));
    }

    #[test]
    fn resolve_rgb_passes_through_truecolor() {
        assert_eq!(
            resolve_rgb(Color::Rgb(1, 2, 3), PaletteSize::Xterm256, 0),
            (1, 2, 3)
        );
    }

    #[test]
    fn resolve_rgb_wraps_indexed_outside_16_palette() {
        assert_eq!(
            resolve_rgb(Color::Indexed(200), PaletteSize::Ansi16, 0),
            indexed_to_rgb(200 % 16)
        );
    }
}
