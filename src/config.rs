use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::terminal::color::PaletteSize;

/// Engine-level terminal configuration: grid size, palette, and the child
/// process to spawn. Host applications own font/theme/UI preferences
/// separately; this struct only covers what the engine itself needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulatorConfig {
    pub cols: u16,
    pub rows: u16,
    /// Maximum scrollback lines retained beyond the visible grid.
    pub max_history_rows: usize,
    pub palette_size: PaletteSize,
    /// Default foreground palette index used when a cell has `Color::Default`.
    pub default_fg: u8,
    /// Default background palette index used when a cell has `Color::Default`.
    pub default_bg: u8,
    /// Whether bold + a basic 30-37 fg color promotes to its bright (+8) form.
    pub bold_is_bright: bool,
    /// Target render/repaint rate, in frames per second.
    pub fps: u32,
    pub mouse_mode: MouseModeDefault,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// Initial mouse reporting mode a session starts in, before the child
/// program negotiates its own via CSI `?100x h/l`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseModeDefault {
    Off,
    Normal,
    ButtonEvent,
    AllMotion,
}

impl Default for MouseModeDefault {
    fn default() -> Self {
        MouseModeDefault::Off
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            max_history_rows: 10_000,
            palette_size: PaletteSize::Xterm256,
            default_fg: 7,
            default_bg: 0,
            bold_is_bright: true,
            fps: 60,
            mouse_mode: MouseModeDefault::Off,
            command: default_shell(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }
}

impl EmulatorConfig {
    /// Load config from the standard config path, falling back to defaults.
    /// Merging with CLI flags or choosing a non-default path is host
    /// application territory.
    pub fn load() -> Self {
        let path = config_path();
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse engine config: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read engine config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard config path.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("tvte")
        .join("config.json")
}
