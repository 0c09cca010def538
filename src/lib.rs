mod config;
mod input;
mod pty;
mod render;
mod shell;
mod sync;
mod terminal;

use std::collections::HashMap;

pub use config::{EmulatorConfig, MouseModeDefault};
pub use input::{
    encode_key, encode_mouse_default, encode_mouse_sgr, KeyCode, Modifiers, MouseButton,
    MouseEventKind,
};
pub use pty::{PtyManager, SpawnResult};
pub use render::{RenderFrame, TerminalEvent};
pub use sync::{PriorityLock, PriorityLockGuard};
pub use terminal::color::{Color, PaletteSize};
pub use terminal::cursor::CursorShape;
pub use terminal::TerminalState;

/// A running terminal session: PTY host plus state machine, with no opinion
/// on windowing or IPC. The host registers closures for the handful of
/// things the engine cannot decide on its own (what a bell sounds like,
/// where clipboard text goes, how to react to exit) and polls or is woken
/// for frames via `notify_render`/the render-pump thread it starts
/// internally.
pub struct Emulator {
    manager: PtyManager,
    session: Option<pty::Session>,
    config: EmulatorConfig,
}

impl Emulator {
    pub fn new(config: EmulatorConfig) -> Self {
        init_tracing();
        Self {
            manager: PtyManager::new(),
            session: None,
            config,
        }
    }

    /// Spawn the configured child process and start the parser/render-pump
    /// threads. `cwd` overrides the engine default (the user's home
    /// directory). `on_frame` is called from the render-pump thread whenever
    /// a new frame is ready; `on_exit` is called once, from the parser
    /// thread, when the child exits.
    pub fn start(
        &mut self,
        cwd: Option<&str>,
        on_frame: impl Fn(RenderFrame) + Send + 'static,
        on_exit: impl FnOnce(Option<i32>) + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let SpawnResult { mut session, reader } = self.manager.spawn_session(&self.config, cwd)?;

        let handles = pty::reader::spawn_pty_threads(
            reader,
            session.state(),
            session.writer(),
            session.child(),
            session.exit_code(),
            on_frame,
            on_exit,
            uuid::Uuid::new_v4().to_string(),
            session.running(),
        );
        session.set_thread_handles(handles.parser, handles.render_pump, handles.render_waker);

        self.session = Some(session);
        Ok(())
    }

    /// Register clipboard callbacks (OSC 52). Call before or after `start`;
    /// if called before, the callbacks survive a RIS reset (`ESC c`).
    /// `default_system_clipboard()` provides an `arboard`-backed pair for
    /// hosts that don't need anything fancier.
    pub fn set_clipboard_callbacks(
        &self,
        on_set: impl Fn(String) + Send + Sync + 'static,
        on_get: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) {
        if let Some(session) = &self.session {
            session
                .state()
                .lock()
                .set_clipboard_callbacks(on_set, on_get);
        }
    }

    pub fn write_input(&self, data: &[u8]) -> Result<(), std::io::Error> {
        match &self.session {
            Some(session) => session.write_input(data),
            None => Ok(()),
        }
    }

    /// Encode a key event with this engine's keymap and write it to the PTY.
    pub fn send_key(&self, code: KeyCode, mods: Modifiers) -> Result<(), std::io::Error> {
        let app_cursor_keys = self
            .session
            .as_ref()
            .map(|s| s.state().lock().modes.cursor_keys_application)
            .unwrap_or(false);
        self.write_input(&encode_key(code, mods, app_cursor_keys))
    }

    /// Encode a mouse event and write it to the PTY, honoring the currently
    /// negotiated mouse tracking mode. Uses the SGR wire format (mode 1006)
    /// when the child has negotiated it, otherwise falls back to the
    /// default/X10 format.
    pub fn send_mouse(
        &self,
        kind: MouseEventKind,
        col: u16,
        row: u16,
        mods: Modifiers,
    ) -> Result<(), std::io::Error> {
        let (tracking, sgr_mouse) = self
            .session
            .as_ref()
            .map(|s| {
                let state = s.state().lock();
                (
                    state.modes.mouse_tracking || state.modes.mouse_motion || state.modes.mouse_all_motion,
                    state.modes.sgr_mouse,
                )
            })
            .unwrap_or((false, false));
        if !tracking {
            return Ok(());
        }
        if sgr_mouse {
            self.write_input(&encode_mouse_sgr(kind, col, row, mods))
        } else {
            self.write_input(&encode_mouse_default(kind, col, row, mods))
        }
    }

    /// Write pasted text, wrapping it in bracketed-paste markers when the
    /// child has requested mode 2004.
    pub fn paste(&self, text: &str) -> Result<(), std::io::Error> {
        let bracketed = self
            .session
            .as_ref()
            .map(|s| s.state().lock().modes.bracketed_paste)
            .unwrap_or(false);
        if bracketed {
            let mut framed = Vec::with_capacity(text.len() + 12);
            framed.extend_from_slice(b"\x1b[200~");
            framed.extend_from_slice(text.as_bytes());
            framed.extend_from_slice(b"\x1b[201~");
            self.write_input(&framed)
        } else {
            self.write_input(text.as_bytes())
        }
    }

    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), Box<dyn std::error::Error>> {
        match &self.session {
            Some(session) => session.resize(rows, cols),
            None => Ok(()),
        }
    }

    pub fn request_full_redraw(&self) {
        if let Some(session) = &self.session {
            session.request_full_redraw();
        }
    }

    /// Take an immediate render snapshot without waiting for the render-pump
    /// tick -- useful right after `start()` to paint the initial frame.
    pub fn snapshot(&self) -> Option<RenderFrame> {
        self.session
            .as_ref()
            .and_then(|s| s.state().lock().take_render_snapshot())
            .map(|snapshot| snapshot.into_frame())
    }

    pub fn kill(&mut self) {
        if let Some(session) = &mut self.session {
            session.kill();
        }
    }
}

/// An `arboard`-backed clipboard callback pair, for hosts that just want
/// the system clipboard and don't need to intercept OSC 52 themselves.
pub fn default_system_clipboard() -> (
    impl Fn(String) + Send + Sync + 'static,
    impl Fn() -> Option<String> + Send + Sync + 'static,
) {
    let on_set = |text: String| {
        if let Ok(mut clipboard) = arboard::Clipboard::new() {
            let _ = clipboard.set_text(text);
        }
    };
    let on_get = || arboard::Clipboard::new().ok()?.get_text().ok();
    (on_set, on_get)
}

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "tvte=info".into()),
            )
            .try_init();
    });
}

/// Build the default engine config merged with an explicit command/args/env,
/// the shape a CLI host typically wants instead of hand-assembling
/// `EmulatorConfig` field by field.
pub fn config_for_command(command: String, args: Vec<String>, env: HashMap<String, String>) -> EmulatorConfig {
    EmulatorConfig {
        command,
        args,
        env,
        ..EmulatorConfig::default()
    }
}

#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_for_command_overrides_defaults_only_where_given() {
        let cfg = config_for_command("bash".into(), vec!["-l".into()], HashMap::new());
        assert_eq!(cfg.command, "bash");
        assert_eq!(cfg.args, vec!["-l".to_string()]);
        assert_eq!(cfg.cols, EmulatorConfig::default().cols);
    }

    #[test]
    fn emulator_with_no_session_is_inert() {
        let emulator = Emulator::new(EmulatorConfig::default());
        assert!(emulator.write_input(b"hi").is_ok());
        assert!(emulator.snapshot().is_none());
    }
}
