pub mod frame;

pub use frame::{RenderFrame, TerminalEvent};
