//! Display/input boundary. Any concrete front end (terminal simulator,
//! LCD + GPIO hardware) implements these and the rest of the system
//! never knows the difference.

use anyhow::Result;
use opsdeck_core::Frame;

/// Discrete button vocabulary of the panel: joystick plus three side keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    Press,
    Key1,
    Key2,
    Key3,
}

/// Event produced by an input source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Button(Button),
    Quit,
}

/// Something a finished frame can be pushed to. Must not block
/// indefinitely.
pub trait DisplaySink {
    fn show(&mut self, frame: &Frame) -> Result<()>;
    fn set_backlight(&mut self, on: bool) -> Result<()>;
}
