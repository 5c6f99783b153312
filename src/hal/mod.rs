//! Hardware abstraction for the event loop driver
//!
//! The driver blocks in exactly one place: [`Hardware::wait_for_vblank`].
//! Everything else the loop needs from the device is a non-blocking sample
//! of the input state and a monotonic tick counter that paces the timer
//! scheduler. A device port implements [`Hardware`] over its interrupt
//! and register plumbing; [`sim::SimHardware`] is the deterministic
//! desktop implementation.

pub mod sim;

use bitflags::bitflags;

bitflags! {
    /// Physical key bits, as reported by the input registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Buttons: u16 {
        const A      = 1 << 0;
        const B      = 1 << 1;
        const SELECT = 1 << 2;
        const START  = 1 << 3;
        const RIGHT  = 1 << 4;
        const LEFT   = 1 << 5;
        const UP     = 1 << 6;
        const DOWN   = 1 << 7;
        const R      = 1 << 8;
        const L      = 1 << 9;
        const X      = 1 << 10;
        const Y      = 1 << 11;
        const TOUCH  = 1 << 12;
    }
}

/// Face buttons that synthesize `buttondown`/`buttonup` events, with the
/// names scripts see. `TOUCH` is deliberately absent: stylus contact is
/// reported through the touch event family instead.
pub const BUTTON_NAMES: &[(Buttons, &str)] = &[
    (Buttons::A, "A"),
    (Buttons::B, "B"),
    (Buttons::X, "X"),
    (Buttons::Y, "Y"),
    (Buttons::L, "L"),
    (Buttons::R, "R"),
    (Buttons::UP, "Up"),
    (Buttons::DOWN, "Down"),
    (Buttons::LEFT, "Left"),
    (Buttons::RIGHT, "Right"),
    (Buttons::START, "START"),
    (Buttons::SELECT, "SELECT"),
];

/// A stylus position in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TouchPoint {
    pub x: i32,
    pub y: i32,
}

/// An edge on the text-composition keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChange {
    /// `true` for a press, `false` for a release
    pub pressed: bool,
    /// The produced key value (`"a"`, `"Shift"`, ...)
    pub key: String,
    /// The physical key code
    pub code: String,
    /// Whether shift was engaged
    pub shifted: bool,
    /// Whether this is an auto-repeat press
    pub repeat: bool,
}

/// One frame's worth of input state.
#[derive(Debug, Clone, Default)]
pub struct InputSample {
    /// Buttons that went down since the previous sample
    pub pressed: Buttons,
    /// Buttons that went up since the previous sample
    pub released: Buttons,
    /// Buttons currently held
    pub held: Buttons,
    /// Current stylus position while `TOUCH` is held
    pub touch: Option<TouchPoint>,
    /// Key edges produced by the composition keyboard this frame
    pub keys: Vec<KeyChange>,
}

/// The device services the driver consumes.
pub trait Hardware {
    /// Block until the next vertical blank. The single suspension point
    /// of the whole runtime.
    fn wait_for_vblank(&mut self);

    /// Sample the input state once. Edge bits are relative to the
    /// previous call.
    fn sample(&mut self) -> InputSample;

    /// Monotonic hardware tick counter. Timer delays are expressed in
    /// these ticks.
    fn ticks(&self) -> u64;
}

/// Script-visible name of a single button flag.
pub fn button_name(flag: Buttons) -> Option<&'static str> {
    BUTTON_NAMES
        .iter()
        .find(|(bit, _)| *bit == flag)
        .map(|(_, name)| *name)
}
