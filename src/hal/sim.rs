//! Deterministic hardware simulation
//!
//! [`SimHardware`] replays a scripted sequence of input frames with a
//! fixed tick advance per vblank, so loop behavior can be asserted without
//! real interrupts. `wait_for_vblank` returns immediately; tests measure
//! time in ticks, not wall-clock.

use std::collections::VecDeque;

use super::{Hardware, InputSample};

/// Ticks per simulated frame, roughly one 60 Hz frame of millisecond ticks.
pub const DEFAULT_TICKS_PER_FRAME: u64 = 16;

/// Scripted [`Hardware`] implementation.
#[derive(Debug, Default)]
pub struct SimHardware {
    frames: VecDeque<InputSample>,
    ticks: u64,
    ticks_per_frame: u64,
}

impl SimHardware {
    /// Simulation advancing [`DEFAULT_TICKS_PER_FRAME`] ticks per vblank.
    pub fn new() -> Self {
        Self {
            frames: VecDeque::new(),
            ticks: 0,
            ticks_per_frame: DEFAULT_TICKS_PER_FRAME,
        }
    }

    /// Simulation with a custom tick advance per vblank.
    pub fn with_ticks_per_frame(ticks_per_frame: u64) -> Self {
        Self {
            ticks_per_frame,
            ..Self::new()
        }
    }

    /// Append a scripted input frame. Frames are consumed one per
    /// `sample` call; once exhausted, sampling reports idle input.
    pub fn push_frame(&mut self, frame: InputSample) {
        self.frames.push_back(frame);
    }

    /// Number of scripted frames not yet consumed.
    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }
}

impl Hardware for SimHardware {
    fn wait_for_vblank(&mut self) {
        self.ticks += self.ticks_per_frame;
    }

    fn sample(&mut self) -> InputSample {
        self.frames.pop_front().unwrap_or_default()
    }

    fn ticks(&self) -> u64 {
        self.ticks
    }
}
