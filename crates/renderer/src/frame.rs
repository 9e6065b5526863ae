//! Frame counter.

/// Monotonic frame counter that maps each frame to its slot in the ring.
///
/// The counter advances exactly once per completed frame; the slot of frame
/// `n` is `n % slots`, so slots are visited round-robin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameCounter {
    frame: u64,
    slots: usize,
}

impl FrameCounter {
    /// Create a counter over `slots` frame slots, starting at frame 0.
    ///
    /// A slot count of zero is treated as one.
    pub fn new(slots: usize) -> Self {
        Self {
            frame: 0,
            slots: slots.max(1),
        }
    }

    /// Number of frames completed so far.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Slot used by the current frame.
    #[inline]
    pub fn slot(&self) -> usize {
        (self.frame % self.slots as u64) as usize
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots
    }

    /// Move on to the next frame.
    #[inline]
    pub fn advance(&mut self) {
        self.frame += 1;
    }
}
