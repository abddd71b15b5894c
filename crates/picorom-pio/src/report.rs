//! Access reporter: surfaces bus activity without touching hot-path timing.

/// Raises a sticky flag once per enable-line assertion.
///
/// The flag is never cleared by the hardware; the sole consumer (the
/// activity indicator) observes it and clears it manually. Missing an
/// observation only costs telemetry, never correctness.
pub struct AccessReporter {
    flag: bool,
    prev_asserted: bool,
}

impl AccessReporter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: false,
            prev_asserted: false,
        }
    }

    /// Step the reporter with the current enable-line state.
    pub fn step(&mut self, enable_asserted: bool) {
        if enable_asserted && !self.prev_asserted {
            self.flag = true;
        }
        self.prev_asserted = enable_asserted;
    }

    /// Whether an access has occurred since the last clear.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.flag
    }

    pub fn clear(&mut self) {
        self.flag = false;
    }
}

impl Default for AccessReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_raises_once_per_assertion_edge() {
        let mut rep = AccessReporter::new();
        rep.step(true);
        rep.step(true);
        assert!(rep.pending());
        rep.clear();
        // Still asserted: no new edge, no new flag.
        rep.step(true);
        assert!(!rep.pending());
        rep.step(false);
        rep.step(true);
        assert!(rep.pending());
    }

    #[test]
    fn flag_is_sticky_until_cleared() {
        let mut rep = AccessReporter::new();
        rep.step(true);
        rep.step(false);
        rep.step(false);
        assert!(rep.pending());
        rep.clear();
        assert!(!rep.pending());
    }
}
