//! Board capability and persisted configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::responder::SampleStrategy;
use crate::rom::ADDR_MASK;

/// Version stamp of the persisted configuration record. A record with any
/// other version is discarded and rebuilt from defaults at boot.
pub const CONFIG_VERSION: u32 = 0x0001_0009;

/// Level driven onto the target's reset line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetLevel {
    Low,
    High,
    /// High impedance (released).
    #[default]
    Z,
}

impl ResetLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
            Self::Z => "z",
        }
    }
}

impl fmt::Display for ResetLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResetLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" | "l" => Ok(Self::Low),
            "high" | "h" => Ok(Self::High),
            "z" => Ok(Self::Z),
            _ => Err(()),
        }
    }
}

/// Hardware capabilities of a board revision, resolved once at startup.
///
/// Capabilities are a plain value so nothing branches on build flags, and
/// the hot path never consults them (the decode plane is built from them
/// at boot).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardConfig {
    /// Populated address lines (18-20 depending on revision).
    pub addr_pins: u32,
    /// External tri-state buffer between the part and the bus.
    pub has_output_buffer: bool,
    /// TCA5405 output expander for LEDs/reset on 32-pin boards.
    pub has_expander: bool,
    /// Dedicated activity LED (older boards without the expander).
    pub has_activity_led: bool,
    /// Clock-counting mailbox extension (1024-byte window).
    pub clock_counting: bool,
    /// Address-sampling strategy for the responder.
    pub sampling: SampleStrategy,
}

impl BoardConfig {
    /// 32-pin board with the TCA5405 expander.
    #[must_use]
    pub fn rom_32p_tca() -> Self {
        Self {
            addr_pins: 19,
            has_output_buffer: true,
            has_expander: true,
            has_activity_led: false,
            clock_counting: false,
            sampling: SampleStrategy::Single,
        }
    }

    /// 32-pin board without the expander, activity LED on a GPIO.
    #[must_use]
    pub fn rom_32p() -> Self {
        Self {
            addr_pins: 18,
            has_output_buffer: true,
            has_expander: false,
            has_activity_led: true,
            clock_counting: false,
            sampling: SampleStrategy::Single,
        }
    }

    /// Original 28-pin board: no buffer, full 20 address lines.
    #[must_use]
    pub fn rom_28p() -> Self {
        Self {
            addr_pins: 20,
            has_output_buffer: false,
            has_expander: false,
            has_activity_led: false,
            clock_counting: false,
            sampling: SampleStrategy::Single,
        }
    }

    #[must_use]
    pub fn with_clock_counting(mut self, enabled: bool) -> Self {
        self.clock_counting = enabled;
        self
    }

    #[must_use]
    pub fn with_sampling(mut self, sampling: SampleStrategy) -> Self {
        self.sampling = sampling;
        self
    }

    /// Widest address mask this board can decode.
    #[must_use]
    pub fn max_addr_mask(&self) -> u32 {
        ((1u32 << self.addr_pins) - 1).min(ADDR_MASK)
    }
}

/// The persisted configuration record (flash config region).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub version: u32,
    /// Device name reported to the host.
    pub name: String,
    /// Name of the committed ROM image.
    pub rom_name: String,
    /// Reset level driven while booting.
    pub initial_reset: ResetLevel,
    /// Reset level driven once the service is up.
    pub default_reset: ResetLevel,
    pub addr_mask: u32,
}

impl Config {
    /// Defaults for a board whose flash holds no valid record.
    #[must_use]
    pub fn default_for(board: &BoardConfig) -> Self {
        Self {
            version: CONFIG_VERSION,
            name: String::from("picorom"),
            rom_name: String::new(),
            initial_reset: ResetLevel::Z,
            default_reset: ResetLevel::Z,
            addr_mask: board.max_addr_mask(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_level_round_trips_through_strings() {
        for level in [ResetLevel::Low, ResetLevel::High, ResetLevel::Z] {
            assert_eq!(level.as_str().parse::<ResetLevel>(), Ok(level));
        }
        assert_eq!("h".parse::<ResetLevel>(), Ok(ResetLevel::High));
        assert!("float".parse::<ResetLevel>().is_err());
    }

    #[test]
    fn board_mask_is_capped_by_buffer_capacity() {
        // 20 address pins could address 1 MiB; the buffer holds 256 KiB.
        assert_eq!(BoardConfig::rom_28p().max_addr_mask(), ADDR_MASK);
        assert_eq!(BoardConfig::rom_32p().max_addr_mask(), 0x3_FFFF);
        assert_eq!(BoardConfig::rom_32p_tca().max_addr_mask(), ADDR_MASK);
    }

    #[test]
    fn default_config_carries_the_version_stamp() {
        let cfg = Config::default_for(&BoardConfig::rom_28p());
        assert_eq!(cfg.version, CONFIG_VERSION);
        assert_eq!(cfg.addr_mask, ADDR_MASK);
    }
}
