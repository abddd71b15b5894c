//! Interface to the flash-persistence collaborator.
//!
//! The physical flash driver is external; the core requires only that the
//! store's erase+program operations run inside a responder suspend/resume
//! bracket, which `PicoRom::commit` arranges.

use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum FlashError {
    #[error("flash program failed in the {region} region")]
    Program { region: &'static str },
}

/// Persistent storage for the ROM image and the configuration record.
pub trait FlashStore {
    /// The committed ROM image, if any.
    fn load_rom(&self) -> Option<Vec<u8>>;

    /// Erase and reprogram the ROM region.
    fn save_rom(&mut self, image: &[u8]) -> Result<(), FlashError>;

    /// The persisted configuration record, if any.
    fn load_config(&self) -> Option<Config>;

    /// Erase and reprogram the config region. Implementations should skip
    /// the write when the record is unchanged to spare erase cycles.
    fn save_config(&mut self, config: &Config) -> Result<(), FlashError>;
}

/// In-memory store, used by tests and host-side tooling.
#[derive(Debug, Default)]
pub struct InMemoryFlash {
    rom: Option<Vec<u8>>,
    config: Option<Config>,
    /// Erase+program cycles on each region, observable by tests.
    pub rom_writes: u32,
    pub config_writes: u32,
}

impl InMemoryFlash {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rom(image: Vec<u8>) -> Self {
        Self {
            rom: Some(image),
            ..Self::default()
        }
    }
}

impl FlashStore for InMemoryFlash {
    fn load_rom(&self) -> Option<Vec<u8>> {
        self.rom.clone()
    }

    fn save_rom(&mut self, image: &[u8]) -> Result<(), FlashError> {
        self.rom = Some(image.to_vec());
        self.rom_writes += 1;
        Ok(())
    }

    fn load_config(&self) -> Option<Config> {
        self.config.clone()
    }

    fn save_config(&mut self, config: &Config) -> Result<(), FlashError> {
        if self.config.as_ref() == Some(config) {
            return Ok(());
        }
        self.config = Some(config.clone());
        self.config_writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoardConfig;

    #[test]
    fn unchanged_config_is_not_rewritten() {
        let mut flash = InMemoryFlash::new();
        let cfg = Config::default_for(&BoardConfig::rom_28p());
        flash.save_config(&cfg).expect("save");
        flash.save_config(&cfg).expect("save");
        assert_eq!(flash.config_writes, 1);

        let mut changed = cfg;
        changed.rom_name = String::from("diag");
        flash.save_config(&changed).expect("save");
        assert_eq!(flash.config_writes, 2);
    }
}
