use super::error::SaveError;
use super::format::{decompress_and_deserialize, serialize_and_compress, FinderSave};

use std::fs::{remove_file, rename, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const MAX_SLOT: u8 = 9;

/// Slot-file persistence for finder saves. Writes go to a temp file first
/// and are renamed into place so a crash never leaves a half-written slot.
pub struct SaveManager {
    base_dir: PathBuf,
}

impl SaveManager {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn validate_slot(slot: u8) -> Result<(), SaveError> {
        if slot > MAX_SLOT {
            return Err(SaveError::InvalidSlot { slot: slot as i64 });
        }
        Ok(())
    }

    fn slot_path(&self, slot: u8) -> PathBuf {
        self.base_dir.join(format!("finder_slot_{}.sav", slot))
    }

    /// Save finder state to a specific slot
    pub fn save_to_slot(&self, slot: u8, save: &FinderSave) -> Result<(), SaveError> {
        Self::validate_slot(slot)?;

        let path = self.slot_path(slot);
        self.save_to_path(&path, save)?;

        log::info!("Finder state saved to slot {}", slot);
        Ok(())
    }

    /// Load finder state from a specific slot
    pub fn load_from_slot(&self, slot: u8) -> Result<FinderSave, SaveError> {
        Self::validate_slot(slot)?;

        let path = self.slot_path(slot);
        let save = self.load_from_path(&path)?;

        log::info!("Finder state loaded from slot {}", slot);
        Ok(save)
    }

    pub fn delete_slot(&self, slot: u8) -> Result<(), SaveError> {
        Self::validate_slot(slot)?;

        let path = self.slot_path(slot);
        if path.exists() {
            remove_file(&path)?;
            log::info!("Deleted save slot {}", slot);
        }
        Ok(())
    }

    pub fn slot_exists(&self, slot: u8) -> bool {
        Self::validate_slot(slot).is_ok() && self.slot_path(slot).exists()
    }

    fn save_to_path(&self, path: &Path, save: &FinderSave) -> Result<(), SaveError> {
        let data = serialize_and_compress(save)?;

        std::fs::create_dir_all(&self.base_dir)?;
        let temp = path.with_extension("tmp");
        {
            let mut file = File::create(&temp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        rename(&temp, path)?;

        log::debug!("Saved {} bytes to {:?}", data.len(), path);
        Ok(())
    }

    fn load_from_path(&self, path: &Path) -> Result<FinderSave, SaveError> {
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        log::debug!("Loaded {} bytes from {:?}", data.len(), path);
        decompress_and_deserialize(&data)
    }
}
