use super::error::SaveError;
use super::SAVE_VERSION;
use crate::catalog::Difficulty;
use crate::ids::{ActivityId, PartyId};
use crate::tickets::FinderState;
use serde::{Deserialize, Serialize};

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use rmp_serde::{from_slice, to_vec_named};
use sha2::{Digest, Sha256};

/// Persisted matchmaking state: one row per party that matters across a
/// restart. Queue and handshake states are deliberately not saved — they
/// are stale the moment the process dies.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FinderSave {
    /// Save format version for migration
    pub version: u32,

    /// Save timestamp (unix milliseconds)
    pub timestamp: u64,

    pub parties: Vec<PartyRow>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PartyRow {
    pub party: PartyId,
    pub activity: Option<ActivityId>,
    pub difficulty: Option<Difficulty>,
    pub state: FinderState,
}

impl Default for FinderSave {
    fn default() -> Self {
        Self::new()
    }
}

impl FinderSave {
    pub fn new() -> Self {
        Self { version: SAVE_VERSION, timestamp: current_timestamp(), parties: Vec::new() }
    }

    pub fn update_timestamp(&mut self) {
        self.timestamp = current_timestamp();
    }

    pub fn validate(&self) -> Result<(), SaveError> {
        // Check for duplicate party rows
        let mut seen = std::collections::HashSet::new();
        for row in &self.parties {
            if !seen.insert(row.party) {
                return Err(SaveError::Corrupted);
            }
        }
        Ok(())
    }
}

/// Serialize and compress finder save data
pub fn serialize_and_compress(save: &FinderSave) -> Result<Vec<u8>, SaveError> {
    // Validate before serialization
    save.validate()?;

    // 1. Serialize to MessagePack with field names
    let msgpack = to_vec_named(save).map_err(SaveError::Serialization)?;

    // 2. Compress with LZ4 (size prepended for easy decompression)
    let compressed = compress_prepend_size(&msgpack);

    // 3. Add SHA256 checksum at the end
    let mut hasher = Sha256::new();
    hasher.update(&compressed);
    let checksum = hasher.finalize();

    let mut result = compressed;
    result.extend_from_slice(&checksum);

    Ok(result)
}

/// Decompress and deserialize finder save data
pub fn decompress_and_deserialize(bytes: &[u8]) -> Result<FinderSave, SaveError> {
    // Check minimum size (header + checksum)
    if bytes.len() < 4 + 32 {
        return Err(SaveError::Corrupted);
    }

    // Split payload and checksum
    let (payload, checksum_bytes) = bytes.split_at(bytes.len() - 32);

    // Verify checksum
    let mut hasher = Sha256::new();
    hasher.update(payload);
    let calculated_checksum = hasher.finalize();

    if &calculated_checksum[..] != checksum_bytes {
        return Err(SaveError::ChecksumMismatch);
    }

    // Decompress
    let msgpack = decompress_size_prepended(payload).map_err(|_| SaveError::Decompression)?;

    // Deserialize
    let save: FinderSave = from_slice(&msgpack).map_err(SaveError::Deserialization)?;

    // Validate version
    if save.version > SAVE_VERSION {
        return Err(SaveError::VersionMismatch { found: save.version, expected: SAVE_VERSION });
    }

    Ok(save)
}

pub fn current_timestamp() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
