//! Pairing store
//!
//! Persists the local identity and, once paired, the single trusted remote
//! peer across restarts. The store is one small JSON document with a slot
//! for each role's record:
//!
//! - `robocar_*`: a vehicle identity (the local one on the vehicle, the
//!   remembered peer on the companion)
//! - `companion_*`: a companion identity (vice versa)
//!
//! Loads return owned snapshots and saves rewrite the whole document, so a
//! UI reading the store concurrently with a coordinator write never sees a
//! half-updated record. A missing file or a record with missing/invalid
//! required fields loads as `None`; callers respond by generating a fresh
//! identity and saving it.

use crate::identity::{led_colors_to_string, string_to_led_colors, AdvertisingInfo, DiscovererInfo};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    robocar_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    robocar_led_sequence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    robocar_pair_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    companion_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    companion_pair_token: Option<String>,
}

/// File-backed store for identities and the trusted-peer record
pub struct PairingStore {
    path: PathBuf,
}

impl PairingStore {
    /// Create a store backed by the given file, creating parent directories
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Load the stored vehicle identity, `None` if absent or incomplete
    pub fn load_advertising_info(&self) -> Result<Option<AdvertisingInfo>> {
        let record = self.read_record()?;
        let (id, leds) = match (record.robocar_id, record.robocar_led_sequence) {
            (Some(id), Some(leds)) => (id, leds),
            _ => return Ok(None),
        };
        let led_sequence = match string_to_led_colors(&leds) {
            Some(sequence) => sequence,
            None => {
                debug!("stored LED sequence {:?} is invalid; treating record as absent", leds);
                return Ok(None);
            }
        };
        Ok(Some(AdvertisingInfo {
            id,
            led_sequence,
            pair_token: record.robocar_pair_token,
        }))
    }

    /// Save a vehicle identity, clearing the token slot when unpaired
    pub fn save_advertising_info(&self, info: &AdvertisingInfo) -> Result<()> {
        let mut record = self.read_record()?;
        record.robocar_id = Some(info.id.clone());
        record.robocar_led_sequence = Some(led_colors_to_string(&info.led_sequence));
        record.robocar_pair_token = info.pair_token.clone();
        self.write_record(&record)
    }

    /// Remove the vehicle record entirely
    pub fn clear_advertising_info(&self) -> Result<()> {
        let mut record = self.read_record()?;
        record.robocar_id = None;
        record.robocar_led_sequence = None;
        record.robocar_pair_token = None;
        self.write_record(&record)
    }

    /// Load the stored companion identity, `None` if absent
    pub fn load_discoverer_info(&self) -> Result<Option<DiscovererInfo>> {
        let record = self.read_record()?;
        Ok(record.companion_id.map(|id| DiscovererInfo {
            id,
            pair_token: record.companion_pair_token,
        }))
    }

    /// Save a companion identity, clearing the token slot when unpaired
    pub fn save_discoverer_info(&self, info: &DiscovererInfo) -> Result<()> {
        let mut record = self.read_record()?;
        record.companion_id = Some(info.id.clone());
        record.companion_pair_token = info.pair_token.clone();
        self.write_record(&record)
    }

    /// Remove the companion record entirely
    pub fn clear_discoverer_info(&self) -> Result<()> {
        let mut record = self.read_record()?;
        record.companion_id = None;
        record.companion_pair_token = None;
        self.write_record(&record)
    }

    fn read_record(&self) -> Result<StoreRecord> {
        if !self.path.exists() {
            debug!("no pairing store at {:?}", self.path);
            return Ok(StoreRecord::default());
        }
        let json = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn write_record(&self, record: &StoreRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&self.path, json)?;
        info!("saved pairing store to {:?}", self.path);
        Ok(())
    }
}
