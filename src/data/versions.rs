//! Known client version table.
//!
//! Legacy object and sprite files carry no version field, only a 4-byte
//! signature unique to the client build they shipped with. This table maps
//! signatures back to content versions (and the matching item-table minor
//! version). A user-supplied JSON file can replace the built-in table when
//! working with custom client builds.

use std::{fmt, fs, io, path::Path};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientVersion {
    /// Content version value, e.g. 860 for the 8.60 client.
    pub value: u32,
    pub name: String,
    pub dat_signature: u32,
    pub spr_signature: u32,
    /// Minor version written into the root of the server item table.
    pub otb_version: u32,
}

#[derive(Debug, Clone)]
pub struct VersionTable {
    entries: Vec<ClientVersion>,
}

#[derive(Debug)]
pub enum VersionError {
    Io(io::Error),
    Json(serde_json::Error),
}

impl From<io::Error> for VersionError {
    fn from(err: io::Error) -> Self {
        VersionError::Io(err)
    }
}

impl From<serde_json::Error> for VersionError {
    fn from(err: serde_json::Error) -> Self {
        VersionError::Json(err)
    }
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::Io(err) => write!(f, "I/O error: {}", err),
            VersionError::Json(err) => write!(f, "Version table JSON error: {}", err),
        }
    }
}

impl std::error::Error for VersionError {}

fn version_entry(value: u32, name: &str, dat: u32, spr: u32, otb: u32) -> ClientVersion {
    ClientVersion {
        value,
        name: String::from(name),
        dat_signature: dat,
        spr_signature: spr,
        otb_version: otb,
    }
}

impl VersionTable {
    /// The versions the editor knows out of the box, oldest first.
    pub fn builtin() -> VersionTable {
        VersionTable {
            entries: vec![
                version_entry(710, "7.10", 0x3D0D_6F34, 0x3D0D_6E4B, 1),
                version_entry(740, "7.40", 0x3F8C_3F2F, 0x3F8C_3E61, 2),
                version_entry(755, "7.55", 0x4111_84A2, 0x4111_8384, 3),
                version_entry(760, "7.60", 0x439D_5A33, 0x439D_58C6, 5),
                version_entry(772, "7.72", 0x43F7_1E8B, 0x43F7_1D0E, 8),
                version_entry(792, "7.92", 0x459E_7B8C, 0x459E_7A51, 12),
                version_entry(860, "8.60", 0x493D_607A, 0x493D_5F4C, 20),
                version_entry(960, "9.60", 0x4FFA_74CC, 0x4FFA_74F0, 30),
                version_entry(1010, "10.10", 0x52E9_36E7, 0x52E9_35D4, 37),
                version_entry(1050, "10.50", 0x5423_62A5, 0x5423_6180, 42),
                version_entry(1076, "10.76", 0x55AD_1A32, 0x55AD_18F1, 50),
                version_entry(1098, "10.98", 0x56C0_5089, 0x56C0_4E83, 57),
            ],
        }
    }

    /// Loads a replacement table from a JSON array of entries.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<VersionTable, VersionError> {
        let text = fs::read_to_string(path)?;
        let entries: Vec<ClientVersion> = serde_json::from_str(&text)?;
        Ok(VersionTable { entries })
    }

    pub fn entries(&self) -> &[ClientVersion] {
        &self.entries
    }

    pub fn by_value(&self, value: u32) -> Option<&ClientVersion> {
        self.entries.iter().find(|v| v.value == value)
    }

    pub fn by_dat_signature(&self, signature: u32) -> Option<&ClientVersion> {
        self.entries.iter().find(|v| v.dat_signature == signature)
    }

    pub fn by_spr_signature(&self, signature: u32) -> Option<&ClientVersion> {
        self.entries.iter().find(|v| v.spr_signature == signature)
    }
}

impl Default for VersionTable {
    fn default() -> Self {
        VersionTable::builtin()
    }
}
