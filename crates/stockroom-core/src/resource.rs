//! Resource and holder records tracked by the assignment engine.
//!
//! Resources come in two kinds with different capacity policies: a hardware
//! unit is exclusively held (capacity 1, with an explicit status field), a
//! software license has a seat pool. The kind-specific behavior lives on the
//! records themselves behind [`ResourceRecord`] so the engine never branches
//! on a bare type flag.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of a shared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Hardware,
    Software,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware => write!(f, "Hardware"),
            Self::Software => write!(f, "Software"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Hardware" | "hardware" => Ok(Self::Hardware),
            "Software" | "software" => Ok(Self::Software),
            other => Err(CoreError::invalid_resource_kind(other)),
        }
    }
}

/// A typed reference to one resource, e.g. `Hardware#42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceRef {
    pub fn hardware(id: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Hardware,
            id: id.into(),
        }
    }

    pub fn software(id: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Software,
            id: id.into(),
        }
    }

    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

impl FromStr for ResourceRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, id) = s
            .split_once('#')
            .ok_or_else(|| CoreError::validation(format!("Malformed resource ref '{s}'")))?;
        if id.is_empty() {
            return Err(CoreError::invalid_id(s));
        }
        Ok(Self {
            kind: kind.parse()?,
            id: id.to_string(),
        })
    }
}

/// Status of a hardware unit. Flipped in the same commit as the assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareStatus {
    Available,
    Assigned,
}

/// One physical unit, exclusively assignable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareUnit {
    pub id: String,
    pub name: String,
    pub status: HardwareStatus,
    pub archived: bool,
    /// Optimistic-concurrency token, bumped on every committed mutation.
    pub version: u64,
}

impl HardwareUnit {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: HardwareStatus::Available,
            archived: false,
            version: 0,
        }
    }
}

/// One software license with a pool of seats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareLicense {
    pub id: String,
    pub name: String,
    pub total_seats: u32,
    /// Cached count of open assignments; kept equal to the true count by the
    /// commit operations.
    pub used_seats: u32,
    pub archived: bool,
    /// Optimistic-concurrency token, bumped on every committed mutation.
    pub version: u64,
}

impl SoftwareLicense {
    pub fn new(id: impl Into<String>, name: impl Into<String>, total_seats: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            total_seats,
            used_seats: 0,
            archived: false,
            version: 0,
        }
    }
}

/// A holder (person) who can claim resources. Read-only directory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holder {
    pub id: String,
    pub display_name: String,
}

impl Holder {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A resource record of either kind, as read from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResourceRecord {
    Hardware(HardwareUnit),
    Software(SoftwareLicense),
}

impl ResourceRecord {
    pub fn as_ref(&self) -> ResourceRef {
        match self {
            Self::Hardware(h) => ResourceRef::hardware(&h.id),
            Self::Software(s) => ResourceRef::software(&s.id),
        }
    }

    /// Maximum simultaneous open assignments permitted.
    ///
    /// A software license declared with 0 seats remains singly claimable.
    pub fn capacity(&self) -> u32 {
        match self {
            Self::Hardware(_) => 1,
            Self::Software(s) => s.total_seats.max(1),
        }
    }

    pub fn archived(&self) -> bool {
        match self {
            Self::Hardware(h) => h.archived,
            Self::Software(s) => s.archived,
        }
    }

    /// Current concurrency token.
    pub fn version(&self) -> u64 {
        match self {
            Self::Hardware(h) => h.version,
            Self::Software(s) => s.version,
        }
    }
}
