//! Sync conflict model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Payload;
use crate::error::{Error, Result};

/// A unique identifier for a conflict record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new unique conflict ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Why client and server disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    VersionMismatch,
    /// Both sides changed the same field(s) since the base
    ConcurrentEdit,
    /// The client edited a record the server no longer has
    DeleteEdit,
    /// The client deleted a record the server has since edited
    EditDelete,
    UniqueConstraint,
}

impl ConflictType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VersionMismatch => "version_mismatch",
            Self::ConcurrentEdit => "concurrent_edit",
            Self::DeleteEdit => "delete_edit",
            Self::EditDelete => "edit_delete",
            Self::UniqueConstraint => "unique_constraint",
        }
    }
}

impl FromStr for ConflictType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "version_mismatch" => Ok(Self::VersionMismatch),
            "concurrent_edit" => Ok(Self::ConcurrentEdit),
            "delete_edit" => Ok(Self::DeleteEdit),
            "edit_delete" => Ok(Self::EditDelete),
            "unique_constraint" => Ok(Self::UniqueConstraint),
            other => Err(Error::InvalidInput(format!("Unknown conflict type: {other}"))),
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution state of a conflict; `Pending` until decided, then terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Pending,
    ClientWins,
    ServerWins,
    Merged,
    Manual,
}

impl Resolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ClientWins => "client_wins",
            Self::ServerWins => "server_wins",
            Self::Merged => "merged",
            Self::Manual => "manual",
        }
    }

    /// `merged` and `manual` carry a caller-supplied payload.
    pub const fn requires_payload(self) -> bool {
        matches!(self, Self::Merged | Self::Manual)
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "client_wins" => Ok(Self::ClientWins),
            "server_wins" => Ok(Self::ServerWins),
            "merged" => Ok(Self::Merged),
            "manual" => Ok(Self::Manual),
            other => Err(Error::InvalidInput(format!("Unknown resolution: {other}"))),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded disagreement between a client change and server state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub id: ConflictId,
    pub facility_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub conflict_type: ConflictType,
    pub client_version: i64,
    /// Server row version at detection (0 when the row was missing)
    pub server_version: i64,
    pub client_timestamp: i64,
    pub server_timestamp: i64,
    pub client_payload: Payload,
    pub server_payload: Payload,
    pub base_payload: Option<Payload>,
    /// Fields both sides changed to different values since the base
    pub conflicting_fields: Vec<String>,
    pub suggested_merge: Option<Payload>,
    pub resolution: Resolution,
    pub resolved_payload: Option<Payload>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<i64>,
    pub resolution_notes: Option<String>,
    /// Client device that pushed the conflicting change
    pub client_id: String,
    /// User that pushed the conflicting change
    pub client_user_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SyncConflict {
    pub const fn is_pending(&self) -> bool {
        matches!(self.resolution, Resolution::Pending)
    }
}

/// A decision to apply to a pending conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub resolution: Resolution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ResolveRequest {
    /// Check the request on its own, before any conflict is loaded.
    pub fn validate(&self) -> Result<()> {
        if self.resolution == Resolution::Pending {
            return Err(Error::InvalidInput(
                "resolution must be one of client_wins, server_wins, merged, manual".into(),
            ));
        }
        if self.resolution.requires_payload() && self.resolved_payload.is_none() {
            return Err(Error::ResolvedPayloadRequired(self.resolution.as_str()));
        }
        Ok(())
    }
}
