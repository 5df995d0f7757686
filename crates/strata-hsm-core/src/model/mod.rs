//! Core HSM domain types shared across the workspace.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extent length meaning "through the end of the file".
pub const EXTENT_EOF: u64 = u64::MAX;

/// Kind of action the coordinator asks a copytool to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// No-op placeholder action.
    None,
    /// Copy file data to the archive backend.
    Archive,
    /// Copy file data back from the archive backend.
    Restore,
    /// Delete the archived copy.
    Remove,
    /// Cancel an action already handed to the copytool.
    Cancel,
}

impl ActionKind {
    /// Decode the coordinator's numeric action code.
    #[must_use]
    pub const fn from_raw(value: u32) -> Option<Self> {
        match value {
            10 => Some(Self::None),
            20 => Some(Self::Archive),
            21 => Some(Self::Restore),
            22 => Some(Self::Remove),
            23 => Some(Self::Cancel),
            _ => None,
        }
    }

    /// Numeric action code understood by the coordinator.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::None => 10,
            Self::Archive => 20,
            Self::Restore => 21,
            Self::Remove => 22,
            Self::Cancel => 23,
        }
    }

    /// Upper-case name used in logs and status output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "NOOP",
            Self::Archive => "ARCHIVE",
            Self::Restore => "RESTORE",
            Self::Remove => "REMOVE",
            Self::Cancel => "CANCEL",
        }
    }
}

impl Display for ActionKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Action requested by a user, as reported by the current-action query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    /// Nothing in progress.
    None,
    /// Archive requested.
    Archive,
    /// Restore requested.
    Restore,
    /// Release of the primary copy requested.
    Release,
    /// Removal of the archived copy requested.
    Remove,
    /// Cancellation requested.
    Cancel,
}

impl UserAction {
    /// Decode the numeric user action code.
    #[must_use]
    pub const fn from_raw(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::None),
            10 => Some(Self::Archive),
            11 => Some(Self::Restore),
            12 => Some(Self::Release),
            13 => Some(Self::Remove),
            14 => Some(Self::Cancel),
            _ => None,
        }
    }

    /// Upper-case name used in status output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "NOOP",
            Self::Archive => "ARCHIVE",
            Self::Restore => "RESTORE",
            Self::Release => "RELEASE",
            Self::Remove => "REMOVE",
            Self::Cancel => "CANCEL",
        }
    }
}

impl Display for UserAction {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Progress of a request as tracked by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    /// Queued, not yet handed to a copytool.
    Waiting,
    /// Handed to a copytool and running.
    Running,
    /// Finished.
    Done,
}

impl ProgressState {
    /// Decode the numeric progress state.
    #[must_use]
    pub const fn from_raw(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Waiting),
            2 => Some(Self::Running),
            3 => Some(Self::Done),
            _ => None,
        }
    }

    /// Upper-case name used in status output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
        }
    }
}

impl Display for ProgressState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Fixed-size file identifier used in place of a path for HSM operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fid {
    /// Sequence number.
    pub seq: u64,
    /// Object id within the sequence.
    pub oid: u32,
    /// Version.
    pub ver: u32,
}

impl Fid {
    #[must_use]
    /// Construct a FID from its parts.
    pub const fn new(seq: u64, oid: u32, ver: u32) -> Self {
        Self { seq, oid, ver }
    }
}

impl Display for Fid {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "[{:#x}:{:#x}:{:#x}]",
            self.seq, self.oid, self.ver
        )
    }
}

/// Failure to parse a FID string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid FID")]
pub struct ParseFidError {
    /// Input that could not be parsed.
    pub input: String,
}

impl FromStr for Fid {
    type Err = ParseFidError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseFidError {
            input: value.to_string(),
        };
        let trimmed = value.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(trimmed);
        let mut parts = inner.split(':');
        let seq = parts.next().and_then(parse_hex_u64).ok_or_else(invalid)?;
        let oid = parts
            .next()
            .and_then(parse_hex_u64)
            .and_then(|part| u32::try_from(part).ok())
            .ok_or_else(invalid)?;
        let ver = parts
            .next()
            .and_then(parse_hex_u64)
            .and_then(|part| u32::try_from(part).ok())
            .ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self { seq, oid, ver })
    }
}

fn parse_hex_u64(part: &str) -> Option<u64> {
    let digits = part
        .strip_prefix("0x")
        .or_else(|| part.strip_prefix("0X"))
        .unwrap_or(part);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Byte range of a file an action applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    /// First byte covered.
    pub offset: u64,
    /// Number of bytes covered; [`EXTENT_EOF`] means through the end of the file.
    pub length: u64,
}

impl Extent {
    #[must_use]
    /// Construct an extent.
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    #[must_use]
    /// Extent from `offset` through the end of the file.
    pub const fn to_eof(offset: u64) -> Self {
        Self {
            offset,
            length: EXTENT_EOF,
        }
    }

    #[must_use]
    /// Whether the extent runs through the end of the file.
    pub const fn reaches_eof(&self) -> bool {
        self.length == EXTENT_EOF
    }

    #[must_use]
    /// Exclusive end offset, or `None` for extents that run to EOF or overflow.
    pub const fn end(&self) -> Option<u64> {
        if self.reaches_eof() {
            None
        } else {
            self.offset.checked_add(self.length)
        }
    }

    #[must_use]
    /// Displayable form of the length honouring the EOF sentinel.
    pub const fn length_display(&self) -> ExtentLength {
        ExtentLength(self.length)
    }
}

impl Display for Extent {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{},{}", self.offset, self.length_display())
    }
}

/// Extent length rendered as `EOF` for the sentinel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentLength(pub u64);

impl Display for ExtentLength {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        if self.0 == EXTENT_EOF {
            formatter.write_str("EOF")
        } else {
            write!(formatter, "{}", self.0)
        }
    }
}

/// Flags passed with progress and end reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ActionFlags(pub i32);

impl ActionFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// The reported extent completes the action.
    pub const COMPLETED: Self = Self(0x01);
    /// Ask the coordinator to retry the action later.
    pub const RETRY: Self = Self(0x02);

    #[must_use]
    /// Raw flag word.
    pub const fn bits(self) -> i32 {
        self.0
    }

    #[must_use]
    /// Whether every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ActionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<i32> for ActionFlags {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// One coordinator-issued action as received in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionItem {
    /// What the coordinator asks for.
    pub kind: ActionKind,
    /// Target file.
    pub fid: Fid,
    /// File that receives data during restores; equals `fid` otherwise.
    pub data_fid: Fid,
    /// Requested byte range.
    pub extent: Extent,
    /// Coordinator cookie identifying the action while it is in flight.
    pub cookie: u64,
    /// Request group id.
    pub gid: u64,
    /// Opaque per-action payload supplied by the requester.
    pub data: Vec<u8>,
}

/// Group of actions delivered by one receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBatch {
    /// Call-level flag word shared by every item.
    pub flags: u64,
    /// Archive backend the batch is addressed to.
    pub archive_id: u32,
    /// Actions in coordinator delivery order.
    pub items: Vec<ActionItem>,
}

/// Point-in-time snapshot of the action in progress for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentActionStatus {
    /// Requested action.
    pub action: UserAction,
    /// Coordinator progress state.
    pub state: ProgressState,
    /// Byte range covered so far.
    pub location: Extent,
}

impl Display for CurrentActionStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let length = self.location.length_display();
        if self.location.reaches_eof() {
            write!(formatter, "[{}:{}] ({length})", self.action, self.state)
        } else {
            write!(formatter, "[{}:{}] ({length}B)", self.action, self.state)
        }
    }
}
