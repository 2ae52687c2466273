//! Build state: one pipeline run as it appears on the board.

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One reported build.
///
/// Field names are fixed by the payload format embedded in report comments,
/// so they are renamed explicitly rather than derived from Rust naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Stable identifier of the build run. The merge key.
    #[serde(rename = "ID")]
    pub id: String,

    /// Pipeline or job name.
    #[serde(rename = "Name", default)]
    pub name: String,

    /// Grouping key, usually a release version. Empty means ungrouped.
    #[serde(rename = "Version", default)]
    pub version: String,

    /// Link to the build's detail page. May be empty.
    #[serde(rename = "URL", default)]
    pub url: String,

    #[serde(rename = "Symbol", default)]
    pub symbol: Symbol,

    /// When the build started. `None` means not yet started.
    #[serde(
        rename = "StartTime",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "zero_time::deserialize"
    )]
    pub start_time: Option<Timestamp>,

    /// When this record was last written.
    #[serde(rename = "LastUpdate")]
    pub last_update: Timestamp,
}

/// Reported status of a build.
///
/// An open set: status strings that don't name a known variant are kept
/// verbatim in `Other` and rendered literally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Symbol {
    #[default]
    NotStarted,
    InProgress,
    Succeeded,
    Failed,
    Other(String),
}

impl Symbol {
    /// Map a raw pipeline status to a symbol.
    ///
    /// Accepts the Azure Pipelines `Agent.JobStatus` values as well as the
    /// manual `InProgress` and `NotStarted` values.
    pub fn from_status(raw: &str) -> Self {
        match raw {
            "Succeeded" | "SucceededWithIssues" => Self::Succeeded,
            "Failed" | "Canceled" => Self::Failed,
            "InProgress" => Self::InProgress,
            "NotStarted" => Self::NotStarted,
            other => Self::Other(other.to_string()),
        }
    }

    /// The name stored in the serialized payload.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::InProgress => "InProgress",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Other(raw) => raw,
        }
    }

    /// Parse a stored name. Unknown names become `Other`.
    fn from_stored(name: String) -> Self {
        match name.as_str() {
            "NotStarted" => Self::NotStarted,
            "InProgress" => Self::InProgress,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Other(name),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from_stored)
    }
}

/// Reads the zero-time sentinel as `None`.
///
/// Older boards were written by a tool that stored unset times as
/// `0001-01-01T00:00:00Z`; empty strings and `null` are accepted too.
mod zero_time {
    use jiff::Timestamp;
    use serde::{Deserialize, Deserializer, de::Error};

    /// `0001-01-01T00:00:00Z` in Unix seconds.
    const ZERO_SECONDS: i64 = -62_135_596_800;

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Timestamp>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        let ts: Timestamp = raw.parse().map_err(D::Error::custom)?;
        if ts.as_second() == ZERO_SECONDS && ts.subsec_nanosecond() == 0 {
            Ok(None)
        } else {
            Ok(Some(ts))
        }
    }
}
