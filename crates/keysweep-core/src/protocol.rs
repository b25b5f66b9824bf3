//! Parent/worker-process messages
//!
//! Newline-delimited JSON over the child's stdin/stdout. Positions travel as
//! decimal strings since JSON numbers cannot carry a full u128.

use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::results::MatchResult;

/// Parent to worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Test every position in `[start, end)`
    Chunk {
        #[serde(with = "decimal")]
        start: u128,
        #[serde(with = "decimal")]
        end: u128,
    },
    Shutdown,
}

/// Worker to parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerReply {
    /// Filter loaded, ready for chunks
    Ready { loaded: usize },
    Done {
        #[serde(with = "decimal")]
        start: u128,
        #[serde(with = "decimal")]
        end: u128,
    },
    Found {
        result: MatchResult,
        #[serde(with = "decimal")]
        next: u128,
    },
    /// Cancelled before `next` was tested
    Stopped {
        #[serde(with = "decimal")]
        next: u128,
    },
    Error { message: String },
}

/// Write one message and flush
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), ScanError> {
    serde_json::to_writer(&mut *writer, message)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read one message; `None` at end of stream
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>, ScanError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line.trim_end())?))
}

pub(crate) mod decimal {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

pub(crate) mod opt_decimal {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u128>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&value.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u128>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| text.parse().map_err(de::Error::custom))
            .transpose()
    }
}
