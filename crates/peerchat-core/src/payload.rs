//! Transfer payloads carried over a data connection
//!
//! A payload is either plain chat text or a structured record. Records tagged
//! `FILE` carry a file blob plus its name and MIME type. Payloads are encoded
//! with bincode before they are handed to the data channel.

use serde::{Deserialize, Serialize};

use crate::errors::PeerChatResult;

/// File name used when a `FILE` record arrives without one
pub const DEFAULT_FILE_NAME: &str = "fileName";

// ----------------------------------------------------------------------------
// Wire Types
// ----------------------------------------------------------------------------

/// Type tag of a structured record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "FILE")]
    File,
    #[serde(rename = "OTHER")]
    Other,
}

/// Structured record sent alongside plain text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRecord {
    pub data_type: DataType,
    pub file: Option<Vec<u8>>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub message: Option<String>,
}

impl DataRecord {
    /// Build a `FILE` record
    pub fn file(
        bytes: Vec<u8>,
        file_name: impl Into<String>,
        file_type: Option<String>,
    ) -> Self {
        Self {
            data_type: DataType::File,
            file: Some(bytes),
            file_name: Some(file_name.into()),
            file_type,
            message: None,
        }
    }
}

/// Everything that can be sent over a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transfer {
    Text(String),
    Record(DataRecord),
}

impl Transfer {
    pub fn text(text: impl Into<String>) -> Self {
        Transfer::Text(text.into())
    }

    /// Encode for the data channel
    pub fn encode(&self) -> PeerChatResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode bytes received from the data channel
    pub fn decode(bytes: &[u8]) -> PeerChatResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Transfer::Text(_) => "text",
            Transfer::Record(record) => match record.data_type {
                DataType::File => "file",
                DataType::Other => "record",
            },
        }
    }
}

// ----------------------------------------------------------------------------
// Inbound Classification
// ----------------------------------------------------------------------------

/// A received file, ready to be written out by a `FileSink`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDownload {
    pub file_name: String,
    pub file_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Inbound payload as seen by application callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Chat text
    Text(String),
    /// A `FILE` record
    File(FileDownload),
    /// A record with a type tag the application does not act on
    Ignored {
        data_type: DataType,
        file_name: Option<String>,
    },
}

impl From<Transfer> for Inbound {
    fn from(transfer: Transfer) -> Self {
        match transfer {
            Transfer::Text(text) => Inbound::Text(text),
            Transfer::Record(record) => match record.data_type {
                DataType::File => Inbound::File(FileDownload {
                    file_name: record
                        .file_name
                        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
                    file_type: record.file_type,
                    bytes: record.file.unwrap_or_default(),
                }),
                DataType::Other => Inbound::Ignored {
                    data_type: record.data_type,
                    file_name: record.file_name,
                },
            },
        }
    }
}
