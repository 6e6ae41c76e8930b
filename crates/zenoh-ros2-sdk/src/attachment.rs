//! Per-sample metadata carried in the Zenoh attachment.
//!
//! Layout (little endian): `i64 sequence_number | i64 source_timestamp |
//! u8 gid_len | gid bytes`, as produced by rmw_zenoh.

use std::io::Cursor;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

const RMW_GID_STORAGE_SIZE: usize = 16;
const ENCODED_LEN: usize = 8 + 8 + 1 + RMW_GID_STORAGE_SIZE;

pub type GidArray = [u8; RMW_GID_STORAGE_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub sequence_number: i64,
    pub source_timestamp: i64,
    pub source_gid: GidArray,
}

impl Attachment {
    /// Attachment stamped with the current wall-clock time.
    pub fn new(sequence_number: i64, source_gid: GidArray) -> Self {
        Self {
            sequence_number,
            source_timestamp: now_ns(),
            source_gid,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENCODED_LEN);
        // Writes into a Vec cannot fail.
        let _ = out.write_i64::<LittleEndian>(self.sequence_number);
        let _ = out.write_i64::<LittleEndian>(self.source_timestamp);
        out.push(RMW_GID_STORAGE_SIZE as u8);
        out.extend_from_slice(&self.source_gid);
        out
    }

    /// Decode an attachment, ignoring trailing bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let short = || Error::Attachment(format!("{} bytes is too short", bytes.len()));
        let mut cursor = Cursor::new(bytes);
        let sequence_number = cursor.read_i64::<LittleEndian>().map_err(|_| short())?;
        let source_timestamp = cursor.read_i64::<LittleEndian>().map_err(|_| short())?;
        let gid_len = cursor.read_u8().map_err(|_| short())? as usize;
        if gid_len != RMW_GID_STORAGE_SIZE {
            return Err(Error::Attachment(format!(
                "expected a {RMW_GID_STORAGE_SIZE}-byte gid, found length {gid_len}"
            )));
        }
        let start = cursor.position() as usize;
        let source_gid = bytes
            .get(start..start + RMW_GID_STORAGE_SIZE)
            .and_then(|gid| GidArray::try_from(gid).ok())
            .ok_or_else(short)?;
        Ok(Self {
            sequence_number,
            source_timestamp,
            source_gid,
        })
    }

    /// Reply attachment for this request: same sequence number and gid, new timestamp.
    pub fn reply(&self) -> Self {
        Self::new(self.sequence_number, self.source_gid)
    }

    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey {
            sequence_number: self.sequence_number,
            gid: self.source_gid,
        }
    }
}

/// Matches a service response to the request that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub sequence_number: i64,
    pub gid: GidArray,
}

pub(crate) fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}
