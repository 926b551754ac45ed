//! Snapshot container: header, tagged fields, and the [`IoSnapshot`] trait.

pub mod codec;

use std::collections::BTreeMap;

use thiserror::Error;

/// Magic prefix of every device snapshot blob.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"SXSN";

/// Container format version. The major must match exactly on load; the minor
/// is informational.
pub const SNAPSHOT_FORMAT_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

const HEADER_LEN: usize = 16;
const FIELD_HEADER_LEN: usize = 2 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotVersion {
    pub major: u16,
    pub minor: u16,
}

impl SnapshotVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub format_version: SnapshotVersion,
    pub device_id: [u8; 4],
    pub device_version: SnapshotVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot blob does not start with the expected magic")]
    InvalidMagic,
    #[error("snapshot blob ended before a complete value could be read")]
    UnexpectedEof,
    #[error("snapshot blob is structurally invalid")]
    Corrupt,
    #[error("invalid field encoding: {0}")]
    InvalidFieldEncoding(&'static str),
    #[error("device id mismatch: expected {expected:?}, found {found:?}")]
    DeviceIdMismatch { expected: [u8; 4], found: [u8; 4] },
    #[error("unsupported container format version {found:?} (supported {supported:?})")]
    UnsupportedFormatVersion {
        found: SnapshotVersion,
        supported: SnapshotVersion,
    },
    #[error("unsupported device major version {found} (supported {supported})")]
    UnsupportedDeviceMajorVersion { found: u16, supported: u16 },
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Implemented by every device (or device state struct) that can be saved to
/// and restored from a snapshot blob.
pub trait IoSnapshot {
    /// Stable 4CC identifying the device type in the blob header.
    const DEVICE_ID: [u8; 4];
    /// Device payload version. Bump the major for incompatible layout
    /// changes; the minor for additive, skippable fields.
    const DEVICE_VERSION: SnapshotVersion;

    fn save_state(&self) -> Vec<u8>;
    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()>;
}

/// Builds a snapshot blob: header first, then `(tag, len, bytes)` fields in
/// the order they are appended.
pub struct SnapshotWriter {
    buf: Vec<u8>,
}

impl SnapshotWriter {
    pub fn new(device_id: [u8; 4], device_version: SnapshotVersion) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&SNAPSHOT_MAGIC);
        buf.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.major.to_le_bytes());
        buf.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.minor.to_le_bytes());
        buf.extend_from_slice(&device_id);
        buf.extend_from_slice(&device_version.major.to_le_bytes());
        buf.extend_from_slice(&device_version.minor.to_le_bytes());
        Self { buf }
    }

    pub fn field_bytes(&mut self, tag: u16, bytes: Vec<u8>) {
        self.buf.extend_from_slice(&tag.to_le_bytes());
        self.buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(&bytes);
    }

    pub fn field_u32(&mut self, tag: u16, value: u32) {
        self.field_bytes(tag, value.to_le_bytes().to_vec());
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Parsed view of a snapshot blob. Field payloads are borrowed from the
/// input; lookups are by tag.
#[derive(Debug)]
pub struct SnapshotReader<'a> {
    header: SnapshotHeader,
    fields: BTreeMap<u16, &'a [u8]>,
}

impl<'a> SnapshotReader<'a> {
    pub fn parse(bytes: &'a [u8], expected_device_id: [u8; 4]) -> SnapshotResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(SnapshotError::UnexpectedEof);
        }
        if bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }

        let format_version = SnapshotVersion {
            major: u16::from_le_bytes([bytes[4], bytes[5]]),
            minor: u16::from_le_bytes([bytes[6], bytes[7]]),
        };
        if format_version.major != SNAPSHOT_FORMAT_VERSION.major {
            return Err(SnapshotError::UnsupportedFormatVersion {
                found: format_version,
                supported: SNAPSHOT_FORMAT_VERSION,
            });
        }

        let device_id = [bytes[8], bytes[9], bytes[10], bytes[11]];
        if device_id != expected_device_id {
            return Err(SnapshotError::DeviceIdMismatch {
                expected: expected_device_id,
                found: device_id,
            });
        }

        let device_version = SnapshotVersion {
            major: u16::from_le_bytes([bytes[12], bytes[13]]),
            minor: u16::from_le_bytes([bytes[14], bytes[15]]),
        };

        let mut fields = BTreeMap::new();
        let mut pos = HEADER_LEN;
        while pos < bytes.len() {
            if bytes.len() - pos < FIELD_HEADER_LEN {
                return Err(SnapshotError::UnexpectedEof);
            }
            let tag = u16::from_le_bytes([bytes[pos], bytes[pos + 1]]);
            let len = u32::from_le_bytes([
                bytes[pos + 2],
                bytes[pos + 3],
                bytes[pos + 4],
                bytes[pos + 5],
            ]) as usize;
            pos += FIELD_HEADER_LEN;
            if bytes.len() - pos < len {
                return Err(SnapshotError::UnexpectedEof);
            }
            // Later duplicates win, like repeated assignment during restore.
            fields.insert(tag, &bytes[pos..pos + len]);
            pos += len;
        }

        Ok(Self {
            header: SnapshotHeader {
                format_version,
                device_id,
                device_version,
            },
            fields,
        })
    }

    pub fn header(&self) -> SnapshotHeader {
        self.header
    }

    pub fn ensure_device_major(&self, supported: u16) -> SnapshotResult<()> {
        if self.header.device_version.major != supported {
            return Err(SnapshotError::UnsupportedDeviceMajorVersion {
                found: self.header.device_version.major,
                supported,
            });
        }
        Ok(())
    }

    /// Payload of the field with this tag, if present.
    pub fn bytes(&self, tag: u16) -> Option<&'a [u8]> {
        self.fields.get(&tag).copied()
    }

    pub fn u32(&self, tag: u16) -> SnapshotResult<Option<u32>> {
        match self.fields.get(&tag) {
            None => Ok(None),
            Some(buf) => {
                let arr: [u8; 4] = (*buf)
                    .try_into()
                    .map_err(|_| SnapshotError::InvalidFieldEncoding("u32 field length"))?;
                Ok(Some(u32::from_le_bytes(arr)))
            }
        }
    }
}
