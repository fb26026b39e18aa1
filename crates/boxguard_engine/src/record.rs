//! Box log records and their framing.
//!
//! A log starts with an 8-byte header and is followed by frames:
//!
//! ```text
//! header: "BXLG" | version u16 | reserved u16
//! frame:  body_len u32 | crc32(body) u32 | body
//! body:   kind u8 | key_len u32 | key | value (put only, rest of body)
//! ```
//!
//! All integers are little-endian.

use crate::error::{EngineError, EngineResult};

/// Magic bytes at the start of every box log.
pub const LOG_MAGIC: [u8; 4] = *b"BXLG";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// Size of the log header in bytes.
pub const HEADER_LEN: u64 = 8;

/// Size of the frame prefix (`body_len` + `crc32`).
pub const FRAME_PREFIX_LEN: usize = 8;

/// Offset of the key inside a frame body (`kind` + `key_len`).
const KEY_OFFSET: usize = 5;

/// Kind of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Insert or replace a key.
    Put = 1,
    /// Remove a key.
    Delete = 2,
}

impl RecordKind {
    /// Converts a byte to a record kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Insert or replace `key`.
    Put {
        /// The key.
        key: String,
        /// The raw value bytes.
        value: Vec<u8>,
    },
    /// Remove `key`.
    Delete {
        /// The key.
        key: String,
    },
}

impl Record {
    /// Returns the key the record applies to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }

    /// Returns the distance from the start of the encoded frame to the value.
    #[must_use]
    pub fn value_offset_in_frame(&self) -> usize {
        FRAME_PREFIX_LEN + KEY_OFFSET + self.key().len()
    }

    /// Encodes the record as a complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EntryTooLarge`] if the body does not fit the
    /// 32-bit length field.
    pub fn encode_frame(&self) -> EngineResult<Vec<u8>> {
        let (kind, key, value): (RecordKind, &str, &[u8]) = match self {
            Self::Put { key, value } => (RecordKind::Put, key.as_str(), value.as_slice()),
            Self::Delete { key } => (RecordKind::Delete, key.as_str(), &[]),
        };

        let body_len = KEY_OFFSET + key.len() + value.len();
        if body_len > u32::MAX as usize {
            return Err(EngineError::entry_too_large(format!(
                "record for key of {} bytes with value of {} bytes exceeds {} bytes",
                key.len(),
                value.len(),
                u32::MAX
            )));
        }

        let mut body = Vec::with_capacity(body_len);
        body.push(kind as u8);
        body.extend_from_slice(&(key.len() as u32).to_le_bytes());
        body.extend_from_slice(key.as_bytes());
        body.extend_from_slice(value);

        let mut frame = Vec::with_capacity(FRAME_PREFIX_LEN + body_len);
        frame.extend_from_slice(&(body_len as u32).to_le_bytes());
        frame.extend_from_slice(&compute_crc32(&body).to_le_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }
}

/// Encodes the log header.
#[must_use]
pub fn encode_header() -> [u8; HEADER_LEN as usize] {
    let mut header = [0u8; HEADER_LEN as usize];
    header[..4].copy_from_slice(&LOG_MAGIC);
    header[4..6].copy_from_slice(&LOG_VERSION.to_le_bytes());
    header
}

/// Validates a log header.
///
/// # Errors
///
/// Returns [`EngineError::Corrupted`] on a short buffer, wrong magic or an
/// unknown version.
pub fn check_header(bytes: &[u8]) -> EngineResult<()> {
    if bytes.len() < HEADER_LEN as usize {
        return Err(EngineError::corrupted("log header is truncated"));
    }
    if bytes[..4] != LOG_MAGIC {
        return Err(EngineError::corrupted("log header has wrong magic"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != LOG_VERSION {
        return Err(EngineError::corrupted(format!(
            "unsupported log version {version}, expected {LOG_VERSION}"
        )));
    }
    Ok(())
}

/// A frame found while scanning a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFrame {
    /// The decoded record.
    pub record: Record,
    /// Absolute offset of the value bytes in the log.
    pub value_offset: u64,
    /// Length of the value bytes (0 for deletes).
    pub value_len: u32,
}

/// Outcome of scanning a log buffer.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Every intact frame, in log order.
    pub frames: Vec<ScannedFrame>,
    /// Offset just past the last intact frame.
    pub valid_len: u64,
    /// Why the scan stopped early, if it did.
    pub damage: Option<EngineError>,
}

/// Decodes every intact frame in `log`, which must start with the header.
///
/// Scanning stops at the first truncated, checksum-failing or malformed
/// frame; everything before it is returned.
///
/// # Errors
///
/// Returns an error only if the header itself is invalid.
pub fn scan(log: &[u8]) -> EngineResult<ScanOutcome> {
    check_header(log)?;

    let mut outcome = ScanOutcome {
        valid_len: HEADER_LEN,
        ..ScanOutcome::default()
    };
    let mut pos = HEADER_LEN as usize;

    while pos < log.len() {
        match decode_frame(log, pos) {
            Ok((frame, next)) => {
                outcome.frames.push(frame);
                outcome.valid_len = next as u64;
                pos = next;
            }
            Err(e) => {
                outcome.damage = Some(e);
                break;
            }
        }
    }

    Ok(outcome)
}

fn decode_frame(log: &[u8], start: usize) -> EngineResult<(ScannedFrame, usize)> {
    let read_u32 = |at: usize| -> EngineResult<u32> {
        let bytes: [u8; 4] = log
            .get(at..at + 4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| EngineError::corrupted(format!("truncated frame at offset {start}")))?;
        Ok(u32::from_le_bytes(bytes))
    };

    let body_len = read_u32(start)? as usize;
    let expected = read_u32(start + 4)?;

    let body_start = start + FRAME_PREFIX_LEN;
    let body_end = body_start
        .checked_add(body_len)
        .filter(|end| *end <= log.len())
        .ok_or_else(|| EngineError::corrupted(format!("truncated frame at offset {start}")))?;
    let body = &log[body_start..body_end];

    let actual = compute_crc32(body);
    if actual != expected {
        return Err(EngineError::ChecksumMismatch { expected, actual });
    }

    if body.len() < KEY_OFFSET {
        return Err(EngineError::corrupted(format!(
            "frame at offset {start} is shorter than its fixed fields"
        )));
    }
    let kind = RecordKind::from_byte(body[0]).ok_or_else(|| {
        EngineError::corrupted(format!("unknown record kind {} at offset {start}", body[0]))
    })?;
    let key_len = u32::from_le_bytes([body[1], body[2], body[3], body[4]]) as usize;
    let key_end = KEY_OFFSET
        .checked_add(key_len)
        .filter(|end| *end <= body.len())
        .ok_or_else(|| EngineError::corrupted(format!("key overruns frame at offset {start}")))?;
    let key = std::str::from_utf8(&body[KEY_OFFSET..key_end])
        .map_err(|_| EngineError::corrupted(format!("key is not UTF-8 at offset {start}")))?
        .to_string();

    let value = &body[key_end..];
    let record = match kind {
        RecordKind::Put => Record::Put {
            key,
            value: value.to_vec(),
        },
        RecordKind::Delete if value.is_empty() => Record::Delete { key },
        RecordKind::Delete => {
            return Err(EngineError::corrupted(format!(
                "delete frame at offset {start} carries a value"
            )))
        }
    };

    let frame = ScannedFrame {
        record,
        value_offset: (body_start + key_end) as u64,
        value_len: value.len() as u32,
    };
    Ok((frame, body_end))
}

/// Computes the CRC32 (IEEE) checksum of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn log_with(records: &[Record]) -> Vec<u8> {
        let mut log = encode_header().to_vec();
        for record in records {
            log.extend(record.encode_frame().unwrap());
        }
        log
    }

    fn put(key: &str, value: &[u8]) -> Record {
        Record::Put {
            key: key.to_string(),
            value: value.to_vec(),
        }
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn header_is_checked() {
        assert!(check_header(&encode_header()).is_ok());
        assert!(check_header(b"BXLG").is_err());
        assert!(check_header(b"NOPE\x01\x00\x00\x00").is_err());
        assert!(check_header(b"BXLG\x02\x00\x00\x00").is_err());
    }

    #[test]
    fn scan_reports_value_location() {
        let log = log_with(&[put("alpha", b"one"), Record::Delete { key: "beta".into() }]);
        let outcome = scan(&log).unwrap();

        assert!(outcome.damage.is_none());
        assert_eq!(outcome.valid_len, log.len() as u64);
        assert_eq!(outcome.frames.len(), 2);

        let first = &outcome.frames[0];
        let start = first.value_offset as usize;
        assert_eq!(&log[start..start + first.value_len as usize], b"one");
        assert_eq!(outcome.frames[1].record.key(), "beta");
        assert_eq!(outcome.frames[1].value_len, 0);
    }

    #[test]
    fn torn_tail_stops_scan() {
        let mut log = log_with(&[put("alpha", b"one"), put("beta", b"two")]);
        let intact = log.len() - 3;
        log.truncate(intact);

        let outcome = scan(&log).unwrap();
        assert_eq!(outcome.frames.len(), 1);
        assert!(outcome.valid_len < intact as u64);
        assert!(matches!(outcome.damage, Some(EngineError::Corrupted { .. })));
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let mut log = log_with(&[put("alpha", b"one")]);
        let last = log.len() - 1;
        log[last] ^= 0xFF;

        let outcome = scan(&log).unwrap();
        assert!(outcome.frames.is_empty());
        assert_eq!(outcome.valid_len, HEADER_LEN);
        assert!(matches!(outcome.damage, Some(EngineError::ChecksumMismatch { .. })));
    }

    proptest! {
        #[test]
        fn scan_never_panics_on_garbage(tail in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut log = encode_header().to_vec();
            log.extend(tail);
            let outcome = scan(&log).unwrap();
            prop_assert!(outcome.valid_len <= log.len() as u64);
        }
    }
}
