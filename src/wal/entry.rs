//! Log record and on-disk frame encoding.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single write-ahead log record.
///
/// `id` is a monotonic wall-clock nanosecond stamp assigned at ingress;
/// uniqueness is not required for correctness, only ordering within a
/// segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub command: RecordCommand,
    pub args: Vec<String>,
}

/// Only Set and Del are ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordCommand {
    Set,
    Del,
}

impl LogRecord {
    pub fn set(id: i64, key: String, value: String) -> Self {
        Self {
            id,
            command: RecordCommand::Set,
            args: vec![key, value],
        }
    }

    pub fn del(id: i64, key: String) -> Self {
        Self {
            id,
            command: RecordCommand::Del,
            args: vec![key],
        }
    }
}

/// Encode a batch as one length-prefixed frame: `u32 LE length || bincode(Vec<LogRecord>)`.
///
/// The length prefix makes frame boundaries explicit when multiple batches
/// are concatenated into the same segment file; bincode itself does not
/// delimit a stream of independently-encoded values.
pub fn encode_frame(batch: &[LogRecord]) -> Result<Vec<u8>> {
    let body = bincode::serialize(batch)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode every concatenated frame in `bytes`, returning all records in order.
pub fn decode_frames(bytes: &[u8]) -> Result<Vec<LogRecord>> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset + 4 <= bytes.len() {
        let len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
        offset += 4;
        if offset + len > bytes.len() {
            break; // truncated trailing frame: tolerated, not an error
        }
        let batch: Vec<LogRecord> = bincode::deserialize(&bytes[offset..offset + len])?;
        records.extend(batch);
        offset += len;
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_single_frame() {
        let batch = vec![
            LogRecord::set(1, "a".into(), "1".into()),
            LogRecord::del(2, "b".into()),
        ];
        let frame = encode_frame(&batch).unwrap();
        let decoded = decode_frames(&frame).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn round_trips_concatenated_frames() {
        let batch_a = vec![LogRecord::set(1, "a".into(), "1".into())];
        let batch_b = vec![LogRecord::set(2, "b".into(), "2".into())];
        let mut bytes = encode_frame(&batch_a).unwrap();
        bytes.extend(encode_frame(&batch_b).unwrap());

        let decoded = decode_frames(&bytes).unwrap();
        assert_eq!(decoded, vec![batch_a[0].clone(), batch_b[0].clone()]);
    }

    #[test]
    fn empty_bytes_decode_to_empty() {
        assert_eq!(decode_frames(&[]).unwrap(), vec![]);
    }
}
