//! Wire format for the replica-to-replica protocol.
//!
//! Every request carries a one-byte tag. Replies do not: the sender already
//! knows which request it made, so the reply shape is implied by context,
//! except for Ping/Pong which both carry their own tag.

use crate::error::{Error, Result};
use crate::wal::SEGMENT_NAME_LENGTH;

pub const TAG_PING: u8 = 0x00;
pub const TAG_PONG: u8 = 0x01;
pub const TAG_NEW_HOST: u8 = 0x02;
pub const TAG_SYNC_SEGMENT: u8 = 0x03;

/// Width of the ascii-decimal, zero-padded id field in a NewHost message.
const ID_FIELD_WIDTH: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRequest {
    Ping,
    NewHost { id: i64, address: String },
    SyncSegment { last_segment_name: Option<String> },
}

impl PeerRequest {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            PeerRequest::Ping => vec![TAG_PING],
            PeerRequest::NewHost { id, address } => {
                let mut body = vec![TAG_NEW_HOST];
                body.extend(format!("{:0width$}", id, width = ID_FIELD_WIDTH).into_bytes());
                body.extend(address.as_bytes());
                body
            }
            PeerRequest::SyncSegment { last_segment_name } => {
                let mut body = vec![TAG_SYNC_SEGMENT];
                if let Some(name) = last_segment_name {
                    body.extend(name.as_bytes());
                }
                body
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (&tag, rest) = bytes
            .split_first()
            .ok_or_else(|| Error::Replication("empty peer message".into()))?;

        match tag {
            TAG_PING => Ok(PeerRequest::Ping),
            TAG_NEW_HOST => {
                if rest.len() < ID_FIELD_WIDTH {
                    return Err(Error::Replication("short NewHost message".into()));
                }
                let (id_field, address) = rest.split_at(ID_FIELD_WIDTH);
                let id = parse_ascii_id(id_field)?;
                let address = String::from_utf8_lossy(address).into_owned();
                Ok(PeerRequest::NewHost { id, address })
            }
            TAG_SYNC_SEGMENT => {
                let name = String::from_utf8_lossy(rest).into_owned();
                Ok(PeerRequest::SyncSegment {
                    last_segment_name: if name.is_empty() { None } else { Some(name) },
                })
            }
            other => Err(Error::Replication(format!("unknown peer message tag: {other}"))),
        }
    }
}

pub fn encode_pong() -> Vec<u8> {
    vec![TAG_PONG]
}

pub fn is_pong(bytes: &[u8]) -> bool {
    bytes.first() == Some(&TAG_PONG)
}

pub fn encode_new_host_reply(own_id: i64) -> Vec<u8> {
    format!("{:0width$}", own_id, width = ID_FIELD_WIDTH).into_bytes()
}

pub fn decode_new_host_reply(bytes: &[u8]) -> Result<i64> {
    parse_ascii_id(bytes)
}

fn parse_ascii_id(bytes: &[u8]) -> Result<i64> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| Error::Replication("malformed id field".into()))?;
    let trimmed = s.trim_start_matches('0');
    let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
    trimmed
        .parse()
        .map_err(|_| Error::Replication("malformed id field".into()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSegmentReply {
    UpToDate,
    Segment { name: String, payload: Vec<u8> },
}

pub fn encode_sync_segment_reply(reply: &SyncSegmentReply) -> Vec<u8> {
    match reply {
        SyncSegmentReply::UpToDate => Vec::new(),
        SyncSegmentReply::Segment { name, payload } => {
            let mut body = Vec::with_capacity(SEGMENT_NAME_LENGTH + payload.len());
            let mut name_bytes = name.clone().into_bytes();
            name_bytes.resize(SEGMENT_NAME_LENGTH, 0);
            body.extend(name_bytes);
            body.extend(payload);
            body
        }
    }
}

pub fn decode_sync_segment_reply(bytes: &[u8]) -> Result<SyncSegmentReply> {
    if bytes.is_empty() {
        return Ok(SyncSegmentReply::UpToDate);
    }
    if bytes.len() < SEGMENT_NAME_LENGTH {
        return Err(Error::Replication("short SyncSegment reply".into()));
    }
    let (name_bytes, payload) = bytes.split_at(SEGMENT_NAME_LENGTH);
    let name = String::from_utf8_lossy(name_bytes)
        .trim_end_matches('\0')
        .to_string();
    Ok(SyncSegmentReply::Segment {
        name,
        payload: payload.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ping() {
        let encoded = PeerRequest::Ping.encode();
        assert_eq!(PeerRequest::decode(&encoded).unwrap(), PeerRequest::Ping);
    }

    #[test]
    fn round_trips_new_host() {
        let req = PeerRequest::NewHost { id: 42, address: "127.0.0.1:4000".into() };
        let encoded = req.encode();
        assert_eq!(PeerRequest::decode(&encoded).unwrap(), req);
    }

    #[test]
    fn round_trips_sync_segment_with_and_without_name() {
        let req = PeerRequest::SyncSegment { last_segment_name: Some("wal_1.log".into()) };
        assert_eq!(PeerRequest::decode(&req.encode()).unwrap(), req);

        let req = PeerRequest::SyncSegment { last_segment_name: None };
        assert_eq!(PeerRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn round_trips_new_host_reply() {
        let bytes = encode_new_host_reply(7);
        assert_eq!(bytes.len(), ID_FIELD_WIDTH);
        assert_eq!(decode_new_host_reply(&bytes).unwrap(), 7);
    }

    #[test]
    fn round_trips_sync_segment_reply() {
        let reply = SyncSegmentReply::Segment {
            name: "a".repeat(SEGMENT_NAME_LENGTH),
            payload: vec![1, 2, 3],
        };
        let encoded = encode_sync_segment_reply(&reply);
        assert_eq!(decode_sync_segment_reply(&encoded).unwrap(), reply);

        assert_eq!(
            decode_sync_segment_reply(&encode_sync_segment_reply(&SyncSegmentReply::UpToDate)).unwrap(),
            SyncSegmentReply::UpToDate
        );
    }
}
