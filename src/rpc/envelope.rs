//! The RPC envelope (§3, §6): the only bit-level contract the spec actually
//! mandates for the value layer. Mirrors `message.go`/`router.go`'s
//! `NewMessage`/`NewError` helpers, generalized with the `Query` map and
//! structured `Error` field the original's bare `Message{Sent, RPC, Body}`
//! doesn't have.

use crate::rpc::value::{Decode, Encode, ValueResult};
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeError {
    pub error: String,
    pub body: String,
}

impl Encode for EnvelopeError {
    fn encode(&self, buf: &mut BytesMut) {
        self.error.encode(buf);
        self.body.encode(buf);
    }
}

impl Decode for EnvelopeError {
    fn decode(cur: &mut Cursor<&[u8]>) -> ValueResult<Self> {
        Ok(EnvelopeError {
            error: String::decode(cur)?,
            body: String::decode(cur)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub rpc: String,
    pub query: HashMap<String, String>,
    pub body: Bytes,
    pub error: Option<EnvelopeError>,
}

impl Envelope {
    pub fn request(rpc: impl Into<String>, query: HashMap<String, String>) -> Self {
        Envelope {
            rpc: rpc.into(),
            query,
            body: Bytes::new(),
            error: None,
        }
    }

    pub fn ok(rpc: impl Into<String>, body: Bytes) -> Self {
        Envelope {
            rpc: rpc.into(),
            query: HashMap::new(),
            body,
            error: None,
        }
    }

    pub fn error(rpc: impl Into<String>, error: impl Into<String>, body: impl Into<String>) -> Self {
        Envelope {
            rpc: rpc.into(),
            query: HashMap::new(),
            body: Bytes::new(),
            error: Some(EnvelopeError {
                error: error.into(),
                body: body.into(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl Encode for Envelope {
    fn encode(&self, buf: &mut BytesMut) {
        self.rpc.encode(buf);
        self.query.encode(buf);
        self.body.encode(buf);
        self.error.encode(buf);
    }
}

impl Decode for Envelope {
    fn decode(cur: &mut Cursor<&[u8]>) -> ValueResult<Self> {
        Ok(Envelope {
            rpc: String::decode(cur)?,
            query: HashMap::decode(cur)?,
            body: Bytes::decode(cur)?,
            error: Option::decode(cur)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::value::{marshal, unmarshal};

    #[test]
    fn ok_envelope_round_trips() {
        let env = Envelope::ok("FindFlight", Bytes::from_static(b"payload"));
        let decoded: Envelope = unmarshal(&marshal(&env)).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn error_envelope_round_trips() {
        let env = Envelope::error("ReserveFlight", "FailToReserve", "not enough seats");
        let decoded: Envelope = unmarshal(&marshal(&env)).unwrap();
        assert_eq!(decoded, env);
        assert!(decoded.is_error());
    }

    #[test]
    fn query_map_round_trips() {
        let mut query = HashMap::new();
        query.insert("id".to_string(), "5653".to_string());
        let env = Envelope::request("FindFlight", query.clone());
        let decoded: Envelope = unmarshal(&marshal(&env)).unwrap();
        assert_eq!(decoded.query, query);
    }
}
