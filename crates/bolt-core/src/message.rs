//! Bolt v1 messages: the fixed set of structures exchanged after the
//! handshake, each identified by a one-byte signature carried in the
//! PackStream structure marker.

use thiserror::Error;

use crate::value::{Map, PackStreamError, Value};

/// Signature bytes, matching the Bolt v1 message catalogue.
pub mod signatures {
    pub const INIT: u8 = 0x01;
    pub const ACK_FAILURE: u8 = 0x0E;
    pub const RESET: u8 = 0x0F;
    pub const RUN: u8 = 0x10;
    pub const DISCARD_ALL: u8 = 0x2F;
    pub const PULL_ALL: u8 = 0x3F;
    pub const SUCCESS: u8 = 0x70;
    pub const RECORD: u8 = 0x71;
    pub const IGNORED: u8 = 0x7E;
    pub const FAILURE: u8 = 0x7F;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Init { client_name: String, auth_token: Map },
    AckFailure,
    Reset,
    Run { statement: String, parameters: Map },
    DiscardAll,
    PullAll,
    Success { metadata: Map },
    Record { fields: Vec<Value> },
    Ignored,
    Failure { metadata: Map },
}

impl Message {
    pub fn signature(&self) -> u8 {
        use signatures::*;
        match self {
            Message::Init { .. } => INIT,
            Message::AckFailure => ACK_FAILURE,
            Message::Reset => RESET,
            Message::Run { .. } => RUN,
            Message::DiscardAll => DISCARD_ALL,
            Message::PullAll => PULL_ALL,
            Message::Success { .. } => SUCCESS,
            Message::Record { .. } => RECORD,
            Message::Ignored => IGNORED,
            Message::Failure { .. } => FAILURE,
        }
    }

    fn into_fields(self) -> Vec<Value> {
        match self {
            Message::Init {
                client_name,
                auth_token,
            } => vec![Value::String(client_name), Value::Map(auth_token)],
            Message::AckFailure | Message::Reset | Message::DiscardAll | Message::PullAll | Message::Ignored => {
                vec![]
            }
            Message::Run {
                statement,
                parameters,
            } => vec![Value::String(statement), Value::Map(parameters)],
            Message::Success { metadata } => vec![Value::Map(metadata)],
            Message::Record { fields } => vec![Value::List(fields)],
            Message::Failure { metadata } => vec![Value::Map(metadata)],
        }
    }

    /// Encode this message as a PackStream structure value, then serialize
    /// it to bytes. The bytes returned are the *unchunked* message body —
    /// chunking is the transport layer's job, done separately by
    /// [`crate::chunk::ChunkWriter`].
    pub fn encode(&self) -> Vec<u8> {
        let value = Value::Structure {
            signature: self.signature(),
            fields: self.clone().into_fields(),
        };
        let mut out = Vec::new();
        crate::value::encode(&value, &mut out);
        out
    }

    /// Decode a complete, unchunked message body.
    pub fn decode(bytes: &[u8]) -> Result<Message, MessageError> {
        let (value, consumed) = crate::value::decode(bytes)?;
        if consumed != bytes.len() {
            return Err(MessageError::TrailingBytes);
        }
        Message::from_value(value)
    }

    fn from_value(value: Value) -> Result<Message, MessageError> {
        let (signature, mut fields) = match value {
            Value::Structure { signature, fields } => (signature, fields),
            _ => return Err(MessageError::NotAStructure),
        };

        use signatures::*;
        match signature {
            INIT => {
                let (client_name, auth_token) = take_two(&mut fields, signature)?;
                Ok(Message::Init {
                    client_name: expect_string(client_name, signature)?,
                    auth_token: expect_map(auth_token, signature)?,
                })
            }
            ACK_FAILURE => expect_arity(&fields, 0, signature).map(|_| Message::AckFailure),
            RESET => expect_arity(&fields, 0, signature).map(|_| Message::Reset),
            RUN => {
                let (statement, parameters) = take_two(&mut fields, signature)?;
                Ok(Message::Run {
                    statement: expect_string(statement, signature)?,
                    parameters: expect_map(parameters, signature)?,
                })
            }
            DISCARD_ALL => expect_arity(&fields, 0, signature).map(|_| Message::DiscardAll),
            PULL_ALL => expect_arity(&fields, 0, signature).map(|_| Message::PullAll),
            SUCCESS => {
                let metadata = take_one(&mut fields, signature)?;
                Ok(Message::Success {
                    metadata: expect_map(metadata, signature)?,
                })
            }
            RECORD => {
                let fields_value = take_one(&mut fields, signature)?;
                match fields_value {
                    Value::List(items) => Ok(Message::Record { fields: items }),
                    _ => Err(MessageError::WrongFieldType { signature, index: 0 }),
                }
            }
            IGNORED => expect_arity(&fields, 0, signature).map(|_| Message::Ignored),
            FAILURE => {
                let metadata = take_one(&mut fields, signature)?;
                Ok(Message::Failure {
                    metadata: expect_map(metadata, signature)?,
                })
            }
            other => Err(MessageError::UnknownSignature(other)),
        }
    }
}

fn expect_arity(fields: &[Value], expected: usize, signature: u8) -> Result<(), MessageError> {
    if fields.len() != expected {
        Err(MessageError::WrongArity {
            signature,
            expected,
            actual: fields.len(),
        })
    } else {
        Ok(())
    }
}

fn take_one(fields: &mut Vec<Value>, signature: u8) -> Result<Value, MessageError> {
    expect_arity(fields, 1, signature)?;
    Ok(fields.remove(0))
}

fn take_two(fields: &mut Vec<Value>, signature: u8) -> Result<(Value, Value), MessageError> {
    expect_arity(fields, 2, signature)?;
    let second = fields.remove(1);
    let first = fields.remove(0);
    Ok((first, second))
}

fn expect_string(value: Value, signature: u8) -> Result<String, MessageError> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(MessageError::WrongFieldType { signature, index: 0 }),
    }
}

fn expect_map(value: Value, signature: u8) -> Result<Map, MessageError> {
    match value {
        Value::Map(m) => Ok(m),
        _ => Err(MessageError::WrongFieldType { signature, index: 1 }),
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MessageError {
    #[error(transparent)]
    PackStream(#[from] PackStreamError),

    #[error("message body contains trailing bytes after the structure")]
    TrailingBytes,

    #[error("message body is not a PackStream structure")]
    NotAStructure,

    #[error("unknown message signature: 0x{0:02x}")]
    UnknownSignature(u8),

    #[error("structure 0x{signature:02x} expected {expected} fields, got {actual}")]
    WrongArity {
        signature: u8,
        expected: usize,
        actual: usize,
    },

    #[error("structure 0x{signature:02x} field {index} has the wrong type")]
    WrongFieldType { signature: u8, index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: Message) {
        let bytes = msg.encode();
        let decoded = Message::decode(&bytes).expect("decode should succeed");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn init_round_trips() {
        let mut auth = Map::new();
        auth.insert("scheme", Value::String("basic".into())).unwrap();
        round_trip(Message::Init {
            client_name: "bolt-client/1.0".into(),
            auth_token: auth,
        });
    }

    #[test]
    fn run_round_trips() {
        let mut params = Map::new();
        params.insert("x", Value::Integer(1)).unwrap();
        round_trip(Message::Run {
            statement: "RETURN $x".into(),
            parameters: params,
        });
    }

    #[test]
    fn zero_arity_messages_round_trip() {
        round_trip(Message::AckFailure);
        round_trip(Message::Reset);
        round_trip(Message::DiscardAll);
        round_trip(Message::PullAll);
        round_trip(Message::Ignored);
    }

    #[test]
    fn success_and_failure_round_trip() {
        let mut meta = Map::new();
        meta.insert("fields", Value::List(vec![Value::String("n".into())]))
            .unwrap();
        round_trip(Message::Success { metadata: meta });

        let mut fail_meta = Map::new();
        fail_meta
            .insert("code", Value::String("Neo.ClientError.Statement.SyntaxError".into()))
            .unwrap();
        round_trip(Message::Failure { metadata: fail_meta });
    }

    #[test]
    fn record_round_trips() {
        round_trip(Message::Record {
            fields: vec![Value::Integer(1), Value::String("a".into())],
        });
    }

    #[test]
    fn decode_rejects_unknown_signature() {
        let value = Value::Structure {
            signature: 0x99,
            fields: vec![],
        };
        let mut bytes = Vec::new();
        crate::value::encode(&value, &mut bytes);
        assert_eq!(
            Message::decode(&bytes).unwrap_err(),
            MessageError::UnknownSignature(0x99)
        );
    }

    #[test]
    fn decode_rejects_wrong_arity() {
        let value = Value::Structure {
            signature: signatures::RESET,
            fields: vec![Value::Integer(1)],
        };
        let mut bytes = Vec::new();
        crate::value::encode(&value, &mut bytes);
        assert_eq!(
            Message::decode(&bytes).unwrap_err(),
            MessageError::WrongArity {
                signature: signatures::RESET,
                expected: 0,
                actual: 1
            }
        );
    }

    #[test]
    fn decode_rejects_non_structure_body() {
        let mut bytes = Vec::new();
        crate::value::encode(&Value::Integer(1), &mut bytes);
        assert_eq!(Message::decode(&bytes).unwrap_err(), MessageError::NotAStructure);
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = Message::AckFailure.encode();
        bytes.push(0xFF);
        assert_eq!(Message::decode(&bytes).unwrap_err(), MessageError::TrailingBytes);
    }
}
