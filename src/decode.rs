//! Top-level MessagePack decoding: turns a raw byte slice into a typed
//! [`Decoded`] packet, with no socket or transport opinions attached.
//!
//! The wire format puts requests and responses in the same shape (a single
//! top-level map keyed by byte strings), and both carry `cmd`: a request's
//! `cmd` names the command and its sequence number lives under `req_id`,
//! while a response's `cmd` is the literal string `"response"` and its
//! sequence number lives under `to` instead. Once routed to the response
//! side, the actual response class still carries no discriminator of its
//! own, so it's inferred from which of its other fields are present. That
//! scan order mirrors zerolib's `attr_dict` / `attr_type_dict` tables in
//! `protocol/packets.py`.

use std::io::Cursor;

use rmpv::Value;

use crate::error::PacketError;
use crate::packet::request::{
    CheckPort, FindHash, GetFile, GetHash, GetPieceStatus, Handshake, ListMod, Pex, Ping, SetHash,
    SetPieceStatus, Update,
};
use crate::packet::response::{
    Ack, Predicate, Pong, RespFile, RespHashDict, RespHashSet, RespMod, RespPex, RespPort,
};
use crate::packet::{RequestBody, ResponseBody};
use crate::sanitizer::Condition;

/// A maximum string/binary field length, applied while walking a decoded
/// value tree: a single oversized field can't be used to force a huge
/// allocation before any sanitizer ever runs.
const MAX_FIELD_BYTES: usize = 512 * 1024;
const MAX_COLLECTION_ENTRIES: usize = 4000;
const MAX_NESTING_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub req_id: u32,
    pub body: DecodedBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    Request(RequestBody),
    Response(ResponseBody),
}

/// Decodes exactly one message from `bytes`, which must contain nothing
/// but that message.
pub fn unpack(bytes: &[u8]) -> Result<Decoded, PacketError> {
    let mut cursor = Cursor::new(bytes);
    let value = rmpv::decode::read_value(&mut cursor)
        .map_err(|e| PacketError::value(format!("malformed msgpack: {e}")))?;
    decode_value(value)
}

/// Decodes one message from the front of a buffer that may hold more data
/// than a single message (or less). Returns `None` rather than an error
/// when the buffer doesn't yet hold a complete message; callers read more
/// off the socket and retry.
pub fn unpack_stream(bytes: &[u8]) -> Result<Option<(Decoded, usize)>, PacketError> {
    let mut cursor = Cursor::new(bytes);
    match rmpv::decode::read_value(&mut cursor) {
        Ok(value) => {
            let consumed = cursor.position() as usize;
            Ok(Some((decode_value(value)?, consumed)))
        }
        Err(rmpv::decode::Error::InvalidMarkerRead(e))
        | Err(rmpv::decode::Error::InvalidDataRead(e))
            if e.kind() == std::io::ErrorKind::UnexpectedEof =>
        {
            Ok(None)
        }
        Err(e) => Err(PacketError::value(format!("malformed msgpack: {e}"))),
    }
}

fn decode_value(value: Value) -> Result<Decoded, PacketError> {
    validate_limits(&value, 0)?;

    let cmd = lookup(&value, "cmd")
        .map(|v| {
            v.as_str().ok_or(PacketError::Type {
                expected: "string",
                found: "non-string cmd".to_string(),
            })
        })
        .transpose()?;

    let c = Condition::new(&value);
    let (req_id, body) = if cmd == Some("response") {
        let to = c.range("to", (0, u32::MAX as u64))? as u32;
        (to, DecodedBody::Response(classify_response(&value)?))
    } else {
        let cmd = cmd.ok_or_else(|| PacketError::key("cmd"))?;
        let req_id = c.range("req_id", (0, u32::MAX as u64))? as u32;
        let empty = Value::Map(Vec::new());
        let params = lookup(&value, "params").unwrap_or(&empty);
        (req_id, DecodedBody::Request(decode_request(cmd, params)?))
    };

    Ok(Decoded { req_id, body })
}

fn decode_request(cmd: &str, params: &Value) -> Result<RequestBody, PacketError> {
    Ok(match cmd {
        "ping" => RequestBody::Ping(Ping::parse(params)?),
        "handshake" => RequestBody::Handshake(Handshake::parse(params)?),
        "getFile" => RequestBody::GetFile(GetFile::parse(params)?),
        "pex" => RequestBody::Pex(Pex::parse(params)?),
        "update" => RequestBody::Update(Update::parse(params)?),
        "listModified" => RequestBody::ListMod(ListMod::parse(params)?),
        "getHashfield" => RequestBody::GetHash(GetHash::parse(params)?),
        "setHashfield" => RequestBody::SetHash(SetHash::parse(params)?),
        "findHashIds" => RequestBody::FindHash(FindHash::parse(params)?),
        "actionCheckport" => RequestBody::CheckPort(CheckPort::parse(params)?),
        "getPieceFields" => RequestBody::GetPieceStatus(GetPieceStatus::parse(params)?),
        "setPieceFields" => RequestBody::SetPieceStatus(SetPieceStatus::parse(params)?),
        other => return Err(PacketError::value(format!("unknown command: {other}"))),
    })
}

/// Responses carry no discriminator field of their own, so the decoded
/// class is inferred from which attributes are present. Checked in a fixed
/// order so overlapping shapes (a response could in principle satisfy more
/// than one) always resolve the same way.
///
/// `peers` alone is ambiguous: a list is a `PEX` peer list, a map is a DHT
/// hash-to-peers dictionary, which this crate never implements.
fn classify_response(value: &Value) -> Result<ResponseBody, PacketError> {
    if lookup(value, "crypt_supported").is_some() {
        return Ok(ResponseBody::Ack(Ack::parse(value)?));
    }
    if lookup(value, "body").is_some() {
        return Ok(ResponseBody::RespFile(RespFile::parse(value)?));
    }
    if lookup(value, "modified_files").is_some() {
        return Ok(ResponseBody::RespMod(RespMod::parse(value)?));
    }
    if lookup(value, "hashfield_raw").is_some() {
        return Ok(ResponseBody::RespHashSet(RespHashSet::parse(value)?));
    }
    if lookup(value, "status").is_some() {
        return Ok(ResponseBody::RespPort(RespPort::parse(value)?));
    }
    if lookup(value, "ok").is_some() || lookup(value, "error").is_some() {
        return Ok(ResponseBody::Predicate(Predicate::parse(value)?));
    }
    if let Some(peers) = lookup(value, "peers") {
        return if peers.is_array() {
            Ok(ResponseBody::RespPex(RespPex::parse(value)?))
        } else {
            Ok(ResponseBody::RespHashDict(RespHashDict::parse(value)?))
        };
    }
    Ok(ResponseBody::Pong(Pong::parse(value)?))
}

fn lookup<'a>(v: &'a Value, key: &str) -> Option<&'a Value> {
    v.as_map()?
        .iter()
        .find(|(k, _)| k.as_str() == Some(key) || k.as_slice() == Some(key.as_bytes()))
        .map(|(_, v)| v)
}

fn validate_limits(v: &Value, depth: usize) -> Result<(), PacketError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(PacketError::value("message nested too deeply".to_string()));
    }
    match v {
        Value::String(s) => {
            if s.as_bytes().len() > MAX_FIELD_BYTES {
                return Err(PacketError::value("string field too large".to_string()));
            }
        }
        Value::Binary(b) => {
            if b.len() > MAX_FIELD_BYTES {
                return Err(PacketError::value("binary field too large".to_string()));
            }
        }
        Value::Array(items) => {
            if items.len() > MAX_COLLECTION_ENTRIES {
                return Err(PacketError::value("array has too many entries".to_string()));
            }
            for item in items {
                validate_limits(item, depth + 1)?;
            }
        }
        Value::Map(entries) => {
            if entries.len() > MAX_COLLECTION_ENTRIES {
                return Err(PacketError::value("map has too many entries".to_string()));
            }
            for (k, val) in entries {
                validate_limits(k, depth + 1)?;
                validate_limits(val, depth + 1)?;
            }
        }
        Value::Ext(..) => {
            return Err(PacketError::value(
                "ext types are not accepted on the wire".to_string(),
            ));
        }
        _ => {}
    }
    Ok(())
}
