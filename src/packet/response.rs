//! Response packet variants.
//!
//! Several of these carry fields that never travel on the wire at all:
//! `site`, `inner_path`, `offset`/`total_size`, and `port` are injected by
//! [`crate::sequencer::Sequencer::interpret`] from the context the matching
//! request registered, mirroring zerolib's `inject_attrs` /
//! `inject_respfile_attrs` but as plain optional struct fields instead of
//! reflective attribute copying.

use std::collections::{BTreeMap, BTreeSet};

use rmpv::Value;

use crate::error::PacketError;
use crate::packet::hashset::{hash_set, HashPrefix};
use crate::packet::request::{parse_peer_lists, IpKey};
use crate::sanitizer::{opt, Condition};

/// Tags the response class a sequencer entry expects, and the class an
/// actually-decoded response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Pong,
    Predicate,
    Ack,
    RespFile,
    RespPex,
    RespMod,
    RespHashSet,
    RespHashDict,
    RespPort,
    RespPieceDict,
}

impl ResponseKind {
    pub fn name(self) -> &'static str {
        match self {
            ResponseKind::Pong => "pong",
            ResponseKind::Predicate => "predicate",
            ResponseKind::Ack => "ack",
            ResponseKind::RespFile => "respFile",
            ResponseKind::RespPex => "respPex",
            ResponseKind::RespMod => "respMod",
            ResponseKind::RespHashSet => "respHashSet",
            ResponseKind::RespHashDict => "respHashDict",
            ResponseKind::RespPort => "respPort",
            ResponseKind::RespPieceDict => "respPieceDict",
        }
    }
}

/// Reply to `[ping]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong;

impl Pong {
    pub fn parse(_params: &Value) -> Result<Self, PacketError> {
        Ok(Pong)
    }
}

/// A bare `{ok: ...}` / `{error: ...}` reply, used by several requests
/// (`Update`, `SetHash`, ...) that have nothing else to say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub ok: bool,
    pub error: Option<String>,
}

impl Predicate {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        let ok = c.has("ok");
        let error = match params.as_map().and_then(|m| {
            m.iter()
                .find(|(k, _)| k.as_str() == Some("error") || k.as_slice() == Some(b"error"))
        }) {
            Some((_, v)) => v.as_str().map(str::to_string).or_else(|| {
                v.as_slice()
                    .map(|b| String::from_utf8_lossy(b).to_string())
            }),
            None => None,
        };
        Ok(Predicate { ok, error })
    }
}

/// Reply to `[handshake]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub crypto_set: BTreeSet<String>,
    pub fileserver_port: u16,
    pub protocol: String,
    pub peer_id: Option<String>,
    pub rev: u32,
    pub version: String,
    pub onion: Option<(String, u16)>,
    pub opened: bool,
    pub crypt: Option<String>,
}

impl Ack {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let handshake = super::request::Handshake::parse(params)?;
        let c = Condition::new(params);
        let crypt = c
            .strlen_opt(opt("crypt"), 64)?
            .map(|b| String::from_utf8_lossy(b).to_string());
        Ok(Ack {
            crypto_set: handshake.crypto_set,
            fileserver_port: handshake.fileserver_port,
            protocol: handshake.protocol,
            peer_id: handshake.peer_id,
            rev: handshake.rev,
            version: handshake.version,
            onion: handshake.onion,
            opened: handshake.opened,
            crypt,
        })
    }
}

/// Reply to `[getFile]`: a single chunk of a file.
///
/// `location` is the absolute offset of the last byte in `body` (zerolib's
/// convention), so the chunk's starting `offset` is derived rather than
/// sent: `offset = (location + 1) - len(body)`. Computed at parse time so
/// the sequencer can compare it directly against what was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespFile {
    pub body: Vec<u8>,
    pub location: u64,
    pub size: u64,
    pub offset: u64,
    pub site: Option<String>,
    pub inner_path: Option<String>,
    pub total_size: Option<u64>,
}

impl RespFile {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        let body = c.as_type_bytes("body")?.to_vec();
        let size = c.as_size("size")?;
        let location = c.range("location", (0, size.saturating_sub(1)))?;

        let body_len = body.len() as u64;
        if body_len > size {
            return Err(PacketError::value(format!(
                "file chunk body ({} bytes) is larger than the file ({} bytes)",
                body_len, size
            )));
        }
        let next_offset = location + 1;
        if body_len > next_offset {
            return Err(PacketError::value(format!(
                "file chunk body ({} bytes) would start before byte 0 at location {}",
                body_len, location
            )));
        }

        Ok(RespFile {
            body,
            location,
            size,
            offset: next_offset - body_len,
            site: None,
            inner_path: None,
            total_size: None,
        })
    }
}

/// Reply to `[pex]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespPex {
    pub peers: BTreeSet<IpKey>,
    pub peers_onion: BTreeSet<(String, u16)>,
    pub peers_i2p: BTreeSet<(Vec<u8>, u16)>,
    pub site: Option<String>,
}

impl RespPex {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        let (peers, peers_onion, peers_i2p) = parse_peer_lists(&c)?;
        Ok(RespPex {
            peers,
            peers_onion,
            peers_i2p,
            site: None,
        })
    }
}

/// Reply to `[listModified]`: content.json paths changed since a given time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespMod {
    pub modified_files: BTreeMap<String, u64>,
    pub site: Option<String>,
}

impl RespMod {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        let raw = c.as_type_map("modified_files")?;
        let mut modified_files = BTreeMap::new();
        for (k, v) in raw {
            let path = match k.as_str() {
                Some(s) => s,
                None => continue,
            };
            let mtime = match v.as_u64() {
                Some(n) => n,
                None => continue,
            };
            modified_files.insert(path.to_string(), mtime);
        }
        Ok(RespMod {
            modified_files,
            site: None,
        })
    }
}

/// Reply to `[getHashfield]` and `[findHashIds]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespHashSet {
    pub prefixes: BTreeSet<HashPrefix>,
    pub site: Option<String>,
}

impl RespHashSet {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        let prefixes = hash_set(c.as_type_bytes("hashfield_raw")?)?;
        Ok(RespHashSet {
            prefixes,
            site: None,
        })
    }
}

/// Reply to `[actionCheckport]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespPort {
    pub status: String,
    pub open: bool,
    pub port: Option<u16>,
}

impl RespPort {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        let status = String::from_utf8_lossy(c.strlen("status", 32)?).to_string();
        let open = status == "open";
        Ok(RespPort {
            status,
            open,
            port: None,
        })
    }
}

/// Reserved DHT hash-dictionary reply, never implemented upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespHashDict;

impl RespHashDict {
    pub fn parse(_params: &Value) -> Result<Self, PacketError> {
        Err(PacketError::NotImplemented("respHashfieldDict"))
    }
}

/// Reserved piece-status dictionary reply, never implemented upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespPieceDict;

impl RespPieceDict {
    pub fn parse(_params: &Value) -> Result<Self, PacketError> {
        Err(PacketError::NotImplemented("respPieceFields"))
    }
}
