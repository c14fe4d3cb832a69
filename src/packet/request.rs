//! Request packet variants: each knows how to parse its validated field set
//! from a decoded MessagePack map via a [`Condition`].

use std::collections::BTreeSet;

use rmpv::Value;

use crate::address::{unpack_i2p, unpack_ip, unpack_onion, I2pAddress, IpAddrPort, OnionAddress};
use crate::error::PacketError;
use crate::packet::hashset::{hash_prefix, hash_set, HashPrefix};
use crate::packet::response::ResponseKind;
use crate::sanitizer::{opt, Condition};

/// Requests that expect a specific response class carry the class they
/// expect and the fixed set of attributes that must be propagated into it:
/// a typed `ResponseContext`, rather than reflective attribute copying.
pub trait ExpectsResponse {
    const RESPONSE_KIND: ResponseKind;

    fn context(&self) -> ResponseContext;
}

#[derive(Debug, Clone)]
pub enum ResponseContext {
    None,
    GetFile {
        site: String,
        inner_path: String,
        offset: u64,
        total_size: Option<u64>,
    },
    Site {
        site: String,
    },
    Port {
        port: u16,
    },
}

/// `[ping]`: checks if the client is still alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping;

impl Ping {
    pub fn parse(_params: &Value) -> Result<Self, PacketError> {
        Ok(Ping)
    }
}

/// `[handshake]`: sent when the connection is initialized.
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    pub crypto_set: BTreeSet<String>,
    pub fileserver_port: u16,
    pub protocol: String,
    pub peer_id: Option<String>,
    pub rev: u32,
    pub version: String,
    pub onion: Option<(String, u16)>,
    pub opened: bool,
}

impl Handshake {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);

        let crypt_list = c.as_type_list("crypt_supported")?;
        let mut crypto_set = BTreeSet::new();
        for item in crypt_list {
            if let Some(bytes) = item.as_slice() {
                if let Ok(s) = std::str::from_utf8(bytes) {
                    if s.is_ascii() {
                        crypto_set.insert(s.to_string());
                    }
                }
            }
        }

        let fileserver_port = c.port_opt(opt("fileserver_port"))?.unwrap_or(0);
        let protocol = ascii_string(c.strlen("protocol", 10)?)?;
        let peer_id = c
            .strlen_opt(opt("peer_id"), 64)?
            .map(|b| String::from_utf8_lossy(b).to_string());
        let rev = c.range_opt(opt("rev"), (0, 0xFFFF_FFFF))?.unwrap_or(0) as u32;
        let version = ascii_string(c.strlen("version", 64)?)?;

        let onion_str = c.onion_opt(opt("onion"))?;
        let onion = match (onion_str, fileserver_port) {
            (Some(onion), port) if port != 0 => Some((onion, port)),
            _ => None,
        };

        let opened = params
            .as_map()
            .and_then(|m| {
                m.iter()
                    .find(|(k, _)| k.as_str() == Some("opened"))
                    .map(|(_, v)| v.as_bool().unwrap_or(false))
            })
            .unwrap_or(false);

        Ok(Handshake {
            crypto_set,
            fileserver_port,
            protocol,
            peer_id,
            rev,
            version,
            onion,
            opened,
        })
    }

    pub fn onion_address(&self) -> Option<&(String, u16)> {
        self.onion.as_ref()
    }
}

fn ascii_string(bytes: &[u8]) -> Result<String, PacketError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| PacketError::value("value is not valid ASCII/UTF-8".to_string()))
}

/// `[getFile]`: requests a file (or a chunk of one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetFile {
    pub site: String,
    pub inner_path: String,
    pub offset: u64,
    pub total_size: Option<u64>,
}

impl GetFile {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        Ok(GetFile {
            site: c.btc("site")?,
            inner_path: c.inner("inner_path")?,
            offset: c.as_size_opt(opt("location"))?.unwrap_or(0),
            total_size: c.as_size_opt(opt("file_size"))?,
        })
    }
}

impl ExpectsResponse for GetFile {
    const RESPONSE_KIND: ResponseKind = ResponseKind::RespFile;

    fn context(&self) -> ResponseContext {
        ResponseContext::GetFile {
            site: self.site.clone(),
            inner_path: self.inner_path.clone(),
            offset: self.offset,
            total_size: self.total_size,
        }
    }
}

/// `[pex]`: exchanges known peers with the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pex {
    pub site: String,
    pub need: u64,
    pub peers: BTreeSet<IpKey>,
    pub peers_onion: BTreeSet<(String, u16)>,
    pub peers_i2p: BTreeSet<(Vec<u8>, u16)>,
}

/// Newtype so a set of peer addresses can be ordered (`IpAddrPort` derives
/// `Ord` itself, this just gives the set element a distinct identity).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IpKey(pub IpAddrPort);

impl Pex {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        let site = c.btc("site")?;
        let need = c.range_opt(opt("need"), (0, 10000))?.unwrap_or(0);
        let (peers, peers_onion, peers_i2p) = parse_peer_lists(&c)?;
        Ok(Pex {
            site,
            need,
            peers,
            peers_onion,
            peers_i2p,
        })
    }
}

impl ExpectsResponse for Pex {
    const RESPONSE_KIND: ResponseKind = ResponseKind::RespPex;

    fn context(&self) -> ResponseContext {
        ResponseContext::Site {
            site: self.site.clone(),
        }
    }
}

/// Parses the three peer-list keys shared by `PEX` and `RespPEX`, silently
/// dropping any entry that fails address decoding.
pub(crate) fn parse_peer_lists(
    c: &Condition,
) -> Result<
    (
        BTreeSet<IpKey>,
        BTreeSet<(String, u16)>,
        BTreeSet<(Vec<u8>, u16)>,
    ),
    PacketError,
> {
    let mut peers = BTreeSet::new();
    if let Some(list) = c.as_type_list_opt(opt("peers"))? {
        for item in list {
            if let Some(bytes) = item.as_slice() {
                if let Ok(addr) = unpack_ip(bytes) {
                    peers.insert(IpKey(addr));
                }
            }
        }
    }

    let mut peers_onion = BTreeSet::new();
    if let Some(list) = c.as_type_list_opt(opt("peers_onion"))? {
        for item in list {
            if let Some(bytes) = item.as_slice() {
                if let Ok((addr, port)) = unpack_onion(bytes) {
                    peers_onion.insert((addr.readable(), port));
                }
            }
        }
    }

    let mut peers_i2p = BTreeSet::new();
    if let Some(list) = c.as_type_list_opt(opt("peers_i2p"))? {
        for item in list {
            if let Some(bytes) = item.as_slice() {
                if let Ok((addr, port)) = unpack_i2p(bytes) {
                    peers_i2p.insert((addr.packed().to_vec(), port));
                }
            }
        }
    }

    Ok((peers, peers_onion, peers_i2p))
}

/// `[update]`: pushes a site file update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub site: String,
    pub inner_path: String,
    pub body: Vec<u8>,
}

impl Update {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        Ok(Update {
            site: c.btc("site")?,
            inner_path: c.inner("inner_path")?,
            body: c.strlen("body", 512 * 1024)?.to_vec(),
        })
    }
}

impl ExpectsResponse for Update {
    const RESPONSE_KIND: ResponseKind = ResponseKind::Predicate;

    fn context(&self) -> ResponseContext {
        ResponseContext::None
    }
}

/// `[listModified]`: requests content.json paths modified since a given time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMod {
    pub site: String,
    pub since: u64,
}

impl ListMod {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        Ok(ListMod {
            site: c.btc("site")?,
            since: c.time("since")?,
        })
    }
}

impl ExpectsResponse for ListMod {
    const RESPONSE_KIND: ResponseKind = ResponseKind::RespMod;

    fn context(&self) -> ResponseContext {
        ResponseContext::Site {
            site: self.site.clone(),
        }
    }
}

/// `[getHashfield]`: requests the client's list of downloaded-file hash ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetHash {
    pub site: String,
}

impl GetHash {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        Ok(GetHash { site: c.btc("site")? })
    }
}

impl ExpectsResponse for GetHash {
    const RESPONSE_KIND: ResponseKind = ResponseKind::RespHashSet;

    fn context(&self) -> ResponseContext {
        ResponseContext::Site {
            site: self.site.clone(),
        }
    }
}

/// `[setHashfield]`: announces and updates the sender's hash-id list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetHash {
    pub site: String,
    pub prefixes: BTreeSet<HashPrefix>,
}

impl SetHash {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        let site = c.btc("site")?;
        let prefixes = hash_set(c.as_type_bytes("hashfield_raw")?)?;
        Ok(SetHash { site, prefixes })
    }
}

impl ExpectsResponse for SetHash {
    const RESPONSE_KIND: ResponseKind = ResponseKind::Predicate;

    fn context(&self) -> ResponseContext {
        ResponseContext::None
    }
}

/// `[findHashIds]`: asks if the client knows peers for the given hash ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindHash {
    pub site: String,
    pub prefixes: BTreeSet<HashPrefix>,
}

impl FindHash {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        let site = c.btc("site")?;
        let list = c.as_type_list("hash_ids")?;
        let mut prefixes = BTreeSet::new();
        for item in list {
            if let Some(n) = item.as_u64() {
                if n <= 0xFFFF {
                    if let Ok(prefix) = hash_prefix(n as u32) {
                        prefixes.insert(prefix);
                    }
                }
            }
        }
        Ok(FindHash { site, prefixes })
    }
}

impl ExpectsResponse for FindHash {
    const RESPONSE_KIND: ResponseKind = ResponseKind::RespHashSet;

    fn context(&self) -> ResponseContext {
        ResponseContext::Site {
            site: self.site.clone(),
        }
    }
}

/// `[actionCheckport]`: asks the client to check the sender's listening port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckPort {
    pub port: u16,
}

impl CheckPort {
    pub fn parse(params: &Value) -> Result<Self, PacketError> {
        let c = Condition::new(params);
        Ok(CheckPort { port: c.port("port")? })
    }
}

impl ExpectsResponse for CheckPort {
    const RESPONSE_KIND: ResponseKind = ResponseKind::RespPort;

    fn context(&self) -> ResponseContext {
        ResponseContext::Port { port: self.port }
    }
}

/// Reserved, unimplemented upstream: the envelope parses, the body never
/// does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetPieceStatus;

impl GetPieceStatus {
    pub fn parse(_params: &Value) -> Result<Self, PacketError> {
        Err(PacketError::NotImplemented("getPieceFields"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetPieceStatus;

impl SetPieceStatus {
    pub fn parse(_params: &Value) -> Result<Self, PacketError> {
        Err(PacketError::NotImplemented("setPieceFields"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmpv::Value;

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (Value::from(k.as_bytes().to_vec()), v))
                .collect(),
        )
    }

    #[test]
    fn get_file_defaults_offset_to_zero() {
        let v = map(vec![
            ("site", Value::from(&b"1MeFqFfFFGQfa1J3gJyYYUvb5Lksczq7nH"[..])),
            ("inner_path", Value::from(&b"content.json"[..])),
        ]);
        let req = GetFile::parse(&v).unwrap();
        assert_eq!(req.offset, 0);
        assert_eq!(req.total_size, None);
    }

    #[test]
    fn check_port_context_carries_port() {
        let v = map(vec![("port", Value::from(15441))]);
        let req = CheckPort::parse(&v).unwrap();
        assert_eq!(req.port, 15441);
        assert!(matches!(req.context(), ResponseContext::Port { port: 15441 }));
    }

    #[test]
    fn find_hash_drops_out_of_range_ids() {
        let v = map(vec![
            ("site", Value::from(&b"1MeFqFfFFGQfa1J3gJyYYUvb5Lksczq7nH"[..])),
            (
                "hash_ids",
                Value::from(vec![Value::from(0x4142), Value::from(0x1_0000)]),
            ),
        ]);
        let req = FindHash::parse(&v).unwrap();
        assert_eq!(req.prefixes.len(), 1);
        assert!(req.prefixes.contains(b"AB"));
    }

    #[test]
    fn piece_status_is_reserved() {
        let v = map(vec![]);
        assert!(matches!(
            GetPieceStatus::parse(&v),
            Err(PacketError::NotImplemented(_))
        ));
    }
}
