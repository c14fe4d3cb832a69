//! Onion, I2P b32, and IPv4/IPv6 address packing and unpacking.
//!
//! Three address families, each with a packed byte form (what travels on
//! the wire inside a peer-exchange list) and a human-readable string form,
//! compared by packed bytes — mirrors zerolib's `OnionAddress` and the
//! `unpack_ip` / `unpack_onion` free functions in `protocol/packets.py`.

use std::net::{Ipv4Addr, Ipv6Addr};

use byteorder::{BigEndian, ByteOrder};

use crate::error::PacketError;

/// A Tor onion service address, identified by its packed key bytes.
/// v2 addresses pack to 10 bytes, v3 addresses pack to 35 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OnionAddress {
    packed: Vec<u8>,
}

impl OnionAddress {
    pub fn from_packed(packed: &[u8]) -> Result<Self, PacketError> {
        if packed.len() != 10 && packed.len() != 35 {
            return Err(PacketError::value(format!(
                "a packed onion address should be either 10 or 35 bytes long, not {}",
                packed.len()
            )));
        }
        Ok(OnionAddress {
            packed: packed.to_vec(),
        })
    }

    pub fn packed(&self) -> &[u8] {
        &self.packed
    }

    /// Lowercase base32 of the packed key, suffixed with `.onion`.
    pub fn readable(&self) -> String {
        format!(
            "{}.onion",
            base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &self.packed)
                .to_lowercase()
        )
    }
}

/// An I2P b32 destination address: always 32 packed bytes, always port 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct I2pAddress {
    packed: [u8; 32],
}

impl I2pAddress {
    pub fn from_packed(packed: &[u8]) -> Result<Self, PacketError> {
        let arr: [u8; 32] = packed.try_into().map_err(|_| {
            PacketError::value(format!(
                "a packed i2p b32 address should be 32 bytes long, not {}",
                packed.len()
            ))
        })?;
        Ok(I2pAddress { packed: arr })
    }

    pub fn packed(&self) -> &[u8] {
        &self.packed
    }

    /// Lowercase, padded base32 of the packed key, suffixed with `.b32.i2p`.
    pub fn readable(&self) -> String {
        format!(
            "{}.b32.i2p",
            base32::encode(base32::Alphabet::Rfc4648 { padding: true }, &self.packed)
                .to_lowercase()
        )
    }
}

/// An IPv4 or IPv6 socket address, as packed on the wire (trailing 2 bytes
/// are the big-endian port).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpAddrPort {
    V4(Ipv4Addr, u16),
    V6(Ipv6Addr, u16),
}

/// Unpacks a `(address, port)` pair from a 6-byte (IPv4) or 18-byte (IPv6)
/// packed blob.
pub fn unpack_ip(b: &[u8]) -> Result<IpAddrPort, PacketError> {
    match b.len() {
        6 => {
            let octets: [u8; 4] = b[0..4].try_into().unwrap();
            let port = BigEndian::read_u16(&b[4..6]);
            Ok(IpAddrPort::V4(Ipv4Addr::from(octets), port))
        }
        18 => {
            let octets: [u8; 16] = b[0..16].try_into().unwrap();
            let port = BigEndian::read_u16(&b[16..18]);
            Ok(IpAddrPort::V6(Ipv6Addr::from(octets), port))
        }
        other => Err(PacketError::value(format!(
            "a packed IP address should be either 6 or 18 bytes long, not {}",
            other
        ))),
    }
}

/// Unpacks an onion `(address, port)` pair: packed onion key followed by a
/// big-endian port.
pub fn unpack_onion(b: &[u8]) -> Result<(OnionAddress, u16), PacketError> {
    if b.len() < 2 {
        return Err(PacketError::value("onion peer entry too short".to_string()));
    }
    let (key, port_bytes) = b.split_at(b.len() - 2);
    let address = OnionAddress::from_packed(key)?;
    let port = BigEndian::read_u16(port_bytes);
    Ok((address, port))
}

/// Unpacks an i2p `(address, port=0)` pair: the packed destination carries
/// no port, it is always reported as 0.
pub fn unpack_i2p(b: &[u8]) -> Result<(I2pAddress, u16), PacketError> {
    let address = I2pAddress::from_packed(b)?;
    Ok((address, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_round_trip_v4() {
        let mut packed = vec![192, 168, 0, 1];
        packed.extend_from_slice(&80u16.to_be_bytes());
        match unpack_ip(&packed).unwrap() {
            IpAddrPort::V4(addr, port) => {
                assert_eq!(addr, Ipv4Addr::new(192, 168, 0, 1));
                assert_eq!(port, 80);
            }
            _ => panic!("expected V4"),
        }
    }

    #[test]
    fn ip_rejects_bad_length() {
        assert!(unpack_ip(&[0u8; 5]).is_err());
    }

    #[test]
    fn onion_v2_packed_length_and_readable() {
        let packed = [0u8; 10];
        let addr = OnionAddress::from_packed(&packed).unwrap();
        assert_eq!(addr.packed().len(), 10);
        assert!(addr.readable().ends_with(".onion"));
        assert_eq!(addr.readable(), addr.readable().to_lowercase());
    }

    #[test]
    fn onion_rejects_bad_length() {
        assert!(OnionAddress::from_packed(&[0u8; 11]).is_err());
    }

    #[test]
    fn i2p_is_always_port_zero() {
        let (_, port) = unpack_i2p(&[0u8; 32]).unwrap();
        assert_eq!(port, 0);
    }
}
