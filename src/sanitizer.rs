//! Field-level validators over a decoded MessagePack map.
//!
//! Mirrors zerolib's `protocol.sanitizer.Condition`: every accessor takes a
//! mandatory key or an [`opt`]-wrapped optional key, and raises the kind of
//! [`PacketError`] the field failed on (wrong type, out of range, wrong
//! shape, or simply absent).

use std::sync::LazyLock;

use regex::Regex;
use rmpv::Value;

use crate::error::PacketError;

pub const RANGE_SIZE: (u64, u64) = (0, 0xFF_FFFF_FFFF); // 2^40 - 1
pub const RANGE_TIME: (u64, u64) = (0, u64::MAX);
pub const RANGE_PORT: (u64, u64) = (0, 65535);

/// Characters allowed in an inner path after `\` -> `/` folding and leading
/// `/` stripping. Matches zerolib's `chars_path`.
const CHARS_PATH: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 !#$(%&)+,-./=@[_]`{~}";

static REGEX_BTC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^1[A-Za-z0-9]{25,}$").unwrap());
static REGEX_ONION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{16}$").unwrap());
static REGEX_HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{1,50}$").unwrap());

/// A key accessor: either mandatory, or optional (absence yields `None`
/// instead of `PacketError::Key`).
#[derive(Clone, Copy)]
pub enum Key {
    Required(&'static str),
    Optional(&'static str),
}

pub fn opt(key: &'static str) -> Key {
    Key::Optional(key)
}

impl From<&'static str> for Key {
    fn from(key: &'static str) -> Self {
        Key::Required(key)
    }
}

/// The semantic type an `as_type` check accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Semantic {
    Bytes,
    List,
    Map,
    Int,
}

/// Wraps a decoded MessagePack map of byte-string keys to arbitrary values.
pub struct Condition<'a> {
    params: &'a Value,
}

impl<'a> Condition<'a> {
    pub fn new(params: &'a Value) -> Self {
        Condition { params }
    }

    fn lookup(&self, key: &str) -> Option<&'a Value> {
        self.params
            .as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key) || k.as_slice() == Some(key.as_bytes()))
            .map(|(_, v)| v)
    }

    fn required<T>(
        &self,
        key: Key,
        f: impl FnOnce(&'a Value) -> Result<T, PacketError>,
    ) -> Result<T, PacketError> {
        match key {
            Key::Required(name) => {
                let v = self.lookup(name).ok_or_else(|| PacketError::key(name))?;
                f(v)
            }
            Key::Optional(_) => unreachable!("required() called with Key::Optional"),
        }
    }

    fn optional<T>(
        &self,
        key: Key,
        f: impl FnOnce(&'a Value) -> Result<T, PacketError>,
    ) -> Result<Option<T>, PacketError> {
        match key {
            Key::Optional(name) => match self.lookup(name) {
                Some(v) => f(v).map(Some),
                None => Ok(None),
            },
            Key::Required(name) => f(self.lookup(name).ok_or_else(|| PacketError::key(name))?)
                .map(Some),
        }
    }

    /// Value must be present and of the given semantic type. Only usable
    /// with a mandatory key since it always returns `T`, never `Option<T>`.
    pub fn as_type_bytes(&self, key: &'static str) -> Result<&'a [u8], PacketError> {
        self.required(Key::Required(key), check_bytes)
    }

    pub fn as_type_bytes_opt(&self, key: Key) -> Result<Option<&'a [u8]>, PacketError> {
        self.optional(key, check_bytes)
    }

    pub fn as_type_list(&self, key: &'static str) -> Result<&'a [Value], PacketError> {
        self.required(Key::Required(key), check_list)
    }

    pub fn as_type_list_opt(&self, key: Key) -> Result<Option<&'a [Value]>, PacketError> {
        self.optional(key, check_list)
    }

    pub fn as_type_map(&self, key: &'static str) -> Result<&'a [(Value, Value)], PacketError> {
        self.required(Key::Required(key), check_map)
    }

    pub fn strlen(&self, key: &'static str, max_len: usize) -> Result<&'a [u8], PacketError> {
        self.required(Key::Required(key), |v| check_length(v, max_len))
    }

    pub fn strlen_opt(&self, key: Key, max_len: usize) -> Result<Option<&'a [u8]>, PacketError> {
        self.optional(key, |v| check_length(v, max_len))
    }

    pub fn range(&self, key: &'static str, bounds: (u64, u64)) -> Result<u64, PacketError> {
        self.required(Key::Required(key), |v| check_range(v, bounds))
    }

    pub fn range_opt(&self, key: Key, bounds: (u64, u64)) -> Result<Option<u64>, PacketError> {
        self.optional(key, |v| check_range(v, bounds))
    }

    pub fn time(&self, key: &'static str) -> Result<u64, PacketError> {
        self.range(key, RANGE_TIME)
    }

    pub fn as_size(&self, key: &'static str) -> Result<u64, PacketError> {
        self.range(key, RANGE_SIZE)
    }

    pub fn as_size_opt(&self, key: Key) -> Result<Option<u64>, PacketError> {
        self.range_opt(key, RANGE_SIZE)
    }

    pub fn port(&self, key: &'static str) -> Result<u16, PacketError> {
        Ok(self.range(key, RANGE_PORT)? as u16)
    }

    pub fn port_opt(&self, key: Key) -> Result<Option<u16>, PacketError> {
        Ok(self.range_opt(key, RANGE_PORT)?.map(|v| v as u16))
    }

    pub fn regex(&self, key: &'static str, re: &Regex) -> Result<String, PacketError> {
        self.required(Key::Required(key), |v| check_regex(v, re))
    }

    pub fn regex_opt(&self, key: Key, re: &Regex) -> Result<Option<String>, PacketError> {
        self.optional(key, |v| check_regex(v, re))
    }

    pub fn btc(&self, key: &'static str) -> Result<String, PacketError> {
        self.regex(key, &REGEX_BTC)
    }

    pub fn handle(&self, key: &'static str) -> Result<String, PacketError> {
        self.regex(key, &REGEX_HANDLE)
    }

    pub fn onion(&self, key: &'static str) -> Result<String, PacketError> {
        self.regex(key, &REGEX_ONION)
    }

    pub fn onion_opt(&self, key: Key) -> Result<Option<String>, PacketError> {
        self.regex_opt(key, &REGEX_ONION)
    }

    pub fn inner(&self, key: &'static str) -> Result<String, PacketError> {
        self.required(Key::Required(key), check_path)
    }

    pub fn inner_opt(&self, key: Key) -> Result<Option<String>, PacketError> {
        self.optional(key, check_path)
    }

    pub fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }
}

fn check_bytes(v: &Value) -> Result<&[u8], PacketError> {
    v.as_slice().ok_or(PacketError::Type {
        expected: "bytes",
        found: kind_name(v),
    })
}

fn check_list(v: &Value) -> Result<&[Value], PacketError> {
    v.as_array().map(|a| a.as_slice()).ok_or(PacketError::Type {
        expected: "list",
        found: kind_name(v),
    })
}

fn check_map(v: &Value) -> Result<&[(Value, Value)], PacketError> {
    v.as_map().map(|m| m.as_slice()).ok_or(PacketError::Type {
        expected: "map",
        found: kind_name(v),
    })
}

fn check_length(v: &Value, max_len: usize) -> Result<&[u8], PacketError> {
    let bytes = check_bytes(v)?;
    if bytes.len() > max_len {
        return Err(PacketError::value(format!(
            "string is too long: should be at most {} characters, not {}",
            max_len,
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn check_range(v: &Value, bounds: (u64, u64)) -> Result<u64, PacketError> {
    let (lo, hi) = bounds;
    let n = v
        .as_u64()
        .or_else(|| v.as_i64().and_then(|i| u64::try_from(i).ok()))
        .ok_or(PacketError::Type {
            expected: "int",
            found: kind_name(v),
        })?;
    if n < lo || n > hi {
        return Err(PacketError::value(format!(
            "value out of range [{}, {}]: {}",
            lo, hi, n
        )));
    }
    Ok(n)
}

fn check_regex(v: &Value, re: &Regex) -> Result<String, PacketError> {
    let bytes = check_bytes(v)?;
    let s = std::str::from_utf8(bytes).map_err(|_| {
        PacketError::value("value is not valid ASCII/UTF-8 for a regex check".to_string())
    })?;
    if !re.is_match(s) {
        return Err(PacketError::value(format!(
            "failed regex test {:?}: {:?}",
            re.as_str(),
            s
        )));
    }
    Ok(s.to_string())
}

fn check_path(v: &Value) -> Result<String, PacketError> {
    let bytes = check_length(v, 255)?;
    let s = std::str::from_utf8(bytes)
        .map_err(|_| PacketError::value("inner path is not ASCII".to_string()))?;
    let folded = s.replace('\\', "/");
    let stripped = folded.trim_start_matches('/');
    if stripped.split('/').any(|segment| segment == "..") {
        return Err(PacketError::value(format!(
            ".. in inner_path {:?}",
            stripped
        )));
    }
    for ch in stripped.chars() {
        if !CHARS_PATH.contains(ch) {
            return Err(PacketError::value(format!(
                "invalid char {:?} in inner_path {:?}",
                ch, stripped
            )));
        }
    }
    Ok(stripped.to_string())
}

fn kind_name(v: &Value) -> String {
    match v {
        Value::Nil => "nil",
        Value::Boolean(_) => "bool",
        Value::Integer(_) => "int",
        Value::F32(_) | Value::F64(_) => "float",
        Value::String(_) => "string",
        Value::Binary(_) => "bytes",
        Value::Array(_) => "list",
        Value::Map(_) => "map",
        Value::Ext(..) => "ext",
        _ => "unknown",
    }
    .to_string()
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
    fn range_accepts_in_bounds_and_rejects_out_of_bounds() {
        let v = map(vec![("n", Value::from(1024))]);
        let c = Condition::new(&v);
        assert_eq!(c.range("n", (0, 1024)).unwrap(), 1024);
        assert!(c.range("n", (0, 1023)).is_err());
    }

    #[test]
    fn range_rejects_wrong_type() {
        let v = map(vec![("n", Value::from("nope"))]);
        let c = Condition::new(&v);
        assert!(matches!(
            c.range("n", (0, 2048)),
            Err(PacketError::Type { .. })
        ));
    }

    #[test]
    fn port_round_trip() {
        let v = map(vec![("port", Value::from(15441))]);
        let c = Condition::new(&v);
        assert_eq!(c.port("port").unwrap(), 15441);
    }

    #[test]
    fn port_out_of_range_is_value_error() {
        let v = map(vec![("port", Value::from(65536))]);
        let c = Condition::new(&v);
        assert!(matches!(c.port("port"), Err(PacketError::Value(_))));
    }

    #[test]
    fn inner_path_strips_leading_slash_and_rejects_dotdot() {
        let v = map(vec![
            ("a", Value::from(&b"/etc/passwd"[..])),
            ("b", Value::from(&b"./././../../etc/passwd"[..])),
        ]);
        let c = Condition::new(&v);
        assert_eq!(c.inner("a").unwrap(), "etc/passwd");
        assert!(c.inner("b").is_err());
    }

    #[test]
    fn inner_path_rejects_backslash_free_and_too_long() {
        let long = "a".repeat(300);
        let v = map(vec![("p", Value::from(long.as_bytes()))]);
        let c = Condition::new(&v);
        assert!(c.inner("p").is_err());
    }

    #[test]
    fn opt_missing_key_yields_none() {
        let v = map(vec![]);
        let c = Condition::new(&v);
        assert_eq!(c.inner_opt(opt("nope")).unwrap(), None);
    }

    #[test]
    fn opt_present_but_invalid_still_errors() {
        let v = map(vec![("p", Value::from(&b"a/../b"[..]))]);
        let c = Condition::new(&v);
        assert!(c.inner_opt(opt("p")).is_err());
    }

    #[test]
    fn btc_regex() {
        let v = map(vec![(
            "site",
            Value::from(&b"1MeFqFfFFGQfa1J3gJyYYUvb5Lksczq7nH"[..]),
        )]);
        let c = Condition::new(&v);
        assert!(c.btc("site").is_ok());
    }
}
