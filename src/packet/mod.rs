//! The packet model: typed request and response bodies, wrapped in an
//! envelope carrying the wire's `req_id` and whatever identifies the peer
//! a packet came from or is going to.
//!
//! `S` is left generic on purpose — this crate never opens a socket, so it
//! has no opinion on what identifies a connection. Callers plug in their
//! own connection handle or peer-table key.

pub mod hashset;
pub mod request;
pub mod response;

use request::{
    CheckPort, FindHash, GetFile, GetHash, GetPieceStatus, Handshake, ListMod, Pex, Ping, SetHash,
    SetPieceStatus, Update,
};
use response::{
    Ack, Predicate, Pong, RespFile, RespHashDict, RespHashSet, RespMod, RespPex, RespPieceDict,
    RespPort,
};

/// A decoded packet body plus the bookkeeping the wire format carries
/// alongside it: the sequence number used to match requests to responses,
/// and the peer it was read from (or is addressed to).
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<S, T> {
    pub req_id: u32,
    pub sender: S,
    pub body: T,
}

pub type Request<S> = Envelope<S, RequestBody>;
pub type Response<S> = Envelope<S, ResponseBody>;

/// Either side of the wire: a command the peer sent us, or a reply to one
/// of ours.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet<S> {
    Request(Request<S>),
    Response(Response<S>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Ping(Ping),
    Handshake(Handshake),
    GetFile(GetFile),
    Pex(Pex),
    Update(Update),
    ListMod(ListMod),
    GetHash(GetHash),
    SetHash(SetHash),
    FindHash(FindHash),
    CheckPort(CheckPort),
    GetPieceStatus(GetPieceStatus),
    SetPieceStatus(SetPieceStatus),
}

impl RequestBody {
    /// The name this request arrives as on the wire, under the `cmd` key.
    pub fn cmd(&self) -> &'static str {
        match self {
            RequestBody::Ping(_) => "ping",
            RequestBody::Handshake(_) => "handshake",
            RequestBody::GetFile(_) => "getFile",
            RequestBody::Pex(_) => "pex",
            RequestBody::Update(_) => "update",
            RequestBody::ListMod(_) => "listModified",
            RequestBody::GetHash(_) => "getHashfield",
            RequestBody::SetHash(_) => "setHashfield",
            RequestBody::FindHash(_) => "findHashIds",
            RequestBody::CheckPort(_) => "actionCheckport",
            RequestBody::GetPieceStatus(_) => "getPieceFields",
            RequestBody::SetPieceStatus(_) => "setPieceFields",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Pong(Pong),
    Predicate(Predicate),
    Ack(Ack),
    RespFile(RespFile),
    RespPex(RespPex),
    RespMod(RespMod),
    RespHashSet(RespHashSet),
    RespHashDict(RespHashDict),
    RespPort(RespPort),
    RespPieceDict(RespPieceDict),
}

impl ResponseBody {
    pub fn kind(&self) -> response::ResponseKind {
        use response::ResponseKind::*;
        match self {
            ResponseBody::Pong(_) => Pong,
            ResponseBody::Predicate(_) => Predicate,
            ResponseBody::Ack(_) => Ack,
            ResponseBody::RespFile(_) => RespFile,
            ResponseBody::RespPex(_) => RespPex,
            ResponseBody::RespMod(_) => RespMod,
            ResponseBody::RespHashSet(_) => RespHashSet,
            ResponseBody::RespHashDict(_) => RespHashDict,
            ResponseBody::RespPort(_) => RespPort,
            ResponseBody::RespPieceDict(_) => RespPieceDict,
        }
    }
}
