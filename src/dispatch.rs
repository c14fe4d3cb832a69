//! Wires a decoded packet to application code.
//!
//! Mirrors zerolib's `nettools.server.BaseServer.handle` / `func_routing`:
//! requests are routed straight to a handler method named after the
//! command, responses are run through the sequencer first (so the
//! handler only ever sees a context-injected, type-checked response) and
//! dropped silently if the sequencer rejects them — an unsolicited or
//! mismatched response is a protocol violation from the peer, not
//! something calling code needs to react to per-packet.

use std::hash::Hash;
use std::sync::Mutex;

use crate::decode::{Decoded, DecodedBody};
use crate::error::SequencerError;
use crate::packet::request::{
    CheckPort, FindHash, GetFile, GetHash, GetPieceStatus, Handshake, ListMod, Pex, Ping, SetHash,
    SetPieceStatus, Update,
};
use crate::packet::{RequestBody, ResponseBody};
use crate::sequencer::Sequencer;

/// Implemented by application code that wants to react to incoming
/// packets. Every method has a no-op default; implement only the ones
/// relevant to the peer role being built (a seed doesn't care about
/// `on_handshake` if handshaking is handled before packets ever reach
/// this trait, for instance).
pub trait Dispatch<S> {
    fn on_ping(&mut self, _sender: &S, _req: &Ping) -> Option<ResponseBody> {
        None
    }
    fn on_handshake(&mut self, _sender: &S, _req: &Handshake) -> Option<ResponseBody> {
        None
    }
    fn on_get_file(&mut self, _sender: &S, _req: &GetFile) -> Option<ResponseBody> {
        None
    }
    fn on_pex(&mut self, _sender: &S, _req: &Pex) -> Option<ResponseBody> {
        None
    }
    fn on_update(&mut self, _sender: &S, _req: &Update) -> Option<ResponseBody> {
        None
    }
    fn on_list_mod(&mut self, _sender: &S, _req: &ListMod) -> Option<ResponseBody> {
        None
    }
    fn on_get_hash(&mut self, _sender: &S, _req: &GetHash) -> Option<ResponseBody> {
        None
    }
    fn on_set_hash(&mut self, _sender: &S, _req: &SetHash) -> Option<ResponseBody> {
        None
    }
    fn on_find_hash(&mut self, _sender: &S, _req: &FindHash) -> Option<ResponseBody> {
        None
    }
    fn on_check_port(&mut self, _sender: &S, _req: &CheckPort) -> Option<ResponseBody> {
        None
    }
    fn on_get_piece_status(&mut self, _sender: &S, _req: &GetPieceStatus) -> Option<ResponseBody> {
        None
    }
    fn on_set_piece_status(&mut self, _sender: &S, _req: &SetPieceStatus) -> Option<ResponseBody> {
        None
    }

    /// Called with a response once the sequencer has matched it to its
    /// request and injected the request's saved context into it.
    fn on_response(&mut self, _sender: &S, _resp: ResponseBody) {}
}

fn dispatch_request<S, D: Dispatch<S> + ?Sized>(
    handler: &mut D,
    sender: &S,
    body: &RequestBody,
) -> Option<ResponseBody> {
    match body {
        RequestBody::Ping(req) => handler.on_ping(sender, req),
        RequestBody::Handshake(req) => handler.on_handshake(sender, req),
        RequestBody::GetFile(req) => handler.on_get_file(sender, req),
        RequestBody::Pex(req) => handler.on_pex(sender, req),
        RequestBody::Update(req) => handler.on_update(sender, req),
        RequestBody::ListMod(req) => handler.on_list_mod(sender, req),
        RequestBody::GetHash(req) => handler.on_get_hash(sender, req),
        RequestBody::SetHash(req) => handler.on_set_hash(sender, req),
        RequestBody::FindHash(req) => handler.on_find_hash(sender, req),
        RequestBody::CheckPort(req) => handler.on_check_port(sender, req),
        RequestBody::GetPieceStatus(req) => handler.on_get_piece_status(sender, req),
        RequestBody::SetPieceStatus(req) => handler.on_set_piece_status(sender, req),
    }
}

/// Routes one decoded packet: a request goes straight to its handler
/// method, a response is matched against the sequencer first. Returns the
/// reply the handler wants sent back to `sender`, if any.
pub fn handle<S, D>(
    sequencer: &Mutex<Sequencer<S>>,
    handler: &mut D,
    sender: &S,
    decoded: Decoded,
) -> Option<ResponseBody>
where
    S: Eq + Hash + Clone,
    D: Dispatch<S> + ?Sized,
{
    match decoded.body {
        DecodedBody::Request(req) => dispatch_request(handler, sender, &req),
        DecodedBody::Response(resp) => {
            let interpreted = {
                let mut seq = sequencer.lock().unwrap();
                seq.interpret(sender, decoded.req_id, resp)
            };
            match interpreted {
                Ok(resp) => {
                    handler.on_response(sender, resp);
                }
                Err(SequencerError::Unsolicited { req_id }) => {
                    log::warn!("unsolicited response for req_id {req_id}, dropping");
                }
                Err(e) => {
                    log::warn!("rejecting response: {e}");
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::request::ResponseContext;
    use crate::packet::response::ResponseKind;

    struct Recorder {
        pinged: bool,
        responses: Vec<ResponseBody>,
    }

    impl Dispatch<&'static str> for Recorder {
        fn on_ping(&mut self, _sender: &&'static str, _req: &Ping) -> Option<ResponseBody> {
            self.pinged = true;
            None
        }

        fn on_response(&mut self, _sender: &&'static str, resp: ResponseBody) {
            self.responses.push(resp);
        }
    }

    #[test]
    fn request_reaches_its_handler_method() {
        let sequencer = Mutex::new(Sequencer::default());
        let mut handler = Recorder {
            pinged: false,
            responses: vec![],
        };
        let decoded = Decoded {
            req_id: 1,
            body: DecodedBody::Request(RequestBody::Ping(Ping)),
        };
        handle(&sequencer, &mut handler, &"peerA", decoded);
        assert!(handler.pinged);
    }

    #[test]
    fn unsolicited_response_is_dropped_not_delivered() {
        let sequencer = Mutex::new(Sequencer::default());
        let mut handler = Recorder {
            pinged: false,
            responses: vec![],
        };
        let decoded = Decoded {
            req_id: 7,
            body: DecodedBody::Response(ResponseBody::Pong(crate::packet::response::Pong)),
        };
        handle(&sequencer, &mut handler, &"peerA", decoded);
        assert!(handler.responses.is_empty());
    }

    #[test]
    fn matched_response_is_delivered_with_injected_context() {
        let sequencer = Mutex::new(Sequencer::default());
        {
            let mut seq = sequencer.lock().unwrap();
            seq.register(
                "peerA",
                3,
                ResponseKind::RespPort,
                ResponseContext::Port { port: 15441 },
            );
        }
        let mut handler = Recorder {
            pinged: false,
            responses: vec![],
        };
        let decoded = Decoded {
            req_id: 3,
            body: DecodedBody::Response(ResponseBody::RespPort(crate::packet::response::RespPort {
                status: "open".to_string(),
                open: true,
                port: None,
            })),
        };
        handle(&sequencer, &mut handler, &"peerA", decoded);
        match &handler.responses[0] {
            ResponseBody::RespPort(resp) => assert_eq!(resp.port, Some(15441)),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
