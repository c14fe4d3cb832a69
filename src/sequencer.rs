//! Matches incoming responses back to the request that asked for them.
//!
//! Mirrors zerolib's `protocol.sequencing.PacketInterp`: `register` records
//! what a request expects in reply (and what of its own context needs to
//! survive into the response, since the wire response never repeats it),
//! `interpret` pops that record when the reply arrives and injects the
//! saved context into the typed response.
//!
//! Outstanding requests live in an insertion-ordered map so that a
//! capacity overflow always evicts the oldest one first, the same
//! dict-as-queue trick `PacketInterp` leans on.

use indexmap::IndexMap;
use std::hash::Hash;

use crate::error::SequencerError;
use crate::packet::request::ResponseContext;
use crate::packet::response::ResponseKind;
use crate::packet::ResponseBody;

const DEFAULT_CAPACITY: usize = 10;

struct Outstanding {
    expected: ResponseKind,
    context: ResponseContext,
}

/// Tracks requests awaiting a reply, keyed by `(sender, req_id)`.
pub struct Sequencer<S> {
    capacity: usize,
    outstanding: IndexMap<(S, u32), Outstanding>,
}

impl<S: Eq + Hash + Clone> Default for Sequencer<S> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl<S: Eq + Hash + Clone> Sequencer<S> {
    pub fn with_capacity(capacity: usize) -> Self {
        Sequencer {
            capacity: capacity.max(1),
            outstanding: IndexMap::new(),
        }
    }

    /// Generates a request id. Callers are expected to pass it straight to
    /// `register` alongside the packet they send.
    pub fn new_id(&self) -> u32 {
        rand::random()
    }

    /// Records that `sender` owes us a reply of `expected` kind, carrying
    /// `context` forward to be injected into it. If the table is already at
    /// capacity the oldest outstanding entry is dropped to make room.
    pub fn register(&mut self, sender: S, req_id: u32, expected: ResponseKind, context: ResponseContext) {
        if self.outstanding.len() >= self.capacity && !self.outstanding.contains_key(&(sender.clone(), req_id)) {
            self.outstanding.shift_remove_index(0);
        }
        self.outstanding
            .insert((sender, req_id), Outstanding { expected, context });
    }

    /// Matches an incoming response to its registered request, validates
    /// the response is of the expected class, and injects the saved
    /// context into it.
    ///
    /// Returns `Unsolicited` if no request is outstanding for `(sender,
    /// req_id)`, `TypeMismatch` if the response isn't the class the
    /// request expected, or a file-continuity error if a `RespFile`'s
    /// reported offset doesn't pick up where the last chunk left off.
    pub fn interpret(
        &mut self,
        sender: &S,
        req_id: u32,
        mut response: ResponseBody,
    ) -> Result<ResponseBody, SequencerError> {
        let key = (sender.clone(), req_id);
        let outstanding = self
            .outstanding
            .shift_remove(&key)
            .ok_or(SequencerError::Unsolicited { req_id })?;

        if response.kind() != outstanding.expected {
            return Err(SequencerError::TypeMismatch {
                req_id,
                expected: outstanding.expected.name(),
                found: response.kind().name(),
            });
        }

        inject(&mut response, outstanding.context, req_id)?;
        Ok(response)
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }
}

fn inject(
    response: &mut ResponseBody,
    context: ResponseContext,
    req_id: u32,
) -> Result<(), SequencerError> {
    match (response, context) {
        (
            ResponseBody::RespFile(file),
            ResponseContext::GetFile {
                site,
                inner_path,
                offset,
                total_size,
            },
        ) => {
            if file.offset != offset {
                return Err(SequencerError::Continuity {
                    expected: offset,
                    actual: file.offset,
                });
            }
            if let Some(expected) = total_size {
                if expected != file.size {
                    return Err(SequencerError::SizeMismatch {
                        expected,
                        actual: file.size,
                    });
                }
            }
            file.site = Some(site);
            file.inner_path = Some(inner_path);
            file.total_size = total_size;
            let _ = req_id;
        }
        (ResponseBody::RespPex(resp), ResponseContext::Site { site }) => {
            resp.site = Some(site);
        }
        (ResponseBody::RespMod(resp), ResponseContext::Site { site }) => {
            resp.site = Some(site);
        }
        (ResponseBody::RespHashSet(resp), ResponseContext::Site { site }) => {
            resp.site = Some(site);
        }
        (ResponseBody::RespPort(resp), ResponseContext::Port { port }) => {
            resp.port = Some(port);
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::response::{Predicate, RespFile, RespPort};

    #[test]
    fn port_check_round_trip_injects_port() {
        let mut seq: Sequencer<&str> = Sequencer::default();
        seq.register("peerA", 1, ResponseKind::RespPort, ResponseContext::Port { port: 15441 });

        let response = ResponseBody::RespPort(RespPort {
            status: "open".to_string(),
            open: true,
            port: None,
        });
        let result = seq.interpret(&"peerA", 1, response).unwrap();
        match result {
            ResponseBody::RespPort(resp) => assert_eq!(resp.port, Some(15441)),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(seq.is_empty());
    }

    #[test]
    fn unsolicited_response_is_rejected() {
        let mut seq: Sequencer<&str> = Sequencer::default();
        let response = ResponseBody::Predicate(Predicate {
            ok: true,
            error: None,
        });
        let err = seq.interpret(&"peerA", 99, response).unwrap_err();
        assert_eq!(err, SequencerError::Unsolicited { req_id: 99 });
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let mut seq: Sequencer<&str> = Sequencer::default();
        seq.register("peerA", 1, ResponseKind::RespPort, ResponseContext::None);
        let response = ResponseBody::Predicate(Predicate {
            ok: true,
            error: None,
        });
        let err = seq.interpret(&"peerA", 1, response).unwrap_err();
        assert!(matches!(err, SequencerError::TypeMismatch { .. }));
    }

    #[test]
    fn non_consecutive_file_chunk_is_rejected() {
        let mut seq: Sequencer<&str> = Sequencer::default();
        seq.register(
            "peerA",
            1,
            ResponseKind::RespFile,
            ResponseContext::GetFile {
                site: "1Site".to_string(),
                inner_path: "content.json".to_string(),
                offset: 1024,
                total_size: Some(2048),
            },
        );
        let response = ResponseBody::RespFile(RespFile {
            body: vec![0u8; 512],
            location: 511,
            size: 2048,
            offset: 0,
            site: None,
            inner_path: None,
            total_size: None,
        });
        let err = seq.interpret(&"peerA", 1, response).unwrap_err();
        assert_eq!(
            err,
            SequencerError::Continuity {
                expected: 1024,
                actual: 0
            }
        );
    }

    #[test]
    fn consecutive_file_chunk_at_the_start_of_the_file_is_accepted() {
        let mut seq: Sequencer<&str> = Sequencer::default();
        seq.register(
            "peerA",
            1,
            ResponseKind::RespFile,
            ResponseContext::GetFile {
                site: "1Site".to_string(),
                inner_path: "content.json".to_string(),
                offset: 0,
                total_size: Some(20),
            },
        );
        let response = ResponseBody::RespFile(RespFile {
            body: vec![0u8; 20],
            location: 19,
            size: 20,
            offset: 0,
            site: None,
            inner_path: None,
            total_size: None,
        });
        let result = seq.interpret(&"peerA", 1, response).unwrap();
        match result {
            ResponseBody::RespFile(file) => {
                assert_eq!(file.site.as_deref(), Some("1Site"));
                assert_eq!(file.inner_path.as_deref(), Some("content.json"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn capacity_overflow_evicts_oldest_entry() {
        let mut seq: Sequencer<&str> = Sequencer::with_capacity(2);
        seq.register("peerA", 1, ResponseKind::Pong, ResponseContext::None);
        seq.register("peerA", 2, ResponseKind::Pong, ResponseContext::None);
        seq.register("peerA", 3, ResponseKind::Pong, ResponseContext::None);
        assert_eq!(seq.len(), 2);
        let response = ResponseBody::Predicate(Predicate {
            ok: true,
            error: None,
        });
        let err = seq.interpret(&"peerA", 1, response).unwrap_err();
        assert_eq!(err, SequencerError::Unsolicited { req_id: 1 });
    }
}
