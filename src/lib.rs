//! A ZeroNet-style peer wire protocol: MessagePack packet schema,
//! request/response sequencing, and the peer and connection tables that
//! sit behind them. No socket I/O lives here — callers own the transport
//! and hand this crate bytes in, packets out.

pub mod address;
pub mod connections;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod packet;
pub mod router;
pub mod rwlock;
pub mod sanitizer;
pub mod sequencer;
