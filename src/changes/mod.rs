//! Change protocol.
//!
//! Changes are the unit of persistence: the model turns its dirty state into
//! an ordered batch of inserts, updates, deletes and commands, and the
//! executor applies the batch as a whole. Batches travel as JSON arrays; see
//! [`codec`] for the wire format.

mod change;
pub mod codec;
mod error;

pub use change::{Change, ChangeKind};
pub use codec::{encode, to_json_string, ChangeDecoder};
pub use error::{DecodeError, DecodeResult};
