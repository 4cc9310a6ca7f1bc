//! Symmetric cipher stream for the encrypted listener mode.
//!
//! # Responsibilities
//! - Parse the configured AEAD method
//! - Derive per-user master keys and per-direction subkeys
//! - Present a sealed connection as a plain `AsyncRead + AsyncWrite` stream
//!
//! # Design Decisions
//! - Deadlines stay with the caller; the wrapper never sleeps or times out
//! - A failed tag check surfaces as `io::ErrorKind::InvalidData` so the relay
//!   treats it like any other read error

pub mod cipher;
pub mod stream;

pub use cipher::{CipherError, CipherKind, MasterKey, MAX_PAYLOAD};
pub use stream::CipherStream;
