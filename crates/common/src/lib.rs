//! Shared building blocks for rs-captive-core.
//!
//! This crate carries the pieces every other crate needs:
//!
//! - [`xdr_stream`]: size-prefixed XDR frame streams, binary-compatible with
//!   stellar-core's `XDROutputFileStream` wire format
//! - [`network`]: standard Stellar network passphrases

pub mod network;
pub mod xdr_stream;

pub use xdr_stream::{XdrFramedReader, XdrOutputStream};
