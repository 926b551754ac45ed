//! Snapshot state for emulated devices.
//!
//! Every device that participates in save/restore serializes its
//! guest-visible state into a small self-describing blob: a fixed header
//! (magic, format version, device 4CC, device version) followed by tagged
//! fields. Unknown tags are skipped on load so minor-version additions stay
//! backward compatible; device major versions must match.
//!
//! Snapshots may be loaded from untrusted sources. The decoder is bounded:
//! it never preallocates from lengths found in the input and fails with
//! [`io::state::SnapshotError::UnexpectedEof`] on truncation.

pub mod io;
