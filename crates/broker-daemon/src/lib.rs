//! `brokerd`'s internals, split into a library so integration tests (§10.7) can drive
//! the event engine directly over real sockets and self-signed test certificates,
//! without needing live DNS or a real CA.

pub mod cli;
pub mod config;
pub mod engine;
pub mod protocol;
pub mod state;
