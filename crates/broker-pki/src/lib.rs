//! CA-backed enrollment signing and DNS-based identity corroboration (§4.4/§6), grounded
//! on `original_source/src/enroll.c` and `original_source/src/auth.c` respectively.

mod ca;
mod resolver;

pub use ca::{CaError, CaSigner};
pub use resolver::{IdentityResolver, ResolveError};
