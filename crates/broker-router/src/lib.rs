//! Topic index and access policy: the two static/shared data structures every dispatched
//! command consults (§4.3, §4.4).

mod access;
mod topic;

pub use access::{AccessPolicy, AccessPolicyError, AllowList, Role, match_pattern};
pub use topic::TopicIndex;
