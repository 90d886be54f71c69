//! Channel membership verification

pub mod gate;
pub mod http;
pub mod oracle;

pub use gate::MembershipGate;
pub use http::HttpMembershipOracle;
pub use oracle::{MembershipOracle, MembershipVerdict};
