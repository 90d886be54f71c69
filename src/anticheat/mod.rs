//! Attribution validation and account scanning

pub mod engine;
pub mod rules;

pub use engine::AntiCheatEngine;
pub use rules::{flip_flops, RejectionReason};
