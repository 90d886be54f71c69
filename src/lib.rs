//! Clover Referral Engine
//!
//! Referral attribution, anti-cheat and milestone tracking for a
//! subscribe-to-enter contest. Participants share referral tokens; the
//! engine validates each arrival against the membership gate and a set of
//! anti-cheat rules, keeps referral counters exactly in step with valid
//! edges, and awards first-to-threshold milestones exactly once.
//!
//! ## Module Structure
//!
//! ```text
//! clover-engine/src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Service entrypoint
//! ├── config.rs      - Configuration management
//! ├── error.rs       - Store and engine error types
//! ├── events.rs      - Inbound transport events
//! ├── engine.rs      - Arrival/re-check orchestration
//! ├── notifier.rs    - Outbound notification trait
//! ├── reconciler.rs  - Background validation & housekeeping
//! ├── anticheat/     - Validation rules & account scanning
//! │   ├── rules.rs   - Rejection reasons, flip-flop heuristic
//! │   └── engine.rs  - Rule evaluation & bans
//! ├── cache/         - Bounded TTL caches
//! │   ├── ttl.rs     - Generic TTL map
//! │   └── service.rs - User/ban/membership cache bundle
//! ├── contest/       - Contest mechanics
//! │   ├── token.rs   - Referral token derivation
//! │   ├── milestones.rs - First-to-threshold winner slots
//! │   └── schedule.rs - Start date, duration, end notification
//! ├── membership/    - Channel membership verification
//! │   ├── oracle.rs  - Verdict type & oracle trait
//! │   ├── http.rs    - HTTP oracle implementation
//! │   └── gate.rs    - Cached, observed membership checks
//! └── database/      - SQLite persistence
//!     ├── pool.rs    - Connection pool & schema
//!     ├── users.rs   - Accounts, counters, leaderboards
//!     ├── referrals.rs - Edge + counter transactions
//!     ├── observations.rs - Membership observation log
//!     └── contest.rs - Settings, milestones, pending rows
//! ```

pub mod anticheat;
pub mod cache;
pub mod config;
pub mod contest;
pub mod database;
pub mod engine;
pub mod error;
pub mod events;
pub mod membership;
pub mod notifier;
pub mod reconciler;

// Re-export main types for convenience
pub use anticheat::{AntiCheatEngine, RejectionReason};
pub use cache::{CacheService, TtlCache};
pub use config::EngineConfig;
pub use contest::{ContestSchedule, MilestoneTracker};
pub use database::{ContestStats, Database, Milestone, User};
pub use engine::{ArrivalOutcome, ReferralEngine};
pub use error::{EngineError, EngineResult, StoreError, StoreResult};
pub use events::{ArrivalEvent, RecheckEvent};
pub use membership::{HttpMembershipOracle, MembershipGate, MembershipOracle, MembershipVerdict};
pub use notifier::{NotificationEvent, Notifier, TracingNotifier};
pub use reconciler::Reconciler;
