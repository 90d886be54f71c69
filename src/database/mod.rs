//! SQLite persistence module
//!
//! Provides the attribution store: users, referral edges, membership
//! observations and contest state.

pub mod pool;
pub mod users;
pub mod referrals;
pub mod observations;
pub mod contest;

pub use pool::Database;
pub use users::{ContestStats, User, UserRepository};
pub use referrals::ReferralRepository;
pub use observations::ObservationRepository;
pub use contest::{ContestRepository, Milestone};
