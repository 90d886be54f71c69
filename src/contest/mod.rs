//! Contest mechanics: tokens, milestones and the schedule

pub mod milestones;
pub mod schedule;
pub mod token;

pub use milestones::MilestoneTracker;
pub use schedule::ContestSchedule;
pub use token::{referral_token, salted_referral_token};
