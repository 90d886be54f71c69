//! In-memory caching for hot user, ban and membership lookups

pub mod service;
pub mod ttl;

pub use service::CacheService;
pub use ttl::TtlCache;
