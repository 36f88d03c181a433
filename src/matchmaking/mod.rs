//! Matchmaking: the waiting slot and room creation

pub mod queue;
pub mod service;

pub use service::MatchmakingService;
