//! Opponent decision making.

pub mod policy;

pub use policy::{
    CandidateScore, OpponentPolicy, PolicyConfig, PolicyDecision, PolicyInput, RestReason,
};
