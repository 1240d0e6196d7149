//! Shared records passed between the scanning engine, its protocol state
//! machines and whatever consumes the results.

pub mod config;
pub mod network;
