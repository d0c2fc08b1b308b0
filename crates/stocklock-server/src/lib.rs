//! Stocklock Server - HTTP front end for the lock-guarded inventory
//!
//! Every instance of this server shares one Redis; the distributed lock keeps
//! their sales of the same counter from interleaving.

pub mod api;
pub mod error;
pub mod model;
pub mod startup;
