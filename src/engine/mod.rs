//! Core engine: match bets to mech requests, attribute tools, aggregate.

pub mod aggregator;
pub mod enricher;
pub mod matcher;
