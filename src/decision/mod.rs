//! Decision Engine (§4.5): periodically scans alerts lacking a Decision and recommends
//! a remediation action.

mod engine;

pub use engine::DecisionEngine;
