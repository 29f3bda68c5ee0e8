pub mod dedup;
pub mod outcome;
pub mod report;

pub use dedup::{DedupDecision, SignalDeduplicator};
pub use report::{PerformanceReport, SymbolPerformance};
