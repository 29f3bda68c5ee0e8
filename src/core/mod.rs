pub mod indicators;
pub mod mtf;
pub mod risk;

pub use indicators::IndicatorEngine;
pub use mtf::{MtfConfirmer, MtfDecision};
pub use risk::RiskFilter;
