//! @ai:module:intent Result aggregation and summary statistics
//! @ai:module:layer application
//! @ai:module:public_api ResultAggregator, SummaryReport, GroupStats

pub mod aggregator;
pub mod types;

pub use aggregator::{ResultAggregator, ResultAggregatorTrait};
pub use types::{
    FailureEntry, GroupStats, GroupSummary, OriginComparison, SummaryReport, VariantInfo,
    VariantSummary,
};
