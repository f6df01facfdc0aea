pub mod aggregator;

pub use aggregator::{aggregate, ColorAggregator};
