pub mod engine;

pub use engine::{QueryOp, RateQueryService};
