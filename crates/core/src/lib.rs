#![forbid(unsafe_code)]

mod ids;
mod ledger;
mod plan;
mod registry;
mod series;
mod step;

pub use ids::*;
pub use ledger::*;
pub use plan::*;
pub use registry::*;
pub use series::*;
pub use step::*;

#[cfg(test)]
mod tests;
