pub mod clustering;
pub mod metrics;

pub use clustering::*;
pub use metrics::*;
