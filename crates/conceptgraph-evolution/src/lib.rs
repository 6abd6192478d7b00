pub mod feedback;
pub mod tracker;

pub use feedback::*;
pub use tracker::*;
