//! Pure calculations used by the lifecycles.
//!
//! - [`ride`]: great-circle distance, coordinate validation and fares
//! - [`shift`]: break aggregation and work time

pub mod ride;
pub mod shift;

pub use ride::{compute_distance_km, compute_fare, validate_coordinates};
pub use shift::{BreakStats, compute_breaks, compute_statistics, compute_work_time};
