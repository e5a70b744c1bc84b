//! STAMP coordinates and version selection for termstore
//!
//! - StampCoordinate: the viewpoint (position, status/module/author filters,
//!   branch origins)
//! - StampCalculator: picks the applicable version(s) of a chronology
//! - Latest: empty, single or contradiction result

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod calculator;
pub mod coordinate;
pub mod latest;

pub use calculator::{StampCalculator, StampSource};
pub use coordinate::{StampBranch, StampCoordinate, StampPosition};
pub use latest::Latest;
