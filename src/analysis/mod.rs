//! Order-book microstructure analysis
//!
//! Void bands (abnormally thin price regions) and stacked walls
//! (abnormally large resting levels) with self-calibrating percentile
//! thresholds.

mod void_wall;

pub use void_wall::{
    MicroReport, StackedWall, VoidBand, VoidDirection, VoidWallDetector, WallSide,
};
