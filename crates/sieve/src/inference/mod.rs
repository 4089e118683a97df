//! Sample-based inference of encoding, layout and schema.

mod detector;

pub use detector::Detector;
