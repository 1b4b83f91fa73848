pub mod anchors;
pub mod calibration;
pub mod config;
pub mod geometry;
pub mod gesture;
pub mod io;
pub mod orientation;
pub mod system;
pub mod vision;
