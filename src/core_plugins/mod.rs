//! Built-in native plugins.

pub mod math;
pub mod time;

pub use math::{math_plugin, BinaryOpTool, MATH_PLUGIN};
pub use time::{time_plugin, NowTool, TodayTool, TIME_PLUGIN};
