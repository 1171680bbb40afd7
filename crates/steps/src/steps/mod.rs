//! Built-in step implementations.

pub mod fixed;
pub mod http;
pub mod report;

pub use fixed::StaticStep;
pub use http::{HttpStep, HttpStepConfig};
pub use report::{DailyReportConfig, DailyReportStep};
