mod logger;
pub use logger::*;

mod report;
pub use report::{log_report, summary_line};
