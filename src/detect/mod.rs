//! Stateless extraction of structured signals from terminal output.

pub mod ansi;
pub mod signals;
pub mod status;

pub use ansi::{detection_window, normalize, DETECTION_WINDOW};
pub use signals::{detect_added_directory, detect_url};
pub use status::{detect_status, StatusMatcher};
