//! Runboard Viewer Library
//!
//! Browser-agnostic view-model logic for the dashboard: the ANSI line
//! renderer, the virtualized terminal window with auto-scroll tracking, and
//! the scenario report aggregations. No I/O; everything here is a pure
//! function of store state plus local UI state.

pub mod ansi;
pub mod report;
pub mod terminal;

pub use ansi::{render_line, strip, Color, Segment, TextStyle};
pub use report::{FileGroup, GroupCounts, ReportView};
pub use terminal::{TerminalViewer, ViewerConfig};
