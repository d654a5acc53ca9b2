//! In-app feedback capture: screenshot, region selection, annotation with
//! undo/redo, diagnostics collection and submission to a collector.

pub mod annotation;
pub mod capture;
pub mod client;
pub mod config;
pub mod diagnostics;
pub mod editor;
pub mod feedback;
pub mod geometry;
pub mod history;
pub mod input;
pub mod logging;
pub mod region;
pub mod render;
pub mod report;
pub mod session;
pub mod util;
