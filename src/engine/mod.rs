//! Execution engine for greenstack
//!
//! The engine wires the declarative core to the terminal:
//! 1. Diffing - Render planned actions and attribute changes
//! 2. Executing - Apply with progress bars, confirmation and state saving

pub mod differ;
pub mod executor;

pub use differ::display_plan;
pub use executor::{print_report, run};
