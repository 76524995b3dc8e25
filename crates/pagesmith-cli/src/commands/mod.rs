//! Command implementations for the pagesmith CLI
//!
//! Each command takes its output writer as a parameter so tests can capture
//! what would have gone to stdout.

mod edit;
mod fixture;
mod open;
mod slug;

pub use edit::execute as edit_page;
pub use open::execute as open_page;
pub use slug::execute as print_slug;
