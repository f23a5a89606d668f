pub mod common;
pub mod completions;
pub mod conflicts;
pub mod entities;
pub mod feed;
pub mod queue;
