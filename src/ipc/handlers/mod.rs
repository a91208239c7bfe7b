pub mod assignments;
pub mod backup;
pub mod core;
pub mod gradebook;
pub mod registry;
pub mod sections;
pub mod setup;
