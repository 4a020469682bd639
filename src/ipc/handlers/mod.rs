pub mod core;
pub mod feedback;
pub mod tables;
pub mod teachers;
