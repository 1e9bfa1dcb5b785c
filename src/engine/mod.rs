pub mod lifecycle;
pub mod types;
