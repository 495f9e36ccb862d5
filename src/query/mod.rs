pub mod operators;
pub mod plan;
