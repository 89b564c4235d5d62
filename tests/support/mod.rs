pub mod containers;
pub mod runtime;
