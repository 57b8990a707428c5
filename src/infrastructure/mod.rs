pub mod decoder;
pub mod staging;
