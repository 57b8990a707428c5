pub mod conversion_service;
pub mod decoder;
pub mod rate_limiter;
pub mod staging;
pub mod worker;
