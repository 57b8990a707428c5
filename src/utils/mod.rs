pub mod formats;
pub mod keyed_mutex;
pub mod kv_store;
pub mod validation;
