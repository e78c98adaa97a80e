pub mod config;
pub mod error;
pub mod record_codec;
pub mod record_store;
pub mod rest_record_store;
pub mod sqlite_record_store;
pub mod storage;
