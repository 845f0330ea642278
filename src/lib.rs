pub mod config;
pub mod errors;
pub mod metadata;
pub mod storage;
pub mod sync;
pub mod tui;
