pub mod config;
pub mod output;
pub mod table;
pub mod timestamp;
