pub mod config;
pub mod conversions;
pub mod pipeline;
pub mod table;
