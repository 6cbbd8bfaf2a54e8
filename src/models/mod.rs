pub mod config;
pub mod operation;
pub mod packet;
pub mod stats;
