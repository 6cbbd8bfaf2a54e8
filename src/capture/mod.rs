pub mod acquire;
pub mod credentials;
pub mod manager;
pub mod parser;
pub mod reader;
