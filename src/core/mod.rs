pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod lifecycle;
pub mod log_io;
pub mod model;
pub mod output;
pub mod parser;
pub mod replay_engine;
pub mod state;
