//! Network task-execution service
//!
//! Clients connect over TCP and send line commands to grow or shrink a
//! pool of background workers and to submit tasks to it.

pub mod command;
pub mod config;
pub mod error;
pub mod handlers;
pub mod pool;
pub mod server;
pub mod state;
pub mod worker;
