pub mod abi;
pub mod config;
pub mod decoder;
pub mod events;
pub mod ipc;
pub mod models;
pub mod output;
pub mod rpc;
pub mod scanner;
pub mod selector;
