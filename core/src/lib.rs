pub mod engine;
pub mod network;
pub mod scanner;
pub mod task;
