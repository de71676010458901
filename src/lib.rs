pub mod behavior;
pub mod config;
pub mod error;
pub mod locomotion;
pub mod messages;
pub mod peripheral;
pub mod robot;
pub mod runtime;
pub mod scheduler;
