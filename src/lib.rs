// Library exports for logctl, a distributed logging control plane

pub mod agent;
pub mod auth;
pub mod cli;
pub mod config;
pub mod control;
pub mod controller;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod workers;
