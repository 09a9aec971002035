pub mod config;
pub mod device;
pub mod host;
pub mod peripherals;
pub mod services;
