pub mod adb;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod models;
pub mod observer;
pub mod poller;
pub mod session;
