pub mod configuration;
pub mod controller;
pub mod data_capture;
pub mod error_handling;
pub mod identity;
pub mod retention;
pub mod transfer;
