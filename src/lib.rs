pub mod certificate;
pub mod composer;
pub mod config;
pub mod course;
pub mod error;
pub mod lesson;
pub mod progress;
pub mod quiz;
pub mod session;
pub mod store;
pub mod utils;
