//! Lay a folder of images out on a 2-D map by visual similarity.

pub mod config;
pub mod embed;
pub mod export;
pub mod pipeline;
pub mod reduce;
pub mod samples;
pub mod scan;
pub mod server;
pub mod session;
pub mod store;
