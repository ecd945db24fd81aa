pub mod bootstrap;
pub mod cache;
pub mod resource;
pub mod server;
pub mod service;
pub mod translate;
