pub mod record;
pub mod resource;
pub mod service;
