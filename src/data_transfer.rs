pub mod engine;
pub mod flat_file;
pub mod frame;
pub mod mapper;
pub mod models;
pub mod provisioner;
pub mod schema;
