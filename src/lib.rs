pub mod backend;
pub mod config;
pub mod errors;
pub mod gate;
pub mod graph;
pub mod logging;
pub mod machine;
pub mod pipeline;
pub mod ports;
pub mod skills;
pub mod store;
pub mod ui;
