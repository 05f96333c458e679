pub mod api;
pub mod application;
pub mod bootstrap;
pub mod domain;
pub mod infrastructure;
