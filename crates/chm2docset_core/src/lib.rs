pub mod assemble;
pub mod config;
pub mod extract;
pub mod index;
pub mod manifest;
pub mod paths;
