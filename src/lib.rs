pub mod config;
pub mod coverage;
pub mod error;
pub mod git;
pub mod github;
pub mod ingest;
pub mod maven;
pub mod model;
pub mod process;
pub mod remote;
pub mod session;
pub mod tools;
