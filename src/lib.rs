pub mod blacklist;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dns;
pub mod error;
pub mod fetch;
pub mod host;
pub mod input;
pub mod job;
pub mod parsers;
pub mod parts;
pub mod queue;
pub mod robots;
pub mod stats;
pub mod url_canon;
pub mod worker;
