pub mod catalog;
pub mod cli;
pub mod command;
pub mod config;
pub mod db;
pub mod encoding;
pub mod error;
pub mod mcp;
pub mod model;
pub mod policy;
pub mod rpc;
pub mod source;
pub mod transfer;
pub mod upload;
pub mod xref;
