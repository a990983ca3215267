#![warn(rust_2018_idioms)]
pub mod common;
pub mod config;
pub mod zookeeper;
