//! Reading, writing, verifying and compressing Kongsberg KMALL multibeam files
#[macro_use]
mod columns;

pub mod cli;
pub mod codec;
pub mod compression;
pub mod error;
pub mod index;
pub mod locker;
pub mod model;
pub mod nav;
pub mod params;
pub mod parser;
pub mod scanner;
pub mod verify;

pub use error::{Error, Result};
