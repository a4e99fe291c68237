#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod data;
pub mod error;
pub mod inference;
pub mod model;
pub mod tokenizer;
pub mod weights;

pub use config::DecoderConfig;
pub use error::{Error, Result};
