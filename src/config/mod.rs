//! Run Configuration Module
//!
//! Everything needed to describe a run before it starts.
//!
//! # Structure
//!
//! - [`model`]: The [`RunConfig`] structure and size parsing
//! - [`parser`]: YAML loading
//! - [`validator`]: Pre-start validation

pub mod model;
pub mod parser;
pub mod validator;

pub use model::{parse_size, RunConfig, GIB, MIB};
pub use parser::{load_config, parse_config};
pub use validator::{validate_config, ValidationError};
