//! # Block Assembly Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Pool, chain and collaborator builders
//! └── integration/      # End-to-end assembly flows
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p assembly-tests
//! cargo test -p assembly-tests integration::
//!
//! # Benchmarks
//! cargo bench -p assembly-tests
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
