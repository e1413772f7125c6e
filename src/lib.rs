//! LLM-backed unit test generation.
//!
//! A job builds a prompt from the class under test, streams a chat
//! completion from the backend, and assembles the streamed text into a
//! [`testgen::test_suite::TestSuite`].

pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod logger;
pub mod monitor;
pub mod persistence;
pub mod testgen;
pub mod workspace;
