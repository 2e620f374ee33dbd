//! Publish orchestration for storypub.
//!
//! This crate ties together markdown parsing and the record store client
//! into the end-to-end `publish` workflow (parse → search → create or
//! update → notify).

pub mod notify;
pub mod publish;
