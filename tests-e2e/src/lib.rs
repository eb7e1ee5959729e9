#![forbid(unsafe_code)]

pub mod common;
