//! Client construction and credential persistence for the CLI.

pub mod storage;
