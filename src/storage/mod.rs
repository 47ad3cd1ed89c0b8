// src/storage/mod.rs
pub mod backend;
pub mod ipfs_client;
pub mod memory;
