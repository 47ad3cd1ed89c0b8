// src/utils/mod.rs
pub mod crypto;
pub mod errors;
pub mod serialization;
