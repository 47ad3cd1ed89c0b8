// src/identity/mod.rs
pub mod did;
