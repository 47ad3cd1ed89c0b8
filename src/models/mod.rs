// src/models/mod.rs
pub mod did;
pub mod operation;
