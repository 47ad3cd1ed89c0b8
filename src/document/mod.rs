// src/document/mod.rs
pub mod builder;
