//! Medical news pipeline: headlines are researched, drafted by an LLM,
//! reviewed by an editor and published.

pub mod ai;
pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;

#[cfg(test)]
mod test_support;
