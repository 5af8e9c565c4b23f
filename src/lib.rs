// Course Sync v0.1
//! Running-course ingestion for a Seoul course catalogue.
//!
//! Reconciles the public Durunubi course feed against stored courses, parses
//! and simplifies GPX tracks, and classifies courses by Seoul area and theme.

pub mod config;
pub mod errors;
mod helpers;
pub mod models;
pub mod services;
