//! qr-checkin - Camera-driven QR check-in pipeline
//!
//! This crate acquires a camera, samples frames on a fixed interval, decodes
//! QR codes with a fallback sequence, classifies the payload and records a
//! visit for recognized customers.

pub mod camera;
pub mod checkin;
pub mod config;
pub mod error;
pub mod events;
pub mod scan;
pub mod utils;

pub use error::{AppError, Result};
