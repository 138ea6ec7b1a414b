// src/output.rs

//! User-facing message sink.
//!
//! Four levels: info, success and warning go to the standard stream,
//! errors go to the error stream. Diagnostics that are not part of the
//! tool's conversation with the user belong to `tracing`, not here.

use std::fmt::Display;

/// Progress and status messages.
pub fn info(msg: impl Display) {
    println!("{msg}");
}

/// Completed operations.
pub fn success(msg: impl Display) {
    println!("{msg}");
}

/// Recoverable conditions the user should know about.
pub fn warning(msg: impl Display) {
    println!("warning: {msg}");
}

/// Failures; callers usually also return an `Err`.
pub fn error(msg: impl Display) {
    eprintln!("error: {msg}");
}
