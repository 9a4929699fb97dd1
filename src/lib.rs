//! Lyrics pipeline library - shared modules for all binaries.
//!
//! Turns a folder of songs into translated, time-synchronised LRC files:
//! vocals are separated, transcribed, matched against published lyrics or
//! corrected, aligned to LRC, re-timed against the transcript and
//! translated with the song's background as context. Every stage persists its output
//! so an interrupted batch can resume where it stopped.

pub mod artifacts;
pub mod batch;
pub mod collaborators;
pub mod config;
pub mod deadline;
pub mod logging;
pub mod lrc;
pub mod models;
pub mod paths;
pub mod pipeline;
pub mod progress;
pub mod result;
pub mod safety;
pub mod stages;
pub mod transcript;

#[cfg(test)]
mod test_support;
