//! Integration test crate for the CutScope monitor.
//!
//! This crate exists solely to hold cross-crate integration tests. They run
//! the real renderer thread against the RAM texture backend and a scripted
//! playback engine.

#[cfg(test)]
mod support;

#[cfg(test)]
mod gate;

#[cfg(test)]
mod playback;

#[cfg(test)]
mod display;
