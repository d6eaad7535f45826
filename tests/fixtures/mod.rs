//! Test Fixtures Module
//!
//! Audio fixtures for live session testing (programmatically generated)

// Allow dead code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]

pub mod audio_fixtures;

pub use audio_fixtures::*;
