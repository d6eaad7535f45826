pub mod config;
pub mod core;
pub mod tutor;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{ConfigError, TutorConfig};
pub use core::*;
pub use tutor::{Glossary, GlossaryToolHandler, SessionBlueprint, TranscriptLog};
