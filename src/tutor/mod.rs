//! Tutoring layer on top of the live session.
//!
//! Chooses the teacher persona and practice mode, composes the agent's
//! instruction, keeps the session glossary the agent fills through tool
//! calls, and records the finalized transcript.

pub mod blueprint;
pub mod glossary;
pub mod profiles;
pub mod transcript_log;

pub use blueprint::{SessionBlueprint, glossary_tool_declaration};
pub use glossary::{GLOSSARY_TOOL_NAME, Glossary, GlossaryToolHandler, GlossaryWord};
pub use profiles::{
    ConversationLevel, Language, PracticeMode, TeacherName, TeacherProfile, UnknownOption,
    teacher_profiles,
};
pub use transcript_log::{MIN_MESSAGES_FOR_SUMMARY, SessionTranscript, TranscriptLog};
