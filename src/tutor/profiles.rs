//! Teacher personas and session options.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A value that does not name any known option.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind} '{value}' (expected one of: {expected})")]
pub struct UnknownOption {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

fn parse_option<T: Copy>(
    kind: &'static str,
    value: &str,
    all: &[T],
    names: impl Fn(T) -> &'static [&'static str],
) -> Result<T, UnknownOption> {
    let wanted = value.trim();
    all.iter()
        .copied()
        .find(|&option| names(option).iter().any(|n| n.eq_ignore_ascii_case(wanted)))
        .ok_or_else(|| UnknownOption {
            kind,
            value: value.to_string(),
            expected: all
                .iter()
                .map(|&o| names(o)[0])
                .collect::<Vec<_>>()
                .join(", "),
        })
}

// =============================================================================
// Teachers
// =============================================================================

/// Available teacher personas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TeacherName {
    #[default]
    Clara,
    Amelia,
    David,
}

/// A teacher persona: who the agent plays and which voice it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TeacherProfile {
    pub name: TeacherName,
    pub description: &'static str,
    /// Prebuilt voice name
    pub voice: &'static str,
    /// Persona used for conversation modes
    pub personality: &'static str,
    /// Persona used for pronunciation drills
    pub pronunciation_personality: &'static str,
}

const CLARA: TeacherProfile = TeacherProfile {
    name: TeacherName::Clara,
    description: "Friendly & Supportive",
    voice: "Zephyr",
    personality: "You are a friendly, kind, and supportive AI language teacher named Clara.",
    pronunciation_personality: "You are a friendly, kind, and supportive AI pronunciation coach named Clara.",
};

const AMELIA: TeacherProfile = TeacherProfile {
    name: TeacherName::Amelia,
    description: "Academic & Precise",
    voice: "Kore",
    personality: "You are a precise, knowledgeable, and structured AI language teacher named Amelia. You are kind and encourage formal language and correct grammar with detailed explanations.",
    pronunciation_personality: "You are a precise, knowledgeable, and structured AI pronunciation coach named Amelia. You focus on the phonetic accuracy of each word.",
};

const DAVID: TeacherProfile = TeacherProfile {
    name: TeacherName::David,
    description: "Energetic & Fun",
    voice: "Puck",
    personality: "You are an energetic, enthusiastic, and fun AI language teacher named David. You are kind and use modern idioms and slang to make learning engaging and practical.",
    pronunciation_personality: "You are an energetic, enthusiastic, and fun AI pronunciation coach named David. You make pronunciation practice exciting and encouraging.",
};

impl TeacherName {
    pub const ALL: [TeacherName; 3] = [TeacherName::Clara, TeacherName::Amelia, TeacherName::David];

    pub fn as_str(&self) -> &'static str {
        match self {
            TeacherName::Clara => "Clara",
            TeacherName::Amelia => "Amelia",
            TeacherName::David => "David",
        }
    }

    pub fn profile(&self) -> &'static TeacherProfile {
        match self {
            TeacherName::Clara => &CLARA,
            TeacherName::Amelia => &AMELIA,
            TeacherName::David => &DAVID,
        }
    }
}

impl fmt::Display for TeacherName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeacherName {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_option("teacher", s, &Self::ALL, |t| match t {
            TeacherName::Clara => &["Clara"],
            TeacherName::Amelia => &["Amelia"],
            TeacherName::David => &["David"],
        })
    }
}

/// All teacher profiles in display order.
pub fn teacher_profiles() -> impl Iterator<Item = &'static TeacherProfile> {
    TeacherName::ALL.into_iter().map(|t| t.profile())
}

// =============================================================================
// Session Options
// =============================================================================

/// Student proficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConversationLevel {
    Basic,
    #[default]
    Intermediate,
    Proficient,
    Native,
}

impl ConversationLevel {
    pub const ALL: [ConversationLevel; 4] = [
        ConversationLevel::Basic,
        ConversationLevel::Intermediate,
        ConversationLevel::Proficient,
        ConversationLevel::Native,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationLevel::Basic => "Basic",
            ConversationLevel::Intermediate => "Intermediate",
            ConversationLevel::Proficient => "Proficient",
            ConversationLevel::Native => "Native",
        }
    }
}

impl fmt::Display for ConversationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationLevel {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_option("level", s, &Self::ALL, |l| match l {
            ConversationLevel::Basic => &["Basic"],
            ConversationLevel::Intermediate => &["Intermediate"],
            ConversationLevel::Proficient => &["Proficient"],
            ConversationLevel::Native => &["Native"],
        })
    }
}

/// Language being practised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    Greek,
    French,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::English, Language::Greek, Language::French];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Greek => "Greek",
            Language::French => "French",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_option("language", s, &Self::ALL, |l| match l {
            Language::English => &["English", "en"],
            Language::Greek => &["Greek", "el"],
            Language::French => &["French", "fr"],
        })
    }
}

/// Kind of practice the session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PracticeMode {
    #[default]
    #[serde(rename = "Open Conversation")]
    Open,
    #[serde(rename = "Role-play")]
    RolePlay,
    #[serde(rename = "Topic Drill")]
    Topic,
    #[serde(rename = "Pronunciation Drill")]
    Pronunciation,
}

impl PracticeMode {
    pub const ALL: [PracticeMode; 4] = [
        PracticeMode::Open,
        PracticeMode::RolePlay,
        PracticeMode::Topic,
        PracticeMode::Pronunciation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PracticeMode::Open => "Open Conversation",
            PracticeMode::RolePlay => "Role-play",
            PracticeMode::Topic => "Topic Drill",
            PracticeMode::Pronunciation => "Pronunciation Drill",
        }
    }

    /// Whether the mode is built around a scenario, topic or target sound.
    pub fn takes_specifics(&self) -> bool {
        !matches!(self, PracticeMode::Open)
    }

    /// Fallback used when no specifics were given.
    pub fn default_specifics(&self) -> Option<&'static str> {
        match self {
            PracticeMode::Open => None,
            PracticeMode::RolePlay => Some("a general daily situation"),
            PracticeMode::Topic => Some("a common interest"),
            PracticeMode::Pronunciation => Some("common difficult words"),
        }
    }
}

impl fmt::Display for PracticeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PracticeMode {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_option("practice mode", s, &Self::ALL, |m| match m {
            PracticeMode::Open => &["Open Conversation", "open"],
            PracticeMode::RolePlay => &["Role-play", "roleplay", "role_play"],
            PracticeMode::Topic => &["Topic Drill", "topic"],
            PracticeMode::Pronunciation => &["Pronunciation Drill", "pronunciation"],
        })
    }
}
