//! Session blueprint: turns the student's choices into a live session config.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::glossary::GLOSSARY_TOOL_NAME;
use super::profiles::{ConversationLevel, Language, PracticeMode, TeacherName};
use crate::core::live::{LiveSessionConfig, ToolDeclaration};

/// Everything chosen before the microphone opens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBlueprint {
    #[serde(default)]
    pub teacher: TeacherName,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub level: ConversationLevel,
    #[serde(default)]
    pub practice_mode: PracticeMode,
    /// Scenario, topic or target sound, depending on the mode
    #[serde(default)]
    pub mode_specifics: String,
}

impl SessionBlueprint {
    pub fn new(teacher: TeacherName, language: Language, level: ConversationLevel) -> Self {
        Self {
            teacher,
            language,
            level,
            practice_mode: PracticeMode::Open,
            mode_specifics: String::new(),
        }
    }

    pub fn with_mode(mut self, mode: PracticeMode, specifics: impl Into<String>) -> Self {
        self.practice_mode = mode;
        self.mode_specifics = specifics.into();
        self
    }

    /// True when the mode expects specifics and none were given.
    ///
    /// The instruction still falls back to the mode's default, so this is
    /// advisory for front ends that want to insist on a choice.
    pub fn missing_specifics(&self) -> bool {
        self.practice_mode.takes_specifics() && self.mode_specifics.trim().is_empty()
    }

    fn specifics(&self) -> &str {
        let given = self.mode_specifics.trim();
        if given.is_empty() {
            self.practice_mode.default_specifics().unwrap_or_default()
        } else {
            given
        }
    }

    /// Compose the system instruction for the remote agent.
    pub fn system_instruction(&self) -> String {
        let profile = self.teacher.profile();
        let language = self.language;
        let level = self.level;

        if self.practice_mode == PracticeMode::Pronunciation {
            return format!(
                "{personality}\n\n\
                 CRITICAL INSTRUCTION: Speak ONLY in {language}.\n\n\
                 Your student is at a {level} level and wants to practice their {language} pronunciation.\n\n\
                 The student wants to practice: \"{specifics}\".\n\n\
                 Your task is to conduct a focused pronunciation drill:\n\
                 1. Introduce the drill for the target sound/word(s) in {language}.\n\
                 2. Provide a single, clear word or a very short phrase for the student to pronounce.\n\
                 3. After they speak, provide immediate, specific, and actionable feedback based on common pronunciation challenges for that word/sound. Focus on tongue placement, mouth shape, and airflow.\n\
                 4. If they make a mistake, gently correct them and have them try the same word again.\n\
                 5. If they pronounce it correctly, praise them and give them a new word or phrase to try.\n\
                 6. Keep the drill focused and repetitive. Do not engage in general conversation.\n\n\
                 Start the drill now by giving the student their first word to practice.",
                personality = profile.pronunciation_personality,
                specifics = self.specifics(),
            );
        }

        let mut instruction = format!(
            "{personality}\n\n\
             CRITICAL INSTRUCTION - LANGUAGE ADHERENCE:\n\
             You are a strict language teacher. You must ALWAYS speak in {language}.\n\
             If the user speaks a different language (e.g., their mother tongue), DO NOT switch to that language.\n\
             Instead, politely reply in {language} that you do not understand or ask them to repeat it in {language}.\n\
             Never translate your own responses into another language. Stay immersed in {language}.\n\n\
             Your student is at a {level} level in {language}. Your primary goal is to help the user improve their spoken {language} through a natural conversation.\n\
             Your most important task is to provide immediate, real-time feedback. If the user makes a mistake in grammar, syntax, or pronunciation in {language}, you must gently interrupt them, point out the error, explain the correction, and have them try again. Do not wait until they finish their sentence. Maintain a positive and encouraging tone.\n\n\
             When you introduce a new or potentially difficult vocabulary word, you MUST use the '{tool}' tool to provide its definition and an example sentence.",
            personality = profile.personality,
            tool = GLOSSARY_TOOL_NAME,
        );

        let appendix = match self.practice_mode {
            PracticeMode::RolePlay => format!(
                "You will now conduct a role-playing exercise in {language}. The scenario is: \"{}\". \
                 You should take on the appropriate role (e.g., interviewer, waiter, shopkeeper). \
                 Start by setting the scene for the student and beginning the role-play.",
                self.specifics()
            ),
            PracticeMode::Topic => format!(
                "You will now conduct a topic drill in {language}. The topic is: \"{}\". \
                 Keep the conversation focused on this topic. Ask questions, introduce relevant vocabulary, \
                 and encourage the student to discuss it in detail. Start by introducing the topic to the student.",
                self.specifics()
            ),
            PracticeMode::Open | PracticeMode::Pronunciation => format!(
                "Start by introducing yourself in {language} and then propose a topic to discuss. \
                 The topic can be anything from daily life to complex subjects, but always ask for \
                 the user's agreement before proceeding. Start the conversation now."
            ),
        };

        instruction.push_str("\n\n");
        instruction.push_str(&appendix);
        instruction
    }

    /// Build the per-session config: voice, instruction and glossary tool.
    pub fn live_config(&self) -> LiveSessionConfig {
        let mut config = LiveSessionConfig::default();
        config.voice = Some(self.teacher.profile().voice.to_string());
        config.system_instruction = Some(self.system_instruction());
        config.tools = vec![glossary_tool_declaration()];
        config
    }
}

/// Declaration of the glossary tool offered to the agent.
pub fn glossary_tool_declaration() -> ToolDeclaration {
    ToolDeclaration {
        name: GLOSSARY_TOOL_NAME.to_string(),
        description: None,
        parameters: Some(json!({
            "type": "OBJECT",
            "description": "Adds a word, its definition, and an example sentence to the user's session glossary.",
            "properties": {
                "word": {
                    "type": "STRING",
                    "description": "The vocabulary word to add."
                },
                "definition": {
                    "type": "STRING",
                    "description": "A simple, clear definition of the word."
                },
                "example": {
                    "type": "STRING",
                    "description": "An example sentence using the word in context."
                }
            },
            "required": ["word", "definition", "example"]
        })),
    }
}
