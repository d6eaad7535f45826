//! Session glossary filled by the agent's `addWordToGlossary` calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::core::live::{ToolCallHandler, ToolCallRequest};

/// Name of the glossary tool as declared to the agent.
pub const GLOSSARY_TOOL_NAME: &str = "addWordToGlossary";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryWord {
    pub word: String,
    pub definition: String,
    pub example: String,
}

/// Words collected during one session, in the order they were introduced.
#[derive(Debug, Default)]
pub struct Glossary {
    words: RwLock<Vec<GlossaryWord>>,
    has_new: AtomicBool,
}

impl Glossary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a word unless one with the same spelling (ignoring case) exists.
    ///
    /// Returns true when the word was added.
    pub fn add(&self, entry: GlossaryWord) -> bool {
        self.has_new.store(true, Ordering::Release);
        let mut words = self.words.write();
        let wanted = entry.word.to_lowercase();
        if words.iter().any(|w| w.word.to_lowercase() == wanted) {
            return false;
        }
        words.push(entry);
        true
    }

    pub fn words(&self) -> Vec<GlossaryWord> {
        self.words.read().clone()
    }

    pub fn len(&self) -> usize {
        self.words.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.read().is_empty()
    }

    /// Whether the agent offered a word since the last call. Clears the flag.
    pub fn take_new_flag(&self) -> bool {
        self.has_new.swap(false, Ordering::AcqRel)
    }

    pub fn clear(&self) {
        self.words.write().clear();
        self.has_new.store(false, Ordering::Release);
    }
}

/// Answers glossary tool calls by recording the word.
#[derive(Debug, Clone)]
pub struct GlossaryToolHandler {
    glossary: Arc<Glossary>,
}

impl GlossaryToolHandler {
    pub fn new(glossary: Arc<Glossary>) -> Self {
        Self { glossary }
    }

    pub fn glossary(&self) -> &Arc<Glossary> {
        &self.glossary
    }
}

#[async_trait]
impl ToolCallHandler for GlossaryToolHandler {
    async fn handle_tool_call(&self, request: &ToolCallRequest) -> Option<Value> {
        if request.name != GLOSSARY_TOOL_NAME {
            debug!("Ignoring unknown tool call: {}", request.name);
            return None;
        }

        let (Some(word), Some(definition), Some(example)) = (
            request.str_arg("word"),
            request.str_arg("definition"),
            request.str_arg("example"),
        ) else {
            debug!("Malformed {} call {}", GLOSSARY_TOOL_NAME, request.id);
            return None;
        };

        let added = self.glossary.add(GlossaryWord {
            word: word.to_string(),
            definition: definition.to_string(),
            example: example.to_string(),
        });
        if added {
            info!("Glossary word added: {}", word);
        } else {
            debug!("Glossary already has '{}'", word);
        }

        Some(json!({ "result": "OK" }))
    }
}
