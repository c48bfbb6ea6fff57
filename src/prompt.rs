//! Prompt composition for grounded answers.
//!
//! [`PromptComposer::compose`] is pure: it renders the system instruction,
//! the retrieved passages in ranked order, a trailing window of conversation
//! history, and finally the question, into a single prompt string. It never
//! touches the network or the index.
use std::fmt;

use chrono::{DateTime, Utc};

use crate::index::search::SearchResult;

/// Answer language requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Hindi,
    Hinglish,
}

/// Romanized Hindi function words that flag Hinglish when no Devanagari is
/// present. Two or more distinct hits are required so a stray loanword in an
/// English sentence does not flip the language.
const HINGLISH_MARKERS: &[&str] = &[
    "hai", "hain", "kya", "kyun", "mein", "nahi", "nahin", "kaise", "karna", "chahiye", "hota",
    "hoti", "bukhar", "dawa", "dawai", "dard", "sar", "theek", "lena", "kitna", "kitni",
];

impl Language {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "Hindi",
            Language::Hinglish => "Hinglish",
        }
    }

    /// Guess the language of a question.
    ///
    /// Mostly-Devanagari text reads as Hindi; any Devanagari mixed into Latin
    /// text reads as Hinglish, as do two or more romanized Hindi marker
    /// words. Everything else reads as English.
    #[must_use]
    pub fn detect(text: &str) -> Language {
        let alphabetic: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
        if alphabetic.is_empty() {
            return Language::English;
        }

        let devanagari = alphabetic
            .iter()
            .filter(|c| matches!(**c, '\u{0900}'..='\u{097F}'))
            .count();
        if devanagari * 2 > alphabetic.len() {
            return Language::Hindi;
        }
        if devanagari > 0 {
            return Language::Hinglish;
        }

        let markers = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| HINGLISH_MARKERS.contains(w))
            .count();
        if markers >= 2 {
            return Language::Hinglish;
        }

        Language::English
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Who said a turn in the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// One turn of the back-and-forth preceding the current question.
///
/// Turns are owned by the caller's history store; the composer only reads
/// them. The timestamp is carried for the caller's benefit and plays no part
/// in prompt rendering — windowing is positional.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Renders prompts with a fixed history window.
pub struct PromptComposer {
    history_window: usize,
}

impl PromptComposer {
    /// `history_window` is the number of trailing turns kept verbatim; older
    /// turns are dropped, never summarized.
    #[must_use]
    pub fn new(history_window: usize) -> Self {
        Self { history_window }
    }

    /// Render the full prompt: instruction, passages, history, question.
    ///
    /// Produces a valid prompt even when `retrieved` is empty; the model is
    /// told nothing matched rather than being handed an empty section.
    #[must_use]
    pub fn compose(
        &self,
        question: &str,
        history: &[Turn],
        retrieved: &[SearchResult],
        target_language: Language,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str("You are MediGuide, a warm and careful health assistant.\n");
        prompt.push_str(
            "Ground every statement in the reference passages below. If they do not cover the question, say so plainly instead of guessing.\n",
        );
        prompt.push_str(
            "Never diagnose a condition or prescribe treatment. For anything severe, persistent, or worrying, advise seeing a doctor.\n",
        );
        let language_line = match target_language {
            Language::English => "Respond in English.",
            Language::Hindi => "Respond in Hindi, written in Devanagari script.",
            Language::Hinglish => {
                "Respond in Hinglish: Hindi phrasing in Latin script, keeping English medical terms where natural."
            }
        };
        prompt.push_str(language_line);
        prompt.push('\n');

        if retrieved.is_empty() {
            prompt.push_str(
                "\nNo reference passages matched this question. Say what you can responsibly and be explicit about what you do not know.\n",
            );
        } else {
            prompt.push_str("\nReference passages:\n");
            for (i, chunk) in retrieved.iter().enumerate() {
                prompt.push_str(&format!(
                    "[{}] (source: {})\n{}\n",
                    i + 1,
                    chunk.document_id,
                    chunk.text.trim()
                ));
            }
        }

        let window = trailing_window(history, self.history_window);
        if !window.is_empty() {
            prompt.push_str("\nConversation so far:\n");
            for turn in window {
                let speaker = match turn.speaker {
                    Speaker::User => "Patient",
                    Speaker::Assistant => "MediGuide",
                };
                prompt.push_str(&format!("{speaker}: {}\n", turn.text));
            }
        }

        prompt.push_str(&format!("\nPatient question: {question}\n"));
        prompt.push_str("MediGuide:");

        prompt
    }
}

fn trailing_window(history: &[Turn], window: usize) -> &[Turn] {
    if history.len() > window {
        &history[history.len() - window..]
    } else {
        history
    }
}
