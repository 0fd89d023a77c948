//! Study-material and generated-question ingestion.
//!
//! Raw material is chunked into paragraph-aligned snippets, embedded, and
//! stored for retrieval. Quiz text drafted by a language model is parsed
//! back into validated [`Question`] values before it reaches the bank.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::providers::EmbeddingProvider;
use crate::store::Repository;
use crate::types::{CertificateLevel, Difficulty, Question, QuestionOption, Snippet};

pub const DEFAULT_CHUNK_BYTES: usize = 1200;

/// Split study material into chunks on paragraph boundaries. Paragraphs are
/// packed greedily up to `max_chunk_bytes`; a single paragraph larger than
/// the limit becomes its own chunk rather than being cut mid-sentence.
pub fn split_material(text: &str, max_chunk_bytes: usize) -> Vec<String> {
    let max_chunk_bytes = max_chunk_bytes.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if current.is_empty() {
            current.push_str(paragraph);
        } else if current.len() + 2 + paragraph.len() <= max_chunk_bytes {
            current.push_str("\n\n");
            current.push_str(paragraph);
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(paragraph);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Writes embedded study material into the knowledge store.
pub struct KnowledgeIngestor {
    repo: Arc<dyn Repository>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunk_bytes: usize,
}

impl KnowledgeIngestor {
    pub fn new(repo: Arc<dyn Repository>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { repo, embedder, chunk_bytes: DEFAULT_CHUNK_BYTES }
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    /// Chunk, embed, and store one piece of material. Returns the number of
    /// snippets written. Material that reduces to nothing is not an error.
    pub async fn ingest_material(
        &self,
        topic: &str,
        level: CertificateLevel,
        text: &str,
    ) -> Result<usize, CoreError> {
        if topic.trim().is_empty() {
            return Err(CoreError::invalid_argument("material topic must not be empty"));
        }

        let chunks = split_material(text, self.chunk_bytes);
        if chunks.is_empty() {
            warn!(topic, level = level.as_str(), "material contained no usable text");
            return Ok(0);
        }

        let vectors = self.embedder.embed_batch(&chunks).await?;
        let snippets: Vec<Snippet> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(text, embedding)| Snippet {
                id: Uuid::new_v4().to_string(),
                topic: topic.to_string(),
                level,
                text,
                embedding,
            })
            .collect();

        let count = snippets.len();
        self.repo.add_snippets(snippets)?;
        info!(topic, level = level.as_str(), count, "ingested study material");
        Ok(count)
    }
}

/// Parse quiz text in the numbered-question format produced by the drafting
/// prompt:
///
/// ```text
/// 1. What is the NCC motto?
/// A) Unity and Discipline
/// B) Service and Sacrifice
/// Correct Answer: A
/// Explanation: Adopted at the 11th Central Advisory Committee meeting.
/// ```
///
/// Malformed blocks are skipped with a warning. If non-empty input yields no
/// questions at all the text is rejected as a whole.
pub fn parse_generated_questions(
    text: &str,
    topic: &str,
    level: CertificateLevel,
    difficulty: Difficulty,
) -> Result<Vec<Question>, CoreError> {
    if text.trim().is_empty() {
        return Err(CoreError::invalid_argument("generated quiz text is empty"));
    }

    let mut questions = Vec::new();
    let mut block = QuestionBlock::default();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if let Some(prompt) = question_number(line) {
            block.finish(&mut questions, topic, level, difficulty);
            block.prompt.push_str(prompt);
            continue;
        }
        if let Some((letter, option_text)) = option_prefix(line) {
            if !block.prompt.is_empty() {
                block.options.push((letter, option_text.to_string()));
                continue;
            }
        }
        if let Some(value) = labeled_value(line, &["correct answer:", "answer:"]) {
            block.correct = value.chars().find(char::is_ascii_alphabetic).map(|c| c.to_ascii_uppercase());
            continue;
        }
        if let Some(value) = labeled_value(line, &["explanation:"]) {
            block.explanation = Some(value.to_string());
            continue;
        }
        // Continuation lines extend whichever section is open.
        if let Some(explanation) = block.explanation.as_mut() {
            explanation.push(' ');
            explanation.push_str(line);
        } else if block.options.is_empty() && !block.prompt.is_empty() {
            block.prompt.push(' ');
            block.prompt.push_str(line);
        }
    }
    block.finish(&mut questions, topic, level, difficulty);

    if questions.is_empty() {
        return Err(CoreError::invalid_argument("generated quiz text had no parseable questions"));
    }
    Ok(questions)
}

#[derive(Default)]
struct QuestionBlock {
    prompt: String,
    options: Vec<(char, String)>,
    correct: Option<char>,
    explanation: Option<String>,
}

impl QuestionBlock {
    fn finish(
        &mut self,
        questions: &mut Vec<Question>,
        topic: &str,
        level: CertificateLevel,
        difficulty: Difficulty,
    ) {
        let block = std::mem::take(self);
        if block.prompt.is_empty() {
            return;
        }
        match block.build(topic, level, difficulty) {
            Some(question) => questions.push(question),
            None => warn!(prompt = %block_preview(&block.prompt), "skipping malformed quiz block"),
        }
    }

    fn build(
        &self,
        topic: &str,
        level: CertificateLevel,
        difficulty: Difficulty,
    ) -> Option<Question> {
        let correct = self.correct?;
        if self.options.len() < 2 {
            return None;
        }
        let mut seen = Vec::new();
        for (letter, _) in &self.options {
            if seen.contains(letter) {
                return None;
            }
            seen.push(*letter);
        }
        if !seen.contains(&correct) {
            return None;
        }

        Some(Question {
            id: Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            level,
            difficulty,
            prompt: self.prompt.clone(),
            options: self
                .options
                .iter()
                .map(|(letter, text)| QuestionOption { id: letter.to_string(), text: text.clone() })
                .collect(),
            correct_option_id: correct.to_string(),
            explanation: self.explanation.clone().unwrap_or_default(),
        })
    }
}

fn block_preview(prompt: &str) -> &str {
    let end = prompt
        .char_indices()
        .take(60)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    &prompt[..end]
}

/// `"3. prompt"` or `"3) prompt"` with any leading number.
fn question_number(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    let rest = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))?;
    let rest = rest.trim_start();
    (!rest.is_empty()).then_some(rest)
}

/// `"A) text"` or `"A. text"`, case-insensitive, letters A through F.
fn option_prefix(line: &str) -> Option<(char, &str)> {
    let mut chars = line.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    if !('A'..='F').contains(&letter) {
        return None;
    }
    let separator = chars.next()?;
    if separator != ')' && separator != '.' {
        return None;
    }
    let text = chars.as_str().trim();
    (!text.is_empty()).then_some((letter, text))
}

/// Case-insensitive `label: value` match against any of `labels`.
fn labeled_value<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    for label in labels {
        if let Some(prefix) = line.get(..label.len()) {
            if prefix.eq_ignore_ascii_case(label) {
                return Some(line[label.len()..].trim());
            }
        }
    }
    None
}
