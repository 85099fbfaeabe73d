//! Grounded prompt assembly

use crate::chain::ConversationTurn;
use crate::config::Config;
use crate::error::{PagechatError, Result};
use crate::retrieval::RetrievalResult;

/// Written by the model when the excerpts do not cover part of an answer
pub const FALLBACK_PHRASE: &str = "Insufficient information in the document for this section.";

pub const DEFAULT_TEMPLATE: &str = include_str!("default_prompt.txt");

/// Lesson plan with fixed sections, each falling back to [`FALLBACK_PHRASE`]
pub const LESSON_PLAN_TEMPLATE: &str = include_str!("lesson_plan_prompt.txt");

/// Names accepted by `prompt.template`
pub const BUILTIN_TEMPLATES: [&str; 2] = ["grounded", "lesson_plan"];

pub fn builtin_template(name: &str) -> Option<&'static str> {
    match name {
        "grounded" => Some(DEFAULT_TEMPLATE),
        "lesson_plan" => Some(LESSON_PLAN_TEMPLATE),
        _ => None,
    }
}

const INPUT: &str = "{input}";
const CONTEXT: &str = "{context}";
const CHAT_HISTORY: &str = "{chat_history}";

/// Renders the template with the query, compressed context and prior turns
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
    /// 0 renders the whole history
    max_history_turns: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            max_history_turns: 0,
        }
    }
}

impl PromptBuilder {
    /// Template must contain `{input}` and `{context}`; `{chat_history}` is optional
    pub fn new(template: impl Into<String>, max_history_turns: usize) -> Result<Self> {
        let template = template.into();
        for placeholder in [INPUT, CONTEXT] {
            if !template.contains(placeholder) {
                return Err(PagechatError::InvalidConfigValue {
                    path: "prompt.template_file".to_string(),
                    message: format!("Template is missing the {} placeholder", placeholder),
                });
            }
        }

        Ok(Self {
            template,
            max_history_turns,
        })
    }

    /// A template file takes precedence over the named built-in
    pub fn from_config(config: &Config) -> Result<Self> {
        let max_history_turns = config.sessions.max_history_turns;
        match &config.prompt.template_file {
            Some(path) => {
                let template = std::fs::read_to_string(path).map_err(|e| PagechatError::Io {
                    source: e,
                    context: format!("Failed to read prompt template: {:?}", path),
                })?;
                tracing::info!("Using prompt template from {:?}", path);
                Self::new(template, max_history_turns)
            }
            None => {
                let name = config.prompt.template.as_str();
                let template =
                    builtin_template(name).ok_or_else(|| PagechatError::InvalidConfigValue {
                        path: "prompt.template".to_string(),
                        message: format!(
                            "Unknown template '{}', expected one of {:?}",
                            name, BUILTIN_TEMPLATES
                        ),
                    })?;
                tracing::debug!("Using built-in prompt template {}", name);
                Self::new(template, max_history_turns)
            }
        }
    }

    pub fn build(
        &self,
        query: &str,
        context: &[RetrievalResult],
        history: &[ConversationTurn],
    ) -> String {
        let context = render_context(context);
        let history = self.render_history(history);

        // Single pass, so placeholders inside user text stay literal
        let mut output = String::with_capacity(self.template.len() + context.len() + history.len());
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            output.push_str(&rest[..open]);
            let tail = &rest[open..];
            let (value, len) = if tail.starts_with(INPUT) {
                (query, INPUT.len())
            } else if tail.starts_with(CONTEXT) {
                (context.as_str(), CONTEXT.len())
            } else if tail.starts_with(CHAT_HISTORY) {
                (history.as_str(), CHAT_HISTORY.len())
            } else {
                ("{", 1)
            };
            output.push_str(value);
            rest = &tail[len..];
        }
        output.push_str(rest);
        output
    }

    fn render_history(&self, history: &[ConversationTurn]) -> String {
        let skip = match self.max_history_turns {
            0 => 0,
            max => history.len().saturating_sub(max),
        };

        let rendered: Vec<String> = history[skip..]
            .iter()
            .map(|turn| format!("User: {}\nAssistant: {}", turn.query, turn.answer))
            .collect();

        if rendered.is_empty() {
            "(no previous messages)".to_string()
        } else {
            rendered.join("\n")
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

fn render_context(context: &[RetrievalResult]) -> String {
    if context.is_empty() {
        return "(no relevant excerpts were found)".to_string();
    }

    context
        .iter()
        .map(|r| format!("[Page {}]\n{}", r.chunk.source_page, r.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    fn result(page: u32, text: &str) -> RetrievalResult {
        RetrievalResult {
            chunk: Chunk {
                text: text.to_string(),
                source_page: page,
                chunk_index: 0,
                document_id: "doc".to_string(),
            },
            score: 1.0,
            rank: 1,
        }
    }

    fn turn(query: &str, answer: &str) -> ConversationTurn {
        ConversationTurn {
            query: query.to_string(),
            retrieved_chunks: Vec::new(),
            answer: answer.to_string(),
        }
    }

    #[test]
    fn test_default_template_is_grounded() {
        let builder = PromptBuilder::default();
        assert!(builder.template().contains(FALLBACK_PHRASE));
        assert!(builder.template().contains(INPUT));
        assert!(builder.template().contains(CONTEXT));
        assert!(builder.template().contains(CHAT_HISTORY));
    }

    #[test]
    fn test_build_renders_all_parts() {
        let builder = PromptBuilder::new("Q={input}\nC={context}\nH={chat_history}", 0).unwrap();
        let prompt = builder.build(
            "what is due?",
            &[result(3, "Rent is due."), result(7, "Tax is due.")],
            &[turn("hi", "hello")],
        );

        assert_eq!(
            prompt,
            "Q=what is due?\nC=[Page 3]\nRent is due.\n\n[Page 7]\nTax is due.\nH=User: hi\nAssistant: hello"
        );
    }

    #[test]
    fn test_user_text_placeholders_stay_literal() {
        let builder = PromptBuilder::new("{input}|{context}", 0).unwrap();
        let prompt = builder.build("show {context} {x}", &[result(1, "body")], &[]);
        assert_eq!(prompt, "show {context} {x}|[Page 1]\nbody");
    }

    #[test]
    fn test_history_limit_keeps_latest_turns() {
        let builder = PromptBuilder::new("{input}{context}{chat_history}", 1).unwrap();
        let prompt = builder.build("", &[], &[turn("first", "a"), turn("second", "b")]);
        assert!(prompt.contains("User: second"));
        assert!(!prompt.contains("User: first"));
    }

    #[test]
    fn test_empty_history_and_context() {
        let prompt = PromptBuilder::default().build("q", &[], &[]);
        assert!(prompt.contains("(no previous messages)"));
        assert!(prompt.contains("(no relevant excerpts were found)"));
    }

    #[test]
    fn test_template_requires_placeholders() {
        assert!(PromptBuilder::new("only {input}", 0).is_err());
        assert!(PromptBuilder::new("{input} {context}", 0).is_ok());
    }

    #[test]
    fn test_lesson_plan_builtin() {
        let mut config = Config::default();
        config.prompt.template = "lesson_plan".to_string();
        let builder = PromptBuilder::from_config(&config).unwrap();

        let prompt = builder.build("photosynthesis", &[result(12, "Chlorophyll absorbs light.")], &[]);
        assert!(prompt.contains("User request: photosynthesis"));
        assert!(prompt.contains("[Page 12]\nChlorophyll absorbs light."));
        for section in ["## Lesson Title", "## Learning Objectives", "## Source References"] {
            assert!(prompt.contains(section), "missing {}", section);
        }
        assert!(prompt.contains(FALLBACK_PHRASE));
    }

    #[test]
    fn test_unknown_builtin_rejected() {
        let mut config = Config::default();
        config.prompt.template = "sonnet".to_string();
        assert!(matches!(
            PromptBuilder::from_config(&config),
            Err(PagechatError::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_template_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "Answer {input} from {context}").unwrap();

        let mut config = Config::default();
        config.prompt.template_file = Some(path);
        let builder = PromptBuilder::from_config(&config).unwrap();
        assert_eq!(builder.build("x", &[], &[]), "Answer x from (no relevant excerpts were found)");
    }
}
