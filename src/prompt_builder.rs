use crate::file_item::SourceFile;
use crate::models::ModelProfile;
use crate::token_count::count_tokens;
use thiserror::Error;

/// Middle part of a prompt: either loaded files or free-form text, never both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Middle {
    Text(String),
    Files(Vec<SourceFile>),
}

impl Default for Middle {
    fn default() -> Self {
        Middle::Text(String::new())
    }
}

impl Middle {
    /// Files render as `--- name ---` blocks, text is used verbatim.
    pub fn render(&self) -> String {
        match self {
            Middle::Text(text) => text.clone(),
            Middle::Files(files) => render_files(files),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromptSegments {
    pub start: String,
    pub middle: Middle,
    pub end: String,
}

impl PromptSegments {
    pub fn new(start: impl Into<String>, middle: Middle, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            middle,
            end: end.into(),
        }
    }
}

pub fn render_file_block(file: &SourceFile) -> String {
    format!("--- {} ---\n{}\n", file.name, file.content)
}

pub fn render_files(files: &[SourceFile]) -> String {
    files.iter().map(render_file_block).collect()
}

/// Joins start, middle and end with newlines, skipping empty parts.
pub fn assemble(segments: &PromptSegments) -> String {
    join_parts(&segments.start, &segments.middle.render(), &segments.end)
}

pub fn join_parts(start: &str, middle: &str, end: &str) -> String {
    [start, middle, end]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A prompt cleared for sending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Approval {
    pub token_count: usize,
    /// Response budget to pass along with the request.
    pub response_token_cap: usize,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("token limit exceeded")]
    TokenLimitExceeded { token_count: usize, limit: usize },

    #[error("another request is already in progress")]
    RequestInProgress,
}

/// Decides whether a prompt of `token_count` tokens fits `model`.
pub fn check_budget(token_count: usize, model: &ModelProfile) -> Result<Approval, SubmitError> {
    if token_count > model.max_context_length {
        return Err(SubmitError::TokenLimitExceeded {
            token_count,
            limit: model.max_context_length,
        });
    }
    Ok(Approval {
        token_count,
        response_token_cap: model.response_token_cap(),
    })
}

pub fn can_submit(prompt: &str, model: &ModelProfile) -> Result<Approval, SubmitError> {
    check_budget(count_tokens(prompt, model), model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile;

    fn file(name: &str, content: &str) -> SourceFile {
        SourceFile {
            name: name.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn assembles_file_blocks_between_start_and_end() {
        let segments = PromptSegments::new(
            "Summarize:",
            Middle::Files(vec![file("a.cs", "class A {}")]),
            "End.",
        );
        assert_eq!(assemble(&segments), "Summarize:\n--- a.cs ---\nclass A {}\n\nEnd.");
    }

    #[test]
    fn file_blocks_keep_selection_order() {
        let files = vec![file("b.cs", "B"), file("a.cs", "A")];
        assert_eq!(render_files(&files), "--- b.cs ---\nB\n--- a.cs ---\nA\n");
    }

    #[test]
    fn free_text_middle_is_verbatim() {
        let segments = PromptSegments::new("s", Middle::Text("  raw\n".into()), "e");
        assert_eq!(assemble(&segments), "s\n  raw\n\ne");
    }

    #[test]
    fn empty_segments_are_skipped() {
        let only_middle = PromptSegments::new("", Middle::Text("body".into()), "");
        assert_eq!(assemble(&only_middle), "body");

        let no_middle = PromptSegments::new("head", Middle::default(), "tail");
        assert_eq!(assemble(&no_middle), "head\ntail");

        assert_eq!(assemble(&PromptSegments::default()), "");
    }

    #[test]
    fn swapping_start_and_end_keeps_characters() {
        let a = PromptSegments::new("alpha", Middle::Text("mid".into()), "omega");
        let b = PromptSegments::new("omega", Middle::Text("mid".into()), "alpha");
        let mut chars_a: Vec<char> = assemble(&a).chars().collect();
        let mut chars_b: Vec<char> = assemble(&b).chars().collect();
        chars_a.sort_unstable();
        chars_b.sort_unstable();
        assert_eq!(chars_a, chars_b);
    }

    #[test]
    fn budget_boundary_for_gpt4() {
        let gpt4 = profile("gpt-4");
        let approval = check_budget(8192, &gpt4).unwrap();
        assert_eq!(approval.token_count, 8192);
        assert_eq!(approval.response_token_cap, 4096);

        let err = check_budget(8193, &gpt4).unwrap_err();
        assert_eq!(
            err,
            SubmitError::TokenLimitExceeded {
                token_count: 8193,
                limit: 8192
            }
        );
        assert_eq!(err.to_string(), "token limit exceeded");
    }

    #[test]
    fn can_submit_at_exact_limit() {
        let prompt = "hello world";
        let count = count_tokens(prompt, &profile("gpt-4"));

        let exact = ModelProfile::new("gpt-4", count, true);
        assert!(can_submit(prompt, &exact).is_ok());

        let short = ModelProfile::new("gpt-4", count - 1, true);
        assert!(matches!(
            can_submit(prompt, &short),
            Err(SubmitError::TokenLimitExceeded { .. })
        ));
    }

    #[test]
    fn empty_prompt_is_submittable() {
        let approval = can_submit("", &profile("gpt-3.5-turbo")).unwrap();
        assert_eq!(approval.token_count, 6);
    }
}
