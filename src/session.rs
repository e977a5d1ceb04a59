//! Everything the window edits, held outside the UI.
//!
//! The egui layer only reads and writes these fields and calls the methods
//! below; prompt assembly and budgeting never look at widget state.

use crate::file_item::{SourceFile, Templates};
use crate::models::{self, ModelProfile};
use crate::prompt_builder::{self, Middle, PromptSegments, SubmitError};
use crate::remote::{CompletionError, CompletionRequest};
use crate::token_count::count_tokens;
use std::borrow::Cow;

/// What a send button press turned into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Debug mode: the prompt is only logged.
    DryRun { prompt: String },
    /// The request must be sent; the session is now busy.
    Send(CompletionRequest),
}

/// Token counts shown next to each text field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentCounts {
    pub start: usize,
    pub middle: usize,
    pub end: usize,
    pub total: usize,
}

pub struct Session {
    pub start_text: String,
    /// Text shown in the middle field. Rewritten on every file load.
    pub middle_text: String,
    pub end_text: String,
    loaded_files: Vec<SourceFile>,

    pub model: String,
    pub available_models: Vec<String>,
    /// Contents of the max tokens field.
    pub max_tokens_input: String,
    pub use_model_max: bool,
    pub manual_token_entry: bool,
    pub dry_run: bool,

    busy: bool,
    response_counter: usize,
    pub responses: String,
    debug_log: Vec<String>,
    /// Last computed counts and the model they were computed for.
    counts: Option<(String, SegmentCounts)>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(models::DEFAULT_MODEL)
    }
}

impl Session {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            start_text: String::new(),
            middle_text: String::new(),
            end_text: String::new(),
            loaded_files: Vec::new(),
            model: model.into(),
            available_models: models::known_ids(),
            max_tokens_input: String::new(),
            use_model_max: false,
            manual_token_entry: false,
            dry_run: false,
            busy: false,
            response_counter: 0,
            responses: String::new(),
            debug_log: Vec::new(),
            counts: None,
        }
    }

    pub fn profile(&self) -> ModelProfile {
        models::profile(&self.model)
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn loaded_files(&self) -> &[SourceFile] {
        &self.loaded_files
    }

    pub fn response_count(&self) -> usize {
        self.response_counter
    }

    pub fn debug_log(&self) -> &[String] {
        &self.debug_log
    }

    /// Records a line for the debug tab and the process log.
    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.debug_log.push(message);
    }

    /// Like [`Session::log`], at warning level.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.debug_log.push(message);
    }

    pub fn clear_debug_log(&mut self) {
        self.debug_log.clear();
    }

    /// Replaces the middle segment with freshly read files.
    pub fn load_files(&mut self, files: Vec<SourceFile>) {
        self.middle_text = prompt_builder::render_files(&files);
        self.log(format!("Loaded {} file(s).", files.len()));
        self.loaded_files = files;
        self.mark_edited();
    }

    pub fn apply_templates(&mut self, templates: Templates) {
        self.start_text = templates.start;
        self.end_text = templates.end;
        self.mark_edited();
        self.log("Standard start/end messages loaded.");
    }

    /// Clears the three text fields and forgets loaded files.
    pub fn clear_segments(&mut self) {
        self.start_text.clear();
        self.middle_text.clear();
        self.end_text.clear();
        self.loaded_files.clear();
        self.mark_edited();
    }

    /// Must be called after writing to one of the text fields directly.
    pub fn mark_edited(&mut self) {
        self.counts = None;
    }

    pub fn clear_responses(&mut self) {
        self.responses.clear();
    }

    /// Current segments. Loaded files win over the middle text field.
    pub fn segments(&self) -> PromptSegments {
        let middle = if self.loaded_files.is_empty() {
            Middle::Text(self.middle_text.trim().to_string())
        } else {
            Middle::Files(self.loaded_files.clone())
        };
        PromptSegments::new(self.start_text.trim(), middle, self.end_text.trim())
    }

    /// The middle part as it will be sent.
    fn rendered_middle(&self) -> Cow<'_, str> {
        if self.loaded_files.is_empty() {
            Cow::Borrowed(self.middle_text.trim())
        } else {
            Cow::Owned(prompt_builder::render_files(&self.loaded_files))
        }
    }

    /// Same result as `assemble(&self.segments())` without cloning loaded files.
    pub fn assembled_prompt(&self) -> String {
        prompt_builder::join_parts(
            self.start_text.trim(),
            &self.rendered_middle(),
            self.end_text.trim(),
        )
    }

    /// Token counts for the current segments and model.
    ///
    /// Cached until a segment is edited or the model changes.
    pub fn segment_counts(&mut self) -> SegmentCounts {
        if let Some((model, counts)) = &self.counts {
            if *model == self.model {
                return *counts;
            }
        }
        let counts = self.compute_counts();
        self.counts = Some((self.model.clone(), counts));
        counts
    }

    fn compute_counts(&self) -> SegmentCounts {
        let model = self.profile();
        let start = self.start_text.trim();
        let middle = self.rendered_middle();
        let end = self.end_text.trim();
        SegmentCounts {
            start: count_tokens(start, &model),
            middle: count_tokens(&middle, &model),
            end: count_tokens(end, &model),
            total: count_tokens(&prompt_builder::join_parts(start, &middle, end), &model),
        }
    }

    /// Called when the model changes or "Use Max Tokens" is toggled.
    pub fn sync_max_tokens(&mut self) {
        if self.use_model_max {
            self.max_tokens_input = self.profile().max_context_length.to_string();
        }
    }

    /// Response budget for the next request.
    ///
    /// A manual entry is honoured only when it parses to a positive number and
    /// never exceeds the model's compatibility cap.
    pub fn response_token_cap(&self) -> usize {
        let cap = self.profile().response_token_cap();
        if self.manual_token_entry && !self.use_model_max {
            if let Ok(requested) = self.max_tokens_input.trim().parse::<usize>() {
                if requested > 0 {
                    return requested.min(cap);
                }
            }
        }
        cap
    }

    /// Validates the current prompt and, unless in debug mode, marks the session busy.
    ///
    /// On error nothing changes except the debug log.
    pub fn begin_submission(&mut self) -> Result<Dispatch, SubmitError> {
        if self.busy {
            self.log("Another request is already in progress.");
            return Err(SubmitError::RequestInProgress);
        }

        let prompt = self.assembled_prompt();
        if self.dry_run {
            self.log("Debug mode is enabled. Prompt will not be sent.");
            self.log(format!("Debug Prompt Content:\n{prompt}"));
            return Ok(Dispatch::DryRun { prompt });
        }

        let model = self.profile();
        let approval = match prompt_builder::can_submit(&prompt, &model) {
            Ok(approval) => approval,
            Err(err) => {
                if let SubmitError::TokenLimitExceeded { token_count, limit } = &err {
                    self.log(format!(
                        "Prompt token count {token_count} exceeds the limit of {limit} for {}.",
                        model.id
                    ));
                }
                return Err(err);
            }
        };

        self.busy = true;
        self.log(format!(
            "Sending prompt to {} ({} tokens).",
            model.id, approval.token_count
        ));
        self.log(format!("Prompt Content:\n{prompt}"));
        Ok(Dispatch::Send(CompletionRequest {
            model: model.id,
            prompt,
            max_tokens: self.response_token_cap(),
        }))
    }

    /// Applies the outcome of a request. Returns the transcript entry on success.
    ///
    /// The busy flag is cleared whatever the outcome.
    pub fn finish_submission(&mut self, result: Result<String, CompletionError>) -> Option<String> {
        self.busy = false;
        match result {
            Ok(content) => {
                self.response_counter += 1;
                let entry = format!("--- Response {} ---\n{}\n", self.response_counter, content);
                self.responses.push_str(&entry);
                self.log("Received response.");
                Some(entry)
            }
            Err(err) => {
                self.warn(format!("An error occurred: {err}"));
                None
            }
        }
    }

    /// Replaces the dropdown choices with the registered subset of `ids`.
    pub fn set_available_models(&mut self, ids: Vec<String>) {
        let models = models::filter_available(ids);
        if models.is_empty() {
            self.log("No models available.");
            return;
        }
        if !models.contains(&self.model) {
            self.model = models[0].clone();
            self.sync_max_tokens();
        }
        self.available_models = models;
        self.log("Model dropdown updated successfully.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content: &str) -> SourceFile {
        SourceFile {
            name: name.into(),
            content: content.into(),
        }
    }

    fn send(session: &mut Session) -> CompletionRequest {
        match session.begin_submission().unwrap() {
            Dispatch::Send(request) => request,
            other => panic!("expected a send, got {other:?}"),
        }
    }

    #[test]
    fn loaded_files_take_precedence_over_edits() {
        let mut session = Session::new("gpt-4");
        session.start_text = "Summarize:".into();
        session.end_text = "End.".into();
        session.load_files(vec![file("a.cs", "class A {}")]);
        assert_eq!(session.middle_text, "--- a.cs ---\nclass A {}\n");

        session.middle_text = "edited by hand".into();
        assert_eq!(
            session.assembled_prompt(),
            "Summarize:\n--- a.cs ---\nclass A {}\n\nEnd."
        );
    }

    #[test]
    fn new_load_replaces_previous_files() {
        let mut session = Session::default();
        session.load_files(vec![file("a.cs", "A"), file("b.cs", "B")]);
        session.load_files(vec![file("c.cs", "C")]);
        assert_eq!(session.loaded_files(), &[file("c.cs", "C")]);
        assert_eq!(session.assembled_prompt(), "--- c.cs ---\nC\n");
    }

    #[test]
    fn free_text_used_without_files() {
        let mut session = Session::default();
        session.start_text = "  intro \n".into();
        session.middle_text = "body".into();
        assert_eq!(session.assembled_prompt(), "intro\nbody");

        session.load_files(vec![file("x.cs", "X")]);
        session.clear_segments();
        session.middle_text = "fresh".into();
        assert_eq!(session.assembled_prompt(), "fresh");
    }

    #[test]
    fn send_marks_busy_until_finished() {
        let mut session = Session::new("gpt-4");
        session.middle_text = "hello".into();

        let request = send(&mut session);
        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.prompt, "hello");
        assert_eq!(request.max_tokens, 4096);
        assert!(session.is_busy());

        assert_eq!(
            session.begin_submission(),
            Err(SubmitError::RequestInProgress)
        );

        let entry = session.finish_submission(Ok("hi there".into()));
        assert_eq!(entry.as_deref(), Some("--- Response 1 ---\nhi there\n"));
        assert!(!session.is_busy());
        assert_eq!(session.response_count(), 1);
    }

    #[test]
    fn failure_clears_busy_without_counting() {
        let mut session = Session::new("gpt-4");
        send(&mut session);
        let logged = session.debug_log().len();
        assert!(session
            .finish_submission(Err(CompletionError::EmptyResponse))
            .is_none());
        assert!(!session.is_busy());
        assert_eq!(session.response_count(), 0);
        assert_eq!(session.debug_log().len(), logged + 1);
        let last = session.debug_log().last().unwrap();
        assert!(last.starts_with("An error occurred: "));
        assert!(last.contains("no message"));
    }

    #[test]
    fn dry_run_never_goes_busy() {
        let mut session = Session::new("gpt-4");
        session.dry_run = true;
        session.start_text = "a".into();
        session.end_text = "b".into();
        assert_eq!(
            session.begin_submission().unwrap(),
            Dispatch::DryRun {
                prompt: "a\nb".into()
            }
        );
        assert!(!session.is_busy());
    }

    #[test]
    fn oversized_prompt_is_rejected_without_side_effects() {
        let mut session = Session::new("gpt-4");
        session.middle_text = "token ".repeat(9000);
        let err = session.begin_submission().unwrap_err();
        assert!(matches!(err, SubmitError::TokenLimitExceeded { limit: 8192, .. }));
        assert!(!session.is_busy());
        assert_eq!(session.response_count(), 0);
    }

    #[test]
    fn manual_cap_is_clamped() {
        let mut session = Session::new("gpt-4o");
        session.manual_token_entry = true;
        session.max_tokens_input = "1000".into();
        assert_eq!(session.response_token_cap(), 1000);

        session.max_tokens_input = "50000".into();
        assert_eq!(session.response_token_cap(), 4096);

        session.max_tokens_input = "lots".into();
        assert_eq!(session.response_token_cap(), 4096);

        session.manual_token_entry = false;
        session.max_tokens_input = "1000".into();
        assert_eq!(session.response_token_cap(), 4096);
    }

    #[test]
    fn use_model_max_fills_field() {
        let mut session = Session::new("gpt-4-32k");
        session.use_model_max = true;
        session.sync_max_tokens();
        assert_eq!(session.max_tokens_input, "32768");

        session.model = "unknown-model".into();
        session.sync_max_tokens();
        assert_eq!(session.max_tokens_input, "128000");
    }

    #[test]
    fn empty_segments_count_overhead() {
        let mut session = Session::new("gpt-4");
        let counts = session.segment_counts();
        assert_eq!(counts.start, 6);
        assert_eq!(counts.total, 6);
    }

    #[test]
    fn available_models_are_filtered() {
        let mut session = Session::new("gpt-3.5-turbo");
        session.set_available_models(vec!["whisper-1".into(), "gpt-4o".into(), "gpt-4".into()]);
        assert_eq!(session.available_models, ["gpt-4", "gpt-4o"]);
        assert_eq!(session.model, "gpt-4");

        session.set_available_models(vec!["whisper-1".into()]);
        assert_eq!(session.available_models, ["gpt-4", "gpt-4o"]);
    }

    #[test]
    fn assembled_prompt_matches_pure_assembly() {
        let mut session = Session::new("gpt-4");
        session.start_text = " Summarize: ".into();
        session.end_text = "End.".into();
        assert_eq!(session.assembled_prompt(), prompt_builder::assemble(&session.segments()));

        session.load_files(vec![file("a.cs", "class A {}"), file("b.cs", "class B {}")]);
        assert_eq!(session.assembled_prompt(), prompt_builder::assemble(&session.segments()));
    }

    #[test]
    fn counts_are_cached_until_edited() {
        let mut session = Session::new("gpt-4");
        let model = session.profile();
        let before = session.segment_counts();

        // direct writes are not seen until the edit is reported
        session.start_text = "hello world".into();
        assert_eq!(session.segment_counts(), before);

        session.mark_edited();
        let after = session.segment_counts();
        assert_eq!(after.start, count_tokens("hello world", &model));
        assert_eq!(after.total, count_tokens("hello world", &model));
    }

    #[test]
    fn counts_follow_every_mutator() {
        let mut session = Session::new("gpt-4");
        let model = session.profile();
        session.segment_counts();

        let files = vec![file("a.cs", "class A {}")];
        let rendered = prompt_builder::render_files(&files);
        session.load_files(files);
        assert_eq!(session.segment_counts().middle, count_tokens(&rendered, &model));

        session.apply_templates(Templates {
            start: "Review:".into(),
            end: "Thanks.".into(),
        });
        let counts = session.segment_counts();
        assert_eq!(counts.start, count_tokens("Review:", &model));
        assert_eq!(counts.end, count_tokens("Thanks.", &model));
        assert_eq!(counts.total, count_tokens(&session.assembled_prompt(), &model));

        session.clear_segments();
        assert_eq!(
            session.segment_counts(),
            SegmentCounts {
                start: 6,
                middle: 6,
                end: 6,
                total: 6,
            }
        );
    }

    #[test]
    fn counts_refresh_on_model_change() {
        let mut session = Session::new("gpt-4");
        session.middle_text = "naïve café — déjà vu ".repeat(20);
        session.mark_edited();
        let on_gpt4 = session.segment_counts();

        session.model = "gpt-4o".into();
        let on_gpt4o = session.segment_counts();
        let expected = count_tokens(session.middle_text.trim(), &models::profile("gpt-4o"));
        assert_eq!(on_gpt4o.middle, expected);
        assert_eq!(
            on_gpt4.middle,
            count_tokens(session.middle_text.trim(), &models::profile("gpt-4"))
        );

        // switching the model is enough to pick up unreported writes
        session.end_text = "bye".into();
        session.model = "gpt-4".into();
        assert_eq!(
            session.segment_counts().end,
            count_tokens("bye", &models::profile("gpt-4"))
        );
    }

    #[test]
    fn middle_count_ignores_edits_while_files_loaded() {
        let mut session = Session::new("gpt-4o");
        let files = vec![file("a.cs", "class A { int x; }")];
        let rendered = prompt_builder::render_files(&files);
        session.load_files(files);

        session.middle_text = "x".into();
        session.mark_edited();
        assert_eq!(
            session.segment_counts().middle,
            count_tokens(&rendered, &session.profile())
        );
    }

    #[test]
    fn large_file_counts_once_per_edit() {
        let mut session = Session::new("gpt-4o");
        session.load_files(vec![file("big.cs", &"public int Value { get; set; }\n".repeat(10_000))]);
        let first = session.segment_counts();
        let started = std::time::Instant::now();
        for _ in 0..100 {
            assert_eq!(session.segment_counts(), first);
        }
        // repeated frames only copy the cached value
        assert!(started.elapsed() < std::time::Duration::from_millis(50));
    }
}
