use crate::{
    archive::ResponseArchive,
    config::Settings,
    credentials::CredentialStore,
    file_item::{load_files, load_templates, save_prompt},
    prompt_builder::SubmitError,
    remote::{Remote, RemoteUpdate},
    session::{Dispatch, Session},
};
use core::f32;
use eframe::egui;
use num_format::{Locale, ToFormattedString};
use std::{env, path::PathBuf, time::Instant};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Tab {
    Prompt,
    Response,
    DebugLog,
}

pub struct MyApp {
    pub session: Session,
    pub settings: Settings,
    pub credentials: Option<CredentialStore>,
    pub archive: ResponseArchive,
    /// Contents of the API key field.
    pub api_key_input: String,
    /// Key used for requests; updated on load and save.
    pub api_key: String,
    pub notification: Option<(String, Instant)>,
    pub remote: Remote,
    tab: Tab,
}

impl MyApp {
    pub fn new(base: PathBuf) -> Self {
        let mut notes = Vec::new();
        let settings = match Settings::load(&base) {
            Ok(settings) => settings,
            Err(err) => {
                notes.push(format!("{err}; using default settings."));
                Settings::defaults(&base)
            }
        };

        let credentials = match CredentialStore::open(&settings.key_file, &settings.api_key_file) {
            Ok(store) => Some(store),
            Err(err) => {
                notes.push(format!("Credential store unavailable: {err}"));
                None
            }
        };
        let api_key = credentials
            .as_ref()
            .map(CredentialStore::load_api_key)
            .unwrap_or_default();

        let mut app = Self {
            session: Session::new(settings.default_model.clone()),
            archive: ResponseArchive::new(settings.responses_dir.clone()),
            settings,
            credentials,
            api_key_input: api_key.clone(),
            api_key,
            notification: None,
            remote: Remote::default(),
            tab: Tab::Prompt,
        };
        for note in notes {
            app.session.warn(note);
        }
        if app.api_key.is_empty() {
            app.session.log("API Key is missing or could not be loaded.");
        } else {
            app.refresh_models();
        }
        app
    }

    fn notify(&mut self, message: impl Into<String>) {
        self.notification = Some((message.into(), Instant::now()));
    }

    fn refresh_models(&mut self) {
        self.remote
            .spawn_model_refresh(self.api_key.clone(), self.settings.timeouts());
    }

    fn save_api_key(&mut self) {
        let Some(store) = &self.credentials else {
            self.session.log("Cannot save API key: credential store unavailable.");
            return;
        };
        match store.save_api_key(&self.api_key_input) {
            Ok(()) => {
                self.api_key = store.load_api_key();
                self.session.log("API key saved.");
                self.refresh_models();
            }
            Err(err) => self.session.log(format!("Failed to save API key: {err}")),
        }
    }

    fn open_files(&mut self) {
        let mut dialog = rfd::FileDialog::new();
        if !self.settings.file_extensions.is_empty() {
            dialog = dialog.add_filter("Source files", self.settings.file_extensions.as_slice());
        }
        let Some(paths) = dialog.pick_files() else {
            return;
        };
        match load_files(&paths) {
            Ok(files) => self.session.load_files(files),
            Err(err) => self.session.log(format!("Error reading files: {err}")),
        }
    }

    fn load_standard_messages(&mut self) {
        match load_templates(&self.settings.templates_dir) {
            Ok(templates) => self.session.apply_templates(templates),
            Err(err) => self
                .session
                .log(format!("Error loading standard messages: {err}")),
        }
    }

    fn save_prompt_as(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Text files", &["txt"])
            .set_file_name("prompt.txt")
            .save_file()
        else {
            return;
        };
        match save_prompt(&path, &self.session.assembled_prompt()) {
            Ok(()) => self
                .session
                .log(format!("Prompt saved to {}.", path.display())),
            Err(err) => self.session.log(err.to_string()),
        }
    }

    fn send_prompt(&mut self) {
        match self.session.begin_submission() {
            Ok(Dispatch::DryRun { .. }) => self.notify("Debug mode: prompt logged, not sent."),
            Ok(Dispatch::Send(request)) => {
                self.remote
                    .spawn_completion(self.api_key.clone(), self.settings.timeouts(), request);
            }
            Err(SubmitError::TokenLimitExceeded { .. }) => {
                self.notify("Prompt token count exceeds the model's limit.");
            }
            Err(SubmitError::RequestInProgress) => {
                self.notify("Another request is already in progress.");
            }
        }
    }

    fn apply_remote_updates(&mut self) {
        while let Ok(update) = self.remote.remote_update_rx.try_recv() {
            match update {
                RemoteUpdate::Completed { model, result } => {
                    let Some(entry) = self.session.finish_submission(result) else {
                        self.notify("Request failed, see Debug Logs.");
                        continue;
                    };
                    match self.archive.save(&entry, &model, &chrono::Local::now()) {
                        Ok(path) => self
                            .session
                            .log(format!("Response saved to {}.", path.display())),
                        Err(err) => self.session.log(err.to_string()),
                    }
                    self.notify("Response received.");
                }
                RemoteUpdate::Models(Ok(ids)) => self.session.set_available_models(ids),
                RemoteUpdate::Models(Err(err)) => {
                    self.session.log(format!("Error fetching models: {err}"));
                }
            }
        }
    }

    fn top_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("API Key:");
                ui.add(
                    egui::TextEdit::singleline(&mut self.api_key_input)
                        .password(true)
                        .desired_width(300.0),
                );
                if ui.button("Save API Key").clicked() {
                    self.save_api_key();
                }
                ui.separator();

                let models = self.session.available_models.clone();
                let mut model_changed = false;
                egui::ComboBox::from_id_salt("model_dropdown")
                    .selected_text(self.session.model.clone())
                    .width(200.0)
                    .show_ui(ui, |ui| {
                        for id in &models {
                            model_changed |= ui
                                .selectable_value(&mut self.session.model, id.clone(), id.as_str())
                                .changed();
                        }
                    });

                ui.add_enabled(
                    !self.session.use_model_max,
                    egui::TextEdit::singleline(&mut self.session.max_tokens_input)
                        .desired_width(70.0),
                );
                let toggled = ui
                    .checkbox(&mut self.session.use_model_max, "Use Max Tokens")
                    .changed();
                if model_changed || toggled {
                    self.session.sync_max_tokens();
                }
                ui.checkbox(&mut self.session.manual_token_entry, "Manual Token Entry");
            });
            ui.horizontal(|ui| {
                if ui.button("Load Standard Messages").clicked() {
                    self.load_standard_messages();
                }
                if ui.button("Empty Textfields").clicked() {
                    self.session.clear_segments();
                }
                if ui.button("Empty Responses").clicked() {
                    self.session.clear_responses();
                }
                if ui.button("Reset Debug Logs").clicked() {
                    self.session.clear_debug_log();
                }
                if ui.button("Save Prompt").clicked() {
                    self.save_prompt_as();
                }
                if ui.button("Copy Prompt").clicked() {
                    ctx.copy_text(self.session.assembled_prompt());
                    self.notify("Prompt copied to clipboard!");
                }
            });
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.tab, Tab::Prompt, "Prompt Creation");
                ui.selectable_value(&mut self.tab, Tab::Response, "GPT Response");
                ui.selectable_value(&mut self.tab, Tab::DebugLog, "Debug Logs");
            });
        });
    }

    fn bottom_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("bottom_panel")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.set_height(30.0);
                    ui.checkbox(&mut self.session.dry_run, "Debug Mode");
                    ui.separator();
                    let total = self.session.segment_counts().total;
                    let limit = self.session.profile().max_context_length;
                    ui.label(format!(
                        "Token count: {} / {} ({:.2}%)",
                        total.to_formatted_string(&Locale::en),
                        limit.to_formatted_string(&Locale::en),
                        (total as f32 / limit as f32) * 100.0
                    ));
                    ui.separator();
                    let busy = self.session.is_busy();
                    if ui
                        .add_enabled(!busy, egui::Button::new("Send to GPT"))
                        .clicked()
                    {
                        self.send_prompt();
                    }
                    if busy {
                        ui.spinner();
                    }
                    const NOTIFICATION_DURATION: f32 = 3.0;
                    if let Some((message, start)) = &self.notification {
                        let elapsed = start.elapsed().as_secs_f32();
                        if elapsed < NOTIFICATION_DURATION {
                            let alpha = 1.0 - (elapsed / NOTIFICATION_DURATION);
                            let text = egui::RichText::new(message).color(
                                egui::Color32::from_rgba_unmultiplied(
                                    255,
                                    255,
                                    255,
                                    (alpha * 255.0) as u8,
                                ),
                            );
                            ui.label(text);
                            ctx.request_repaint();
                        } else {
                            self.notification = None;
                        }
                    }
                });
            });
    }

    fn prompt_tab(&mut self, ui: &mut egui::Ui) {
        let counts = self.session.segment_counts();
        egui::ScrollArea::vertical()
            .id_salt("prompt_scroll_area")
            .show(ui, |ui| {
                ui.label(format!("Start Message Part ({} tokens)", counts.start));
                let edited = ui
                    .add(
                        egui::TextEdit::multiline(&mut self.session.start_text)
                            .desired_width(f32::INFINITY)
                            .desired_rows(6),
                    )
                    .changed();
                if edited {
                    self.session.mark_edited();
                }
                if ui.button("Open File Explorer").clicked() {
                    self.open_files();
                }
                let files = self.session.loaded_files().len();
                if files > 0 {
                    ui.label(format!(
                        "Middle Message Part ({} tokens, {} file(s) loaded)",
                        counts.middle, files
                    ));
                } else {
                    ui.label(format!("Middle Message Part ({} tokens)", counts.middle));
                }
                let edited = ui
                    .add(
                        egui::TextEdit::multiline(&mut self.session.middle_text)
                            .desired_width(f32::INFINITY)
                            .desired_rows(16),
                    )
                    .changed();
                if edited {
                    self.session.mark_edited();
                }
                ui.label(format!("End Message Part ({} tokens)", counts.end));
                let edited = ui
                    .add(
                        egui::TextEdit::multiline(&mut self.session.end_text)
                            .desired_width(f32::INFINITY)
                            .desired_rows(6),
                    )
                    .changed();
                if edited {
                    self.session.mark_edited();
                }
            });
    }

    fn central_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| match self.tab {
            Tab::Prompt => self.prompt_tab(ui),
            Tab::Response => {
                egui::ScrollArea::vertical()
                    .id_salt("response_scroll_area")
                    .show(ui, |ui| {
                        ui.add(
                            egui::TextEdit::multiline(&mut self.session.responses)
                                .desired_width(f32::INFINITY)
                                .desired_rows(30),
                        );
                    });
            }
            Tab::DebugLog => {
                egui::ScrollArea::vertical()
                    .id_salt("debug_log_scroll_area")
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        for line in self.session.debug_log() {
                            ui.monospace(line.as_str());
                        }
                        ui.label("-----");
                    });
            }
        });
        if self.session.is_busy() {
            ctx.request_repaint();
        }
    }
}

impl eframe::App for MyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.apply_remote_updates();

        self.top_panel(ctx);

        self.bottom_panel(ctx);

        self.central_panel(ctx);
    }
}

pub fn run() {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base = match env::args().nth(1) {
        Some(arg) => {
            let folder = PathBuf::from(arg);
            if folder.is_dir() {
                folder
            } else {
                tracing::warn!("provided argument is not a valid directory, using {:?}", cwd);
                cwd
            }
        }
        None => cwd,
    };
    let app = MyApp::new(base);
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 900.0]),
        ..Default::default()
    };
    if let Err(err) = eframe::run_native("AI Merger", options, Box::new(|_cc| Ok(Box::new(app)))) {
        tracing::error!("window closed with error: {err}");
    }
}
