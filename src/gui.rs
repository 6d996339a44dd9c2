use eframe::egui;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::audio::{self, AudioSource};
use crate::conversation::Role;
use crate::models::{AnalysisSettings, ModelId, ReasoningEffort, MODELS, STYLES, SUGGESTIONS};
use crate::orchestrator::{Orchestrator, Outbound};
use crate::player::{Playback, RodioPlayback, SilentPlayback};
use crate::selection::{RegionDrag, RegionEvent};
use crate::service::{MixService, Spectrogram};
use crate::session::SessionStatus;
use crate::worker::Dispatcher;

const WAVEFORM_HEIGHT: f32 = 120.0;
const WAVEFORM_COLUMNS: usize = 1200;
/// Pointer distance from a region edge that still grabs the edge.
const EDGE_GRAB_PX: f32 = 6.0;

const ACCENT: egui::Color32 = egui::Color32::from_rgb(129, 140, 248);
const WARNING: egui::Color32 = egui::Color32::from_rgb(251, 191, 36);
const DANGER: egui::Color32 = egui::Color32::from_rgb(239, 68, 68);

pub fn run(
    initial_file: Option<PathBuf>,
    settings: AnalysisSettings,
    service: Arc<dyn MixService>,
) -> anyhow::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([900.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Mix Assistant",
        options,
        Box::new(move |cc| {
            configure_visuals(&cc.egui_ctx);
            Ok(Box::new(MixApp::new(initial_file, settings, service, cc.egui_ctx.clone())))
        }),
    )
    .map_err(|e| anyhow::anyhow!("GUI Error: {}", e))
}

pub fn configure_visuals(ctx: &egui::Context) {
    let mut visuals = egui::Visuals::dark();
    visuals.window_corner_radius = egui::CornerRadius::same(8);
    visuals.widgets.noninteractive.bg_fill = egui::Color32::from_gray(20);
    visuals.selection.bg_fill = ACCENT;
    ctx.set_visuals(visuals);
}

enum AppMessage {
    Loaded(u64, Arc<AudioSource>),
    LoadFailed(u64, String),
}

pub struct MixApp {
    orchestrator: Orchestrator,
    dispatcher: Dispatcher,
    msg_receiver: Receiver<AppMessage>,
    msg_sender: Sender<AppMessage>,
    ctx: egui::Context,

    // File loading
    load_ticket: u64,
    loading: Option<String>,

    // Visualization
    waveform_cache: Option<Vec<(f32, f32)>>,
    drag: Option<RegionDrag>,
    spectrogram: Option<(Arc<Spectrogram>, Option<egui::TextureHandle>)>,

    // Inputs
    prompt_input: String,
    reply_input: String,
}

impl MixApp {
    pub fn new(
        initial_file: Option<PathBuf>,
        settings: AnalysisSettings,
        service: Arc<dyn MixService>,
        ctx: egui::Context,
    ) -> Self {
        let (sender, receiver) = unbounded();

        let playback: Box<dyn Playback> = match RodioPlayback::try_default() {
            Ok(playback) => Box::new(playback),
            Err(e) => {
                log::warn!("no audio output, playback disabled: {e}");
                Box::new(SilentPlayback::default())
            }
        };

        let repaint = ctx.clone();
        let mut app = Self {
            orchestrator: Orchestrator::new(settings, playback),
            dispatcher: Dispatcher::new(service, move || repaint.request_repaint()),
            msg_receiver: receiver,
            msg_sender: sender,
            ctx,
            load_ticket: 0,
            loading: None,
            waveform_cache: None,
            drag: None,
            spectrogram: None,
            prompt_input: String::new(),
            reply_input: String::new(),
        };

        if let Some(path) = initial_file {
            app.load_file(path);
        }

        app
    }

    fn load_file(&mut self, path: PathBuf) {
        self.load_ticket += 1;
        let ticket = self.load_ticket;
        let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
        self.loading = Some(name);

        let sender = self.msg_sender.clone();
        let ctx = self.ctx.clone();
        thread::spawn(move || {
            match audio::load_audio_file(&path) {
                Ok(source) => {
                    sender.send(AppMessage::Loaded(ticket, Arc::new(source))).ok();
                }
                Err(e) => {
                    sender.send(AppMessage::LoadFailed(ticket, format!("{e:#}"))).ok();
                }
            }
            ctx.request_repaint();
        });
    }

    fn pick_file(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Audio", &["wav", "mp3", "flac", "ogg", "m4a", "aac", "aiff"])
            .pick_file()
        {
            self.load_file(path);
        }
    }

    fn handle_messages(&mut self) {
        while let Ok(msg) = self.msg_receiver.try_recv() {
            match msg {
                AppMessage::Loaded(ticket, _) | AppMessage::LoadFailed(ticket, _)
                    if ticket != self.load_ticket =>
                {
                    log::debug!("ignoring superseded load {ticket}");
                }
                AppMessage::Loaded(_, source) => {
                    self.loading = None;
                    self.generate_waveform(&source);
                    self.drag = None;
                    self.reply_input.clear();
                    self.orchestrator.load_source(source);
                }
                AppMessage::LoadFailed(_, e) => {
                    self.loading = None;
                    self.waveform_cache = None;
                    self.drag = None;
                    self.orchestrator.source_failed(e);
                }
            }
        }
    }

    fn submit(&mut self, outbound: Option<Outbound>) {
        if let Some(outbound) = outbound {
            self.dispatcher.dispatch(outbound);
        }
    }

    fn send_reply(&mut self) {
        let outbound = self.orchestrator.send_reply(self.reply_input.clone());
        if outbound.is_some() {
            self.reply_input.clear();
        }
        self.submit(outbound);
    }

    /// Min/max pairs per display column.
    fn generate_waveform(&mut self, data: &AudioSource) {
        let channels = data.channels.max(1) as usize;
        let frames = data.frames();
        let step = (frames / WAVEFORM_COLUMNS).max(1);
        let mut cache = Vec::with_capacity(WAVEFORM_COLUMNS);

        for column in 0..WAVEFORM_COLUMNS {
            let start = column * step * channels;
            let end = ((column + 1) * step * channels).min(data.samples.len());
            if start >= end {
                break;
            }
            let (min, max) = data.samples[start..end]
                .iter()
                .fold((0.0f32, 0.0f32), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            cache.push((min, max));
        }
        self.waveform_cache = Some(cache);
    }

    fn sync_spectrogram(&mut self, ctx: &egui::Context) {
        let current = self.orchestrator.spectrogram().cloned();
        match current {
            None => self.spectrogram = None,
            Some(spec) => {
                let fresh = self
                    .spectrogram
                    .as_ref()
                    .map_or(true, |(shown, _)| !Arc::ptr_eq(shown, &spec));
                if fresh {
                    let texture = match image::load_from_memory(&spec.png) {
                        Ok(img) => {
                            let rgba = img.to_rgba8();
                            let size = [rgba.width() as usize, rgba.height() as usize];
                            let color_image = egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());
                            Some(ctx.load_texture("spectrogram", color_image, Default::default()))
                        }
                        Err(e) => {
                            log::warn!("could not decode spectrogram: {e}");
                            None
                        }
                    };
                    self.spectrogram = Some((spec, texture));
                }
            }
        }
    }

    fn waveform_ui(&mut self, ui: &mut egui::Ui) {
        let desired = egui::vec2(ui.available_width(), WAVEFORM_HEIGHT);
        let (rect, response) = ui.allocate_exact_size(desired, egui::Sense::click_and_drag());
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, egui::CornerRadius::same(6), egui::Color32::from_gray(24));

        if let Some(cache) = &self.waveform_cache {
            let mid = rect.center().y;
            let half = rect.height() / 2.0;
            let col_w = rect.width() / cache.len().max(1) as f32;
            for (i, (min, max)) in cache.iter().enumerate() {
                let x = rect.left() + i as f32 * col_w;
                painter.line_segment(
                    [egui::pos2(x, mid - max * half), egui::pos2(x, mid - min * half)],
                    egui::Stroke::new(col_w.max(1.0), egui::Color32::from_rgb(71, 85, 105)),
                );
            }
        }

        let duration = self.orchestrator.source().map_or(0.0, |s| s.duration_secs());
        if duration <= 0.0 {
            return;
        }
        let to_secs = |x: f32| ((x - rect.left()) / rect.width()).clamp(0.0, 1.0) as f64 * duration;
        let to_x = |secs: f64| rect.left() + (secs / duration) as f32 * rect.width();

        if let Some(range) = self.orchestrator.range() {
            let region = egui::Rect::from_x_y_ranges(to_x(range.start())..=to_x(range.end()), rect.y_range());
            painter.rect_filled(region, egui::CornerRadius::ZERO, ACCENT.linear_multiply(0.15));
            for x in [region.left(), region.right()] {
                painter.line_segment(
                    [egui::pos2(x, rect.top()), egui::pos2(x, rect.bottom())],
                    egui::Stroke::new(2.0, ACCENT),
                );
            }
        }

        let generation = self.orchestrator.selection_generation();
        let pointer = response
            .interact_pointer_pos()
            .or_else(|| ui.ctx().input(|i| i.pointer.latest_pos()));

        if response.drag_started() {
            if let (Some(pos), Some(range)) = (pointer, self.orchestrator.range()) {
                let tolerance = EDGE_GRAB_PX as f64 / rect.width() as f64 * duration;
                self.drag = RegionDrag::begin(range, to_secs(pos.x), tolerance);
            }
        }
        if response.dragged() {
            if let (Some(drag), Some(pos)) = (self.drag, pointer) {
                self.orchestrator.region_changed(generation, drag.update(to_secs(pos.x)));
            }
        }
        if response.drag_stopped() {
            if let (Some(drag), Some(pos)) = (self.drag.take(), pointer) {
                self.orchestrator.region_changed(generation, drag.finish(to_secs(pos.x)));
            }
        }
        if response.clicked() {
            if let Some(pos) = pointer {
                self.orchestrator
                    .region_changed(generation, RegionEvent::Seek { at: to_secs(pos.x) });
            }
        }
    }

    fn source_ui(&mut self, ui: &mut egui::Ui) {
        ui.label(egui::RichText::new("1) Studio Source").strong());
        ui.horizontal(|ui| {
            if ui.button("Open File...").clicked() {
                self.pick_file();
            }
            match (&self.loading, self.orchestrator.source()) {
                (Some(name), _) => {
                    ui.spinner();
                    ui.label(format!("Reading {name}..."));
                }
                (None, Some(source)) => {
                    ui.label(source.title.as_deref().unwrap_or(source.name.as_str()));
                    if let Some(artist) = &source.artist {
                        ui.weak(artist);
                    }
                }
                (None, None) => {
                    ui.weak("WAV / MP3 / FLAC supported. Drop a file anywhere.");
                }
            }
        });

        if self.orchestrator.source().is_none() {
            return;
        }

        ui.separator();
        ui.label(egui::RichText::new("2) Signal Selection").strong());
        self.waveform_ui(ui);

        let controls = self.orchestrator.controls();
        ui.horizontal(|ui| {
            let play_label = if self.orchestrator.is_playing() { "Pause" } else { "Play/Pause" };
            if ui.add_enabled(controls.playback, egui::Button::new(play_label)).clicked() {
                self.orchestrator.toggle_playback();
            }
            if ui.add_enabled(controls.playback, egui::Button::new("Play Selection")).clicked() {
                self.orchestrator.play_selection();
            }
            if ui.add_enabled(controls.playback, egui::Button::new("Select Full")).clicked() {
                self.orchestrator.select_full();
            }
            if let Some(range) = self.orchestrator.range() {
                ui.label(format!("Start: {:.2}s", range.start()));
                ui.label(format!("End: {:.2}s", range.end()));
                ui.label(format!("Region: {:.2}s", range.len()));
                ui.weak(format!("Duration: {:.2}s", range.duration()));
            }
        });
        ui.weak("Drag the region to move it, drag its edges to resize. Default selection is the full song (up to 10 min).");
    }

    fn spectrogram_ui(&self, ui: &mut egui::Ui) {
        ui.label(egui::RichText::new("Spectrogram Reference").strong());
        match &self.spectrogram {
            Some((_, Some(texture))) => {
                ui.add(egui::Image::new(texture).max_width(ui.available_width()));
            }
            Some((_, None)) => {
                ui.colored_label(DANGER, "Spectrogram could not be displayed.");
            }
            None => {
                ui.weak("Visual data will appear after analysis");
            }
        }
    }

    fn settings_ui(&mut self, ui: &mut egui::Ui) {
        let controls = self.orchestrator.controls();
        let settings = self.orchestrator.settings().clone();
        let mut model_choice = None;
        let mut style_choice = None;
        let mut reasoning_choice = None;

        ui.horizontal(|ui| {
            ui.add_enabled_ui(controls.model_editable, |ui| {
                egui::ComboBox::from_id_salt("model_select")
                    .selected_text(settings.model.label())
                    .show_ui(ui, |ui| {
                        for (id, label) in MODELS {
                            if ui.selectable_label(settings.model.as_str() == *id, *label).clicked() {
                                model_choice = Some(ModelId::new(*id));
                            }
                        }
                    });
            });

            let style_label = STYLES
                .iter()
                .find(|(_, t)| (*t - settings.temperature).abs() < f32::EPSILON)
                .map(|(label, _)| label.to_string())
                .unwrap_or_else(|| format!("Temp {:.1}", settings.temperature));
            egui::ComboBox::from_id_salt("style_select")
                .selected_text(style_label)
                .show_ui(ui, |ui| {
                    for (label, temperature) in STYLES {
                        if ui.selectable_label(settings.temperature == *temperature, *label).clicked() {
                            style_choice = Some(*temperature);
                        }
                    }
                });

            let effective = settings.effective_reasoning();
            ui.add_enabled_ui(controls.reasoning_editable, |ui| {
                egui::ComboBox::from_id_salt("reasoning_select")
                    .selected_text(format!("Thinking: {}", effective.label()))
                    .show_ui(ui, |ui| {
                        for effort in ReasoningEffort::ALL {
                            if ui.selectable_label(effective == effort, effort.label()).clicked() {
                                reasoning_choice = Some(effort);
                            }
                        }
                    });
            });
        });

        if let Some(model) = model_choice {
            self.orchestrator.set_model(model);
        }
        if let Some(temperature) = style_choice {
            self.orchestrator.set_temperature(temperature);
        }
        if let Some(effort) = reasoning_choice {
            self.orchestrator.set_reasoning(effort);
        }

        if !self.orchestrator.settings().include_spectrogram() {
            ui.colored_label(
                WARNING,
                "Audio-only model: the spectrogram image will not be sent and thinking is not available.",
            );
        }
    }

    fn directive_ui(&mut self, ui: &mut egui::Ui) {
        let controls = self.orchestrator.controls();
        ui.label(egui::RichText::new("3) Engineer Directives").strong());

        if !controls.prompt_editable {
            self.prompt_input = self.orchestrator.prompt().to_string();
        }
        let edit = egui::TextEdit::multiline(&mut self.prompt_input)
            .hint_text("Describe the style and direction...")
            .desired_rows(4)
            .desired_width(f32::INFINITY);
        if ui.add_enabled(controls.prompt_editable, edit).changed() {
            self.orchestrator.set_prompt(self.prompt_input.clone());
        }

        ui.horizontal_wrapped(|ui| {
            for (i, suggestion) in SUGGESTIONS.iter().enumerate() {
                let button = egui::Button::new(egui::RichText::new(*suggestion).small());
                if ui.add_enabled(controls.prompt_editable, button).clicked()
                    && self.orchestrator.apply_suggestion(i)
                {
                    self.prompt_input = self.orchestrator.prompt().to_string();
                }
            }
        });

        let in_flight = self.orchestrator.in_flight();
        let status = self.orchestrator.session().status();
        ui.horizontal(|ui| {
            let preview_label = if in_flight.preview { "Rendering..." } else { "Preview" };
            if ui.add_enabled(controls.preview, egui::Button::new(preview_label)).clicked() {
                let outbound = self.orchestrator.request_preview();
                self.submit(outbound);
            }

            let analyze_label = match status {
                SessionStatus::Analyzing => "Analyzing...",
                SessionStatus::Active => "Session Live",
                SessionStatus::Idle => "Start Analysis",
            };
            if ui.add_enabled(controls.analyze, egui::Button::new(analyze_label)).clicked() {
                let outbound = self.orchestrator.start_analysis();
                self.submit(outbound);
            }

            if ui.add_enabled(controls.new_analysis, egui::Button::new("New Analysis")).clicked() {
                self.orchestrator.new_analysis();
                self.reply_input.clear();
            }
        });

        if let Some(error) = self.orchestrator.last_error() {
            let message = error.to_string();
            let mut dismiss = false;
            egui::Frame::group(ui.style()).show(ui, |ui| {
                ui.colored_label(DANGER, "Error Occurred");
                ui.label(&message);
                dismiss = ui.small_button("Dismiss").clicked();
            });
            if dismiss {
                self.orchestrator.dismiss_error();
            }
        }
    }

    fn chat_ui(&mut self, ui: &mut egui::Ui) {
        ui.label(egui::RichText::new("Engineer Consultation").strong());
        let controls = self.orchestrator.controls();
        let in_flight = self.orchestrator.in_flight();

        let input_height = 40.0;
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .max_height((ui.available_height() - input_height).max(80.0))
            .auto_shrink([false, false])
            .show(ui, |ui| {
                let log = self.orchestrator.log();
                if log.is_empty() {
                    ui.vertical_centered(|ui| {
                        ui.weak("Consultation inactive. Start analysis to begin chat.");
                    });
                }
                for turn in log.turns() {
                    let (who, color) = match turn.role {
                        Role::User => ("Producer", ACCENT),
                        Role::Model => ("Engineer", egui::Color32::from_rgb(45, 212, 191)),
                    };
                    ui.label(egui::RichText::new(who).small().color(color));
                    ui.label(&turn.text);
                    ui.add_space(6.0);
                }
                if in_flight.analysis || in_flight.reply {
                    ui.spinner();
                }
            });

        let mut send = false;
        ui.horizontal(|ui| {
            let hint = if self.orchestrator.session().accepts_replies() {
                "Ask follow-up..."
            } else {
                "Analysis required..."
            };
            let input = egui::TextEdit::singleline(&mut self.reply_input)
                .hint_text(hint)
                .desired_width(ui.available_width() - 60.0);
            let response = ui.add_enabled(controls.reply, input);
            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                send = true;
            }
            let send_label = if in_flight.reply { "..." } else { "Send" };
            let can_send = controls.reply && !self.reply_input.trim().is_empty();
            if ui.add_enabled(can_send, egui::Button::new(send_label)).clicked() {
                send = true;
            }
        });
        if send {
            self.send_reply();
        }
    }
}

impl eframe::App for MixApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_messages();
        self.dispatcher.drain(&mut self.orchestrator);
        self.sync_spectrogram(ctx);

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new("Mix Assistant AI").heading().strong());
                ui.weak("Professional Grade Audio Engineering & Critical Listening");
            });
        });

        egui::SidePanel::right("consultation")
            .resizable(true)
            .default_width(460.0)
            .show(ctx, |ui| {
                ui.spacing_mut().item_spacing = egui::vec2(8.0, 8.0);
                self.settings_ui(ui);
                ui.separator();
                self.directive_ui(ui);
                ui.separator();
                self.chat_ui(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.spacing_mut().item_spacing = egui::vec2(10.0, 10.0);
            self.source_ui(ui);
            ui.separator();
            self.spectrogram_ui(ui);
        });

        if !ctx.input(|i| i.raw.dropped_files.is_empty()) {
            let dropped = ctx.input(|i| i.raw.dropped_files.clone());
            if let Some(path) = dropped.first().and_then(|f| f.path.clone()) {
                self.load_file(path);
            }
        }

        // Keep the spinner moving while something is outstanding
        let in_flight = self.orchestrator.in_flight();
        if self.loading.is_some() || in_flight.analysis || in_flight.reply || in_flight.preview {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}
