use crate::config::Config;
use crate::session::{EventKind, GradeReport, SessionManager};
use crate::simulation::world::{Shape, World2d};
use crate::types::exercise::{Domain, ParameterSpec};
use eframe::{egui, App, NativeOptions};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

const MAX_LOG_LINES: usize = 500;
const TRAIL_COLOR: egui::Color32 = egui::Color32::from_rgb(120, 160, 220);
const BODY_COLOR: egui::Color32 = egui::Color32::from_rgb(230, 140, 60);

pub fn run(config: Config, config_error: Option<String>, source: Option<String>) -> Result<(), eframe::Error> {
    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 860.0])
            .with_min_inner_size([960.0, 640.0]),
        ..Default::default()
    };
    eframe::run_native(
        "SimLab - Exercise Simulator",
        options,
        Box::new(move |cc| Box::new(SimLabApp::new(cc, config, config_error, source))),
    )
}

struct SimLabApp {
    manager: SessionManager<World2d>,
    config_display: String,
    config_error: Option<String>,
    exercise_input: String,
    domain: Option<Domain>,
    exercise_json: String,
    answers: BTreeMap<String, String>,
    hint_target: Option<String>,
    hints: Vec<String>,
    last_report: Option<GradeReport>,
    status: Option<Result<String, String>>,
    event_log: Rc<RefCell<Vec<String>>>,
    replay_frame: usize,
    playing: bool,
}

impl SimLabApp {
    fn new(_cc: &eframe::CreationContext<'_>, config: Config, config_error: Option<String>, source: Option<String>) -> Self {
        let config_display = format!(
            "Results: {} | Templates: {} | Language model: {}",
            config.results_dir.display(),
            config
                .templates_dir
                .as_ref()
                .map_or_else(|| "built-in".to_string(), |d| d.display().to_string()),
            if config.llm.enabled { config.llm.command.join(" ") } else { "off".to_string() }
        );

        let mut manager = SessionManager::from_config(&config);
        let event_log = Rc::new(RefCell::new(Vec::new()));
        for kind in EventKind::ALL {
            let log = event_log.clone();
            manager.register_callback(kind, move |event| {
                let mut lines = log.borrow_mut();
                lines.push(event.to_string());
                if lines.len() > MAX_LOG_LINES {
                    lines.remove(0);
                }
                Ok(())
            });
        }

        let mut app = Self {
            manager,
            config_display,
            config_error,
            exercise_input: String::new(),
            domain: None,
            exercise_json: String::new(),
            answers: BTreeMap::new(),
            hint_target: None,
            hints: Vec::new(),
            last_report: None,
            status: None,
            event_log,
            replay_frame: 0,
            playing: false,
        };
        if let Some(source) = source {
            app.exercise_input = source;
            app.load_exercise();
        }
        app
    }

    fn reset_exercise_state(&mut self) {
        self.answers.clear();
        self.hint_target = None;
        self.hints.clear();
        self.last_report = None;
        self.replay_frame = 0;
        self.playing = false;
    }

    fn load_exercise(&mut self) {
        match self.manager.load(self.exercise_input.trim(), self.domain) {
            Ok(exercise) => {
                self.exercise_json = serde_json::to_string_pretty(exercise)
                    .unwrap_or_else(|e| format!("Failed to render exercise: {}", e));
                self.status = Some(Ok(format!("Loaded {}", exercise.display_name())));
                self.reset_exercise_state();
            }
            Err(e) => self.status = Some(Err(e.to_string())),
        }
    }

    fn run_simulation(&mut self) {
        match self.manager.run_simulation() {
            Ok(()) => {
                self.replay_frame = 0;
                self.playing = true;
                self.status = Some(Ok(format!("Simulated {:.2}s", self.manager.engine().time())));
            }
            Err(e) => self.status = Some(Err(e.to_string())),
        }
    }

    fn parameter_controls(&mut self, ui: &mut egui::Ui) {
        let Some(session) = self.manager.session() else {
            ui.label("Load an exercise to see its parameters.");
            return;
        };
        let parameters: Vec<(String, ParameterSpec)> =
            session.parameters().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        if parameters.is_empty() {
            ui.label("This exercise has no parameters.");
        }

        let mut changed = Vec::new();
        for (name, spec) in parameters {
            let mut value = spec.value;
            let label = match &spec.unit {
                Some(unit) => format!("{} ({})", name, unit),
                None => name.clone(),
            };
            let slider = egui::Slider::new(&mut value, spec.min..=spec.max)
                .step_by(spec.step)
                .text(label);
            let response = ui.add(slider);
            if let Some(description) = &spec.description {
                response.clone().on_hover_text(description);
            }
            if response.changed() {
                changed.push((name, value));
            }
        }
        for (name, value) in changed {
            self.manager.update_parameter(&name, value);
        }

        ui.horizontal(|ui| {
            if ui.button("Run Simulation").clicked() {
                self.run_simulation();
            }
            if ui.button("Reset Parameters").clicked() {
                self.manager.reset_parameters();
            }
        });
    }

    fn answer_controls(&mut self, ui: &mut egui::Ui) {
        let Some(exercise) = self.manager.exercise() else {
            return;
        };
        let target_ids: Vec<String> = exercise.targets.iter().map(|t| t.id.clone()).collect();
        if target_ids.is_empty() {
            ui.label("No targets to answer.");
        }

        egui::Grid::new("answers_grid").num_columns(3).show(ui, |ui| {
            for id in &target_ids {
                ui.label(id);
                ui.add(egui::TextEdit::singleline(self.answers.entry(id.clone()).or_default()).desired_width(90.0));
                match self.last_report.as_ref().and_then(|r| r.results.get(id)) {
                    Some(result) if result.correct => {
                        ui.colored_label(egui::Color32::GREEN, &result.feedback);
                    }
                    Some(result) => {
                        ui.colored_label(egui::Color32::RED, &result.feedback);
                    }
                    None => {
                        ui.label("");
                    }
                }
                ui.end_row();
            }
        });

        ui.horizontal(|ui| {
            if ui.button("Check Answers").clicked() {
                let submitted: BTreeMap<String, String> = self
                    .answers
                    .iter()
                    .filter(|(_, answer)| !answer.trim().is_empty())
                    .map(|(id, answer)| (id.clone(), answer.clone()))
                    .collect();
                match self.manager.check_answers(&submitted) {
                    Ok(report) => self.last_report = Some(report),
                    Err(e) => self.status = Some(Err(e.to_string())),
                }
            }
            if ui.button("Save Results").clicked() {
                self.status = Some(
                    self.manager
                        .save_results(None)
                        .map(|path| format!("Saved {}", path.display()))
                        .map_err(|e| e.to_string()),
                );
            }
        });
        if let Some(report) = &self.last_report {
            let color = if report.all_correct() { egui::Color32::GREEN } else { egui::Color32::YELLOW };
            ui.colored_label(color, &report.overall);
        }

        ui.separator();
        ui.horizontal(|ui| {
            egui::ComboBox::from_id_source("hint_target")
                .selected_text(self.hint_target.as_deref().unwrap_or("any target"))
                .show_ui(ui, |ui| {
                    ui.selectable_value(&mut self.hint_target, None, "any target");
                    for id in &target_ids {
                        ui.selectable_value(&mut self.hint_target, Some(id.clone()), id);
                    }
                });
            if ui.button("Get Hint").clicked() {
                let hint = self.manager.get_hint(self.hint_target.as_deref());
                self.hints.push(hint);
            }
        });
        for hint in &self.hints {
            ui.label(format!("• {}", hint));
        }
    }

    fn trajectory_canvas(&mut self, ui: &mut egui::Ui) {
        let world = self.manager.engine();
        let trajectory = world.trajectory();
        let size = egui::vec2(ui.available_width(), ui.available_height().max(200.0));
        let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
        let rect = response.rect;
        painter.rect_filled(rect, 4.0, egui::Color32::from_gray(24));

        if trajectory.is_empty() {
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "Run the simulation to see the trajectory",
                egui::FontId::proportional(16.0),
                egui::Color32::GRAY,
            );
            return;
        }

        // World bounds over every recorded position, always including the ground.
        let (mut min_x, mut max_x, mut max_y) = (0.0_f64, 1.0_f64, 1.0_f64);
        for frame in trajectory {
            for p in &frame.positions {
                min_x = min_x.min(p.x);
                max_x = max_x.max(p.x);
                max_y = max_y.max(p.y);
            }
        }
        let margin = 20.0;
        let scale = ((rect.width() - 2.0 * margin) as f64 / (max_x - min_x).max(1e-6))
            .min((rect.height() - 2.0 * margin) as f64 / max_y.max(1e-6));
        let to_screen = |x: f64, y: f64| {
            egui::pos2(
                rect.left() + margin + ((x - min_x) * scale) as f32,
                rect.bottom() - margin - (y * scale) as f32,
            )
        };

        painter.line_segment(
            [to_screen(min_x, 0.0), to_screen(max_x, 0.0)],
            egui::Stroke::new(2.0, egui::Color32::DARK_GREEN),
        );

        let current = self.replay_frame.min(trajectory.len() - 1);
        for (index, body) in world.bodies().iter().enumerate() {
            let trail: Vec<egui::Pos2> = trajectory[..=current]
                .iter()
                .filter_map(|frame| frame.positions.get(index))
                .map(|p| to_screen(p.x, p.y))
                .collect();
            painter.add(egui::Shape::line(trail, egui::Stroke::new(1.0, TRAIL_COLOR)));

            let Some(position) = trajectory[current].positions.get(index) else {
                continue;
            };
            let center = to_screen(position.x, position.y);
            match body.shape {
                Shape::Circle { radius } => {
                    painter.circle_filled(center, ((radius * scale) as f32).max(3.0), BODY_COLOR);
                }
                Shape::Box { width, height } => {
                    let extent = egui::vec2(((width * scale) as f32).max(4.0), ((height * scale) as f32).max(4.0));
                    painter.rect_filled(egui::Rect::from_center_size(center, extent), 0.0, BODY_COLOR);
                }
            }
            painter.text(
                center + egui::vec2(0.0, -14.0),
                egui::Align2::CENTER_BOTTOM,
                &body.name,
                egui::FontId::monospace(11.0),
                egui::Color32::LIGHT_GRAY,
            );
        }

        painter.text(
            rect.left_top() + egui::vec2(8.0, 8.0),
            egui::Align2::LEFT_TOP,
            format!("t = {:.2}s", trajectory[current].time),
            egui::FontId::monospace(12.0),
            egui::Color32::WHITE,
        );

        if self.playing {
            if current + 1 < trajectory.len() {
                self.replay_frame = current + 1;
                ui.ctx().request_repaint();
            } else {
                self.playing = false;
            }
        }
    }
}

impl App for SimLabApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Exit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
                ui.menu_button("Replay", |ui| {
                    if ui.button("Restart Replay").clicked() {
                        self.replay_frame = 0;
                        self.playing = true;
                        ui.close_menu();
                    }
                });
            });
        });

        egui::SidePanel::left("side_panel_left").min_width(320.0).default_width(420.0).show(ctx, |ui| {
            egui::ScrollArea::vertical().id_source("controls_scroll").show(ui, |ui| {
                ui.heading("Exercise");
                ui.separator();
                ui.collapsing("Configuration", |ui| {
                    if let Some(err) = &self.config_error {
                        ui.colored_label(egui::Color32::RED, format!("Config: {}", err));
                    }
                    ui.label(&self.config_display);
                });

                ui.label("Exercise text, or a path to a .yaml/.json/.txt file:");
                ui.add(
                    egui::TextEdit::multiline(&mut self.exercise_input)
                        .desired_rows(4)
                        .desired_width(f32::INFINITY),
                );
                ui.horizontal(|ui| {
                    egui::ComboBox::from_label("Domain")
                        .selected_text(self.domain.map_or("auto", |d| d.as_str()))
                        .show_ui(ui, |ui| {
                            ui.selectable_value(&mut self.domain, None, "auto");
                            for domain in [Domain::Physics, Domain::Chemistry, Domain::Biology] {
                                ui.selectable_value(&mut self.domain, Some(domain), domain.as_str());
                            }
                        });
                    if ui.button("Load").clicked() {
                        self.load_exercise();
                    }
                });
                match &self.status {
                    Some(Ok(message)) => {
                        ui.colored_label(egui::Color32::GREEN, message);
                    }
                    Some(Err(message)) => {
                        ui.colored_label(egui::Color32::RED, message);
                    }
                    None => {}
                }
                ui.separator();

                ui.heading("Parameters");
                self.parameter_controls(ui);
                ui.separator();

                ui.heading("Answers");
                self.answer_controls(ui);
                ui.separator();

                ui.collapsing("Event Log", |ui| {
                    egui::ScrollArea::vertical().id_source("event_log_scroll").max_height(200.0).stick_to_bottom(true).show(ui, |ui| {
                        let mut log_text_display = self.event_log.borrow().join("\n");
                        ui.add(
                            egui::TextEdit::multiline(&mut log_text_display)
                                .font(egui::TextStyle::Monospace)
                                .desired_width(f32::INFINITY)
                                .interactive(false)
                                .frame(false),
                        );
                    });
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.columns(2, |columns| {
                self.trajectory_canvas(&mut columns[0]);
                egui::ScrollArea::both().id_source("exercise_json_scroll").auto_shrink([false, false]).show(&mut columns[1], |ui| {
                    ui.heading("Canonical Exercise (JSON)");
                    ui.separator();
                    if self.exercise_json.is_empty() {
                        ui.label("The parsed exercise appears here.");
                    } else {
                        let mut s_display = self.exercise_json.clone();
                        ui.add(
                            egui::TextEdit::multiline(&mut s_display)
                                .font(egui::TextStyle::Monospace)
                                .desired_width(f32::INFINITY)
                                .interactive(false)
                                .frame(true),
                        );
                    }
                });
            });
        });
    }
}
