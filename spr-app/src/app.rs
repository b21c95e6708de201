use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use ab_glyph::FontVec;
use anyhow::{Context, Result};
use chrono::Utc;
use pixels::{Pixels, SurfaceTexture};
use spr_core::{KeyEvent, KeyToken};
use spr_experiment::{
    DisplayInfo, ExperimentConfig, InputSource, KeyboardHub, PressFilter, RawKeyState,
    SessionStateMachine, StepOutcome, Subscription, TransportKind,
};
use spr_export::{
    DirectoryTransport, JsonLinesStore, LocalExport, SheetTransport, Transport, deliver_once,
};
use spr_render::{SkiaRenderer, TextSize, find_font};
use spr_timing::{HighPrecisionTimer, Timer};
use tracing::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, Ime, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowId},
};

use crate::keys::key_token;

/// Whether drawing a frame took longer than one refresh interval. Unknown
/// refresh rates never count.
fn exceeds_refresh(draw: Duration, refresh_hz: Option<f64>) -> bool {
    refresh_hz
        .filter(|hz| *hz > 0.0)
        .is_some_and(|hz| draw.as_secs_f64() > 1.0 / hz)
}

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    font: Option<FontVec>,
    font_size: f32,

    machine: SessionStateMachine,
    timer: HighPrecisionTimer,
    hub: KeyboardHub,
    filter: PressFilter,
    pending: Rc<RefCell<VecDeque<KeyEvent>>>,
    _subscription: Subscription,

    notice: Option<String>,
    exported: bool,
    current_size: Option<PhysicalSize<u32>>,
    refresh_rate: Option<f64>,
    /// Frames whose drawing took longer than one refresh interval.
    slow_frames: usize,
    slowest_frame: Duration,
    /// Committed text arrives through `Ime::Commit` while an input method
    /// is active, through key events otherwise.
    ime_enabled: bool,
    should_exit: bool,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = ExperimentConfig::load().context("loading experiment config")?;
        let font = find_font(config.font_path.as_deref())?;
        let font_size = config.font_size;

        let timer = HighPrecisionTimer::new();
        let mut rng = rand::rng();
        let machine = SessionStateMachine::from_config(config, &mut rng, timer.now())
            .context("preparing session")?;

        let mut hub = KeyboardHub::new();
        let pending = Rc::new(RefCell::new(VecDeque::new()));
        let sink = Rc::clone(&pending);
        let subscription = hub.subscribe(Box::new(move |e: &KeyEvent| {
            sink.borrow_mut().push_back(e.clone())
        }));

        Ok(Self {
            window: None,
            pixels: None,
            renderer: None,
            font: Some(font),
            font_size,
            machine,
            timer,
            hub,
            filter: PressFilter::new(),
            pending,
            _subscription: subscription,
            notice: None,
            exported: false,
            current_size: None,
            refresh_rate: None,
            slow_frames: 0,
            slowest_frame: Duration::ZERO,
            ime_enabled: false,
            should_exit: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!(
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            participant_id = self.machine.session().participant_id(),
            list_id = self.machine.session().list_id(),
            "self-paced reading session ready"
        );

        event_loop.run_app(&mut self)?;
        Ok(())
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow::anyhow!("No monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let window_attributes = Window::default_attributes()
            .with_title("Self-Paced Reading")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let size = window.inner_size();
        self.current_size = Some(size);
        info!(
            width = size.width,
            height = size.height,
            scale_factor = window.scale_factor(),
            refresh_hz = ?self.refresh_rate,
            "display configured"
        );

        let surface_texture = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface_texture)?);

        let font = self
            .font
            .take()
            .ok_or_else(|| anyhow::anyhow!("renderer already created"))?;
        let mut renderer = SkiaRenderer::new(size.width, size.height, font, self.font_size)?;
        let regions = self.machine.upcoming_regions();
        let cached = renderer.prewarm(&regions, TextSize::Large);
        info!(regions = regions.len(), cached, "region texts rasterized");
        self.renderer = Some(renderer);

        window.set_cursor_visible(false);
        window.set_ime_allowed(true);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    /// Draws the current screen, then reports it as presented.
    fn render(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };
        self.machine.tick(self.timer.now());

        let screen = self.machine.screen();
        let stats = renderer.render_frame(
            &screen,
            self.notice.as_deref(),
            pixels.frame_mut(),
            &mut self.timer,
        )?;
        pixels.render()?;

        self.slowest_frame = self.slowest_frame.max(stats.total);
        if exceeds_refresh(stats.total, self.refresh_rate) {
            self.slow_frames += 1;
            debug!(total = ?stats.total, dirty = stats.dirty_count, "frame exceeded refresh interval");
        }

        let shown_at = self.timer.now();
        if self.machine.display_presented(shown_at) {
            debug!(shown_at, "screen presented");
        }
        Ok(())
    }

    fn handle_key(&mut self, token: KeyToken, state: ElementState, repeat: bool) {
        let raw = match state {
            ElementState::Pressed => RawKeyState::Pressed { repeat },
            ElementState::Released => RawKeyState::Released,
        };
        if let Some(press) = self.filter.filter(token, raw, self.timer.now()) {
            self.hub.dispatch(&press);
        }
    }

    fn handle_text(&mut self, text: &str) {
        if self.machine.handle_text(text) == StepOutcome::Advanced {
            debug!(chars = text.chars().count(), "recall text entered");
        }
    }

    fn log_frame_timing(&self) {
        let stats = self.timer.frame_stats();
        info!(
            refresh_hz = ?self.refresh_rate,
            frames = stats.samples,
            avg_ms = stats.average_frame_time_ns / 1e6,
            jitter_ms = stats.jitter_ns / 1e6,
            max_ms = stats.max_frame_time_ns / 1e6,
            slowest = ?self.slowest_frame,
            slow_frames = self.slow_frames,
            "frame timing"
        );
    }

    fn process_pending(&mut self, event_loop: &ActiveEventLoop) {
        let presses: Vec<KeyEvent> = self.pending.borrow_mut().drain(..).collect();
        for press in presses {
            if self.machine.is_finished() {
                if self.exported {
                    self.cleanup_and_exit(event_loop);
                }
                continue;
            }
            if press.token == KeyToken::Escape {
                self.machine.abort();
                self.finish_session();
                continue;
            }
            match self.machine.handle_key(&press) {
                StepOutcome::Finished => self.finish_session(),
                StepOutcome::Recorded(tag) => debug!(%tag, "record batched"),
                StepOutcome::Advanced | StepOutcome::Ignored => {}
            }
        }
    }

    fn transport(&self) -> Box<dyn Transport> {
        let export = &self.machine.config.export;
        match export.transport {
            TransportKind::Directory => Box::new(DirectoryTransport::new(&export.data_dir)),
            TransportKind::Sheets => Box::new(SheetTransport::new(JsonLinesStore::new(
                export.data_dir.join("sheets"),
            ))),
        }
    }

    /// Sends the batched session once, falling back to a local copy.
    fn finish_session(&mut self) {
        if self.exported {
            return;
        }
        self.exported = true;

        let display = DisplayInfo {
            platform: std::env::consts::OS.to_string(),
            screen_width: self.current_size.map(|s| s.width),
            screen_height: self.current_size.map(|s| s.height),
        };
        let session = self.machine.session();
        if session.is_aborted() {
            warn!(records = session.records().len(), "exporting aborted session");
        }
        for (item, err) in self.machine.skipped() {
            warn!(%item, %err, "item was skipped");
        }
        let payload = session.to_payload(self.timer.now(), &display, Utc::now());

        let fallback = LocalExport::new(&self.machine.config.export.fallback_dir);
        let mut transport = self.transport();
        let outcome = deliver_once(transport.as_mut(), &fallback, &payload, Utc::now());
        if outcome.is_delivered() {
            info!(?outcome, "session delivered");
        } else {
            error!(?outcome, "session not delivered");
        }
        self.notice = Some(outcome.notice());
        self.log_frame_timing();
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        self.current_size = Some(new_size);
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                error!(%e, "failed to resize surface");
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                error!(%e, "failed to resize buffer");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(new_size.width, new_size.height) {
                error!(%e, "failed to resize canvas");
            }
        }
        info!(width = new_size.width, height = new_size.height, "display resized");
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if !self.machine.is_finished() {
            self.machine.abort();
        }
        self.finish_session();
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        self.should_exit = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                error!("failed to create window and surface: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.cleanup_and_exit(event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    error!("render failed: {e:#}");
                    self.cleanup_and_exit(event_loop);
                    return;
                }
                if let Some(win) = &self.window {
                    win.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let token = key_token(event.physical_key, &event.logical_key);
                let editing = !matches!(
                    token,
                    Some(KeyToken::Enter | KeyToken::Backspace | KeyToken::Escape)
                );
                if editing && event.state == ElementState::Pressed && self.machine.accepts_text() {
                    if !self.ime_enabled {
                        if let Some(text) = event.text.as_ref() {
                            self.handle_text(text);
                        }
                    }
                    return;
                }
                if let Some(token) = token {
                    self.handle_key(token, event.state, event.repeat);
                    self.process_pending(event_loop);
                }
            }
            WindowEvent::Ime(ime) => match ime {
                Ime::Enabled => self.ime_enabled = true,
                Ime::Disabled => self.ime_enabled = false,
                Ime::Commit(text) => self.handle_text(&text),
                Ime::Preedit(..) => {}
            },
            WindowEvent::Focused(false) => self.filter.reset(),
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    self.handle_resize(window.inner_size());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        debug!("application resources released");
    }
}
