use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use catalog::ProgramCatalog;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::gpu::{GpuState, RenderError};
use crate::input::InputState;
use crate::orchestrator::UpdateOutcome;
use crate::runtime::{format_title, FrameStats, FrameTiming, TitleStatus};
use crate::types::RendererConfig;

/// Window controls handled by the renderer itself rather than programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    NextProgram,
    PreviousProgram,
    ToggleAlternate,
    ToggleVsync,
}

pub(crate) fn control_for(key: &Key) -> Option<Control> {
    match key {
        Key::Named(NamedKey::PageDown) => Some(Control::NextProgram),
        Key::Named(NamedKey::PageUp) => Some(Control::PreviousProgram),
        Key::Named(NamedKey::Tab) => Some(Control::ToggleAlternate),
        Key::Character(value) => match value.as_str() {
            "]" => Some(Control::NextProgram),
            "[" => Some(Control::PreviousProgram),
            "v" | "V" => Some(Control::ToggleVsync),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) struct WindowState {
    // Dropped before the window the surface was created from.
    gpu: GpuState,
    window: Arc<Window>,
    input: InputState,
    stats: FrameStats,
    timing: Option<FrameTiming>,
    title: String,
}

impl WindowState {
    pub(crate) fn new(
        window: Arc<Window>,
        config: &RendererConfig,
        catalog: Arc<ProgramCatalog>,
    ) -> Result<Self> {
        let size = window.inner_size();
        let gpu = GpuState::new(window.as_ref(), size, config, catalog)?;
        Ok(Self {
            gpu,
            window,
            input: InputState::default(),
            stats: FrameStats::new(Instant::now()),
            timing: None,
            title: config.title.clone(),
        })
    }

    pub(crate) fn window(&self) -> &Window {
        self.window.as_ref()
    }

    fn handle_control(&mut self, control: Control) {
        let current = self.gpu.orchestrator().requested();
        let count = self.gpu.catalog().len();
        match control {
            Control::NextProgram => self.gpu.request(current.next(count)),
            Control::PreviousProgram => self.gpu.request(current.previous(count)),
            Control::ToggleAlternate => {
                let has_alternate = self
                    .gpu
                    .catalog()
                    .get(current.program_index)
                    .is_some_and(|entry| entry.has_alternate());
                if has_alternate {
                    self.gpu.request(current.toggle_alternate());
                } else {
                    tracing::info!("this program has no solution to switch to");
                }
            }
            Control::ToggleVsync => {
                let enabled = !self.gpu.vsync_enabled();
                self.gpu.set_vsync(enabled);
            }
        }
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        self.input.handle_key(event);
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        if let Some(control) = control_for(&event.logical_key) {
            self.handle_control(control);
        }
    }

    fn update_title(&mut self, now: Instant) {
        let Some(timing) = self.timing else {
            return;
        };
        let orchestrator = self.gpu.orchestrator();
        let program = orchestrator.active();
        let status = TitleStatus {
            title: &self.title,
            label: program.label(),
            alternate: program.selection().use_alternate,
            error_visible: orchestrator.error_visible(now),
        };
        self.window.set_title(&format_title(&status, &timing));
    }

    /// Rebuilds if needed, then renders and presents one frame.
    fn redraw(&mut self) -> Result<(), RenderError> {
        let now = Instant::now();
        match self.gpu.update(now) {
            Ok(UpdateOutcome::Unchanged) => {}
            Ok(UpdateOutcome::Rebuilt { program_id }) => {
                tracing::debug!(program_id, "active program replaced");
                self.update_title(now);
            }
            Ok(UpdateOutcome::Failed) => self.update_title(now),
            Err(err) => {
                tracing::error!(error = ?err, "program update failed");
                return Err(RenderError::Fatal(err));
            }
        }

        self.gpu.render(now, &self.input)?;
        if let Some(timing) = self.stats.frame_presented(Instant::now()) {
            self.timing = Some(timing);
            self.update_title(now);
        }
        Ok(())
    }
}

pub(crate) fn run_window(config: RendererConfig, catalog: Arc<ProgramCatalog>) -> Result<()> {
    let event_loop = EventLoopBuilder::new()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let window_size = PhysicalSize::new(config.window_size.0, config.window_size.1);
    let window = WindowBuilder::new()
        .with_title(&config.title)
        .with_inner_size(window_size)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let mut state = WindowState::new(window, &config, catalog)?;
    state.window().request_redraw();

    let mut fatal: Option<anyhow::Error> = None;
    let run_result = event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
            match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    state.handle_key(&event);
                }
                WindowEvent::CursorMoved { position, .. } => {
                    state.input.handle_cursor_moved(position);
                }
                WindowEvent::CursorLeft { .. } => {
                    state.input.handle_cursor_left();
                }
                WindowEvent::MouseInput {
                    state: button_state,
                    button,
                    ..
                } => {
                    state.input.handle_mouse_button(button, button_state);
                }
                WindowEvent::Focused(false) => {
                    state.input.release_all();
                }
                WindowEvent::Resized(new_size) => {
                    if let Err(err) = state.gpu.resize(new_size) {
                        fatal = Some(err);
                        elwt.exit();
                    }
                }
                WindowEvent::RedrawRequested => match state.redraw() {
                    Ok(()) => {}
                    Err(RenderError::Surface(surface_err)) => match surface_err {
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                            state.gpu.reconfigure_surface();
                        }
                        wgpu::SurfaceError::OutOfMemory => {
                            fatal = Some(anyhow!("surface out of memory"));
                            elwt.exit();
                        }
                        wgpu::SurfaceError::Timeout => {
                            tracing::warn!("surface timeout; retrying next frame");
                        }
                        other => {
                            tracing::warn!(error = ?other, "surface error; retrying next frame");
                        }
                    },
                    Err(err) => {
                        fatal = Some(err.into());
                        elwt.exit();
                    }
                },
                _ => {}
            }
        }
        Event::AboutToWait => {
            state.window().request_redraw();
            elwt.set_control_flow(ControlFlow::Poll);
        }
        _ => {}
    });

    if let Err(err) = state.gpu.finish() {
        tracing::warn!(error = ?err, "GPU did not drain cleanly at shutdown");
    }
    run_result.map_err(|err| anyhow!("window event loop error: {err}"))?;
    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_and_page_keys_cycle_programs() {
        assert_eq!(
            control_for(&Key::Named(NamedKey::PageDown)),
            Some(Control::NextProgram)
        );
        assert_eq!(
            control_for(&Key::Character("]".into())),
            Some(Control::NextProgram)
        );
        assert_eq!(
            control_for(&Key::Named(NamedKey::PageUp)),
            Some(Control::PreviousProgram)
        );
        assert_eq!(
            control_for(&Key::Character("[".into())),
            Some(Control::PreviousProgram)
        );
    }

    #[test]
    fn tab_and_v_toggle() {
        assert_eq!(
            control_for(&Key::Named(NamedKey::Tab)),
            Some(Control::ToggleAlternate)
        );
        assert_eq!(
            control_for(&Key::Character("V".into())),
            Some(Control::ToggleVsync)
        );
        assert_eq!(control_for(&Key::Character("w".into())), None);
        assert_eq!(control_for(&Key::Named(NamedKey::Space)), None);
    }
}
