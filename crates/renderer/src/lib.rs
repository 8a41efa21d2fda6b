//! Renderer crate for the compute playground.
//!
//! The playground runs one GLSL compute program per frame against a shared set
//! of resources and presents its render target in a window. Editing a program
//! (or any file it includes) rebuilds it live; a broken edit keeps the last
//! good program running and flags the failure in the title bar. The overall
//! flow is:
//!
//! ```text
//!   playground CLI
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ WindowState ──▶ winit event loop ──▶ redraw()
//!                                                  │
//!            Orchestrator::update ◀────────────────┤
//!              │ sources changed / new selection   │
//!              ▼                                   ▼
//!   ProgramCompiler ─▶ PipelineGraph        FrameScheduler ─▶ dispatch + blit
//! ```
//!
//! `WindowState` owns all GPU resources through `GpuState`, while `Renderer` is
//! the thin entry point that loads the program catalog and opens the window.

mod compile;
pub mod gpu;
mod include;
mod input;
pub mod orchestrator;
mod runtime;
mod tracker;
mod types;
mod window;

use anyhow::{Context, Result};

pub use compile::{CompileError, ProgramBlob, ProgramCompiler, HOST_DEFINE};
pub use gpu::graph::{BuildError, GraphDevice, PipelineGraph, ProgramDescriptor};
pub use include::{IncludeLoader, LoadedInclude, TrackingIncludeLoader};
pub use input::{
    KEY_A, KEY_D, KEY_DOWN, KEY_LEFT, KEY_RIGHT, KEY_S, KEY_SPACE, KEY_UP, KEY_W, MOUSE_LEFT,
    MOUSE_MIDDLE, MOUSE_RIGHT,
};
pub use orchestrator::{ActiveProgram, Orchestrator, ProgramBuilder, UpdateOutcome};
pub use runtime::{format_title, FrameStats, FrameTiming, TitleStatus, TITLE_REFRESH_INTERVAL};
pub use tracker::SourceTracker;
pub use types::{
    DeviceOptions, RendererConfig, Selection, ShaderCompiler, TargetProfile,
};

/// Entry point used by the binary.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Discovers the programs, opens the window and blocks until it closes.
    pub fn run(&mut self) -> Result<()> {
        let catalog = catalog::catalog(&self.config.program_root, &self.config.program_extension)
            .with_context(|| {
                format!(
                    "failed to discover programs under {}",
                    self.config.program_root.display()
                )
            })?;
        if catalog.is_empty() {
            anyhow::bail!(
                "no *.{} programs found under {}",
                self.config.program_extension,
                self.config.program_root.display()
            );
        }
        tracing::info!(
            programs = catalog.len(),
            root = %catalog.root().display(),
            compiler = %self.config.shader_compiler,
            "starting compute playground"
        );
        window::run_window(self.config.clone(), catalog)
    }
}
