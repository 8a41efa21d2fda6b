use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use catalog::ProgramCatalog;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use scheduler::{FrameScheduler, SchedulerError};
use winit::dpi::PhysicalSize;

use crate::compile::ProgramCompiler;
use crate::input::InputState;
use crate::orchestrator::{ActiveProgram, Orchestrator, ProgramBuilder, UpdateOutcome};
use crate::types::{RendererConfig, Selection, TargetProfile};

use super::blit::BlitPipeline;
use super::context::GpuContext;
use super::frames::{FrameError, QueueBackend};
use super::graph::{BuildError, GraphDevice, PipelineGraph, WgpuGraphDevice};
use super::resources::SharedResources;
use super::uniforms::Constants;

pub(crate) type Program = PipelineGraph<WgpuGraphDevice>;

impl<D: GraphDevice> ActiveProgram for PipelineGraph<D> {
    fn selection(&self) -> Selection {
        PipelineGraph::selection(self)
    }

    fn id(&self) -> u64 {
        PipelineGraph::id(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RenderError {
    #[error(transparent)]
    Surface(#[from] wgpu::SurfaceError),
    #[error("frame submission failed: {0}")]
    Scheduler(#[from] SchedulerError<FrameError>),
    #[error(transparent)]
    Fatal(anyhow::Error),
}

/// Borrows what a rebuild needs out of `GpuState` for one orchestrator update.
struct ProgramLoader<'a> {
    compiler: &'a mut ProgramCompiler,
    scheduler: &'a mut FrameScheduler<QueueBackend>,
    graph_device: &'a WgpuGraphDevice,
    catalog: &'a ProgramCatalog,
    profile: TargetProfile,
}

impl ProgramBuilder for ProgramLoader<'_> {
    type Program = Program;

    fn sources_changed(&mut self) -> bool {
        self.compiler.sources_changed()
    }

    fn drain(&mut self) -> Result<()> {
        self.scheduler
            .drain()
            .context("failed to drain the GPU before rebuilding")
    }

    fn build(&mut self, selection: Selection) -> Result<Program, BuildError> {
        let program = PipelineGraph::build(
            self.graph_device,
            self.compiler,
            self.catalog,
            selection,
            self.profile,
        )?;
        tracing::info!(
            "{}: open {} to start editing",
            program.label(),
            program.source().display()
        );
        Ok(program)
    }
}

pub(crate) struct GpuState {
    context: GpuContext,
    scheduler: FrameScheduler<QueueBackend>,
    resources: SharedResources,
    blit: BlitPipeline,
    graph_device: WgpuGraphDevice,
    compiler: ProgramCompiler,
    catalog: Arc<ProgramCatalog>,
    orchestrator: Orchestrator<Program>,
    profile: TargetProfile,
    constants: Constants,
}

impl GpuState {
    pub(crate) fn new<T>(
        target: &T,
        size: PhysicalSize<u32>,
        config: &RendererConfig,
        catalog: Arc<ProgramCatalog>,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, size, config.device, config.vsync)?;
        let device = context.device.clone();
        let extent = (context.config.width, context.config.height);

        let mut scheduler = FrameScheduler::new(QueueBackend::new(
            device.clone(),
            context.queue.clone(),
        ));
        let resources = SharedResources::new(&device, extent, config.persistent_scratch_bytes);
        tracing::debug!(
            width = extent.0,
            height = extent.1,
            persistent_bytes = resources.persistent_size(),
            "created shared program resources"
        );
        let blit = BlitPipeline::new(&device, context.surface_format, resources.render_view());
        let graph_device = WgpuGraphDevice::new(device, resources.layout().clone());
        let mut compiler = ProgramCompiler::new(catalog.root(), config.shader_compiler);

        let initial = if config.initial_program < catalog.len() {
            config.initial_program
        } else {
            tracing::warn!(
                requested = config.initial_program,
                available = catalog.len(),
                "initial program out of range; starting with the first one"
            );
            0
        };

        let orchestrator = {
            let mut loader = ProgramLoader {
                compiler: &mut compiler,
                scheduler: &mut scheduler,
                graph_device: &graph_device,
                catalog: &catalog,
                profile: config.target_profile,
            };
            Orchestrator::new(
                &mut loader,
                Selection::new(initial, false),
                config.error_display,
                Instant::now(),
            )?
        };

        Ok(Self {
            context,
            scheduler,
            resources,
            blit,
            graph_device,
            compiler,
            catalog,
            orchestrator,
            profile: config.target_profile,
            constants: Constants::new(extent.0, extent.1),
        })
    }

    pub(crate) fn catalog(&self) -> &ProgramCatalog {
        &self.catalog
    }

    pub(crate) fn orchestrator(&self) -> &Orchestrator<Program> {
        &self.orchestrator
    }

    pub(crate) fn request(&mut self, selection: Selection) {
        self.orchestrator.request(selection);
    }

    pub(crate) fn vsync_enabled(&self) -> bool {
        self.context.vsync_enabled()
    }

    pub(crate) fn set_vsync(&mut self, enabled: bool) {
        self.context.set_vsync(enabled);
    }

    /// Drains in-flight frames, then resizes the surface, the render target
    /// and everything bound to it.
    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) -> Result<()> {
        if new_size.width == 0 || new_size.height == 0 || new_size == self.context.size {
            return Ok(());
        }
        self.scheduler
            .drain()
            .context("failed to drain the GPU before resizing")?;
        self.context.resize(new_size);
        let extent = (self.context.config.width, self.context.config.height);
        self.resources.resize(&self.context.device, extent);
        self.blit
            .rebind(&self.context.device, self.resources.render_view());
        tracing::debug!(width = extent.0, height = extent.1, "resized render target");
        Ok(())
    }

    pub(crate) fn reconfigure_surface(&mut self) {
        self.context.reconfigure();
    }

    /// Rebuilds the active program when its sources or the selection changed.
    pub(crate) fn update(&mut self, now: Instant) -> Result<UpdateOutcome> {
        let mut loader = ProgramLoader {
            compiler: &mut self.compiler,
            scheduler: &mut self.scheduler,
            graph_device: &self.graph_device,
            catalog: &self.catalog,
            profile: self.profile,
        };
        self.orchestrator.update(&mut loader, now)
    }

    /// Records and submits one frame, then presents it.
    pub(crate) fn render(&mut self, now: Instant, input: &InputState) -> Result<(), RenderError> {
        // Acquire the swapchain image first so a surface error never leaves a
        // ring slot recording.
        let surface_texture = self.context.surface.get_current_texture()?;
        let mut frame = self.scheduler.acquire_frame()?;
        let slot = frame.slot();

        let (width, height) = self.resources.size();
        self.constants.set_render_size(width, height);
        let [mouse_x, mouse_y] = input.mouse_position();
        self.constants.set_mouse(mouse_x, mouse_y);
        self.constants.set_input_state(input.bits());
        self.constants
            .set_time(self.orchestrator.elapsed(now).as_secs_f32());
        self.resources
            .write_constants(&self.context.queue, slot, &self.constants);

        let clear_persistent = self.orchestrator.take_persistent_clear();
        self.resources
            .record_clears(frame.recorder(), clear_persistent);
        self.orchestrator.active_mut().dispatch(
            &self.graph_device,
            frame.recorder(),
            self.resources.bind_group(slot),
        );

        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.blit.record(frame.recorder(), &view);

        let value = self.scheduler.submit_frame(frame)?;
        surface_texture.present();
        tracing::trace!(slot, value, "frame submitted");
        Ok(())
    }

    /// Waits for all submitted work before the device is torn down.
    pub(crate) fn finish(&mut self) -> Result<()> {
        self.scheduler
            .drain()
            .context("failed to drain the GPU at shutdown")
    }
}
