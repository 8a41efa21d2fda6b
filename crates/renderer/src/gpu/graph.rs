//! One compiled, GPU-resident program and everything needed to dispatch it.
//!
//! A `PipelineGraph` is built in one go from a catalog selection: compile the
//! source, find the compute entry point, size the backing memory by reflecting
//! the storage block at group 1 / binding 0, allocate it and create the
//! pipeline. Any failing step yields a `BuildError` and no graph; the caller
//! keeps running whatever it had before. The compiler's tracked files follow
//! the candidate only when every step succeeded; otherwise the candidate's
//! files are added to them.
//!
//! `GraphDevice` is the seam to the GPU so the build and dispatch bookkeeping
//! can be exercised without an adapter. `WgpuGraphDevice` is the real one.
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use catalog::ProgramCatalog;
use wgpu::naga;

use crate::compile::{CompileError, ProgramBlob, ProgramCompiler};
use crate::types::{Selection, TargetProfile};

/// Compute entry point every program must define.
pub const ENTRY_POINT: &str = "main";
/// Bind group holding the program's backing memory.
pub const BACKING_GROUP: u32 = 1;

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("program index {0} is not in the catalog")]
    UnknownProgram(usize),
    #[error("{0} has no solution to switch to")]
    NoAlternate(String),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("{program} does not define a compute entry point named `{entry_point}`")]
    MissingEntryPoint { program: String, entry_point: String },
    #[error("failed to create compute pipeline: {0}")]
    Pipeline(String),
}

/// Identity and memory requirements of a built program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramDescriptor {
    /// Process-unique; never reused by a later build.
    pub program_id: u64,
    /// Index of the designated entry point in the module.
    pub entry_index: usize,
    /// Bytes of backing memory; zero when the program declares none.
    pub backing_memory_size: u64,
    pub initialize_on_first_dispatch: bool,
}

pub trait GraphDevice {
    type Pipeline;
    type Memory;
    type Encoder;
    type Bindings;

    fn create_pipeline(
        &self,
        blob: &ProgramBlob,
        entry_point: &str,
        has_backing: bool,
    ) -> Result<Self::Pipeline, String>;

    fn allocate_backing(&self, size: u64) -> Result<Self::Memory, String>;

    /// Records one `(1, 1, 1)` dispatch; zero-fills `backing` first when
    /// `initialize` is set.
    fn record_dispatch(
        &self,
        encoder: &mut Self::Encoder,
        bindings: &Self::Bindings,
        pipeline: &Self::Pipeline,
        backing: Option<&Self::Memory>,
        initialize: bool,
    );
}

pub struct PipelineGraph<D: GraphDevice> {
    pipeline: D::Pipeline,
    backing: Option<D::Memory>,
    descriptor: ProgramDescriptor,
    selection: Selection,
    label: String,
    source: PathBuf,
}

impl<D: GraphDevice> PipelineGraph<D> {
    pub fn build(
        device: &D,
        compiler: &mut ProgramCompiler,
        catalog: &ProgramCatalog,
        selection: Selection,
        profile: TargetProfile,
    ) -> Result<Self, BuildError> {
        let entry = catalog
            .get(selection.program_index)
            .ok_or(BuildError::UnknownProgram(selection.program_index))?;
        let source = entry
            .source_for(selection.use_alternate)
            .ok_or_else(|| BuildError::NoAlternate(entry.label.clone()))?;

        let mut blob = compiler.compile(source, profile, ENTRY_POINT)?;
        let sources = blob.take_sources();
        match Self::from_blob(device, &blob, selection, &entry.label) {
            Ok(graph) => {
                compiler.commit_sources(sources);
                Ok(graph)
            }
            Err(err) => {
                compiler.merge_sources(sources);
                Err(err)
            }
        }
    }

    /// Turns a compiled blob into a dispatchable program.
    pub fn from_blob(
        device: &D,
        blob: &ProgramBlob,
        selection: Selection,
        label: &str,
    ) -> Result<Self, BuildError> {
        let entry_index = find_entry_point(blob.module(), ENTRY_POINT).ok_or_else(|| {
            BuildError::MissingEntryPoint {
                program: blob.source().display().to_string(),
                entry_point: ENTRY_POINT.to_string(),
            }
        })?;

        let backing_memory_size = backing_memory_size(blob.module());
        let backing = if backing_memory_size > 0 {
            Some(
                device
                    .allocate_backing(backing_memory_size)
                    .map_err(BuildError::Pipeline)?,
            )
        } else {
            None
        };
        let pipeline = device
            .create_pipeline(blob, ENTRY_POINT, backing.is_some())
            .map_err(BuildError::Pipeline)?;

        let descriptor = ProgramDescriptor {
            program_id: NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed),
            entry_index,
            backing_memory_size,
            initialize_on_first_dispatch: true,
        };
        tracing::info!(
            program = %label,
            alternate = selection.use_alternate,
            id = descriptor.program_id,
            backing_bytes = backing_memory_size,
            "built program"
        );

        Ok(Self {
            pipeline,
            backing,
            descriptor,
            selection,
            label: label.to_string(),
            source: blob.source().to_path_buf(),
        })
    }

    pub fn dispatch(&mut self, device: &D, encoder: &mut D::Encoder, bindings: &D::Bindings) {
        let initialize = self.descriptor.initialize_on_first_dispatch;
        device.record_dispatch(
            encoder,
            bindings,
            &self.pipeline,
            self.backing.as_ref(),
            initialize,
        );
        self.descriptor.initialize_on_first_dispatch = false;
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn descriptor(&self) -> &ProgramDescriptor {
        &self.descriptor
    }

    pub fn id(&self) -> u64 {
        self.descriptor.program_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Absolute path of the source this program was compiled from.
    pub fn source(&self) -> &Path {
        &self.source
    }
}

/// Index of the compute entry point called `name`.
pub fn find_entry_point(module: &naga::Module, name: &str) -> Option<usize> {
    module
        .entry_points
        .iter()
        .position(|entry| entry.stage == naga::ShaderStage::Compute && entry.name == name)
}

/// Byte size of the storage block bound at group 1 / binding 0, or zero.
///
/// A runtime-sized trailing array counts as a single element.
pub fn backing_memory_size(module: &naga::Module) -> u64 {
    module
        .global_variables
        .iter()
        .find_map(|(_, global)| {
            let binding = global.binding.as_ref()?;
            let is_backing = binding.group == BACKING_GROUP
                && binding.binding == 0
                && matches!(global.space, naga::AddressSpace::Storage { .. });
            is_backing.then(|| u64::from(module.types[global.ty].inner.size(module.to_ctx())))
        })
        .unwrap_or(0)
}

/// Backing memory on the GPU together with its group 1 bind group.
pub struct WgpuBacking {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

pub struct WgpuGraphDevice {
    device: wgpu::Device,
    shared_layout: wgpu::BindGroupLayout,
    backing_layout: wgpu::BindGroupLayout,
}

impl WgpuGraphDevice {
    pub(crate) fn new(device: wgpu::Device, shared_layout: wgpu::BindGroupLayout) -> Self {
        let backing_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("backing memory layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        Self {
            device,
            shared_layout,
            backing_layout,
        }
    }

    fn scoped<T>(&self, create: impl FnOnce() -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create();
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }
}

impl GraphDevice for WgpuGraphDevice {
    type Pipeline = wgpu::ComputePipeline;
    type Memory = WgpuBacking;
    type Encoder = wgpu::CommandEncoder;
    type Bindings = wgpu::BindGroup;

    fn create_pipeline(
        &self,
        blob: &ProgramBlob,
        entry_point: &str,
        has_backing: bool,
    ) -> Result<Self::Pipeline, String> {
        let label = blob.source().display().to_string();
        self.scoped(|| {
            let module = self
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&label),
                    source: wgpu::ShaderSource::Naga(Cow::Owned(blob.module().clone())),
                });
            let layouts: Vec<&wgpu::BindGroupLayout> = if has_backing {
                vec![&self.shared_layout, &self.backing_layout]
            } else {
                vec![&self.shared_layout]
            };
            let layout = self
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("program pipeline layout"),
                    bind_group_layouts: &layouts,
                    push_constant_ranges: &[],
                });
            self.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(&label),
                    layout: Some(&layout),
                    module: &module,
                    entry_point: Some(entry_point),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                })
        })
    }

    fn allocate_backing(&self, size: u64) -> Result<Self::Memory, String> {
        let limit = self.device.limits().max_storage_buffer_binding_size;
        if size > u64::from(limit) {
            return Err(format!(
                "backing memory of {size} bytes exceeds the device limit of {limit} bytes"
            ));
        }
        self.scoped(|| {
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("program backing memory"),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("program backing bind group"),
                layout: &self.backing_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            WgpuBacking { buffer, bind_group }
        })
    }

    fn record_dispatch(
        &self,
        encoder: &mut Self::Encoder,
        bindings: &Self::Bindings,
        pipeline: &Self::Pipeline,
        backing: Option<&Self::Memory>,
        initialize: bool,
    ) {
        if initialize {
            if let Some(backing) = backing {
                encoder.clear_buffer(&backing.buffer, 0, None);
            }
        }
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("program dispatch"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bindings, &[]);
        if let Some(backing) = backing {
            pass.set_bind_group(BACKING_GROUP, &backing.bind_group, &[]);
        }
        pass.dispatch_workgroups(1, 1, 1);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tracker::tests::touch_forward;
    use crate::types::ShaderCompiler;
    use std::cell::{Cell, RefCell};
    use std::fs;

    /// Records allocations and dispatches instead of touching a GPU.
    #[derive(Default)]
    pub(crate) struct FakeDevice {
        pub(crate) allocations: RefCell<Vec<u64>>,
        pub(crate) fail_pipeline: Cell<bool>,
    }

    impl GraphDevice for FakeDevice {
        type Pipeline = String;
        type Memory = u64;
        type Encoder = Vec<String>;
        type Bindings = ();

        fn create_pipeline(
            &self,
            blob: &ProgramBlob,
            entry_point: &str,
            _has_backing: bool,
        ) -> Result<Self::Pipeline, String> {
            if self.fail_pipeline.get() {
                return Err("validation failed".into());
            }
            Ok(format!("{}#{entry_point}", blob.source().display()))
        }

        fn allocate_backing(&self, size: u64) -> Result<Self::Memory, String> {
            self.allocations.borrow_mut().push(size);
            Ok(size)
        }

        fn record_dispatch(
            &self,
            encoder: &mut Self::Encoder,
            _bindings: &Self::Bindings,
            _pipeline: &Self::Pipeline,
            backing: Option<&Self::Memory>,
            initialize: bool,
        ) {
            if let (true, Some(size)) = (initialize, backing) {
                encoder.push(format!("clear {size}"));
            }
            encoder.push("dispatch".into());
        }
    }

    fn program(elements: usize) -> String {
        format!(
            "#version 450\nlayout(local_size_x = 1) in;\n\
             layout(std430, set = 1, binding = 0) buffer Backing {{ uint values[{elements}]; }} backing;\n\
             void main() {{ backing.values[0] = 1u; }}\n"
        )
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        compiler: ProgramCompiler,
        catalog: ProgramCatalog,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Foo.comp"), program(4)).unwrap();
        fs::write(dir.path().join("FooSolution.comp"), program(64)).unwrap();
        fs::write(
            dir.path().join("Plain.comp"),
            "#version 450\nlayout(local_size_x = 1) in;\nvoid main() {}\n",
        )
        .unwrap();
        let catalog = ProgramCatalog::scan(dir.path(), "comp").unwrap();
        let compiler = ProgramCompiler::new(dir.path(), ShaderCompiler::NagaGlsl);
        Fixture {
            _dir: dir,
            compiler,
            catalog,
        }
    }

    fn build(
        device: &FakeDevice,
        fixture: &mut Fixture,
        selection: Selection,
    ) -> Result<PipelineGraph<FakeDevice>, BuildError> {
        PipelineGraph::build(
            device,
            &mut fixture.compiler,
            &fixture.catalog,
            selection,
            TargetProfile::default(),
        )
    }

    fn build_err(device: &FakeDevice, fixture: &mut Fixture, selection: Selection) -> BuildError {
        match build(device, fixture, selection) {
            Ok(_) => panic!("build of {selection:?} should fail"),
            Err(err) => err,
        }
    }

    #[test]
    fn initialize_flag_only_applies_to_first_dispatch() {
        let device = FakeDevice::default();
        let mut fixture = fixture();
        let mut graph = build(&device, &mut fixture, Selection::new(0, false)).unwrap();
        assert!(graph.descriptor().initialize_on_first_dispatch);

        let mut encoder = Vec::new();
        graph.dispatch(&device, &mut encoder, &());
        graph.dispatch(&device, &mut encoder, &());
        assert_eq!(encoder, vec!["clear 16", "dispatch", "dispatch"]);
        assert!(!graph.descriptor().initialize_on_first_dispatch);
    }

    #[test]
    fn toggling_alternate_allocates_independent_backing() {
        let device = FakeDevice::default();
        let mut fixture = fixture();
        let first = build(&device, &mut fixture, Selection::new(0, false)).unwrap();
        let second = build(&device, &mut fixture, Selection::new(0, true)).unwrap();
        let third = build(&device, &mut fixture, Selection::new(0, false)).unwrap();

        assert_eq!(*device.allocations.borrow(), vec![16, 256, 16]);
        assert_eq!(second.descriptor().backing_memory_size, 256);
        assert!(second.selection().use_alternate);
        assert_ne!(first.id(), second.id());
        assert_ne!(first.id(), third.id());
        assert_ne!(second.id(), third.id());
    }

    #[test]
    fn programs_without_backing_allocate_nothing() {
        let device = FakeDevice::default();
        let mut fixture = fixture();
        // Catalog order: Foo, Plain.
        let mut graph = build(&device, &mut fixture, Selection::new(1, false)).unwrap();
        assert_eq!(graph.descriptor().backing_memory_size, 0);
        assert!(device.allocations.borrow().is_empty());

        let mut encoder = Vec::new();
        graph.dispatch(&device, &mut encoder, &());
        assert_eq!(encoder, vec!["dispatch"]);
    }

    #[test]
    fn missing_alternate_is_rejected() {
        let device = FakeDevice::default();
        let mut fixture = fixture();
        let err = build_err(&device, &mut fixture, Selection::new(1, true));
        assert_eq!(err, BuildError::NoAlternate("Tutorial 1: Plain".into()));
    }

    #[test]
    fn unknown_program_is_rejected() {
        let device = FakeDevice::default();
        let mut fixture = fixture();
        let err = build_err(&device, &mut fixture, Selection::new(9, false));
        assert_eq!(err, BuildError::UnknownProgram(9));
    }

    #[test]
    fn pipeline_failure_is_reported_as_build_error() {
        let device = FakeDevice::default();
        device.fail_pipeline.set(true);
        let mut fixture = fixture();
        let err = build_err(&device, &mut fixture, Selection::new(1, false));
        assert!(matches!(err, BuildError::Pipeline(_)));
    }

    #[test]
    fn failed_pipeline_keeps_tracking_the_running_program() {
        let device = FakeDevice::default();
        let mut fixture = fixture();
        let running = build(&device, &mut fixture, Selection::new(0, false)).unwrap();
        assert!(fixture.compiler.tracker().contains(running.source()));

        device.fail_pipeline.set(true);
        build_err(&device, &mut fixture, Selection::new(1, false));
        let plain = fixture.catalog.root().join("Plain.comp");
        assert!(fixture.compiler.tracker().contains(running.source()));
        assert!(fixture.compiler.tracker().contains(&plain));
        assert!(!fixture.compiler.sources_changed());

        touch_forward(running.source(), 2);
        assert!(fixture.compiler.sources_changed());
    }

    #[test]
    fn successful_build_replaces_the_tracked_files() {
        let device = FakeDevice::default();
        let mut fixture = fixture();
        let first = build(&device, &mut fixture, Selection::new(0, false)).unwrap();
        let second = build(&device, &mut fixture, Selection::new(1, false)).unwrap();
        assert!(fixture.compiler.tracker().contains(second.source()));
        assert!(!fixture.compiler.tracker().contains(first.source()));
    }

    #[test]
    fn module_without_compute_main_is_missing_entry_point() {
        let device = FakeDevice::default();
        let mut fixture = fixture();
        let compiled = fixture
            .compiler
            .compile("Plain.comp", TargetProfile::default(), ENTRY_POINT)
            .unwrap();
        let mut module = compiled.module().clone();
        module.entry_points.clear();
        let blob = ProgramBlob::new(module, compiled.source(), ENTRY_POINT);

        let err = match PipelineGraph::from_blob(&device, &blob, Selection::new(1, false), "Plain") {
            Ok(_) => panic!("a module without entry points should be rejected"),
            Err(err) => err,
        };
        assert!(matches!(err, BuildError::MissingEntryPoint { ref entry_point, .. } if entry_point == "main"));
        assert!(err.to_string().contains("Plain.comp"));
    }

    #[test]
    fn entry_point_lookup_requires_compute_main() {
        let mut fixture = fixture();
        let blob = fixture
            .compiler
            .compile("Plain.comp", TargetProfile::default(), ENTRY_POINT)
            .unwrap();
        assert_eq!(find_entry_point(blob.module(), "main"), Some(0));
        assert_eq!(find_entry_point(blob.module(), "other"), None);
    }

    #[test]
    fn runtime_sized_arrays_count_one_element() {
        let mut fixture = fixture();
        fs::write(
            fixture.catalog.root().join("Dynamic.comp"),
            "#version 450\nlayout(local_size_x = 1) in;\n\
             layout(std430, set = 1, binding = 0) buffer Backing { uint count; uint items[]; } backing;\n\
             void main() { backing.items[0] = 7u; }\n",
        )
        .unwrap();
        let blob = fixture
            .compiler
            .compile("Dynamic.comp", TargetProfile::default(), ENTRY_POINT)
            .unwrap();
        assert_eq!(backing_memory_size(blob.module()), 8);
    }
}
