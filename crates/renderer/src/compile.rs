//! Turns program sources on disk into validated naga modules.
//!
//! `ProgramCompiler` owns the program root and the `SourceTracker` describing
//! what the active program was built from. Every compile records the entry
//! file and each include it reads into a fresh tracker. A failed compile merges
//! that set into the tracked one, so fixing a newly included file triggers a
//! rebuild. A successful compile hands the set back with the blob; it replaces
//! the tracked set only once the caller commits it with
//! [`ProgramCompiler::commit_sources`].
//!
//! The presentation shaders (a full-screen triangle and a 1:1 `texelFetch`
//! blit) live here as well.
use std::borrow::Cow;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use wgpu::naga::{self, ShaderStage};

use crate::include::{expand_includes, IncludeLoader, TrackingIncludeLoader};
use crate::tracker::SourceTracker;
use crate::types::{ShaderCompiler, TargetProfile};

/// Pause before the single retry of a failed source load.
const LOAD_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Macro defined for every program so shared headers can detect the host.
pub const HOST_DEFINE: &str = "PLAYGROUND";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{diagnostic}")]
pub struct CompileError {
    /// Compiler output, formatted for humans.
    pub diagnostic: String,
}

impl CompileError {
    fn new(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: diagnostic.into(),
        }
    }
}

/// A compiled program ready to be turned into a pipeline.
#[derive(Debug, Clone)]
pub struct ProgramBlob {
    module: naga::Module,
    source: PathBuf,
    entry_point: String,
    sources: SourceTracker,
}

impl ProgramBlob {
    pub fn new(module: naga::Module, source: impl Into<PathBuf>, entry_point: &str) -> Self {
        Self {
            module,
            source: source.into(),
            entry_point: entry_point.to_string(),
            sources: SourceTracker::new(),
        }
    }

    pub fn module(&self) -> &naga::Module {
        &self.module
    }

    /// Absolute path of the entry source.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Entry point name the program was compiled for.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Every file read while compiling, entry source included.
    pub fn sources(&self) -> &SourceTracker {
        &self.sources
    }

    pub fn take_sources(&mut self) -> SourceTracker {
        mem::take(&mut self.sources)
    }
}

pub struct ProgramCompiler {
    root: PathBuf,
    backend: ShaderCompiler,
    tracker: SourceTracker,
}

impl ProgramCompiler {
    pub fn new(root: impl Into<PathBuf>, backend: ShaderCompiler) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or_else(|err| {
            tracing::warn!(root = %root.display(), error = %err, "cannot make program root absolute");
            root
        });
        let backend = if backend.is_available() {
            backend
        } else {
            tracing::warn!(
                requested = %backend,
                "shader compiler not built into this binary; falling back to naga"
            );
            ShaderCompiler::NagaGlsl
        };
        Self {
            root,
            backend,
            tracker: SourceTracker::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backend(&self) -> ShaderCompiler {
        self.backend
    }

    pub fn tracker(&self) -> &SourceTracker {
        &self.tracker
    }

    /// Polls the files of the last committed build and of failed attempts since.
    pub fn sources_changed(&mut self) -> bool {
        self.tracker.has_any_changed()
    }

    /// Makes `sources` the tracked set; called once the program built from
    /// them is running.
    pub fn commit_sources(&mut self, sources: SourceTracker) {
        self.tracker.replace_with(sources);
    }

    /// Tracks `sources` in addition to the current set; used when a build
    /// fails after compiling.
    pub fn merge_sources(&mut self, sources: SourceTracker) {
        self.tracker.merge(sources);
    }

    /// Compiles `entry_file` (relative to the program root).
    pub fn compile(
        &mut self,
        entry_file: &str,
        profile: TargetProfile,
        entry_point: &str,
    ) -> Result<ProgramBlob, CompileError> {
        let path = self.root.join(entry_file);
        let source = load_source(&path)?;
        let loader = TrackingIncludeLoader::new(&self.root);
        loader.record(&path);

        tracing::debug!(
            source = %path.display(),
            backend = %self.backend,
            %profile,
            entry_point,
            "compiling program"
        );
        let compiled = match self.backend {
            ShaderCompiler::NagaGlsl => compile_naga_glsl(&source, &path, &loader),
            ShaderCompiler::Shaderc => {
                compile_shaderc(&source, &path, profile, entry_point, &loader)
            }
        };

        match compiled {
            Ok(module) => Ok(ProgramBlob {
                sources: loader.into_pending(),
                ..ProgramBlob::new(module, path, entry_point)
            }),
            Err(err) => {
                self.tracker.merge(loader.into_pending());
                Err(err)
            }
        }
    }
}

fn load_source(path: &Path) -> Result<String, CompileError> {
    match fs::read_to_string(path) {
        Ok(source) => Ok(source),
        Err(first) => {
            tracing::debug!(path = %path.display(), error = %first, "source load failed; retrying");
            thread::sleep(LOAD_RETRY_DELAY);
            fs::read_to_string(path).map_err(|err| {
                CompileError::new(format!("failed to load {}: {err}", path.display()))
            })
        }
    }
}

fn compile_naga_glsl(
    source: &str,
    path: &Path,
    loader: &dyn IncludeLoader,
) -> Result<naga::Module, CompileError> {
    let expanded = expand_includes(source, path, loader).map_err(CompileError::new)?;

    let mut options = naga::front::glsl::Options::from(ShaderStage::Compute);
    options
        .defines
        .insert(HOST_DEFINE.to_string(), "1".to_string());

    let module = naga::front::glsl::Frontend::default()
        .parse(&options, &expanded)
        .map_err(|errors| {
            CompileError::new(format!(
                "{}:\n{}",
                path.display(),
                errors.emit_to_string(&expanded)
            ))
        })?;

    validate(&module, &expanded, path)?;
    Ok(module)
}

fn validate(module: &naga::Module, source: &str, path: &Path) -> Result<(), CompileError> {
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(module)
    .map(|_| ())
    .map_err(|err| CompileError::new(err.emit_to_string_with_path(source, path)))
}

#[cfg(feature = "shaderc")]
fn compile_shaderc(
    source: &str,
    path: &Path,
    profile: TargetProfile,
    entry_point: &str,
    loader: &dyn IncludeLoader,
) -> Result<naga::Module, CompileError> {
    let mut compiler = shaderc::Compiler::new()
        .ok_or_else(|| CompileError::new("failed to initialise shaderc compiler"))?;
    let mut options = shaderc::CompileOptions::new()
        .ok_or_else(|| CompileError::new("failed to initialise shaderc options"))?;

    let version = match profile {
        TargetProfile::Vulkan1_0 => shaderc::EnvVersion::Vulkan1_0,
        TargetProfile::Vulkan1_1 => shaderc::EnvVersion::Vulkan1_1,
        TargetProfile::Vulkan1_2 => shaderc::EnvVersion::Vulkan1_2,
    };
    options.set_target_env(shaderc::TargetEnv::Vulkan, version as u32);
    options.add_macro_definition(HOST_DEFINE, Some("1"));
    options.set_include_callback(|requested, _kind, requesting, _depth| {
        loader
            .load(requested, Path::new(requesting))
            .map(|loaded| shaderc::ResolvedInclude {
                resolved_name: loaded.path.to_string_lossy().into_owned(),
                content: loaded.content,
            })
    });

    let name = path.to_string_lossy();
    let artifact = compiler
        .compile_into_spirv(
            source,
            shaderc::ShaderKind::DefaultCompute,
            &name,
            entry_point,
            Some(&options),
        )
        .map_err(|err| match err {
            shaderc::Error::CompilationError(_, message) => CompileError::new(message),
            other => CompileError::new(other.to_string()),
        })?;
    if artifact.get_num_warnings() > 0 {
        tracing::warn!(source = %name, "{}", artifact.get_warning_messages());
    }

    let module =
        naga::front::spv::parse_u8_slice(artifact.as_binary_u8(), &naga::front::spv::Options::default())
            .map_err(|err| CompileError::new(format!("{name}: invalid SPIR-V: {err}")))?;
    validate(&module, source, path)?;
    Ok(module)
}

#[cfg(not(feature = "shaderc"))]
fn compile_shaderc(
    _source: &str,
    path: &Path,
    _profile: TargetProfile,
    _entry_point: &str,
    _loader: &dyn IncludeLoader,
) -> Result<naga::Module, CompileError> {
    Err(CompileError::new(format!(
        "{}: shaderc support is not compiled in (enable the `shaderc` feature)",
        path.display()
    )))
}

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("fullscreen triangle vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    })
}

/// Compiles the fragment shader that copies the render target to the surface.
pub(crate) fn compile_blit_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("render target blit fragment"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(BLIT_SHADER_GLSL),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    })
}

/// Minimal full-screen triangle vertex shader.
const VERTEX_SHADER_GLSL: &str = r"#version 450
const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    gl_Position = vec4(positions[vertex_index], 0.0, 1.0);
}
";

/// Presents the render target 1:1; the target always matches the surface size.
const BLIT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec4 outColor;

layout(set = 0, binding = 0) uniform texture2D RenderTarget;
layout(set = 0, binding = 1) uniform sampler BlitSampler;

void main() {
    ivec2 texel = ivec2(gl_FragCoord.xy);
    outColor = texelFetch(sampler2D(RenderTarget, BlitSampler), texel, 0);
}
";
