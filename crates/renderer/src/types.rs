use std::path::PathBuf;
use std::time::Duration;

/// Shader compilation backend requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderCompiler {
    /// Compile GLSL through shaderc into SPIR-V, then lift it into naga IR.
    Shaderc,
    /// Hand GLSL to naga's built-in frontend.
    #[default]
    NagaGlsl,
}

impl ShaderCompiler {
    /// Whether this build can actually run the backend.
    pub fn is_available(self) -> bool {
        match self {
            ShaderCompiler::NagaGlsl => true,
            ShaderCompiler::Shaderc => cfg!(feature = "shaderc"),
        }
    }
}

impl std::fmt::Display for ShaderCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderCompiler::Shaderc => f.write_str("shaderc"),
            ShaderCompiler::NagaGlsl => f.write_str("naga"),
        }
    }
}

/// Vulkan environment the programs are compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetProfile {
    Vulkan1_0,
    #[default]
    Vulkan1_1,
    Vulkan1_2,
}

impl std::fmt::Display for TargetProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetProfile::Vulkan1_0 => f.write_str("vulkan1.0"),
            TargetProfile::Vulkan1_1 => f.write_str("vulkan1.1"),
            TargetProfile::Vulkan1_2 => f.write_str("vulkan1.2"),
        }
    }
}

/// Which catalog program to run, and whether to run its reference solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Selection {
    pub program_index: usize,
    pub use_alternate: bool,
}

impl Selection {
    pub fn new(program_index: usize, use_alternate: bool) -> Self {
        Self {
            program_index,
            use_alternate,
        }
    }

    /// Next program, wrapping around; switching programs drops the alternate.
    pub fn next(self, count: usize) -> Self {
        if count == 0 {
            return self;
        }
        Self::new((self.program_index + 1) % count, false)
    }

    pub fn previous(self, count: usize) -> Self {
        if count == 0 {
            return self;
        }
        Self::new((self.program_index + count - 1) % count, false)
    }

    pub fn toggle_alternate(self) -> Self {
        Self::new(self.program_index, !self.use_alternate)
    }
}

/// Adapter and instance switches exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceOptions {
    /// Prefer the software fallback adapter over real hardware.
    pub force_software_adapter: bool,
    /// Enable the API debug layer and validation.
    pub enable_debug_layer: bool,
    /// Enable GPU-based validation on top of regular validation.
    pub enable_gpu_validation: bool,
}

impl DeviceOptions {
    /// Instance flags for these options, with `WGPU_*` environment overrides
    /// applied last.
    pub fn instance_flags(&self) -> wgpu::InstanceFlags {
        let mut flags = wgpu::InstanceFlags::empty();
        if self.enable_debug_layer {
            flags |= wgpu::InstanceFlags::DEBUG | wgpu::InstanceFlags::VALIDATION;
        }
        if self.enable_gpu_validation {
            flags |= wgpu::InstanceFlags::VALIDATION | wgpu::InstanceFlags::GPU_BASED_VALIDATION;
        }
        flags.with_env()
    }
}

/// Immutable configuration passed to the renderer at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial window size in physical pixels.
    pub window_size: (u32, u32),
    /// Base window title; program label and timings are appended.
    pub title: String,
    pub vsync: bool,
    /// Directory containing the programs and their includes.
    pub program_root: PathBuf,
    /// Program extension without the leading dot.
    pub program_extension: String,
    /// Catalog index selected at start-up.
    pub initial_program: usize,
    /// How long a failed rebuild is reported in the title.
    pub error_display: Duration,
    /// Requested size of the persistent scratch buffer; clamped to device limits.
    pub persistent_scratch_bytes: u64,
    pub shader_compiler: ShaderCompiler,
    pub target_profile: TargetProfile,
    pub device: DeviceOptions,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window_size: (1280, 720),
            title: "Compute Playground".to_string(),
            vsync: true,
            program_root: PathBuf::from("tutorials"),
            program_extension: "comp".to_string(),
            initial_program: 0,
            error_display: Duration::from_secs(5),
            persistent_scratch_bytes: 64 * 1024 * 1024,
            shader_compiler: ShaderCompiler::default(),
            target_profile: TargetProfile::default(),
            device: DeviceOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_layer_enables_validation() {
        let options = DeviceOptions {
            enable_debug_layer: true,
            ..DeviceOptions::default()
        };
        let flags = options.instance_flags();
        assert!(flags.contains(wgpu::InstanceFlags::DEBUG));
        assert!(flags.contains(wgpu::InstanceFlags::VALIDATION));
    }

    #[test]
    fn gpu_validation_implies_validation() {
        let options = DeviceOptions {
            enable_gpu_validation: true,
            ..DeviceOptions::default()
        };
        let flags = options.instance_flags();
        assert!(flags.contains(wgpu::InstanceFlags::GPU_BASED_VALIDATION));
        assert!(flags.contains(wgpu::InstanceFlags::VALIDATION));
    }

    #[test]
    fn selection_wraps_and_resets_alternate() {
        let current = Selection::new(2, true);
        assert_eq!(current.next(3), Selection::new(0, false));
        assert_eq!(current.previous(3), Selection::new(1, false));
        assert_eq!(Selection::new(0, false).previous(3), Selection::new(2, false));
        assert_eq!(current.toggle_alternate(), Selection::new(2, false));
        assert_eq!(current.next(0), current);
    }

    #[test]
    fn naga_backend_is_always_available() {
        assert!(ShaderCompiler::NagaGlsl.is_available());
        assert_eq!(ShaderCompiler::default(), ShaderCompiler::NagaGlsl);
        assert_eq!(ShaderCompiler::Shaderc.to_string(), "shaderc");
    }
}
