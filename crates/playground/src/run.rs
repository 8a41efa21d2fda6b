use anyhow::{Context, Result};
use catalog::ProgramCatalog;
use playconfig::{CompilerChoice, PlaygroundConfig};
use renderer::{DeviceOptions, Renderer, RendererConfig, ShaderCompiler};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

pub fn run(cli: Cli) -> Result<()> {
    let (config, source) =
        PlaygroundConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    match &source {
        Some(path) => tracing::info!(path = %path.display(), "loaded configuration"),
        None => tracing::debug!("no configuration file found; using defaults"),
    }

    let renderer_config = renderer_config(&config, &cli);
    if cli.list {
        return list_programs(&renderer_config);
    }

    tracing::debug!(?renderer_config, "resolved renderer configuration");
    Renderer::new(renderer_config).run()
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Merges the configuration file with command-line overrides.
pub fn renderer_config(config: &PlaygroundConfig, cli: &Cli) -> RendererConfig {
    let configured_compiler = match config.runtime.compiler {
        CompilerChoice::Naga => ShaderCompiler::NagaGlsl,
        CompilerChoice::Shaderc => ShaderCompiler::Shaderc,
    };
    RendererConfig {
        window_size: (config.window.width, config.window.height),
        title: config.window.title.clone(),
        vsync: config.window.vsync,
        program_root: cli
            .root
            .clone()
            .unwrap_or_else(|| config.programs.root.clone()),
        program_extension: config.programs.extension.clone(),
        initial_program: cli.program.unwrap_or(config.programs.initial),
        error_display: config.runtime.error_display,
        persistent_scratch_bytes: config.runtime.persistent_scratch_bytes(),
        shader_compiler: cli.shader_compiler.unwrap_or(configured_compiler),
        device: DeviceOptions {
            force_software_adapter: cli.force_software_adapter,
            enable_debug_layer: cli.enable_debug_layer,
            enable_gpu_validation: cli.enable_gpu_validation,
        },
        ..RendererConfig::default()
    }
}

fn list_programs(config: &RendererConfig) -> Result<()> {
    let catalog = ProgramCatalog::scan(&config.program_root, &config.program_extension)
        .with_context(|| {
            format!(
                "failed to discover programs under {}",
                config.program_root.display()
            )
        })?;
    if catalog.is_empty() {
        println!(
            "No *.{} programs found under {}",
            config.program_extension,
            config.program_root.display()
        );
        return Ok(());
    }

    println!("Programs under {}:", catalog.root().display());
    for entry in catalog.entries() {
        match &entry.alternate {
            Some(alternate) => println!("  {:<40} {} (solution: {alternate})", entry.label, entry.source),
            None => println!("  {:<40} {}", entry.label, entry.source),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn command_line_overrides_configuration() {
        let config = PlaygroundConfig::from_toml_str(
            r#"
            [programs]
            root = "lessons"
            initial = 1
            [runtime]
            error_display = "2s"
            compiler = "naga"
            "#,
        )
        .unwrap();

        let cli = Cli::parse_from(["playground", "--program", "3", "--forceWarpAdapter"]);
        let merged = renderer_config(&config, &cli);
        assert_eq!(merged.program_root, PathBuf::from("lessons"));
        assert_eq!(merged.initial_program, 3);
        assert_eq!(merged.error_display, Duration::from_secs(2));
        assert!(merged.device.force_software_adapter);
        assert_eq!(merged.shader_compiler, ShaderCompiler::NagaGlsl);

        let cli = Cli::parse_from(["playground", "--root", "elsewhere"]);
        let merged = renderer_config(&config, &cli);
        assert_eq!(merged.program_root, PathBuf::from("elsewhere"));
        assert_eq!(merged.initial_program, 1);
    }
}
