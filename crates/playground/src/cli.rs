use std::ffi::OsString;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use renderer::ShaderCompiler;

#[derive(Parser, Debug)]
#[command(
    name = "playground",
    author,
    version,
    about = "Live-reloading GPU compute shader playground",
    arg_required_else_help = false
)]
pub struct Cli {
    /// Prefer the software (fallback) adapter over real GPUs.
    #[arg(long, alias = "forceWarpAdapter")]
    pub force_software_adapter: bool,

    /// Enable the graphics API debug layer and validation.
    #[arg(long, alias = "enableDebugLayer")]
    pub enable_debug_layer: bool,

    /// Enable GPU-based validation (slow).
    #[arg(long, alias = "enableGpuValidationLayer")]
    pub enable_gpu_validation: bool,

    /// Configuration file; overrides `PLAYGROUND_CONFIG` and the default lookup.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the discovered programs and exit.
    #[arg(long)]
    pub list: bool,

    /// Catalog index of the program to start with.
    #[arg(long, value_name = "INDEX")]
    pub program: Option<usize>,

    /// Directory containing the programs (overrides the config file).
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Shader compiler backend: `naga` (default) or `shaderc`.
    #[arg(long, value_name = "COMPILER", value_parser = parse_shader_compiler)]
    pub shader_compiler: Option<ShaderCompiler>,
}

/// Parses the process arguments, dropping anything the CLI does not know.
///
/// Returns the ignored arguments so they can be logged once tracing is up.
pub fn parse() -> (Cli, Vec<String>) {
    let mut args = std::env::args_os();
    let program = args.next().unwrap_or_else(|| OsString::from("playground"));
    let (known, ignored) = split_known_args(args.map(|arg| arg.to_string_lossy().into_owned()));
    let cli = Cli::parse_from(std::iter::once(program.to_string_lossy().into_owned()).chain(known));
    (cli, ignored)
}

/// Splits `args` into those the CLI accepts (with their values) and the rest.
pub fn split_known_args<I>(args: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = String>,
{
    let mut command = Cli::command();
    command.build();

    let mut known = Vec::new();
    let mut ignored = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let Some(definition) = lookup(&command, &arg) else {
            ignored.push(arg);
            continue;
        };
        let inline_value = arg.contains('=');
        known.push(arg);
        if definition.get_action().takes_values() && !inline_value {
            if let Some(value) = args.next() {
                known.push(value);
            }
        }
    }
    (known, ignored)
}

fn lookup<'a>(command: &'a clap::Command, arg: &str) -> Option<&'a clap::Arg> {
    if let Some(long) = arg.strip_prefix("--") {
        let name = long.split_once('=').map_or(long, |(name, _)| name);
        return command.get_arguments().find(|definition| {
            definition.get_long() == Some(name)
                || definition
                    .get_all_aliases()
                    .is_some_and(|aliases| aliases.contains(&name))
        });
    }
    let mut chars = arg.strip_prefix('-')?.chars();
    let short = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    command
        .get_arguments()
        .find(|definition| definition.get_short() == Some(short))
}

pub fn parse_shader_compiler(value: &str) -> Result<ShaderCompiler, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("shader compiler must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "shaderc" => {
            if cfg!(feature = "shaderc") {
                Ok(ShaderCompiler::Shaderc)
            } else {
                Err("shaderc support is not enabled in this build".to_string())
            }
        }
        "naga" | "naga-glsl" => Ok(ShaderCompiler::NagaGlsl),
        _ => Err("unknown shader compiler (expected shaderc or naga)".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn unknown_arguments_are_dropped() {
        let (known, ignored) = split_known_args(strings(&[
            "--forceWarpAdapter",
            "-NSDocumentRevisionsDebugMode",
            "YES",
            "--program",
            "2",
            "--mystery=1",
        ]));
        assert_eq!(known, strings(&["--forceWarpAdapter", "--program", "2"]));
        assert_eq!(
            ignored,
            strings(&["-NSDocumentRevisionsDebugMode", "YES", "--mystery=1"])
        );
    }

    #[test]
    fn legacy_aliases_map_to_flags() {
        let (known, _) = split_known_args(strings(&[
            "--enableDebugLayer",
            "--enableGpuValidationLayer",
            "--config=custom.toml",
        ]));
        let cli = Cli::parse_from(std::iter::once("playground".to_string()).chain(known));
        assert!(cli.enable_debug_layer);
        assert!(cli.enable_gpu_validation);
        assert!(!cli.force_software_adapter);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
    }

    #[test]
    fn shader_compiler_names() {
        assert_eq!(
            parse_shader_compiler("Naga").unwrap(),
            ShaderCompiler::NagaGlsl
        );
        assert!(parse_shader_compiler("fxc").is_err());
        assert!(parse_shader_compiler(" ").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
