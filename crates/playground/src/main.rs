mod cli;
mod run;

use anyhow::Result;

fn main() -> Result<()> {
    let (cli, ignored) = cli::parse();
    run::initialise_tracing();
    if !ignored.is_empty() {
        tracing::debug!(?ignored, "ignoring unrecognised arguments");
    }

    run::run(cli)
}
