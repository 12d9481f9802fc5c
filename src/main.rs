use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use dmsmap::{
    compile, compile_unvalidated, FileSink, Sink, TableMapping, WriterSink,
    DEFAULT_OUTPUT_FILENAME,
};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "dmsmap",
    about = "Compiles table mapping configs into DMS table-mapping rules"
)]
struct Opt {
    /// JSON table mapping configs
    #[structopt(parse(from_os_str), required = true)]
    configs: Vec<PathBuf>,

    /// Output file, when compiling a single config
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Directory for output files
    #[structopt(long, parse(from_os_str))]
    out_dir: Option<PathBuf>,

    /// Print the rules instead of writing files
    #[structopt(long)]
    stdout: bool,

    /// Skip consistency checks on the configs
    #[structopt(long)]
    no_validate: bool,
}

impl Opt {
    fn output_path(&self, config: &Path) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }

        let dir = self.out_dir.clone().unwrap_or_default();
        if self.configs.len() == 1 {
            return dir.join(DEFAULT_OUTPUT_FILENAME);
        }

        // Several configs would otherwise all land on the default name.
        let stem = config
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".to_owned());
        dir.join(format!("{}.{}", stem, DEFAULT_OUTPUT_FILENAME))
    }

    /// Output path for every config, refusing any two configs that would
    /// write to the same file.
    fn output_paths(&self) -> Result<Vec<PathBuf>> {
        if self.output.is_some() && self.configs.len() > 1 {
            bail!("--output can only be used with a single config; use --out-dir instead");
        }

        let paths = self
            .configs
            .iter()
            .map(|config| self.output_path(config))
            .collect::<Vec<_>>();

        if !self.stdout {
            if let Some(path) = paths.iter().duplicates().next() {
                let configs = self
                    .configs
                    .iter()
                    .zip(&paths)
                    .filter(|(_, output)| *output == path)
                    .map(|(config, _)| config.display())
                    .join(", ");
                bail!(
                    "configs {} would all be written to {}; rename them or compile them separately",
                    configs,
                    path.display()
                );
            }
        }

        Ok(paths)
    }
}

fn handle_config(opt: &Opt, config: &Path, output: &Path) -> Result<()> {
    let json = std::fs::read_to_string(config)
        .with_context(|| format!("failed to read {}", config.display()))?;
    let mapping = TableMapping::from_json(&json)
        .with_context(|| format!("failed to parse {}", config.display()))?;

    let document = if opt.no_validate {
        compile_unvalidated(&mapping)
    } else {
        compile(&mapping).with_context(|| format!("invalid config {}", config.display()))?
    };

    if opt.stdout {
        WriterSink::new(std::io::stdout().lock(), "<stdout>").write(&document)?;
    } else {
        FileSink::new(output).write(&document)?;
    }

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::from_args();
    let outputs = opt.output_paths()?;

    for (config, output) in opt.configs.iter().zip(&outputs) {
        handle_config(&opt, config, output)?;
    }

    Ok(())
}
