use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use pnacl_compress::{CompressFlags, Compressor};
use tempfile::NamedTempFile;

#[derive(Parser, Debug)]
#[command(
    name = "pnacl-bccompress",
    version,
    about = "Rewrite a PNaCl bitcode file with better abbreviations, or report on the ones it has."
)]
struct Args {
    /// Input bitcode file ("-" for stdin)
    #[arg(default_value = "-")]
    input: PathBuf,

    /// Output file ("-" for stdout)
    #[arg(short, long, value_name = "PATH", default_value = "-")]
    output: PathBuf,

    /// Trace abbreviations as they're read and created
    #[arg(long = "abbreviations", action = clap::ArgAction::SetTrue)]
    trace_abbreviations: bool,

    /// Print the data distributions instead of compressing
    #[arg(long, action = clap::ArgAction::SetTrue)]
    show_distributions: bool,

    /// Print the abbreviation lookup tries instead of compressing
    #[arg(long, action = clap::ArgAction::SetTrue)]
    show_lookup_tries: bool,

    /// Print how often each abbreviation is used instead of compressing
    #[arg(long, action = clap::ArgAction::SetTrue)]
    show_abbreviation_frequencies: bool,

    /// Write every record unabbreviated
    #[arg(long, action = clap::ArgAction::SetTrue)]
    remove_abbreviations: bool,
}

impl Args {
    fn flags(&self) -> CompressFlags {
        CompressFlags {
            trace_abbreviations: self.trace_abbreviations,
            show_distributions: self.show_distributions,
            show_lookup_tries: self.show_lookup_tries,
            show_abbreviation_frequencies: self.show_abbreviation_frequencies,
            remove_abbreviations: self.remove_abbreviations,
        }
    }
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    let mut input = vec![];
    if is_stdio(path) {
        io::stdin()
            .read_to_end(&mut input)
            .context("read input from stdin")?;
    } else {
        File::open(path)
            .and_then(|mut f| f.read_to_end(&mut input))
            .with_context(|| format!("read input {}", path.display()))?;
    }
    Ok(input)
}

/// Where the result goes. File output is staged next to its destination and
/// only moved into place by [`Output::commit`].
enum Output {
    Stdout,
    File { path: PathBuf, staged: NamedTempFile },
}

impl Output {
    fn open(path: &Path) -> Result<Self> {
        if is_stdio(path) {
            return Ok(Output::Stdout);
        }

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let staged =
            NamedTempFile::new_in(dir).with_context(|| format!("open output {}", path.display()))?;

        Ok(Output::File {
            path: path.to_path_buf(),
            staged: staged,
        })
    }

    fn commit(self, buf: &[u8]) -> Result<()> {
        match self {
            Output::Stdout => {
                let mut stdout = io::stdout().lock();
                stdout
                    .write_all(buf)
                    .and_then(|_| stdout.flush())
                    .context("write output to stdout")
            }
            Output::File { path, mut staged } => {
                staged
                    .write_all(buf)
                    .and_then(|_| staged.flush())
                    .with_context(|| format!("write output {}", path.display()))?;
                staged
                    .persist(&path)
                    .with_context(|| format!("write output {}", path.display()))?;
                Ok(())
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let input = read_input(&args.input)?;
    let output = Output::open(&args.output)?;
    let compressor = Compressor::new(args.flags());

    // NOTE: On failure the staged file is dropped, which deletes it and leaves
    // any existing output untouched.
    let mut buf = vec![];
    if compressor.is_analysis_only() {
        compressor
            .analyze(&input, &mut buf)
            .context("analyze bitcode")?;
    } else {
        buf = compressor.compress(&input).context("compress bitcode")?;
    }

    output.commit(&buf)
}
