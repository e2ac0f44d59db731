//! Renders `ctr2cloud` man pages from the clap definitions.
//!
//! One page is written for the binary and one per subcommand
//! (`ctr2cloud-raw.1`), all into `OUT_DIR`.

use std::env;
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

fn render_page(command: Command, title: &str, out_dir: &Path) -> Result<(), Box<dyn Error>> {
    let mut page = Vec::new();
    Man::new(command).title(title).render(&mut page)?;
    fs::write(out_dir.join(format!("{title}.1")), page)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let mut cargo = io::stdout();
    for watched in ["build.rs", "src/cli/mod.rs"] {
        writeln!(cargo, "cargo:rerun-if-changed={watched}")?;
    }

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))?;

    let root = cli::Cli::command();
    let root_name = root.get_name().to_owned();
    for sub in root.get_subcommands() {
        let title = format!("{root_name}-{}", sub.get_name());
        render_page(sub.clone(), &title, &out_dir)?;
    }
    render_page(root, &root_name, &out_dir)
}
