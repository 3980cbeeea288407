//! Renders the demo binary's manual page from its clap definition.

use std::{env, fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed=REPLYFRAME_MAN_DIR");

    let out_dir = env::var_os("REPLYFRAME_MAN_DIR")
        .map_or_else(|| PathBuf::from("target/generated-man"), PathBuf::from);
    fs::create_dir_all(&out_dir)?;

    let cmd = cli::Cli::command();
    let page = out_dir.join(format!("{}.1", cmd.get_name()));
    let mut buf = Vec::new();
    Man::new(cmd).render(&mut buf)?;
    fs::write(page, buf)?;

    Ok(())
}
