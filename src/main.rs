use std::env;
use std::fs;
use std::process::exit;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = run() {
        eprintln!("{:#}", e);
        exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() != 2 {
        eprintln!("Usage: cesium <source.ces> <ProgramName>");
        exit(1);
    }
    let source_path = &args[0];
    let program_name = &args[1];

    let source =
        fs::read_to_string(source_path).with_context(|| format!("reading {}", source_path))?;
    let bytes = cesium::compile(&source, program_name)?;

    let out_path = format!("{}.class", program_name);
    fs::write(&out_path, &bytes).with_context(|| format!("writing {}", out_path))?;

    println!("Compilation successful. Generated {}", out_path);
    Ok(())
}
