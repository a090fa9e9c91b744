/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use anyhow::{Context, Result};
use clap::Parser as clap_parser;
use millc::loader;
use std::fs;
use std::path::PathBuf;

#[derive(clap_parser)]
#[clap(version = "0.1.0")]
struct Opts {
    /// Program description to compile (JSON)
    #[clap(short, long)]
    input: PathBuf,
    /// Where the assembly text is written
    #[clap(short, long)]
    output: PathBuf,
    /// Skip the optimization passes
    #[clap(long)]
    no_opt: bool,
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();

    let description = fs::read_to_string(&opts.input)
        .with_context(|| format!("Failed to read input file: {}", opts.input.display()))?;

    let mut program = loader::load_program(&description)
        .context("Failed during loading stage")?;

    if !opts.no_opt {
        millc::optimize(&mut program)?;
    }

    let asm = millc::gen_code(&mut program)?;

    fs::write(&opts.output, asm)?;
    println!(
        "Successfully compiled {} to {}",
        opts.input.display(),
        opts.output.display()
    );

    Ok(())
}
