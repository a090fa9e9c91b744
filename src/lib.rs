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

pub mod checker;
pub mod codegen;
pub mod context;
pub mod errors;
pub mod ir;
pub mod loader;
pub mod opt;

use anyhow::{Context, Result};
use ir::Program;

/// Checks the program and runs the optimization passes in place.
pub fn optimize(program: &mut Program) -> Result<()> {
    checker::check(program).context("Failed during checking stage")?;

    context::ensure_contexts(program).context("Failed during analysis stage")?;

    checker::type_check(program).context("Failed during type checking stage")?;

    opt::optimize_procs(program).context("Failed during optimization stage")?;

    Ok(())
}

/// Generates x86-64 assembly text for a checked program. Optimization is
/// not required beforehand; contexts are built on demand and cached.
pub fn gen_code(program: &mut Program) -> Result<String> {
    checker::check(program).context("Failed during checking stage")?;

    context::ensure_contexts(program).context("Failed during analysis stage")?;

    checker::type_check(program).context("Failed during type checking stage")?;

    let asm =
        codegen::generate(program).context("Failed during code generation stage")?;

    Ok(asm)
}

/// The full pipeline: optimize, then generate.
pub fn compile(program: &mut Program) -> Result<String> {
    optimize(program)?;
    gen_code(program)
}
