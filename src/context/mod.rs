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

mod coloring;

use crate::codegen::ops::{ArgCondition, OpSpec, OpTable};
use crate::codegen::platform::{self, VariableLayers};
use crate::errors::CompileError;
use crate::ir::{Arg, Instr, InstrKind, Procedure, Program, StaticSegment, ValueKind};

/// Index of a variable within its procedure context.
pub type VarId = usize;

#[derive(Debug)]
pub struct Variable {
    pub name: String,
    pub kind: ValueKind,
    pub mem_unit: u32,
    pub begin_index: u32,
    pub end_index: u32,
    // Indices of the instructions that read or rewrite the variable. The
    // argument inliner pops one entry per folded use.
    pub uses: Vec<u32>,
    pub can_be_ref_target: bool,
    pub is_proc_param: bool,
    pub is_static: bool,
}

// Analysis results attached to one instruction, keyed by its index. Kept
// in a side table so instructions and variables reference each other
// without cycles.
#[derive(Debug, Clone, Default)]
pub struct InstrData {
    pub dest_var: Option<VarId>,
    pub arg_vars: Vec<VarId>,
}

#[derive(Debug)]
pub struct ProcContext {
    pub vars: Vec<Variable>,
    pub instr_data: Vec<InstrData>,
}

impl ProcContext {
    /// Most recent variable with the given name.
    pub fn lookup_variable(&self, name: &str) -> Option<VarId> {
        self.vars.iter().rposition(|var| var.name == name)
    }

    pub fn arg_kind(&self, arg: &Arg) -> Result<ValueKind, CompileError> {
        match arg {
            Arg::Value(value) => Ok(value.kind()),
            Arg::Var(name) => {
                let var_id =
                    self.lookup_variable(name)
                        .ok_or_else(|| CompileError::ResolutionError {
                            reason: format!("Variable `{}` was not defined before usage", name),
                        })?;

                Ok(self.vars[var_id].kind)
            }
        }
    }

    pub fn data(&self, instr_index: u32) -> &InstrData {
        &self.instr_data[instr_index as usize]
    }

    /// Resolves an `Op` instruction against the op table using the kinds
    /// of its arguments.
    pub fn instr_op(
        &self,
        name: &str,
        args: &[Arg],
        ops: &OpTable,
    ) -> Result<&'static OpSpec, CompileError> {
        let arg_kinds = args
            .iter()
            .map(|arg| self.arg_kind(arg))
            .collect::<Result<Vec<_>, _>>()?;

        ops.lookup(name, &arg_kinds)
    }

    fn use_variable(&mut self, instr_index: u32, name: &str) -> Result<VarId, CompileError> {
        let var_id = self
            .lookup_variable(name)
            .ok_or_else(|| CompileError::ResolutionError {
                reason: format!("Variable `{}` was not defined before usage", name),
            })?;

        let var = &mut self.vars[var_id];
        if var.end_index < instr_index {
            var.end_index = instr_index;
        }
        var.uses.push(instr_index);

        Ok(var_id)
    }

    fn create_dest_variable(&mut self, instr_index: u32, name: &str, kind: ValueKind) -> VarId {
        self.vars.push(Variable {
            name: name.to_string(),
            kind,
            mem_unit: 0,
            begin_index: instr_index + 1,
            end_index: instr_index + 1,
            uses: Vec::new(),
            can_be_ref_target: false,
            is_proc_param: false,
            is_static: false,
        });

        self.vars.len() - 1
    }

    // Attaches the destination variable of a `dest`-producing
    // instruction, creating it on first assignment.
    fn attach_dest(&mut self, instr_index: u32, name: &str, kind: ValueKind) -> Result<(), CompileError> {
        let dest_var = match self.lookup_variable(name) {
            Some(var_id) => {
                self.use_variable(instr_index, name)?;
                var_id
            }
            None => self.create_dest_variable(instr_index, name, kind),
        };

        self.instr_data[instr_index as usize].dest_var = Some(dest_var);

        Ok(())
    }

    fn param_var(&self, param_index: usize) -> Option<VarId> {
        self.vars
            .iter()
            .enumerate()
            .filter(|(_, var)| var.is_proc_param)
            .nth(param_index)
            .map(|(var_id, _)| var_id)
    }

    // Call arguments extend the liveness of the caller's own parameter at
    // the same ordinal, so a parameter still in its incoming register is
    // not clobbered while the outgoing arguments are staged.
    fn walk_call_args(&mut self, instr_index: u32, args: &[Arg]) -> Result<(), CompileError> {
        for (i, arg) in args.iter().enumerate() {
            if let Arg::Var(name) = arg {
                let arg_var = self.use_variable(instr_index, name)?;
                self.instr_data[instr_index as usize].arg_vars.push(arg_var);
            }

            if let Some(param_var) = self.param_var(i) {
                let var = &mut self.vars[param_var];
                if var.end_index < instr_index {
                    var.end_index = instr_index;
                }
            }
        }

        Ok(())
    }

    fn walk_op(
        &mut self,
        instrs: &mut [Instr],
        pos: usize,
        ops: &OpTable,
    ) -> Result<(), CompileError> {
        let instr_index = instrs[pos].index;

        let spec = {
            let InstrKind::Op { name, args, .. } = &instrs[pos].kind else {
                return Ok(());
            };
            self.instr_op(name, args, ops)?
        };

        let InstrKind::Op { name, dest, args } = &mut instrs[pos].kind else {
            return Ok(());
        };

        // Binary ops are commutative-normalized so a literal never ends
        // up as the staged first operand.
        if spec.desc.arity() == 2
            && matches!(args[0], Arg::Value(_))
            && matches!(args[1], Arg::Var(_))
        {
            args.swap(0, 1);
        }

        for (i, op_arg) in spec.desc.args.iter().enumerate() {
            match op_arg.cond {
                ArgCondition::Any => {}
                ArgCondition::Var | ArgCondition::RefTarget => {
                    if !matches!(args[i], Arg::Var(_)) {
                        return Err(CompileError::StructuralError {
                            reason: format!(
                                "Argument {} of `{}` operation should be a variable",
                                i + 1,
                                name
                            ),
                        });
                    }
                }
            }

            if let Arg::Var(arg_name) = &args[i] {
                let arg_var = self.use_variable(instr_index, arg_name)?;
                self.instr_data[instr_index as usize].arg_vars.push(arg_var);

                if op_arg.cond == ArgCondition::RefTarget {
                    self.vars[arg_var].can_be_ref_target = true;
                }
            }
        }

        if spec.desc.dest_kind == ValueKind::Unit {
            return Ok(());
        }

        let dest_name = dest.clone();
        self.attach_dest(instr_index, &dest_name, spec.desc.dest_kind)
    }

    fn walk_instrs(
        &mut self,
        proc: &mut Procedure,
        ops: &OpTable,
        ret_kinds: &[ValueKind],
    ) -> Result<(), CompileError> {
        for pos in 0..proc.instrs.len() {
            if proc.instrs[pos].removed {
                continue;
            }

            let instr_index = proc.instrs[pos].index;

            if matches!(proc.instrs[pos].kind, InstrKind::Op { .. }) {
                self.walk_op(&mut proc.instrs, pos, ops)?;
                continue;
            }

            match &proc.instrs[pos].kind {
                InstrKind::Op { .. } => {}

                InstrKind::Call { args, .. } => {
                    let args = args.clone();
                    self.walk_call_args(instr_index, &args)?;
                }

                InstrKind::CallAssign {
                    dest,
                    callee_name,
                    args,
                    callee,
                } => {
                    let dest = dest.clone();
                    let args = args.clone();
                    let ret_val_kind = callee
                        .map(|callee| ret_kinds[callee])
                        .ok_or_else(|| CompileError::ResolutionError {
                            reason: format!(
                                "Procedure `{}` with such signature was not found",
                                callee_name
                            ),
                        })?;

                    self.walk_call_args(instr_index, &args)?;
                    self.attach_dest(instr_index, &dest, ret_val_kind)?;
                }

                InstrKind::Return => {}

                InstrKind::ReturnValue { arg } => {
                    if let Arg::Var(name) = arg {
                        let name = name.clone();
                        let arg_var = self.use_variable(instr_index, &name)?;
                        self.instr_data[instr_index as usize].arg_vars.push(arg_var);
                    }
                }

                InstrKind::Jump { .. } => {}

                InstrKind::CondJump { arg0, arg1, .. } => {
                    let (arg0, arg1) = (arg0.clone(), arg1.clone());

                    if let Arg::Var(name) = &arg0 {
                        let arg_var = self.use_variable(instr_index, name)?;
                        self.instr_data[instr_index as usize].arg_vars.push(arg_var);
                    }
                    if let Arg::Var(name) = &arg1 {
                        let arg_var = self.use_variable(instr_index, name)?;
                        self.instr_data[instr_index as usize].arg_vars.push(arg_var);
                    }
                }

                InstrKind::Label { .. } => {}

                InstrKind::Alloc { dest, .. } => {
                    let dest = dest.clone();
                    self.attach_dest(instr_index, &dest, ValueKind::S64)?;
                }
            }
        }

        self.widen_ref_target_liveness(proc, ops)
    }

    // A pointee must stay alive for as long as any pointer into it, so
    // the source of a ref-producing op inherits the pointer's end index.
    fn widen_ref_target_liveness(
        &mut self,
        proc: &Procedure,
        ops: &OpTable,
    ) -> Result<(), CompileError> {
        for instr in &proc.instrs {
            if instr.removed {
                continue;
            }

            let InstrKind::Op { name, args, .. } = &instr.kind else {
                continue;
            };

            let spec = self.instr_op(name, args, ops)?;
            let data = self.data(instr.index).clone();

            let Some(dest_var) = data.dest_var else {
                continue;
            };

            for (i, op_arg) in spec.desc.args.iter().enumerate() {
                if op_arg.cond != ArgCondition::RefTarget {
                    continue;
                }

                let var_pos = args[..i]
                    .iter()
                    .filter(|arg| matches!(arg, Arg::Var(_)))
                    .count();
                let arg_var = data.arg_vars[var_pos];

                if self.vars[arg_var].end_index < self.vars[dest_var].end_index {
                    self.vars[arg_var].end_index = self.vars[dest_var].end_index;
                }
            }
        }

        Ok(())
    }

    pub fn build(
        proc: &mut Procedure,
        ops: &OpTable,
        layers: &VariableLayers,
        static_data: &[StaticSegment],
        ret_kinds: &[ValueKind],
    ) -> Result<Self, CompileError> {
        if proc.ret_val_kind != ValueKind::Unit {
            let ends_in_return_value = proc
                .instrs
                .last()
                .is_some_and(|instr| matches!(instr.kind, InstrKind::ReturnValue { .. }));

            if !ends_in_return_value {
                return Err(CompileError::TypeError {
                    reason: "Non-unit procedure should return something".to_string(),
                });
            }
        }

        for (i, instr) in proc.instrs.iter_mut().enumerate() {
            instr.index = i as u32;
        }

        let mut ctx = Self {
            vars: Vec::new(),
            instr_data: vec![InstrData::default(); proc.instrs.len()],
        };

        for segment in static_data {
            ctx.vars.push(Variable {
                name: segment.name.clone(),
                kind: ValueKind::S64, // addressed as a pointer
                mem_unit: 0,
                begin_index: 1,
                end_index: 1,
                uses: Vec::new(),
                can_be_ref_target: false,
                is_proc_param: false,
                is_static: true,
            });
        }

        for param in &proc.params {
            ctx.vars.push(Variable {
                name: param.name.clone(),
                kind: param.kind,
                mem_unit: 0,
                begin_index: 1,
                end_index: 1,
                uses: Vec::new(),
                can_be_ref_target: false,
                is_proc_param: true,
                is_static: false,
            });
        }

        ctx.walk_instrs(proc, ops, ret_kinds)?;
        coloring::assign_mem_units(&mut ctx.vars, layers);

        Ok(ctx)
    }
}

/// Builds and caches the context of every procedure that has none yet.
pub fn ensure_contexts(program: &mut Program) -> Result<(), CompileError> {
    let ops = OpTable::for_target(program.target);
    let layers = platform::layers(program.target);
    let ret_kinds: Vec<ValueKind> = program.procs.iter().map(|proc| proc.ret_val_kind).collect();

    let Program { procs, static_data, .. } = program;

    for proc in procs.iter_mut() {
        if proc.ctx.is_some() {
            continue;
        }

        let ctx = ProcContext::build(proc, &ops, &layers, static_data, &ret_kinds)?;
        proc.ctx = Some(ctx);
    }

    Ok(())
}
