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

pub mod ops;
pub mod platform;
mod stack;

use crate::context::{InstrData, ProcContext, VarId, Variable};
use crate::errors::CompileError;
use crate::ir::{
    Arg, InstrKind, Procedure, Program, RelOp, Value, ValueKind, VALUE_KIND_COUNT,
};

use ops::OpTable;
use stack::StackFrame;

// Callee-saved pool backing the memory units of local variables.
const REG_NAMES_S64: &[&str] = &["rbx", "r12", "r13", "r14", "r15"];

// System V AMD64 parameter registers.
const PARAM_REG_NAMES_S64: &[&str] = &["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

// Textual assembly accumulator.
#[derive(Debug, Default)]
pub struct Asm {
    out: String,
}

impl Asm {
    pub fn new() -> Self {
        Self::default()
    }

    /// One indented instruction line.
    pub fn ins(&mut self, line: &str) {
        self.out.push_str("  ");
        self.out.push_str(line);
        self.out.push('\n');
    }

    pub fn raw(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LocKind {
    #[default]
    Reg,
    Stack,
}

// Where a variable lives during code generation: a register name, a
// stack slot such as `qword[rbp-8]`, or a static segment's name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Loc {
    pub kind: LocKind,
    pub text: String,
}

fn reg_names(kind: ValueKind) -> &'static [&'static str] {
    match kind {
        ValueKind::S64 => REG_NAMES_S64,
        ValueKind::Unit => &[],
    }
}

fn param_reg_names(kind: ValueKind) -> &'static [&'static str] {
    match kind {
        ValueKind::S64 => PARAM_REG_NAMES_S64,
        ValueKind::Unit => &[],
    }
}

fn cond_jump_mnemonic(rel_op: RelOp) -> &'static str {
    match rel_op {
        RelOp::Equal => "je",
        RelOp::NotEqual => "jne",
        RelOp::Greater => "jg",
        RelOp::Less => "jl",
        RelOp::GreaterOrEqual => "jge",
        RelOp::LessOrEqual => "jle",
    }
}

fn ptr_prefix(kind: ValueKind) -> Result<&'static str, CompileError> {
    match kind {
        ValueKind::S64 => Ok("qword"),
        ValueKind::Unit => Err(CompileError::StructuralError {
            reason: "Wrong value kind".to_string(),
        }),
    }
}

fn value_to_str(value: Value) -> Result<String, CompileError> {
    match value {
        Value::Unit => Err(CompileError::StructuralError {
            reason: "Value of type unit cannot be used".to_string(),
        }),
        Value::S64(v) => Ok(v.to_string()),
    }
}

// Incoming location of the parameter with the given call-order index.
// Parameters beyond the register quota live above the frame base;
// `params_offset` walks back down as stack parameters are handed out.
fn param_var_loc(
    var: &Variable,
    index: usize,
    params_offset: &mut u32,
) -> Result<Loc, CompileError> {
    let regs = param_reg_names(var.kind);

    if index < regs.len() {
        return Ok(Loc {
            kind: LocKind::Reg,
            text: regs[index].to_string(),
        });
    }

    let loc = Loc {
        kind: LocKind::Stack,
        text: format!("{}[rbp+{}]", ptr_prefix(var.kind)?, params_offset),
    };

    *params_offset -= var.kind.size();

    Ok(loc)
}

// Per-procedure generation scratch: the body text, the location of every
// variable, the stack frame, and the register pressure per kind.
struct ProcGen {
    body: Asm,
    var_locs: Vec<Option<Loc>>,
    stack: StackFrame,
    max_mem_units_used: [u32; VALUE_KIND_COUNT],
    found_return: bool,
}

impl ProcGen {
    fn new(var_count: usize) -> Self {
        Self {
            body: Asm::new(),
            var_locs: vec![None; var_count],
            stack: StackFrame::new(),
            max_mem_units_used: [0; VALUE_KIND_COUNT],
            found_return: false,
        }
    }

    // Location of a non-parameter variable: its memory unit when it fits
    // the register pool, a stack slot otherwise. Ref-target variables
    // always land on the stack so their address is stable.
    fn colored_var_loc(&mut self, var: &Variable) -> Result<Loc, CompileError> {
        let regs = reg_names(var.kind);

        if (var.mem_unit as usize) < regs.len() && !var.can_be_ref_target && !var.is_static {
            return Ok(Loc {
                kind: LocKind::Reg,
                text: regs[var.mem_unit as usize].to_string(),
            });
        }

        let offset = self
            .stack
            .alloc(var.kind.size(), var.begin_index, var.end_index);

        Ok(Loc {
            kind: LocKind::Stack,
            text: format!("{}[rbp-{}]", ptr_prefix(var.kind)?, offset),
        })
    }

    fn set_var_locs(&mut self, proc: &Procedure, ctx: &ProcContext) -> Result<(), CompileError> {
        let mut params_offset: u32 = 8;
        let mut param_units_used = [0u32; VALUE_KIND_COUNT];

        for param in &proc.params {
            let regs = param_reg_names(param.kind);
            if param_units_used[param.kind.index()] as usize >= regs.len() {
                params_offset += param.kind.size();
            }
            param_units_used[param.kind.index()] += 1;
        }

        let mut params_count = 0;

        for (var_id, var) in ctx.vars.iter().enumerate() {
            if var.uses.is_empty() {
                // an unread parameter still occupies its call-order slot
                if var.is_proc_param {
                    params_count += 1;
                }
                continue;
            }

            if var.is_static {
                self.var_locs[var_id] = Some(Loc {
                    kind: LocKind::Stack,
                    text: var.name.clone(),
                });
                continue;
            }

            if var.is_proc_param && !proc.has_callee {
                let index = params_count;
                params_count += 1;
                self.var_locs[var_id] = Some(param_var_loc(var, index, &mut params_offset)?);
                continue;
            }

            let loc = self.colored_var_loc(var)?;

            if !var.can_be_ref_target {
                let used = &mut self.max_mem_units_used[var.kind.index()];
                if *used < var.mem_unit + 1 {
                    *used = var.mem_unit + 1;
                }
            }

            if var.is_proc_param {
                let index = params_count;
                params_count += 1;
                let param_loc = param_var_loc(var, index, &mut params_offset)?;
                self.body.ins(&format!("mov {},{}", loc.text, param_loc.text));
            }

            self.var_locs[var_id] = Some(loc);
        }

        Ok(())
    }

    fn var_loc(
        &self,
        ctx: &ProcContext,
        var_id: VarId,
        is_dest: bool,
    ) -> Result<Loc, CompileError> {
        let var = &ctx.vars[var_id];

        let loc = self.var_locs[var_id]
            .clone()
            .ok_or_else(|| CompileError::ResolutionError {
                reason: format!("Variable `{}` location was not set", var.name),
            })?;

        // a static segment used as a destination is dereferenced by name
        if var.is_static && is_dest {
            return Ok(Loc {
                kind: loc.kind,
                text: format!("{}[{}]", ptr_prefix(var.kind)?, loc.text),
            });
        }

        Ok(loc)
    }

    fn arg_to_str(
        &self,
        ctx: &ProcContext,
        arg: &Arg,
        var_id: Option<VarId>,
    ) -> Result<String, CompileError> {
        match arg {
            Arg::Value(value) => value_to_str(*value),
            Arg::Var(name) => {
                let var_id = var_id.ok_or_else(|| CompileError::ResolutionError {
                    reason: format!("Variable `{}` was not defined before usage", name),
                })?;

                Ok(self.var_loc(ctx, var_id, false)?.text)
            }
        }
    }

    // Maps each argument position to the context variable it uses, if
    // any; variable arguments consume `arg_vars` entries in order.
    fn arg_var_ids(args: &[Arg], data: &InstrData) -> Vec<Option<VarId>> {
        let mut var_ids = Vec::with_capacity(args.len());
        let mut var_count = 0;

        for arg in args {
            if matches!(arg, Arg::Var(_)) {
                var_ids.push(data.arg_vars.get(var_count).copied());
                var_count += 1;
            } else {
                var_ids.push(None);
            }
        }

        var_ids
    }

    // Materializes call arguments into the System V parameter registers;
    // the overflow is pushed right-to-left and the returned byte count
    // is popped off rsp after the call.
    fn gen_call_params(
        &mut self,
        ctx: &ProcContext,
        args: &[Arg],
        data: &InstrData,
    ) -> Result<u32, CompileError> {
        let var_ids = Self::arg_var_ids(args, data);
        let mut params_count = [0u32; VALUE_KIND_COUNT];

        for (i, arg) in args.iter().enumerate() {
            let kind = ctx.arg_kind(arg)?;
            let regs = param_reg_names(kind);
            let count = &mut params_count[kind.index()];

            if *count as usize >= regs.len() {
                *count += 1;
                continue;
            }

            let reg_name = regs[*count as usize];
            *count += 1;

            let arg_str = self.arg_to_str(ctx, arg, var_ids[i])?;
            if reg_name != arg_str {
                self.body.ins(&format!("mov {},{}", reg_name, arg_str));
            }
        }

        let mut offset = 0;

        for (i, arg) in args.iter().enumerate().rev() {
            let kind = ctx.arg_kind(arg)?;
            let regs = param_reg_names(kind);
            let count = &mut params_count[kind.index()];

            if *count as usize <= regs.len() {
                break;
            }

            *count -= 1;

            let arg_str = self.arg_to_str(ctx, arg, var_ids[i])?;
            self.body.ins(&format!("push {}", arg_str));

            offset += kind.size();
        }

        Ok(offset)
    }

    fn gen_op(
        &mut self,
        ctx: &ProcContext,
        ops: &OpTable,
        name: &str,
        args: &[Arg],
        data: &InstrData,
    ) -> Result<(), CompileError> {
        // a definition whose value is never read emits nothing
        if let Some(dest_var) = data.dest_var {
            if ctx.vars[dest_var].uses.is_empty() {
                return Ok(());
            }
        }

        let spec = ctx.instr_op(name, args, ops)?;
        let var_ids = Self::arg_var_ids(args, data);

        let mut arg_strs = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            arg_strs.push(self.arg_to_str(ctx, arg, var_ids[i])?);
        }

        let dest_loc = match data.dest_var {
            Some(dest_var) => self.var_loc(ctx, dest_var, true)?,
            None => Loc::default(),
        };

        (spec.emit)(&mut self.body, &dest_loc, &arg_strs);

        Ok(())
    }

    fn gen_proc_body(
        &mut self,
        proc: &Procedure,
        ctx: &ProcContext,
        ops: &OpTable,
        proc_index: usize,
    ) -> Result<(), CompileError> {
        for pos in 0..proc.instrs.len() {
            let instr = &proc.instrs[pos];

            if instr.removed {
                continue;
            }

            let is_final = pos + 1 == proc.instrs.len();

            match &instr.kind {
                InstrKind::Op { name, args, .. } => {
                    let data = ctx.data(instr.index);
                    self.gen_op(ctx, ops, name, args, data)?;
                }

                InstrKind::Call { callee_name, args, .. } => {
                    let data = ctx.data(instr.index);
                    let offset = self.gen_call_params(ctx, args, data)?;

                    self.body.ins(&format!("call ${}", callee_name));

                    if offset > 0 {
                        self.body.ins(&format!("add rsp,{}", offset));
                    }
                }

                InstrKind::CallAssign { callee_name, args, .. } => {
                    let data = ctx.data(instr.index);
                    let offset = self.gen_call_params(ctx, args, data)?;

                    self.body.ins(&format!("call ${}", callee_name));

                    if offset > 0 {
                        self.body.ins(&format!("add rsp,{}", offset));
                    }

                    let dest_var = data.dest_var.ok_or_else(|| CompileError::StructuralError {
                        reason: format!("Call to `{}` has no destination", callee_name),
                    })?;

                    if !ctx.vars[dest_var].uses.is_empty() {
                        let dest_loc = self.var_loc(ctx, dest_var, true)?;
                        self.body.ins(&format!("mov {},rax", dest_loc.text));
                    }
                }

                InstrKind::Return => {
                    if proc.ret_val_kind != ValueKind::Unit {
                        return Err(CompileError::TypeError {
                            reason: "Wrong return value kind".to_string(),
                        });
                    }

                    if !is_final {
                        self.found_return = true;
                        self.body.ins(&format!("jmp p{}.end", proc_index));
                    }
                }

                InstrKind::ReturnValue { arg } => {
                    if proc.ret_val_kind != ctx.arg_kind(arg)? {
                        return Err(CompileError::TypeError {
                            reason: "Wrong return value kind".to_string(),
                        });
                    }

                    let data = ctx.data(instr.index);
                    let var_id = match arg {
                        Arg::Var(_) => data.arg_vars.first().copied(),
                        Arg::Value(_) => None,
                    };
                    let ret_val = self.arg_to_str(ctx, arg, var_id)?;

                    self.body.ins(&format!("mov rax,{}", ret_val));

                    if !is_final {
                        self.found_return = true;
                        self.body.ins(&format!("jmp p{}.end", proc_index));
                    }
                }

                InstrKind::Jump { label_name } => {
                    self.body.ins(&format!("jmp p{}{}", proc_index, label_name));
                }

                InstrKind::CondJump { rel_op, arg0, arg1, label_name } => {
                    let data = ctx.data(instr.index);
                    let var_ids = Self::arg_var_ids(
                        &[arg0.clone(), arg1.clone()],
                        data,
                    );

                    let mut arg0_str = self.arg_to_str(ctx, arg0, var_ids[0])?;
                    let arg1_str = self.arg_to_str(ctx, arg1, var_ids[1])?;

                    // cmp takes at most one memory operand
                    let both_on_stack = var_ids[0].is_some_and(|var_id| {
                        self.var_locs[var_id]
                            .as_ref()
                            .is_some_and(|loc| loc.kind == LocKind::Stack)
                    }) && var_ids[1].is_some_and(|var_id| {
                        self.var_locs[var_id]
                            .as_ref()
                            .is_some_and(|loc| loc.kind == LocKind::Stack)
                    });

                    if both_on_stack {
                        self.body.ins(&format!("mov rax,{}", arg0_str));
                        arg0_str = "rax".to_string();
                    }

                    self.body.ins(&format!("cmp {},{}", arg0_str, arg1_str));
                    self.body.ins(&format!(
                        "{} p{}{}",
                        cond_jump_mnemonic(*rel_op),
                        proc_index,
                        label_name
                    ));
                }

                InstrKind::Label { name } => {
                    self.body.raw(&format!(" p{}{}:\n", proc_index, name));
                }

                InstrKind::Alloc { size, .. } => {
                    let data = ctx.data(instr.index);
                    let dest_var = data.dest_var.ok_or_else(|| CompileError::StructuralError {
                        reason: "Stack allocation has no destination".to_string(),
                    })?;

                    let dest_loc = self.var_loc(ctx, dest_var, true)?;

                    // the buffer outlives every pointer into it
                    let offset = self.stack.alloc(
                        *size,
                        ctx.vars[dest_var].begin_index,
                        u32::MAX,
                    );

                    self.body.ins(&format!("lea {},[rbp-{}]", dest_loc.text, offset));
                }
            }
        }

        Ok(())
    }
}

/// Lowers the checked, contextualized program to x86-64 assembly text.
pub fn generate(program: &Program) -> Result<String, CompileError> {
    let ops = OpTable::for_target(program.target);
    let mut asm = Asm::new();

    platform::begin_program_wrap(&mut asm, program);

    for (proc_index, proc) in program.procs.iter().enumerate() {
        if !proc.is_used {
            continue;
        }

        let ctx = proc.ctx.as_ref().ok_or_else(|| CompileError::StructuralError {
            reason: format!("Procedure `{}` has no context", proc.name),
        })?;

        let mut proc_gen = ProcGen::new(ctx.vars.len());
        proc_gen.set_var_locs(proc, ctx)?;
        proc_gen.gen_proc_body(proc, ctx, &ops, proc_index)?;

        asm.raw(&format!("${}:\n", proc.name));

        for kind in [ValueKind::Unit, ValueKind::S64] {
            let regs = reg_names(kind);
            let max = (proc_gen.max_mem_units_used[kind.index()] as usize).min(regs.len());

            for reg in &regs[..max] {
                asm.ins(&format!("push {}", reg));
            }
        }

        if proc_gen.stack.max_size > 0 {
            asm.ins("push rbp");
            asm.ins("mov rbp,rsp");
            asm.ins(&format!("sub rsp,{}", proc_gen.stack.max_size));
        }

        asm.raw(proc_gen.body.as_str());

        if proc_gen.found_return {
            asm.raw(&format!(" p{}.end:\n", proc_index));
        }

        if proc_gen.stack.max_size > 0 {
            asm.ins("leave");
        }

        for kind in [ValueKind::S64, ValueKind::Unit] {
            let regs = reg_names(kind);
            let max = (proc_gen.max_mem_units_used[kind.index()] as usize).min(regs.len());

            for reg in regs[..max].iter().rev() {
                asm.ins(&format!("pop {}", reg));
            }
        }

        asm.ins("ret");
    }

    if !program.static_data.is_empty() {
        asm.raw("section .data\n");

        for segment in &program.static_data {
            let bytes = segment
                .data
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(",");
            asm.raw(&format!("{}: db {}\n", segment.name, bytes));
        }
    }

    Ok(asm.into_string())
}
