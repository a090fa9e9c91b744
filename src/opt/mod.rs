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

use crate::codegen::ops::{ArgCondition, OpSpec, OpTable};
use crate::errors::CompileError;
use crate::ir::{Arg, Instr, InstrKind, Procedure, Program, Value};

const BEGIN_LABEL: &str = ".begin";

/// Rewrites self-tail-calls into backward jumps to a `.begin` label
/// inserted once at the procedure head, so they grow no stack.
pub fn tail_recursion(proc: &mut Procedure) {
    let mut added_begin_label = false;

    let mut pos = 0;
    while pos < proc.instrs.len() {
        let is_self_call = matches!(
            &proc.instrs[pos].kind,
            InstrKind::Call { callee_name, .. } if *callee_name == proc.name
        );

        if !is_self_call {
            pos += 1;
            continue;
        }

        let followed_by_return = match proc.instrs.get(pos + 1) {
            None => true,
            Some(next) => matches!(
                next.kind,
                InstrKind::Return | InstrKind::ReturnValue { .. }
            ),
        };

        if !followed_by_return {
            pos += 1;
            continue;
        }

        if !added_begin_label {
            proc.instrs.insert(
                0,
                Instr::new(InstrKind::Label {
                    name: BEGIN_LABEL.to_string(),
                }),
            );
            added_begin_label = true;
            pos += 1;
        }

        proc.instrs[pos].kind = InstrKind::Jump {
            label_name: BEGIN_LABEL.to_string(),
        };

        pos += 1;
    }
}

// Most recent upstream definition of a variable, stopping at labels
// since they are control-flow join points.
fn last_var_def(instrs: &[Instr], pos: usize, var_name: &str) -> Option<usize> {
    for def_pos in (0..pos).rev() {
        match &instrs[def_pos].kind {
            InstrKind::Op { dest, .. } if dest == var_name => return Some(def_pos),
            InstrKind::Label { .. } => return None,
            _ => {}
        }
    }

    None
}

fn op_can_be_inlined(spec: &OpSpec) -> bool {
    spec.desc.arity() == 1
        && spec.desc.can_be_inlined
        && spec.desc.args[0].cond == ArgCondition::Any
}

/// Replaces `Any`-constrained variable arguments with the literal their
/// single-definition `put` carries, decrementing the definition's use
/// count so it becomes eligible for dead-store removal.
pub fn inline_args(proc: &mut Procedure, ops: &OpTable) -> Result<(), CompileError> {
    let Procedure { instrs, ctx, name, .. } = proc;
    let ctx = ctx.as_mut().ok_or_else(|| CompileError::StructuralError {
        reason: format!("Procedure `{}` has no context", name),
    })?;

    for pos in (0..instrs.len()).rev() {
        let arity = match &instrs[pos].kind {
            InstrKind::Op { args, .. } => args.len(),
            _ => continue,
        };

        for i in 0..arity {
            let mut replacement: Option<(usize, Value)> = None;

            if let InstrKind::Op { name, args, .. } = &instrs[pos].kind {
                let spec = ctx.instr_op(name, args, ops)?;

                if spec.desc.args[i].cond == ArgCondition::Any {
                    if let Arg::Var(var_name) = &args[i] {
                        if let Some(def_pos) = last_var_def(instrs, pos, var_name) {
                            let InstrKind::Op { name: def_name, args: def_args, .. } =
                                &instrs[def_pos].kind
                            else {
                                continue;
                            };

                            let def_spec = ctx.instr_op(def_name, def_args, ops)?;
                            if op_can_be_inlined(def_spec) {
                                if let Arg::Value(value) = &def_args[0] {
                                    replacement = Some((def_pos, *value));
                                }
                            }
                        }
                    }
                }
            }

            let Some((def_pos, value)) = replacement else {
                continue;
            };

            let def_index = instrs[def_pos].index;
            if let InstrKind::Op { args, .. } = &mut instrs[pos].kind {
                args[i] = Arg::Value(value);
            }

            if let Some(dest_var) = ctx.data(def_index).dest_var {
                ctx.vars[dest_var].uses.pop();
            }
        }
    }

    Ok(())
}

/// Marks `Op`s whose destination has no remaining uses as removed,
/// provided no operand slot carries a placement constraint.
pub fn remove_unused_var_defs(proc: &mut Procedure, ops: &OpTable) -> Result<(), CompileError> {
    let Procedure { instrs, ctx, name, .. } = proc;
    let ctx = ctx.as_ref().ok_or_else(|| CompileError::StructuralError {
        reason: format!("Procedure `{}` has no context", name),
    })?;

    for instr in instrs.iter_mut() {
        let removable = match &instr.kind {
            InstrKind::Op { name, args, .. } => {
                let dest_is_dead = ctx
                    .data(instr.index)
                    .dest_var
                    .is_some_and(|dest_var| ctx.vars[dest_var].uses.is_empty());

                if dest_is_dead {
                    let spec = ctx.instr_op(name, args, ops)?;
                    spec.desc
                        .args
                        .iter()
                        .all(|op_arg| op_arg.cond == ArgCondition::Any)
                } else {
                    false
                }
            }
            _ => false,
        };

        instr.removed = removable;
    }

    Ok(())
}

/// Runs the three optimization passes over every procedure.
pub fn optimize_procs(program: &mut Program) -> Result<(), CompileError> {
    let ops = OpTable::for_target(program.target);

    for proc in program.procs.iter_mut() {
        tail_recursion(proc);
        inline_args(proc, &ops)?;
        remove_unused_var_defs(proc, &ops)?;
    }

    Ok(())
}
