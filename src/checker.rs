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

use std::collections::HashMap;

use crate::errors::CompileError;
use crate::ir::{InstrKind, ProcId, Program, ValueKind};

/// Pass 1: resolve symbolic references and mark reachable procedures.
///
/// Callees are attached by first occurrence of the name, jump targets are
/// resolved within the enclosing procedure, and duplicate or reserved
/// definitions are rejected. Reachability is seeded at the entry
/// procedure and iterated to a fixpoint, so calls may point backwards.
pub fn check(program: &mut Program) -> Result<(), CompileError> {
    let reserved_procs = program.target.reserved_procs();

    let mut proc_ids: HashMap<String, ProcId> = HashMap::new();
    for (proc_id, proc) in program.procs.iter().enumerate() {
        if reserved_procs.contains(&proc.name.as_str()) {
            return Err(CompileError::DefinitionError {
                reason: format!(
                    "Cannot define `{}` procedure, because it is reserved",
                    proc.name
                ),
            });
        }

        if proc_ids.contains_key(&proc.name) {
            return Err(CompileError::DefinitionError {
                reason: format!(
                    "Cannot define `{}` procedure, because it was already defined",
                    proc.name
                ),
            });
        }

        proc_ids.insert(proc.name.clone(), proc_id);
    }

    for proc in program.procs.iter_mut() {
        let mut label_names: Vec<String> = Vec::new();
        for instr in &proc.instrs {
            if let InstrKind::Label { name } = &instr.kind {
                if label_names.contains(name) {
                    return Err(CompileError::DefinitionError {
                        reason: format!("Label `{}` was redefined", name),
                    });
                }
                label_names.push(name.clone());
            }
        }

        let mut has_callee = false;
        for instr in proc.instrs.iter_mut() {
            match &mut instr.kind {
                InstrKind::Call { callee_name, callee, .. }
                | InstrKind::CallAssign { callee_name, callee, .. } => {
                    let callee_id = proc_ids.get(callee_name.as_str()).ok_or_else(|| {
                        CompileError::ResolutionError {
                            reason: format!(
                                "Procedure `{}` with such signature was not found",
                                callee_name
                            ),
                        }
                    })?;

                    *callee = Some(*callee_id);
                    has_callee = true;
                }

                InstrKind::Jump { label_name } | InstrKind::CondJump { label_name, .. } => {
                    if !label_names.contains(label_name) {
                        return Err(CompileError::ResolutionError {
                            reason: format!("Label `{}` was not found", label_name),
                        });
                    }
                }

                _ => {}
            }
        }

        if has_callee {
            proc.has_callee = true;
        }
    }

    mark_used_procs(program);

    Ok(())
}

fn mark_used_procs(program: &mut Program) {
    if let Some(entry) = program.procs.first_mut() {
        entry.is_used = true;
    }

    let callees: Vec<Vec<ProcId>> = program
        .procs
        .iter()
        .map(|proc| {
            proc.instrs
                .iter()
                .filter_map(|instr| match &instr.kind {
                    InstrKind::Call { callee, .. } | InstrKind::CallAssign { callee, .. } => *callee,
                    _ => None,
                })
                .collect()
        })
        .collect();

    loop {
        let mut changed = false;

        for proc_id in 0..program.procs.len() {
            if !program.procs[proc_id].is_used {
                continue;
            }

            for &callee in &callees[proc_id] {
                if !program.procs[callee].is_used {
                    program.procs[callee].is_used = true;
                    changed = true;
                }
            }
        }

        if !changed {
            break;
        }
    }
}

/// Pass 2: kind checking over a resolved program with built contexts.
pub fn type_check(program: &Program) -> Result<(), CompileError> {
    if let Some(entry) = program.procs.first() {
        if entry.params.len() > 2 {
            return Err(CompileError::TypeError {
                reason: format!("`{}` procedure should have 0-2 parameters", entry.name),
            });
        }

        if entry.params.first().is_some_and(|param| param.kind != ValueKind::S64) {
            return Err(CompileError::TypeError {
                reason: format!(
                    "First parameter of `{}` procedure should be an integer",
                    entry.name
                ),
            });
        }

        if entry.params.get(1).is_some_and(|param| param.kind != ValueKind::S64) {
            return Err(CompileError::TypeError {
                reason: format!(
                    "Second parameter of `{}` procedure should be an integer",
                    entry.name
                ),
            });
        }
    }

    for proc in &program.procs {
        let ctx = proc.ctx.as_ref().ok_or_else(|| CompileError::StructuralError {
            reason: format!("Procedure `{}` has no context", proc.name),
        })?;

        let mut found_return = false;

        for instr in &proc.instrs {
            match &instr.kind {
                InstrKind::Call { callee_name, args, callee }
                | InstrKind::CallAssign { callee_name, args, callee, .. } => {
                    let callee = callee.ok_or_else(|| CompileError::ResolutionError {
                        reason: format!(
                            "Procedure `{}` with such signature was not found",
                            callee_name
                        ),
                    })?;
                    let params = &program.procs[callee].params;

                    if params.len() != args.len() {
                        return Err(CompileError::TypeError {
                            reason: format!(
                                "Expected {}, but got {} parameters for `{}` procedure",
                                params.len(),
                                args.len(),
                                callee_name
                            ),
                        });
                    }

                    for (i, (arg, param)) in args.iter().zip(params).enumerate() {
                        if ctx.arg_kind(arg)? != param.kind {
                            return Err(CompileError::TypeError {
                                reason: format!(
                                    "Unexpected type of parameter {} of `{}` procedure",
                                    i + 1,
                                    callee_name
                                ),
                            });
                        }
                    }
                }

                InstrKind::Return => {
                    if proc.ret_val_kind != ValueKind::Unit {
                        return Err(CompileError::TypeError {
                            reason: "Non-unit procedure should return something".to_string(),
                        });
                    }

                    found_return = true;
                }

                InstrKind::ReturnValue { arg } => {
                    if proc.ret_val_kind != ctx.arg_kind(arg)? {
                        return Err(CompileError::TypeError {
                            reason: "Wrong return value kind".to_string(),
                        });
                    }

                    found_return = true;
                }

                _ => {}
            }
        }

        if !found_return && proc.ret_val_kind != ValueKind::Unit {
            return Err(CompileError::TypeError {
                reason: "Non-unit procedure should return something".to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ensure_contexts;
    use crate::ir::{Arg, Procedure, ProcParam, TargetPlatform, Value};

    fn s64_param(name: &str) -> ProcParam {
        ProcParam { name: name.to_string(), kind: ValueKind::S64 }
    }

    #[test]
    fn test_duplicate_procedure_rejected() {
        let mut program = Program::new(TargetPlatform::RawX86_64);
        program.push_proc("f", ValueKind::Unit, vec![]).unwrap();
        program.push_proc("f", ValueKind::Unit, vec![]).unwrap();

        assert!(matches!(
            check(&mut program),
            Err(CompileError::DefinitionError { .. })
        ));
    }

    #[test]
    fn test_reserved_procedure_rejected() {
        let mut program = Program::new(TargetPlatform::LinuxX86_64);
        // pushed behind the builder's back to exercise the checker
        program.procs.push(Procedure {
            name: "_start".to_string(),
            ret_val_kind: ValueKind::Unit,
            params: vec![],
            instrs: vec![],
            ctx: None,
            is_used: false,
            has_callee: false,
        });

        assert!(matches!(
            check(&mut program),
            Err(CompileError::DefinitionError { .. })
        ));
    }

    #[test]
    fn test_unknown_callee_rejected() {
        let mut program = Program::new(TargetPlatform::RawX86_64);
        let proc = program.push_proc("main", ValueKind::Unit, vec![]).unwrap();
        proc.push_call("ghost", vec![]);

        assert!(matches!(
            check(&mut program),
            Err(CompileError::ResolutionError { .. })
        ));
    }

    #[test]
    fn test_unknown_label_rejected() {
        let mut program = Program::new(TargetPlatform::RawX86_64);
        let proc = program.push_proc("main", ValueKind::Unit, vec![]).unwrap();
        proc.push_jump("nowhere");

        assert!(matches!(
            check(&mut program),
            Err(CompileError::ResolutionError { .. })
        ));
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let mut program = Program::new(TargetPlatform::RawX86_64);
        let proc = program.push_proc("main", ValueKind::Unit, vec![]).unwrap();
        proc.add_label("here").unwrap();
        proc.add_label("here").unwrap();

        assert!(matches!(
            check(&mut program),
            Err(CompileError::DefinitionError { .. })
        ));
    }

    #[test]
    fn test_reachability_iterates_to_fixpoint() {
        // `helper` only becomes used through `late`, which is declared
        // after it; a single forward pass would miss `leaf`.
        let mut program = Program::new(TargetPlatform::RawX86_64);

        let main = program.push_proc("main", ValueKind::Unit, vec![]).unwrap();
        main.push_call("late", vec![]);

        let helper = program.push_proc("helper", ValueKind::Unit, vec![]).unwrap();
        helper.push_call("leaf", vec![]);

        let late = program.push_proc("late", ValueKind::Unit, vec![]).unwrap();
        late.push_call("helper", vec![]);

        program.push_proc("leaf", ValueKind::Unit, vec![]).unwrap();
        program.push_proc("dead", ValueKind::Unit, vec![]).unwrap();

        check(&mut program).unwrap();

        assert!(program.procs[0].is_used);
        assert!(program.procs[1].is_used);
        assert!(program.procs[2].is_used);
        assert!(program.procs[3].is_used);
        assert!(!program.procs[4].is_used);
    }

    #[test]
    fn test_call_arity_mismatch_rejected() {
        let mut program = Program::new(TargetPlatform::RawX86_64);
        let main = program.push_proc("main", ValueKind::Unit, vec![]).unwrap();
        main.push_call("id", vec![]);
        program
            .push_proc("id", ValueKind::Unit, vec![s64_param("x")])
            .unwrap();

        check(&mut program).unwrap();
        ensure_contexts(&mut program).unwrap();

        assert!(matches!(
            type_check(&program),
            Err(CompileError::TypeError { .. })
        ));
    }

    #[test]
    fn test_return_in_non_unit_procedure_rejected() {
        let mut program = Program::new(TargetPlatform::RawX86_64);
        let main = program.push_proc("main", ValueKind::S64, vec![]).unwrap();
        main.push_return();
        main.push_return_value(Arg::Value(Value::S64(0)));

        check(&mut program).unwrap();
        ensure_contexts(&mut program).unwrap();

        assert!(matches!(
            type_check(&program),
            Err(CompileError::TypeError { .. })
        ));
    }

    #[test]
    fn test_wrong_return_value_kind_rejected() {
        let mut program = Program::new(TargetPlatform::RawX86_64);
        let main = program.push_proc("main", ValueKind::Unit, vec![]).unwrap();
        main.push_return_value(Arg::Value(Value::S64(1)));

        check(&mut program).unwrap();
        ensure_contexts(&mut program).unwrap();

        assert!(matches!(
            type_check(&program),
            Err(CompileError::TypeError { .. })
        ));
    }

    #[test]
    fn test_entry_procedure_signature_limits() {
        let mut program = Program::new(TargetPlatform::RawX86_64);
        program
            .push_proc(
                "main",
                ValueKind::Unit,
                vec![s64_param("a"), s64_param("b"), s64_param("c")],
            )
            .unwrap();

        check(&mut program).unwrap();
        ensure_contexts(&mut program).unwrap();

        assert!(matches!(
            type_check(&program),
            Err(CompileError::TypeError { .. })
        ));
    }
}
