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

pub mod linux;
pub mod x86_64;

use crate::codegen::{Asm, Loc};
use crate::errors::CompileError;
use crate::ir::{TargetPlatform, ValueKind};

// Placement constraint of a single operation argument. `Any` accepts a
// literal value or a variable; `Var` requires a variable; `RefTarget`
// additionally pins the referenced variable to the stack so its address
// stays stable.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArgCondition {
    Any = 0,
    Var,
    RefTarget,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OpArg {
    pub kind: ValueKind,
    pub cond: ArgCondition,
}

#[derive(Debug, Copy, Clone)]
pub struct OpDesc {
    pub name: &'static str,
    pub dest_kind: ValueKind,
    pub args: &'static [OpArg],
    pub can_be_inlined: bool,
}

impl OpDesc {
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

pub type GenFn = fn(&mut Asm, &Loc, &[String]);

// An operation descriptor and its emission callback. Pairing the two in
// one struct keeps the descriptor/generator tables aligned by
// construction.
pub struct OpSpec {
    pub desc: OpDesc,
    pub emit: GenFn,
}

pub struct OpTable {
    specs: Vec<&'static OpSpec>,
}

impl OpTable {
    pub fn for_target(target: TargetPlatform) -> Self {
        let specs = match target {
            TargetPlatform::RawX86_64 => x86_64::OPS.iter().collect(),
            TargetPlatform::LinuxX86_64 => {
                linux::OPS.iter().chain(x86_64::OPS.iter()).collect()
            }
        };

        Self { specs }
    }

    /// Resolves an operation by name, arity and argument kinds.
    pub fn lookup(
        &self,
        name: &str,
        arg_kinds: &[ValueKind],
    ) -> Result<&'static OpSpec, CompileError> {
        for &spec in &self.specs {
            if spec.desc.name != name {
                continue;
            }

            if spec.desc.arity() != arg_kinds.len() {
                continue;
            }

            let kinds_match = spec
                .desc
                .args
                .iter()
                .zip(arg_kinds)
                .all(|(op_arg, kind)| op_arg.kind == *kind);

            if kinds_match {
                return Ok(spec);
            }
        }

        Err(CompileError::ResolutionError {
            reason: format!(
                "Operation `{}` with such signature was not found for current platform",
                name
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_and_arity() {
        let ops = OpTable::for_target(TargetPlatform::RawX86_64);

        let add = ops.lookup("add", &[ValueKind::S64, ValueKind::S64]).unwrap();
        assert_eq!(add.desc.dest_kind, ValueKind::S64);
        assert_eq!(add.desc.arity(), 2);

        assert!(ops.lookup("add", &[ValueKind::S64]).is_err());
        assert!(ops.lookup("nonsense", &[]).is_err());
    }

    #[test]
    fn test_linux_table_includes_both_op_sets() {
        let ops = OpTable::for_target(TargetPlatform::LinuxX86_64);

        assert!(ops.lookup("exit", &[ValueKind::S64]).is_ok());
        assert!(ops.lookup("put", &[ValueKind::S64]).is_ok());
    }

    #[test]
    fn test_syscall_ops_absent_on_raw_target() {
        let ops = OpTable::for_target(TargetPlatform::RawX86_64);
        assert!(ops.lookup("exit", &[ValueKind::S64]).is_err());
    }
}
