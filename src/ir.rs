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

use crate::errors::CompileError;

pub const VALUE_KIND_COUNT: usize = 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Unit = 0,
    S64,
}

impl ValueKind {
    /// Storage size in bytes.
    pub fn size(self) -> u32 {
        match self {
            ValueKind::Unit => 0,
            ValueKind::S64 => 8,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Value {
    Unit,
    S64(i64),
}

impl Value {
    pub fn kind(self) -> ValueKind {
        match self {
            Value::Unit => ValueKind::Unit,
            Value::S64(_) => ValueKind::S64,
        }
    }
}

// Represents all possible forms an argument to an instruction can take.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Value),
    Var(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RelOp {
    Equal = 0,
    NotEqual,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
}

/// Index of a procedure within `Program::procs`.
pub type ProcId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    Op {
        name: String,
        dest: String,
        args: Vec<Arg>,
    },
    Call {
        callee_name: String,
        args: Vec<Arg>,
        callee: Option<ProcId>,
    },
    CallAssign {
        dest: String,
        callee_name: String,
        args: Vec<Arg>,
        callee: Option<ProcId>,
    },
    Return,
    ReturnValue {
        arg: Arg,
    },
    Jump {
        label_name: String,
    },
    CondJump {
        rel_op: RelOp,
        arg0: Arg,
        arg1: Arg,
        label_name: String,
    },
    Label {
        name: String,
    },
    Alloc {
        dest: String,
        size: u32,
    },
}

// A single instruction of a procedure body. `index` is the position
// assigned when the procedure context is built; a label inserted at the
// head by the optimizer keeps index 0 and owns no per-instruction data.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub kind: InstrKind,
    pub index: u32,
    pub removed: bool,
}

impl Instr {
    pub fn new(kind: InstrKind) -> Self {
        Self {
            kind,
            index: 0,
            removed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcParam {
    pub name: String,
    pub kind: ValueKind,
}

#[derive(Debug)]
pub struct Procedure {
    pub name: String,
    pub ret_val_kind: ValueKind,
    pub params: Vec<ProcParam>,
    pub instrs: Vec<Instr>,
    pub ctx: Option<crate::context::ProcContext>,
    pub is_used: bool,
    pub has_callee: bool,
}

impl Procedure {
    pub fn push_op(&mut self, name: &str, dest: &str, args: Vec<Arg>) {
        self.instrs.push(Instr::new(InstrKind::Op {
            name: name.to_string(),
            dest: dest.to_string(),
            args,
        }));
    }

    pub fn push_call(&mut self, callee_name: &str, args: Vec<Arg>) {
        self.instrs.push(Instr::new(InstrKind::Call {
            callee_name: callee_name.to_string(),
            args,
            callee: None,
        }));
    }

    pub fn push_call_assign(&mut self, dest: &str, callee_name: &str, args: Vec<Arg>) {
        self.instrs.push(Instr::new(InstrKind::CallAssign {
            dest: dest.to_string(),
            callee_name: callee_name.to_string(),
            args,
            callee: None,
        }));
    }

    pub fn push_return(&mut self) {
        self.instrs.push(Instr::new(InstrKind::Return));
    }

    pub fn push_return_value(&mut self, arg: Arg) {
        self.instrs.push(Instr::new(InstrKind::ReturnValue { arg }));
    }

    pub fn push_jump(&mut self, label_name: &str) {
        self.instrs.push(Instr::new(InstrKind::Jump {
            label_name: label_name.to_string(),
        }));
    }

    pub fn push_cond_jump(&mut self, rel_op: RelOp, arg0: Arg, arg1: Arg, label_name: &str) {
        self.instrs.push(Instr::new(InstrKind::CondJump {
            rel_op,
            arg0,
            arg1,
            label_name: label_name.to_string(),
        }));
    }

    pub fn add_label(&mut self, name: &str) -> Result<(), CompileError> {
        check_symbol_name(name, "Label")?;

        self.instrs.push(Instr::new(InstrKind::Label {
            name: name.to_string(),
        }));

        Ok(())
    }

    pub fn push_alloc(&mut self, dest: &str, size: u32) {
        self.instrs.push(Instr::new(InstrKind::Alloc {
            dest: dest.to_string(),
            size,
        }));
    }
}

// A named byte buffer emitted into the program's data section.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticSegment {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TargetPlatform {
    RawX86_64 = 0,
    LinuxX86_64,
}

impl TargetPlatform {
    // Procedure names the target claims for itself.
    pub fn reserved_procs(self) -> &'static [&'static str] {
        match self {
            TargetPlatform::RawX86_64 => &[],
            TargetPlatform::LinuxX86_64 => &["_start"],
        }
    }
}

// The program under construction. Procedures and static segments are
// appended in declaration order; the first procedure is the entry point.
#[derive(Debug)]
pub struct Program {
    pub target: TargetPlatform,
    pub procs: Vec<Procedure>,
    pub static_data: Vec<StaticSegment>,
}

impl Program {
    pub fn new(target: TargetPlatform) -> Self {
        Self {
            target,
            procs: Vec::new(),
            static_data: Vec::new(),
        }
    }

    pub fn push_proc(
        &mut self,
        name: &str,
        ret_val_kind: ValueKind,
        params: Vec<ProcParam>,
    ) -> Result<&mut Procedure, CompileError> {
        check_symbol_name(name, "Procedure")?;

        if self.target.reserved_procs().contains(&name) {
            return Err(CompileError::DefinitionError {
                reason: format!("Cannot define `{}` procedure, because it is reserved", name),
            });
        }

        self.procs.push(Procedure {
            name: name.to_string(),
            ret_val_kind,
            params,
            instrs: Vec::new(),
            ctx: None,
            is_used: false,
            has_callee: false,
        });

        Ok(self.procs.last_mut().expect("just pushed"))
    }

    pub fn push_static_var(&mut self, name: &str, value: Value) -> Result<(), CompileError> {
        check_symbol_name(name, "Static variable")?;

        let data = match value {
            Value::Unit => Vec::new(),
            Value::S64(v) => v.to_le_bytes().to_vec(),
        };

        self.static_data.push(StaticSegment {
            name: name.to_string(),
            data,
        });

        Ok(())
    }

    pub fn push_static_segment(&mut self, name: &str, data: Vec<u8>) -> Result<(), CompileError> {
        check_symbol_name(name, "Static segment")?;

        self.static_data.push(StaticSegment {
            name: name.to_string(),
            data,
        });

        Ok(())
    }
}

fn check_symbol_name(name: &str, what: &str) -> Result<(), CompileError> {
    if name.is_empty() {
        return Err(CompileError::DefinitionError {
            reason: format!("{} name should not be empty", what),
        });
    }

    if name.starts_with('.') {
        return Err(CompileError::DefinitionError {
            reason: format!("{} name should not start with a dot", what),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_proc_rejects_dot_name() {
        let mut program = Program::new(TargetPlatform::RawX86_64);
        assert!(program.push_proc(".hidden", ValueKind::Unit, vec![]).is_err());
    }

    #[test]
    fn test_push_proc_rejects_reserved_name() {
        let mut program = Program::new(TargetPlatform::LinuxX86_64);
        assert!(program.push_proc("_start", ValueKind::Unit, vec![]).is_err());

        // raw target reserves nothing
        let mut raw = Program::new(TargetPlatform::RawX86_64);
        assert!(raw.push_proc("_start", ValueKind::Unit, vec![]).is_ok());
    }

    #[test]
    fn test_add_label_rejects_bad_names() {
        let mut program = Program::new(TargetPlatform::RawX86_64);
        let proc = program.push_proc("main", ValueKind::Unit, vec![]).unwrap();
        assert!(proc.add_label("").is_err());
        assert!(proc.add_label(".begin").is_err());
        assert!(proc.add_label("loop").is_ok());
    }

    #[test]
    fn test_push_static_var_encodes_value() {
        let mut program = Program::new(TargetPlatform::RawX86_64);
        program.push_static_var("counter", Value::S64(1)).unwrap();
        assert_eq!(program.static_data[0].data.len(), 8);
        assert_eq!(program.static_data[0].data[0], 1);
    }
}
