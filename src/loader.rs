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

//! Program descriptions: a JSON serialization of the builder API, used
//! by the command-line front so programs can be compiled without the
//! source-language front-end.

use serde::Deserialize;

use crate::errors::CompileError;
use crate::ir::{Arg, ProcParam, Program, RelOp, TargetPlatform, Value, ValueKind};

#[derive(Debug, Copy, Clone, Deserialize)]
pub enum TargetDesc {
    #[serde(rename = "raw_x86_64")]
    RawX86_64,
    #[serde(rename = "linux_x86_64")]
    LinuxX86_64,
}

impl From<TargetDesc> for TargetPlatform {
    fn from(desc: TargetDesc) -> Self {
        match desc {
            TargetDesc::RawX86_64 => TargetPlatform::RawX86_64,
            TargetDesc::LinuxX86_64 => TargetPlatform::LinuxX86_64,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindDesc {
    #[default]
    Unit,
    S64,
}

impl From<KindDesc> for ValueKind {
    fn from(desc: KindDesc) -> Self {
        match desc {
            KindDesc::Unit => ValueKind::Unit,
            KindDesc::S64 => ValueKind::S64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgDesc {
    S64(i64),
    Var(String),
}

impl From<ArgDesc> for Arg {
    fn from(desc: ArgDesc) -> Self {
        match desc {
            ArgDesc::S64(value) => Arg::Value(Value::S64(value)),
            ArgDesc::Var(name) => Arg::Var(name),
        }
    }
}

#[derive(Debug, Copy, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelOpDesc {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl From<RelOpDesc> for RelOp {
    fn from(desc: RelOpDesc) -> Self {
        match desc {
            RelOpDesc::Eq => RelOp::Equal,
            RelOpDesc::Ne => RelOp::NotEqual,
            RelOpDesc::Gt => RelOp::Greater,
            RelOpDesc::Lt => RelOp::Less,
            RelOpDesc::Ge => RelOp::GreaterOrEqual,
            RelOpDesc::Le => RelOp::LessOrEqual,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrDesc {
    Op {
        name: String,
        #[serde(default)]
        dest: String,
        #[serde(default)]
        args: Vec<ArgDesc>,
    },
    Call {
        callee: String,
        #[serde(default)]
        args: Vec<ArgDesc>,
    },
    CallAssign {
        dest: String,
        callee: String,
        #[serde(default)]
        args: Vec<ArgDesc>,
    },
    Ret,
    RetValue {
        arg: ArgDesc,
    },
    Jump {
        label: String,
    },
    CondJump {
        rel: RelOpDesc,
        arg0: ArgDesc,
        arg1: ArgDesc,
        label: String,
    },
    Label {
        name: String,
    },
    Alloc {
        dest: String,
        size: u32,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParamDesc {
    pub name: String,
    pub kind: KindDesc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticDesc {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcDesc {
    pub name: String,
    #[serde(default)]
    pub ret: KindDesc,
    #[serde(default)]
    pub params: Vec<ParamDesc>,
    #[serde(default)]
    pub body: Vec<InstrDesc>,
}

#[derive(Debug, Deserialize)]
pub struct ProgramDesc {
    pub target: TargetDesc,
    #[serde(default)]
    pub statics: Vec<StaticDesc>,
    #[serde(default)]
    pub procs: Vec<ProcDesc>,
}

fn convert_args(args: Vec<ArgDesc>) -> Vec<Arg> {
    args.into_iter().map(Arg::from).collect()
}

/// Replays a parsed description through the builder API, so loaded
/// programs obey every builder contract.
pub fn load_program(description: &str) -> Result<Program, CompileError> {
    let desc: ProgramDesc = serde_json::from_str(description)?;

    let mut program = Program::new(desc.target.into());

    for segment in desc.statics {
        program.push_static_segment(&segment.name, segment.bytes)?;
    }

    for proc_desc in desc.procs {
        let params = proc_desc
            .params
            .into_iter()
            .map(|param| ProcParam {
                name: param.name,
                kind: param.kind.into(),
            })
            .collect();

        let proc = program.push_proc(&proc_desc.name, proc_desc.ret.into(), params)?;

        for instr in proc_desc.body {
            match instr {
                InstrDesc::Op { name, dest, args } => {
                    proc.push_op(&name, &dest, convert_args(args));
                }
                InstrDesc::Call { callee, args } => {
                    proc.push_call(&callee, convert_args(args));
                }
                InstrDesc::CallAssign { dest, callee, args } => {
                    proc.push_call_assign(&dest, &callee, convert_args(args));
                }
                InstrDesc::Ret => proc.push_return(),
                InstrDesc::RetValue { arg } => proc.push_return_value(arg.into()),
                InstrDesc::Jump { label } => proc.push_jump(&label),
                InstrDesc::CondJump { rel, arg0, arg1, label } => {
                    proc.push_cond_jump(rel.into(), arg0.into(), arg1.into(), &label);
                }
                InstrDesc::Label { name } => proc.add_label(&name)?,
                InstrDesc::Alloc { dest, size } => proc.push_alloc(&dest, size),
            }
        }
    }

    Ok(program)
}
