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

use crate::codegen::{Asm, Loc, LocKind};
use crate::ir::ValueKind;

use super::{ArgCondition, OpArg, OpDesc, OpSpec};

fn arg_is_on_stack(arg: &str) -> bool {
    arg.ends_with(']')
}

// An argument is an immediate when it is neither a register name nor a
// memory operand.
fn arg_is_immediate(arg: &str) -> bool {
    arg.starts_with(|c: char| c.is_ascii_digit() || c == '-') && !arg.ends_with(']')
}

// Stages the destination through rax when it lives on the stack, so
// two-operand instructions never see two memory operands.
fn reserve_reg_loc(asm: &mut Asm, dest_loc: &Loc, arg: &str) -> String {
    let reserved = match dest_loc.kind {
        LocKind::Stack => "rax".to_string(),
        LocKind::Reg => dest_loc.text.clone(),
    };

    if reserved != arg {
        asm.ins(&format!("mov {},{}", reserved, arg));
    }

    reserved
}

fn free_reserved_loc(asm: &mut Asm, reserved: &str, prev: &str) {
    if reserved != prev {
        asm.ins(&format!("mov {},{}", prev, reserved));
    }
}

fn gen_comparison_op(asm: &mut Asm, dest_loc: &Loc, arg0: &str, arg1: &str, cc: &str) {
    let mut arg0 = arg0;

    if arg_is_on_stack(arg0) && arg_is_on_stack(arg1) {
        asm.ins(&format!("mov rax,{}", arg0));
        arg0 = "rax";
    }

    asm.ins(&format!("cmp {},{}", arg0, arg1));
    asm.ins(&format!("set{} al", cc));

    if arg_is_on_stack(&dest_loc.text) {
        asm.ins("movzx rax,al");
        asm.ins(&format!("mov {},rax", dest_loc.text));
    } else {
        asm.ins(&format!("movzx {},al", dest_loc.text));
    }
}

fn gen_put_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    if dest_loc.text != args[0] {
        asm.ins(&format!("mov {},{}", dest_loc.text, args[0]));
    }
}

fn gen_add_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    let dest_reg = reserve_reg_loc(asm, dest_loc, &args[0]);
    asm.ins(&format!("add {},{}", dest_reg, args[1]));
    free_reserved_loc(asm, &dest_reg, &dest_loc.text);
}

fn gen_sub_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    let dest_reg = reserve_reg_loc(asm, dest_loc, &args[0]);
    asm.ins(&format!("sub {},{}", dest_reg, args[1]));
    free_reserved_loc(asm, &dest_reg, &dest_loc.text);
}

// imul/idiv take no immediate of this form, so a literal second operand
// is staged through r10 first.
fn gen_mul_div_operand(asm: &mut Asm, arg: &str) -> String {
    if arg_is_immediate(arg) {
        asm.ins(&format!("mov r10,{}", arg));
        "r10".to_string()
    } else {
        arg.to_string()
    }
}

fn gen_mul_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    let rhs = gen_mul_div_operand(asm, &args[1]);
    asm.ins(&format!("mov rax,{}", args[0]));
    asm.ins(&format!("imul {}", rhs));
    asm.ins(&format!("mov {},rax", dest_loc.text));
}

fn gen_div_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    let rhs = gen_mul_div_operand(asm, &args[1]);
    asm.ins(&format!("mov rax,{}", args[0]));
    asm.ins("cdq");
    asm.ins(&format!("idiv {}", rhs));
    asm.ins(&format!("mov {},rax", dest_loc.text));
}

fn gen_mod_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    let rhs = gen_mul_div_operand(asm, &args[1]);
    asm.ins(&format!("mov rax,{}", args[0]));
    asm.ins("cdq");
    asm.ins(&format!("idiv {}", rhs));
    asm.ins(&format!("mov {},rdx", dest_loc.text));
}

fn gen_neg_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    let dest_reg = reserve_reg_loc(asm, dest_loc, &args[0]);
    asm.ins(&format!("neg {}", dest_reg));
    free_reserved_loc(asm, &dest_reg, &dest_loc.text);
}

fn gen_eq_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    gen_comparison_op(asm, dest_loc, &args[0], &args[1], "e");
}

fn gen_ne_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    gen_comparison_op(asm, dest_loc, &args[0], &args[1], "ne");
}

fn gen_gt_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    gen_comparison_op(asm, dest_loc, &args[0], &args[1], "g");
}

fn gen_ls_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    gen_comparison_op(asm, dest_loc, &args[0], &args[1], "l");
}

fn gen_ge_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    gen_comparison_op(asm, dest_loc, &args[0], &args[1], "ge");
}

fn gen_le_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    gen_comparison_op(asm, dest_loc, &args[0], &args[1], "le");
}

fn gen_ref_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    let dest_is_on_stack = arg_is_on_stack(&dest_loc.text);

    let lea_dest = if dest_is_on_stack { "rax" } else { &dest_loc.text };
    asm.ins(&format!("lea {},{}", lea_dest, args[0]));

    if dest_is_on_stack {
        asm.ins(&format!("mov {},rax", dest_loc.text));
    }
}

fn gen_deref_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    let dest_is_on_stack = arg_is_on_stack(&dest_loc.text);
    let ptr_is_on_stack = arg_is_on_stack(&args[0]);

    if ptr_is_on_stack {
        asm.ins(&format!("mov rax,{}", args[0]));
    }

    let dest = if dest_is_on_stack { "rax" } else { &dest_loc.text };
    let ptr = if ptr_is_on_stack { "rax" } else { &args[0] };
    asm.ins(&format!("mov {},qword[{}]", dest, ptr));

    if dest_is_on_stack {
        asm.ins(&format!("mov {},rax", dest_loc.text));
    }
}

fn gen_deref_str_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    let ptr_is_on_stack = arg_is_on_stack(&args[0]);

    if ptr_is_on_stack {
        asm.ins(&format!("mov rax,{}", args[0]));
    }

    let ptr = if ptr_is_on_stack { "rax" } else { &args[0] };
    asm.ins(&format!("movzx rax,byte[{}]", ptr));

    if dest_loc.text != "rax" {
        asm.ins(&format!("mov {},rax", dest_loc.text));
    }
}

fn gen_deref_put_op(asm: &mut Asm, _dest_loc: &Loc, args: &[String]) {
    let mut ptr = args[0].as_str();
    let mut value = args[1].as_str();

    if arg_is_on_stack(ptr) {
        asm.ins(&format!("mov rax,{}", ptr));
        ptr = "rax";
    }

    if arg_is_on_stack(value) {
        asm.ins(&format!("mov r10,{}", value));
        value = "r10";
    }

    asm.ins(&format!("mov qword[{}],{}", ptr, value));
}

fn gen_deref_put_str_op(asm: &mut Asm, _dest_loc: &Loc, args: &[String]) {
    let mut ptr = args[0].as_str();

    if arg_is_on_stack(ptr) {
        asm.ins(&format!("mov rax,{}", ptr));
        ptr = "rax";
    }

    asm.ins(&format!("mov r10,{}", args[1]));
    asm.ins(&format!("mov byte[{}],r10b", ptr));
}

static BIN_OP_ARGS: [OpArg; 2] = [
    OpArg { kind: ValueKind::S64, cond: ArgCondition::Any },
    OpArg { kind: ValueKind::S64, cond: ArgCondition::Any },
];

static UN_OP_ARGS: [OpArg; 1] = [OpArg { kind: ValueKind::S64, cond: ArgCondition::Any }];

static BIN_OP_ARGS_VAR: [OpArg; 2] = [
    OpArg { kind: ValueKind::S64, cond: ArgCondition::Var },
    OpArg { kind: ValueKind::S64, cond: ArgCondition::Any },
];

static UN_OP_ARGS_REF_TARGET: [OpArg; 1] =
    [OpArg { kind: ValueKind::S64, cond: ArgCondition::RefTarget }];

pub static OPS: &[OpSpec] = &[
    OpSpec {
        desc: OpDesc {
            name: "put",
            dest_kind: ValueKind::S64,
            args: &UN_OP_ARGS,
            can_be_inlined: true,
        },
        emit: gen_put_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "add",
            dest_kind: ValueKind::S64,
            args: &BIN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_add_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "sub",
            dest_kind: ValueKind::S64,
            args: &BIN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_sub_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "mul",
            dest_kind: ValueKind::S64,
            args: &BIN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_mul_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "div",
            dest_kind: ValueKind::S64,
            args: &BIN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_div_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "mod",
            dest_kind: ValueKind::S64,
            args: &BIN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_mod_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "neg",
            dest_kind: ValueKind::S64,
            args: &UN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_neg_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "eq",
            dest_kind: ValueKind::S64,
            args: &BIN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_eq_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "ne",
            dest_kind: ValueKind::S64,
            args: &BIN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_ne_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "gt",
            dest_kind: ValueKind::S64,
            args: &BIN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_gt_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "ls",
            dest_kind: ValueKind::S64,
            args: &BIN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_ls_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "ge",
            dest_kind: ValueKind::S64,
            args: &BIN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_ge_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "le",
            dest_kind: ValueKind::S64,
            args: &BIN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_le_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "ref",
            dest_kind: ValueKind::S64,
            args: &UN_OP_ARGS_REF_TARGET,
            can_be_inlined: false,
        },
        emit: gen_ref_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "deref",
            dest_kind: ValueKind::S64,
            args: &UN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_deref_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "deref_str",
            dest_kind: ValueKind::S64,
            args: &UN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_deref_str_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "deref_put",
            dest_kind: ValueKind::Unit,
            args: &BIN_OP_ARGS_VAR,
            can_be_inlined: false,
        },
        emit: gen_deref_put_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "deref_put_str",
            dest_kind: ValueKind::Unit,
            args: &BIN_OP_ARGS_VAR,
            can_be_inlined: false,
        },
        emit: gen_deref_put_str_op,
    },
];
