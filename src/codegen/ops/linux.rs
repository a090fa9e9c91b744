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

use crate::codegen::{Asm, Loc};
use crate::ir::ValueKind;

use super::{ArgCondition, OpArg, OpDesc, OpSpec};

// PROT_READ | PROT_WRITE
const MMAP_PROT: u32 = 3;
// MAP_PRIVATE | MAP_ANONYMOUS
const MMAP_FLAGS: u32 = 34;
const AT_FDCWD: i32 = -100;
const O_RDWR: u32 = 2;

fn mov_unless_in_place(asm: &mut Asm, reg: &str, arg: &str) {
    if arg != reg {
        asm.ins(&format!("mov {},{}", reg, arg));
    }
}

fn store_syscall_result(asm: &mut Asm, dest_loc: &Loc) {
    if dest_loc.text != "rax" {
        asm.ins(&format!("mov {},rax", dest_loc.text));
    }
}

fn gen_exit_op(asm: &mut Asm, _dest_loc: &Loc, args: &[String]) {
    mov_unless_in_place(asm, "rdi", &args[0]);
    asm.ins("mov rax,60");
    asm.ins("syscall");
}

fn gen_write_op(asm: &mut Asm, _dest_loc: &Loc, args: &[String]) {
    mov_unless_in_place(asm, "rdi", &args[0]);
    mov_unless_in_place(asm, "rsi", &args[1]);
    mov_unless_in_place(asm, "rdx", &args[2]);
    asm.ins("mov rax,1");
    asm.ins("syscall");
}

fn gen_read_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    mov_unless_in_place(asm, "rdi", &args[0]);
    mov_unless_in_place(asm, "rsi", &args[1]);
    mov_unless_in_place(asm, "rdx", &args[2]);
    asm.ins("mov rax,0");
    asm.ins("syscall");
    store_syscall_result(asm, dest_loc);
}

fn gen_mmap_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    mov_unless_in_place(asm, "rsi", &args[0]);
    asm.ins("mov rdi,0");
    asm.ins(&format!("mov rdx,{}", MMAP_PROT));
    asm.ins(&format!("mov r10,{}", MMAP_FLAGS));
    asm.ins("mov r8,-1");
    asm.ins("mov r9,0");
    asm.ins("mov rax,9");
    asm.ins("syscall");
    store_syscall_result(asm, dest_loc);
}

fn gen_munmap_op(asm: &mut Asm, _dest_loc: &Loc, args: &[String]) {
    mov_unless_in_place(asm, "rdi", &args[0]);
    mov_unless_in_place(asm, "rsi", &args[1]);
    asm.ins("mov rax,11");
    asm.ins("syscall");
}

fn gen_openat_op(asm: &mut Asm, dest_loc: &Loc, args: &[String]) {
    asm.ins(&format!("mov rdi,{}", AT_FDCWD));
    mov_unless_in_place(asm, "rsi", &args[0]);
    asm.ins(&format!("mov rdx,{}", O_RDWR));
    asm.ins("mov rax,257");
    asm.ins("syscall");
    store_syscall_result(asm, dest_loc);
}

fn gen_close_op(asm: &mut Asm, _dest_loc: &Loc, args: &[String]) {
    mov_unless_in_place(asm, "rdi", &args[0]);
    asm.ins("mov rax,3");
    asm.ins("syscall");
}

fn gen_fstat_op(asm: &mut Asm, _dest_loc: &Loc, args: &[String]) {
    mov_unless_in_place(asm, "rdi", &args[0]);
    mov_unless_in_place(asm, "rsi", &args[1]);
    asm.ins("mov rax,5");
    asm.ins("syscall");
}

static BIN_OP_ARGS: [OpArg; 2] = [
    OpArg { kind: ValueKind::S64, cond: ArgCondition::Any },
    OpArg { kind: ValueKind::S64, cond: ArgCondition::Any },
];

static UN_OP_ARGS: [OpArg; 1] = [OpArg { kind: ValueKind::S64, cond: ArgCondition::Any }];

static TERNARY_OP_ARGS: [OpArg; 3] = [
    OpArg { kind: ValueKind::S64, cond: ArgCondition::Any },
    OpArg { kind: ValueKind::S64, cond: ArgCondition::Any },
    OpArg { kind: ValueKind::S64, cond: ArgCondition::Any },
];

pub static OPS: &[OpSpec] = &[
    OpSpec {
        desc: OpDesc {
            name: "exit",
            dest_kind: ValueKind::Unit,
            args: &UN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_exit_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "write",
            dest_kind: ValueKind::Unit,
            args: &TERNARY_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_write_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "read",
            dest_kind: ValueKind::S64,
            args: &TERNARY_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_read_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "mmap",
            dest_kind: ValueKind::S64,
            args: &UN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_mmap_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "munmap",
            dest_kind: ValueKind::Unit,
            args: &BIN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_munmap_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "openat",
            dest_kind: ValueKind::S64,
            args: &UN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_openat_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "close",
            dest_kind: ValueKind::Unit,
            args: &UN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_close_op,
    },
    OpSpec {
        desc: OpDesc {
            name: "fstat",
            dest_kind: ValueKind::Unit,
            args: &BIN_OP_ARGS,
            can_be_inlined: false,
        },
        emit: gen_fstat_op,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::LocKind;

    #[test]
    fn test_exit_materializes_status_and_syscall_number() {
        let mut asm = Asm::new();
        gen_exit_op(&mut asm, &Loc::default(), &["0".to_string()]);
        assert_eq!(asm.into_string(), "  mov rdi,0\n  mov rax,60\n  syscall\n");
    }

    #[test]
    fn test_write_skips_moves_for_in_place_args() {
        let mut asm = Asm::new();
        gen_write_op(
            &mut asm,
            &Loc::default(),
            &["rdi".to_string(), "rsi".to_string(), "rdx".to_string()],
        );
        assert_eq!(asm.into_string(), "  mov rax,1\n  syscall\n");
    }

    #[test]
    fn test_read_stores_result() {
        let mut asm = Asm::new();
        let dest = Loc { kind: LocKind::Reg, text: "rbx".to_string() };
        gen_read_op(
            &mut asm,
            &dest,
            &["0".to_string(), "rsi".to_string(), "rdx".to_string()],
        );
        let text = asm.into_string();
        assert!(text.ends_with("  syscall\n  mov rbx,rax\n"));
        assert!(text.contains("  mov rax,0\n"));
    }
}
