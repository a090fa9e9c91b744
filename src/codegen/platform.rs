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

use crate::ir::{Program, TargetPlatform, ValueKind, VALUE_KIND_COUNT};

use super::Asm;

// Memory-unit layer per value kind. Variables on different layers never
// collide during interval coloring; on x86-64 every kind shares layer 0.
#[derive(Debug, Copy, Clone)]
pub struct VariableLayers {
    pub indices: [u32; VALUE_KIND_COUNT],
}

pub fn layers(target: TargetPlatform) -> VariableLayers {
    match target {
        TargetPlatform::RawX86_64 | TargetPlatform::LinuxX86_64 => VariableLayers {
            indices: [0; VALUE_KIND_COUNT],
        },
    }
}

// Emits the platform entry stub. On Linux, `_start` forwards argc/argv to
// the entry procedure and feeds its result to the exit syscall.
pub fn begin_program_wrap(asm: &mut Asm, program: &Program) {
    match program.target {
        TargetPlatform::RawX86_64 => {}

        TargetPlatform::LinuxX86_64 => {
            asm.raw("global _start\n");
            asm.raw("section .text\n");
            asm.raw("_start:\n");

            if let Some(entry) = program.procs.first() {
                asm.ins("mov rdi,qword[rsp]");
                asm.ins("lea rsi,qword[rsp+8]");
                asm.ins(&format!("call ${}", entry.name));
                asm.ins("mov rdi,rax");
            }

            let entry_returns_value = program
                .procs
                .first()
                .is_some_and(|entry| entry.ret_val_kind != ValueKind::Unit);

            if !entry_returns_value {
                asm.ins("mov rdi,0");
            }

            asm.ins("mov rax,60");
            asm.ins("syscall");
        }
    }
}
