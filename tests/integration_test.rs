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

use millc::compile;
use millc::ir::{Arg, ProcParam, Program, RelOp, TargetPlatform, Value, ValueKind};
use std::fs;

fn s64_param(name: &str) -> ProcParam {
    ProcParam {
        name: name.to_string(),
        kind: ValueKind::S64,
    }
}

fn var(name: &str) -> Arg {
    Arg::Var(name.to_string())
}

fn val(v: i64) -> Arg {
    Arg::Value(Value::S64(v))
}

#[test]
fn test_empty_linux_program_exits_zero() {
    let mut program = Program::new(TargetPlatform::LinuxX86_64);

    let asm = compile(&mut program).unwrap();

    assert!(asm.contains("global _start\n"));
    assert!(asm.contains("_start:\n"));
    assert!(asm.contains("  mov rdi,0\n  mov rax,60\n  syscall\n"));
    assert!(!asm.contains("call"));
}

#[test]
fn test_identity_procedure_is_a_single_move() {
    let mut program = Program::new(TargetPlatform::RawX86_64);
    let proc = program
        .push_proc("id", ValueKind::S64, vec![s64_param("x")])
        .unwrap();
    proc.push_return_value(var("x"));

    let asm = compile(&mut program).unwrap();

    // leaf procedure: the parameter stays in rdi, no prologue at all
    assert_eq!(asm, "$id:\n  mov rax,rdi\n  ret\n");
}

#[test]
fn test_tail_recursive_sum_becomes_a_loop() {
    let mut program = Program::new(TargetPlatform::RawX86_64);
    let proc = program
        .push_proc("sum", ValueKind::S64, vec![s64_param("n"), s64_param("acc")])
        .unwrap();
    proc.push_cond_jump(RelOp::NotEqual, var("n"), val(0), "recurse");
    proc.push_return_value(var("acc"));
    proc.add_label("recurse").unwrap();
    proc.push_op("add", "acc", vec![var("acc"), var("n")]);
    proc.push_op("sub", "n", vec![var("n"), val(1)]);
    proc.push_call("sum", vec![var("n"), var("acc")]);
    proc.push_return_value(var("acc"));

    let asm = compile(&mut program).unwrap();

    assert!(!asm.contains("call $sum"));
    assert!(asm.contains(" p0.begin:\n"));
    assert!(asm.contains("  jmp p0.begin\n"));

    // both parameters are copied out of the argument registers because
    // the body is re-entered by the backward jump
    assert!(asm.contains("  mov rbx,rdi\n  mov r12,rsi\n"));
    assert!(asm.contains("  add r12,rbx\n"));
    assert!(asm.contains("  sub rbx,1\n"));
}

#[test]
fn test_constant_fold_removes_dead_definitions() {
    let mut program = Program::new(TargetPlatform::RawX86_64);
    let proc = program.push_proc("main", ValueKind::S64, vec![]).unwrap();
    proc.push_op("put", "a", vec![val(3)]);
    proc.push_op("put", "b", vec![val(4)]);
    proc.push_op("add", "c", vec![var("a"), var("b")]);
    proc.push_return_value(var("c"));

    let asm = compile(&mut program).unwrap();

    // both literals are folded into the add; the put definitions vanish
    assert!(asm.contains("  mov rbx,3\n  add rbx,4\n"));
    assert_eq!(asm.matches("mov rbx,").count(), 1);
    assert_eq!(asm.matches("add").count(), 1);
    assert!(program.procs[0].instrs[0].removed);
    assert!(program.procs[0].instrs[1].removed);
}

#[test]
fn test_alloc_deref_round_trip() {
    let mut program = Program::new(TargetPlatform::RawX86_64);
    let proc = program.push_proc("main", ValueKind::S64, vec![]).unwrap();
    proc.push_alloc("p", 8);
    proc.push_op("deref_put", "", vec![var("p"), val(42)]);
    proc.push_op("deref", "x", vec![var("p")]);
    proc.push_return_value(var("x"));

    let asm = compile(&mut program).unwrap();

    assert!(asm.contains("  lea rbx,[rbp-8]\n"));
    assert!(asm.contains("  mov qword[rbx],42\n"));
    assert!(asm.contains("  mov rbx,qword[rbx]\n"));
    assert!(asm.contains("  sub rsp,8\n"));
    assert!(asm.contains("  leave\n"));
}

#[test]
fn test_non_tail_recursion_saves_parameter_in_callee_saved_register() {
    let mut program = Program::new(TargetPlatform::RawX86_64);
    let proc = program
        .push_proc("fact", ValueKind::S64, vec![s64_param("n")])
        .unwrap();
    proc.push_cond_jump(RelOp::Greater, var("n"), val(1), "recurse");
    proc.push_return_value(val(1));
    proc.add_label("recurse").unwrap();
    proc.push_op("sub", "m", vec![var("n"), val(1)]);
    proc.push_call_assign("r", "fact", vec![var("m")]);
    proc.push_op("mul", "res", vec![var("r"), var("n")]);
    proc.push_return_value(var("res"));

    let asm = compile(&mut program).unwrap();

    assert!(program.procs[0].has_callee);
    assert!(asm.contains("call $fact"));
    assert!(asm.contains("  mov rbx,rdi\n"));
    assert!(asm.starts_with("$fact:\n  push rbx\n"));
    assert!(asm.contains("  pop rbx\n"));

    // the early return routes through the synthetic end label
    assert!(asm.contains("  jmp p0.end\n"));
    assert!(asm.contains(" p0.end:\n"));
}

#[test]
fn test_label_and_return_only_procedure_has_no_prologue() {
    let mut program = Program::new(TargetPlatform::RawX86_64);
    let proc = program.push_proc("main", ValueKind::Unit, vec![]).unwrap();
    proc.add_label("here").unwrap();
    proc.push_return();

    let asm = compile(&mut program).unwrap();

    assert_eq!(asm, "$main:\n p0here:\n  ret\n");
}

#[test]
fn test_linux_entry_receives_argc_argv() {
    let mut program = Program::new(TargetPlatform::LinuxX86_64);
    let proc = program
        .push_proc("main", ValueKind::S64, vec![s64_param("argc"), s64_param("argv")])
        .unwrap();
    proc.push_return_value(var("argc"));

    let asm = compile(&mut program).unwrap();

    assert!(asm.contains("  mov rdi,qword[rsp]\n  lea rsi,qword[rsp+8]\n  call $main\n"));
    assert!(asm.contains("  mov rdi,rax\n"));
    // the leaf entry reads argc straight from rdi
    assert!(asm.contains("$main:\n  mov rax,rdi\n  ret\n"));
}

#[test]
fn test_static_segments_are_emitted_and_addressable() {
    let mut program = Program::new(TargetPlatform::LinuxX86_64);
    program
        .push_static_segment("msg", vec![104, 105, 10])
        .unwrap();
    let proc = program.push_proc("main", ValueKind::Unit, vec![]).unwrap();
    proc.push_op("write", "", vec![val(1), var("msg"), val(3)]);
    proc.push_return();

    let asm = compile(&mut program).unwrap();

    assert!(asm.contains("  mov rdi,1\n  mov rsi,msg\n  mov rdx,3\n  mov rax,1\n  syscall\n"));
    assert!(asm.contains("section .data\nmsg: db 104,105,10\n"));
}

#[test]
fn test_static_variable_as_destination() {
    let mut program = Program::new(TargetPlatform::RawX86_64);
    program.push_static_var("counter", Value::S64(0)).unwrap();
    let proc = program.push_proc("main", ValueKind::S64, vec![]).unwrap();
    proc.push_op("put", "counter", vec![val(5)]);
    proc.push_return_value(var("counter"));

    let asm = compile(&mut program).unwrap();

    assert!(asm.contains("  mov qword[counter],5\n"));
    assert!(asm.contains("  mov rax,counter\n"));
    assert!(asm.contains("section .data\ncounter: db 0,0,0,0,0,0,0,0\n"));
}

#[test]
fn test_call_with_stack_arguments_cleans_rsp() {
    let mut program = Program::new(TargetPlatform::RawX86_64);
    let main = program.push_proc("main", ValueKind::Unit, vec![]).unwrap();
    main.push_call(
        "seven",
        vec![val(1), val(2), val(3), val(4), val(5), val(6), val(7)],
    );
    main.push_return();

    let params = vec![
        s64_param("a"),
        s64_param("b"),
        s64_param("c"),
        s64_param("d"),
        s64_param("e"),
        s64_param("f"),
        s64_param("g"),
    ];
    program.push_proc("seven", ValueKind::Unit, params).unwrap();

    let asm = compile(&mut program).unwrap();

    assert!(asm.contains("  mov rdi,1\n"));
    assert!(asm.contains("  mov r9,6\n"));
    // exactly one argument overflows the register quota
    assert!(asm.contains("  push 7\n  call $seven\n  add rsp,8\n"));
    assert_eq!(asm.matches("push 7").count(), 1);
    assert!(!asm.contains("push 6"));
}

#[test]
fn test_dead_procedures_are_not_emitted() {
    let mut program = Program::new(TargetPlatform::RawX86_64);
    let main = program.push_proc("main", ValueKind::Unit, vec![]).unwrap();
    main.push_call("used", vec![]);
    main.push_return();
    program.push_proc("used", ValueKind::Unit, vec![]).unwrap();
    program.push_proc("dead", ValueKind::Unit, vec![]).unwrap();

    let asm = compile(&mut program).unwrap();

    assert!(asm.contains("$used:"));
    assert!(!asm.contains("$dead:"));
    // procedure-local labels keep their declaration index
    assert!(asm.contains("call $used"));
}

#[test]
fn test_spilled_variables_share_stack_slots_by_interval() {
    // nine overlapping variables exhaust the five callee-saved
    // registers, so the coldest ones spill into the frame
    let mut program = Program::new(TargetPlatform::RawX86_64);
    let proc = program.push_proc("main", ValueKind::S64, vec![]).unwrap();

    let names: Vec<String> = (0..9).map(|i| format!("v{}", i)).collect();
    for (i, name) in names.iter().enumerate() {
        proc.push_op("put", name, vec![val(i as i64)]);
    }
    // the label is a join point, so none of the puts can be folded away
    proc.add_label("mix").unwrap();
    // keep every variable alive to the end so the intervals all overlap
    let mut sum = "s".to_string();
    proc.push_op("add", &sum, vec![var(&names[0]), var(&names[1])]);
    for name in &names[2..] {
        let next = format!("{}x", sum);
        proc.push_op("add", &next, vec![var(&sum), var(name)]);
        sum = next;
    }
    proc.push_return_value(var(&sum));

    let asm = compile(&mut program).unwrap();

    assert!(asm.contains("qword[rbp-"));
    assert!(asm.contains("  push rbx\n  push r12\n  push r13\n  push r14\n  push r15\n"));
    assert!(asm.contains("  sub rsp,"));
    assert!(asm.contains("  leave\n  pop r15\n  pop r14\n  pop r13\n  pop r12\n  pop rbx\n  ret\n"));
}

#[test]
fn test_live_intervals_and_memory_units_stay_consistent() {
    let mut program = Program::new(TargetPlatform::RawX86_64);
    let proc = program
        .push_proc("main", ValueKind::S64, vec![s64_param("n")])
        .unwrap();
    proc.push_op("put", "a", vec![val(1)]);
    proc.push_op("add", "b", vec![var("a"), var("n")]);
    proc.push_op("mul", "c", vec![var("b"), val(2)]);
    proc.push_op("add", "d", vec![var("c"), var("n")]);
    proc.push_return_value(var("d"));

    compile(&mut program).unwrap();

    let ctx = program.procs[0].ctx.as_ref().unwrap();

    for var in &ctx.vars {
        assert!(var.begin_index <= var.end_index);
        for &use_index in &var.uses {
            assert!(use_index >= var.begin_index.min(var.end_index));
            assert!(use_index <= var.end_index);
        }
    }

    // variables sharing a memory unit never overlap
    for (i, a) in ctx.vars.iter().enumerate() {
        for b in ctx.vars.iter().skip(i + 1) {
            if a.can_be_ref_target || b.can_be_ref_target || a.is_static || b.is_static {
                continue;
            }
            if a.mem_unit == b.mem_unit && a.kind == b.kind {
                assert!(a.end_index < b.begin_index || b.end_index < a.begin_index);
            }
        }
    }
}

#[test]
fn test_optimizer_is_idempotent_on_generated_output() {
    let mut first = Program::new(TargetPlatform::RawX86_64);
    let proc = first.push_proc("main", ValueKind::S64, vec![]).unwrap();
    proc.push_op("put", "a", vec![val(10)]);
    proc.push_op("add", "b", vec![var("a"), val(5)]);
    proc.push_return_value(var("b"));

    millc::optimize(&mut first).unwrap();
    millc::optimize(&mut first).unwrap();
    let asm = millc::gen_code(&mut first).unwrap();

    let mut second = Program::new(TargetPlatform::RawX86_64);
    let proc = second.push_proc("main", ValueKind::S64, vec![]).unwrap();
    proc.push_op("put", "a", vec![val(10)]);
    proc.push_op("add", "b", vec![var("a"), val(5)]);
    proc.push_return_value(var("b"));

    assert_eq!(asm, compile(&mut second).unwrap());
}

#[test]
fn test_compile_from_description_file() {
    let description = r#"{
        "target": "linux_x86_64",
        "procs": [
            {
                "name": "main",
                "ret": "s64",
                "body": [
                    {"op": {"name": "put", "dest": "a", "args": [{"s64": 41}]}},
                    {"op": {"name": "add", "dest": "b", "args": [{"var": "a"}, {"s64": 1}]}},
                    {"ret_value": {"arg": {"var": "b"}}}
                ]
            }
        ]
    }"#;

    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("answer.json");
    fs::write(&input_path, description).unwrap();

    let text = fs::read_to_string(&input_path).unwrap();
    let mut program = millc::loader::load_program(&text).unwrap();
    let asm = compile(&mut program).unwrap();

    assert!(asm.contains("_start:\n"));
    assert!(asm.contains("  mov rbx,41\n  add rbx,1\n"));
    assert!(asm.contains("  mov rdi,rax\n"));
}
