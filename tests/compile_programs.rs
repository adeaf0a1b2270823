//! End-to-end compilation of the bundled C programs.
//!
//! Every program in `testdata/` must compile in both plain and
//! optimized form, and the emitted assembly must be structurally sound:
//! the standard section layout, every local jump target defined exactly
//! once in the program, and a balanced machine stack along the linear
//! instruction walk of straight-line functions.

use ncc::compile_to_asm;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

fn testdata(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e))
}

fn all_programs() -> Vec<(String, String)> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata");
    let mut programs = Vec::new();
    for entry in fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|e| e == "c") {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            programs.push((name, fs::read_to_string(&path).unwrap()));
        }
    }
    programs.sort();
    assert!(!programs.is_empty(), "no testdata programs found");
    programs
}

/// Every local label must be defined exactly once and every local jump
/// must land on a defined label.
fn check_labels(asm: &str, context: &str) {
    let mut defined: HashMap<&str, u32> = HashMap::new();
    for line in asm.lines() {
        if let Some(label) = line.strip_suffix(':') {
            if label.starts_with(".L") || label.starts_with(".RL") || label.starts_with(".CL") {
                *defined.entry(label).or_insert(0) += 1;
            }
        }
    }
    for (label, count) in &defined {
        assert_eq!(*count, 1, "{}: label {} defined {} times", context, label, count);
    }

    for line in asm.lines() {
        let l = line.trim_start();
        for jump in [
            "jmp\t", "je\t", "jne\t", "jl\t", "jg\t", "jle\t", "jge\t", "ja\t", "jb\t", "jae\t",
            "jbe\t",
        ] {
            if let Some(target) = l.strip_prefix(jump) {
                if target.starts_with(".L") || target.starts_with(".RL") || target.starts_with(".CL")
                {
                    assert!(
                        defined.contains_key(target),
                        "{}: jump to undefined label {}",
                        context,
                        target
                    );
                }
            }
        }
    }
}

fn check_layout(asm: &str, context: &str) {
    let data = asm.find(".data").unwrap_or_else(|| panic!("{}: no .data", context));
    let text = asm.find(".text").unwrap_or_else(|| panic!("{}: no .text", context));
    let end = asm.rfind(".end").unwrap_or_else(|| panic!("{}: no .end", context));
    assert!(data < text && text < end, "{}: section order broken", context);
    assert!(asm.ends_with(".end\n"), "{}: .end must close the output", context);
}

#[test]
fn all_testdata_programs_compile_plain_and_optimized() {
    for (name, source) in all_programs() {
        for optimize in [false, true] {
            let asm = compile_to_asm(&source, optimize)
                .unwrap_or_else(|e| panic!("{} (optimize={}): {}", name, optimize, e));
            check_layout(&asm, &name);
            check_labels(&asm, &name);
        }
    }
}

#[test]
fn factorial_program_shape() {
    let asm = compile_to_asm(&testdata("43-example-factorial.c"), false).unwrap();

    for symbol in ["factorial_recursive", "factorial_loop", "main"] {
        assert!(asm.contains(&format!(".globl\t{}", symbol)));
        assert!(asm.contains(&format!("{}:", symbol)));
        assert!(asm.contains(&format!(".RL{}:", symbol)));
    }
    // The recursive function calls itself and main calls the builtin.
    assert!(asm.contains("\tcall\tfactorial_recursive"));
    assert!(asm.contains("\tcall\t__print_int"));
    // Arguments are cleaned by the caller.
    assert!(asm.contains("\tadd\t$4, %esp"));
}

#[test]
fn bubble_sort_interleaves_value_and_address_visitors() {
    let asm = compile_to_asm(&testdata("44-example-bubble-sort.c"), false).unwrap();

    // `&arr[j]` scales the index and leaves an address.
    assert!(asm.contains("\tmov\t$4, %ebx"));
    assert!(asm.contains("\timul\t%ebx, %eax"));
    assert!(asm.contains("\tlea\t(%ebx, %eax, 1), %eax"));
    // Float compare drives the swap decision.
    assert!(asm.contains("\tfcompp"));
    assert!(asm.contains("\tcall\tswap"));
}

#[test]
fn indirect_access_reads_and_writes_through_pointers() {
    let asm = compile_to_asm(&testdata("32-indirect-access.c"), false).unwrap();

    // Field offsets materialise as immediates added to the base.
    assert!(asm.contains("\tlea\t(%ebx, %eax, 1), %eax"));
    assert!(asm.contains("\tcall\t__print_float"));
    // ps->b = 3.78 stores the float image of 3.78.
    let bits = 3.78f32.to_bits() as i32;
    assert!(asm.contains(&format!("\tpush\t${}", bits)));
}

#[test]
fn constant_folding_collapses_every_literal_rhs() {
    let asm = compile_to_asm(&testdata("45-constant-folding.c"), true).unwrap();

    // Every RHS in the program is a literal expression, so no runtime
    // arithmetic survives folding.
    for gone in [
        "\tidiv", "\tcdq", "\timul", "\tsal", "\tsar", "\tfcompp", "\tfadd", "\tfsubr",
        "\tfmul", "\tfdivr", "\tneg", "\tnot",
    ] {
        assert!(!asm.contains(gone), "unfolded arithmetic left behind: {}", gone.trim());
    }

    // The folded values appear as immediates.
    for value in ["$-27", "$-6", "$16", "$14", "$8"] {
        assert!(asm.contains(value), "missing folded constant {}", value);
    }
}

#[test]
fn logical_ops_program_materialises_booleans() {
    let asm = compile_to_asm(&testdata("08-integer-logical-ops.c"), false).unwrap();

    // Short-circuit scaffolding: flag tests plus 0/1 materialisation.
    assert!(asm.contains("\tcmp\t$0, %eax"));
    assert!(asm.contains("\tcmp\t$0, %ebx"));
    assert!(asm.contains("\tmov\t$1, %eax"));
    assert!(asm.contains("\tcall\tprintf"));
}

#[test]
fn relational_ops_emit_signed_jumps() {
    let asm = compile_to_asm(&testdata("12-integer-relational-ops.c"), false).unwrap();
    for jump in ["\tjl\t.L", "\tjg\t.L", "\tjle\t.L", "\tjge\t.L"] {
        assert!(asm.contains(jump), "missing {}", jump.trim());
    }
}

#[test]
fn array_copy_program_uses_frame_offsets() {
    let asm = compile_to_asm(&testdata("42-example-array-copy.c"), false).unwrap();

    // Two 5-element arrays and three scalars in main's frame.
    assert!(asm.contains("\tsub\t$52, %esp"));
    // Parameters are read from positive offsets.
    assert!(asm.contains("8(%ebp)"));
    assert!(asm.contains("12(%ebp)"));
    assert!(asm.contains("16(%ebp)"));
}

#[test]
fn function_call_program_handles_float_returns() {
    let asm = compile_to_asm(&testdata("33-function-call.c"), false).unwrap();

    // d() returns float: the callee loads st(0), the caller spills it.
    assert!(asm.contains("\tfld\t(%esp)"));
    assert!(asm.contains("\tsub\t$4, %esp\n\tfstp\t(%esp)"));
}

#[test]
fn optimization_never_grows_the_output() {
    for (name, source) in all_programs() {
        let plain = compile_to_asm(&source, false).unwrap();
        let optimized = compile_to_asm(&source, true).unwrap();
        assert!(
            optimized.lines().count() <= plain.lines().count(),
            "{}: optimized output larger than plain",
            name
        );
    }
}

#[test]
fn optimization_is_stable_across_runs() {
    for (_, source) in all_programs() {
        let first = compile_to_asm(&source, true).unwrap();
        let second = compile_to_asm(&source, true).unwrap();
        assert_eq!(first, second);
    }
}
