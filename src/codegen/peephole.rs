//! Window-based rewriting of the emitted instruction list, applied
//! until no rule fires.
//!
//! Three passes per round, in a fixed order: superfluous push/pop pairs
//! first (they materialise `mov`s the arithmetic rules can then
//! simplify), arithmetic identities second, trivial jumps last. The
//! whole pipeline is confluent: once a round fires nothing, further
//! rounds change nothing.

use super::asm::{mem, AsmProgram, Instruction, Mnemonic, Operand, Register};

/// Run all peephole passes to fixpoint.
pub fn peephole_optimize(asm: &mut AsmProgram) {
    loop {
        let mut changed = remove_superfluous_push_pop(asm.instructions_mut());
        changed |= simplify_arithmetic(asm.instructions_mut());
        changed |= remove_trivial_jumps(asm.instructions_mut());
        if !changed {
            break;
        }
    }
}

/// `push X; pop Y` and `pop R; push R` windows.
fn remove_superfluous_push_pop(code: &mut Vec<Instruction>) -> bool {
    let mut changed = false;
    let mut i = 0;

    while i + 1 < code.len() {
        let rewrite = match (&code[i], &code[i + 1]) {
            (Instruction::Op1(Mnemonic::Push, x), Instruction::Op1(Mnemonic::Pop, y)) => {
                if x == y {
                    Some(None)
                } else if !x.is_mem() || !y.is_mem() {
                    Some(Some(Instruction::Op2(Mnemonic::Mov, x.clone(), y.clone())))
                } else {
                    None
                }
            }
            (Instruction::Op1(Mnemonic::Pop, x), Instruction::Op1(Mnemonic::Push, y)) => {
                if x == y && x.is_reg() {
                    Some(Some(Instruction::Op2(
                        Mnemonic::Mov,
                        mem(Register::Esp),
                        x.clone(),
                    )))
                } else {
                    None
                }
            }
            _ => None,
        };

        match rewrite {
            Some(replacement) => {
                code.remove(i + 1);
                match replacement {
                    Some(instruction) => code[i] = instruction,
                    None => {
                        code.remove(i);
                    }
                }
                changed = true;
                // A new adjacency may have formed one step back.
                i = i.saturating_sub(1);
            }
            None => i += 1,
        }
    }

    changed
}

/// Zero/one identities and `inc`/`dec` canonicalisation.
fn simplify_arithmetic(code: &mut Vec<Instruction>) -> bool {
    let mut changed = false;
    let mut i = 0;

    while i < code.len() {
        let rewrite = match &code[i] {
            Instruction::Op2(m, Operand::Imm(0), op2) => match m {
                Mnemonic::Add | Mnemonic::Sub => Some(None),
                Mnemonic::Imul => Some(Some(Instruction::Op2(
                    Mnemonic::Mov,
                    Operand::Imm(0),
                    op2.clone(),
                ))),
                Mnemonic::Mov if op2.is_reg() => Some(Some(Instruction::Op2(
                    Mnemonic::Xor,
                    op2.clone(),
                    op2.clone(),
                ))),
                _ => None,
            },
            Instruction::Op2(m, Operand::Imm(1), _) => match m {
                Mnemonic::Imul | Mnemonic::Idiv => Some(None),
                _ => None,
            },
            Instruction::Op1(Mnemonic::Inc, op) if op.is_reg() => Some(Some(Instruction::Op2(
                Mnemonic::Add,
                Operand::Imm(1),
                op.clone(),
            ))),
            Instruction::Op1(Mnemonic::Dec, op) if op.is_reg() => Some(Some(Instruction::Op2(
                Mnemonic::Sub,
                Operand::Imm(1),
                op.clone(),
            ))),
            _ => None,
        };

        match rewrite {
            Some(Some(instruction)) => {
                // Replacing a `mov $0`/`inc`/`dec` with its canonical
                // form must not refire forever.
                let refires = instruction == code[i];
                code[i] = instruction;
                if !refires {
                    changed = true;
                }
                i += 1;
            }
            Some(None) => {
                code.remove(i);
                changed = true;
            }
            None => i += 1,
        }
    }

    changed
}

/// `jmp L` straight into `L:`.
fn remove_trivial_jumps(code: &mut Vec<Instruction>) -> bool {
    let mut changed = false;
    let mut i = 0;

    while i + 1 < code.len() {
        let remove = matches!(
            (&code[i], &code[i + 1]),
            (Instruction::Op1(Mnemonic::Jmp, Operand::Label(target)), Instruction::Label(label))
                if target == label
        );

        if remove {
            code.remove(i);
            changed = true;
            i = i.saturating_sub(1);
        } else {
            i += 1;
        }
    }

    changed
}
