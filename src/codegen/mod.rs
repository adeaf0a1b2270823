//! 32-bit x86 code generation.
//!
//! The generator is a tree walker producing stack-machine code: every
//! sub-expression evaluates by pushing its 4-byte value onto `%esp`,
//! every statement leaves the stack balanced. Floats travel through the
//! x87 FPU; `%eax`/`%ebx`/`%ecx`/`%edx` are scratch and `%ebp` is the
//! frame pointer.
//!
//! Two mutually-recursive entry points cooperate: [`CodeGen::emit_value`]
//! pushes an expression's value, [`CodeGen::emit_address`] pushes the
//! address an lvalue designates. Value context for subscripts and member
//! accesses always goes through the address visitor and dereferences
//! once.
//!
//! Calls follow cdecl: arguments pushed right-to-left, caller cleans the
//! stack, integers return in `%eax`, floats in `st(0)` (callers reserve
//! a slot and `fstp` into it).
//!
//! # Module structure
//!
//! - `asm.rs`: registers, mnemonics, operands, the instruction list
//! - `expressions.rs`: the value visitor
//! - `lvalues.rs`: the address visitor
//! - `statements.rs`: statements, frames and control flow
//! - `peephole.rs`: the fixpoint peephole optimizer

mod asm;
mod expressions;
mod lvalues;
mod peephole;
mod statements;

pub use asm::{AsmProgram, GlobalVar, Instruction, Mnemonic, Operand, Register};
pub use peephole::peephole_optimize;

use crate::ast::CaseId;
use crate::symbols::{Program, TypeId};
use asm::mem;
use asm::Mnemonic::*;
use asm::Register::*;
use std::collections::HashMap;

/// Per-function state the statement walker needs.
struct FunctionContext {
    name: String,
    return_type: TypeId,
    /// Whether the prologue/epilogue is emitted. An empty frame is
    /// elided when optimization is on.
    has_frame: bool,
}

/// The tree-walking code generator. One instance per translation unit.
pub struct CodeGen<'a> {
    program: &'a Program,
    asm: AsmProgram,
    optimize: bool,

    function: Option<FunctionContext>,
    block_nesting: u32,
    break_labels: Vec<String>,
    continue_labels: Vec<String>,
    /// Labels assigned to `case`/`default` ids by the enclosing switch
    /// dispatch, consumed when the body walk reaches each label.
    case_labels: HashMap<CaseId, String>,
}

impl<'a> CodeGen<'a> {
    pub fn new(program: &'a Program, optimize: bool) -> Self {
        CodeGen {
            program,
            asm: AsmProgram::new(),
            optimize,
            function: None,
            block_nesting: 0,
            break_labels: Vec::new(),
            continue_labels: Vec::new(),
            case_labels: HashMap::new(),
        }
    }

    /// Lower the whole translation unit to an instruction list plus data
    /// section.
    pub fn run(mut self) -> AsmProgram {
        // Detach the program reference so body walks can borrow `self`
        // mutably.
        let program = self.program;

        for var in program.globals.variables() {
            let types = &program.types;
            self.asm.add_global_variable(GlobalVar {
                name: var.name.clone(),
                size: types.size(var.ty),
                scalar: types.is_scalar(var.ty),
                float: types.is_float(var.ty),
                init_value: var.init_value,
            });
        }

        for function in &program.functions {
            let Some(body) = function.body.as_ref() else {
                continue;
            };

            let has_frame = !self.optimize
                || body.locals.elements_size() != 0
                || function.arguments_size() != 0;
            self.function = Some(FunctionContext {
                name: function.name.clone(),
                return_type: function.return_type,
                has_frame,
            });
            self.block_nesting = 0;

            self.emit_block(body);
        }

        self.asm
    }

    fn ctx(&self) -> &FunctionContext {
        self.function.as_ref().expect("code generation outside a function")
    }

    /// The type both operands of a binary arithmetic operation are
    /// brought to: float if either side is float.
    fn common_real_type(&self, l: TypeId, r: TypeId) -> TypeId {
        let types = &self.program.types;
        if types.is_float(l) || types.is_float(r) {
            types.float()
        } else {
            l
        }
    }

    /// Convert the value at the top of the stack from `src` to `dst`.
    /// Only the int/float pair needs instructions.
    fn perform_conversion(&mut self, dst: TypeId, src: TypeId) {
        let types = &self.program.types;
        if types.is_int(dst) && types.is_float(src) {
            self.asm.op1(Fld, mem(Esp));
            self.asm.op1(Fisttp, mem(Esp));
        } else if types.is_float(dst) && types.is_int(src) {
            self.asm.op1(Fild, mem(Esp));
            self.asm.op1(Fstp, mem(Esp));
        }
    }

    /// Pop the disregarded value of an expression statement, unless the
    /// expression was void and pushed nothing.
    fn emit_expression_statement(&mut self, expr: &crate::ast::Expr) {
        self.emit_value(expr);
        if !self.program.types.is_void(expr.ty) {
            self.asm.op1(Pop, Eax);
        }
    }

    /// Materialise a comparison's 0-or-1 in `%eax` after flags are set.
    fn emit_flag_to_bool(&mut self, jump_if_true: Mnemonic) {
        let true_label = self.asm.generate_label();
        let end_label = self.asm.generate_label();

        self.asm.op1(jump_if_true, true_label.clone());
        self.asm.op2(Mov, 0, Eax);
        self.asm.op1(Jmp, end_label.clone());
        self.asm.label(true_label);
        self.asm.op2(Mov, 1, Eax);
        self.asm.label(end_label);
    }

    /// `ftst` the x87 top against zero and move the result into the CPU
    /// flags, freeing the x87 register afterwards.
    fn emit_float_test(&mut self) {
        self.asm.op0(Ftst);
        self.asm.op1(Fstsw, Ax);
        self.asm.op0(Sahf);
        self.asm.op1(Fstp, St0);
    }
}
