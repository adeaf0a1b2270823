//! The value visitor: every expression evaluates by pushing its 4-byte
//! value onto the machine stack. Float values travel as raw bit
//! patterns between the stack and the x87 unit.

use super::asm::{mem, mem_disp, Operand};
use super::{CodeGen, Mnemonic, Mnemonic::*, Register::*};
use crate::ast::{Expr, ExprKind};
use crate::parser::compound_base;
use crate::scanner::TokenKind;
use crate::symbols::SCALAR_SIZE;

/// Two-operand mnemonic for a trivially-mapped integer operation.
fn int_op(op: TokenKind) -> Mnemonic {
    match op {
        TokenKind::Plus => Add,
        TokenKind::Minus => Sub,
        TokenKind::Asterisk => Imul,
        TokenKind::Ampersand => And,
        TokenKind::BitwiseOr => Or,
        TokenKind::BitwiseXor => Xor,
        TokenKind::ShiftLeft => Sal,
        TokenKind::ShiftRight => Sar,
        _ => unreachable!("not a trivial integer operation"),
    }
}

/// Conditional jump taken when an integer comparison holds.
fn int_comparison_jump(op: TokenKind) -> Mnemonic {
    match op {
        TokenKind::Equal => Je,
        TokenKind::NotEqual => Jne,
        TokenKind::LessThan => Jl,
        TokenKind::GreaterThan => Jg,
        TokenKind::LessThanOrEqual => Jle,
        TokenKind::GreaterThanOrEqual => Jge,
        _ => unreachable!("not a comparison"),
    }
}

/// Conditional jump for a float comparison. The x87 status word maps to
/// the unsigned flags, hence the unsigned-style mnemonics.
fn float_comparison_jump(op: TokenKind) -> Mnemonic {
    match op {
        TokenKind::Equal => Je,
        TokenKind::NotEqual => Jne,
        TokenKind::LessThan => Jb,
        TokenKind::GreaterThan => Ja,
        TokenKind::LessThanOrEqual => Jbe,
        TokenKind::GreaterThanOrEqual => Jae,
        _ => unreachable!("not a comparison"),
    }
}

/// x87 mnemonic computing `left op right` with the right operand in
/// st(0) and the left in memory.
fn float_op(op: TokenKind) -> Mnemonic {
    match op {
        TokenKind::Plus => Fadd,
        TokenKind::Minus => Fsubr,
        TokenKind::Asterisk => Fmul,
        TokenKind::Slash => Fdivr,
        _ => unreachable!("not a float operation"),
    }
}

impl<'a> CodeGen<'a> {
    /// Evaluate `expr` and push its value.
    pub(super) fn emit_value(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::IntConst(v) => {
                self.asm.op1(Push, *v);
            }
            ExprKind::FloatConst(v) => {
                // The 32-bit float image goes onto the stack directly.
                self.asm.op1(Push, v.to_bits() as i32);
            }
            ExprKind::CharConst(c) => {
                self.asm.op1(Push, *c as i32);
            }
            ExprKind::StringConst(s) => {
                let label = self.asm.add_string_literal(s);
                self.asm.op1(Push, format!("${}", label));
            }
            ExprKind::Variable(v) => {
                if self.program.types.is_array(v.ty) {
                    // Arrays decay to the address of their first element.
                    self.emit_address(expr);
                } else if v.global {
                    self.asm.op1(Push, Operand::Label(v.name.clone()));
                } else {
                    self.asm.op1(Push, mem_disp(v.offset, Ebp));
                }
            }
            ExprKind::FunctionRef { name, .. } => {
                // A bare function name decays to its address.
                self.asm.op1(Push, format!("${}", name));
            }
            ExprKind::Unary { arg } => self.emit_unary(expr, arg),
            ExprKind::Postfix { arg } => self.emit_postfix(expr, arg),
            ExprKind::Binary { left, right } => self.emit_binary(expr, left, right),
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => self.emit_conditional(expr, cond, then_expr, else_expr),
            ExprKind::Call { fun, name, args } => self.emit_call(*fun, name, args),
            ExprKind::StructAccess { .. }
            | ExprKind::IndirectAccess { .. }
            | ExprKind::ArrayAccess { .. } => {
                // Value context computes the address, then dereferences
                // once. Array-typed results stay as addresses.
                if self.program.types.is_array(expr.ty) {
                    self.emit_address(expr);
                } else {
                    self.emit_address(expr);
                    self.asm.op1(Pop, Eax);
                    self.asm.op1(Push, mem(Eax));
                }
            }
            ExprKind::AddressOf { arg } => self.emit_address(arg),
            ExprKind::Cast { arg } => {
                self.emit_value(arg);
                self.perform_conversion(expr.ty, arg.ty);
            }
            ExprKind::SizeOf { arg } => {
                self.asm.op1(Push, self.program.types.size(arg.ty));
            }
        }
    }

    fn emit_unary(&mut self, expr: &Expr, arg: &Expr) {
        let op = expr.op;

        if self.program.types.is_float(arg.ty) {
            match op {
                TokenKind::Minus => {
                    self.emit_value(arg);
                    self.asm.op1(Fld, mem(Esp));
                    self.asm.op0(Fchs);
                    self.asm.op1(Fstp, mem(Esp));
                }
                TokenKind::Plus => {
                    self.emit_value(arg);
                }
                TokenKind::Increment | TokenKind::Decrement => {
                    self.emit_value(arg);
                    self.emit_address(arg);

                    self.asm.op1(Pop, Ebx);

                    self.asm.op0(Fld1);
                    let fop = if op == TokenKind::Increment { Fadd } else { Fsubr };
                    self.asm.op1(fop, mem(Esp));
                    self.asm.op1(Fstp, mem(Esp));

                    self.asm.op2(Mov, mem(Esp), Eax);
                    self.asm.op2(Mov, Eax, mem(Ebx));
                }
                TokenKind::LogicNot => {
                    self.emit_value(arg);
                    self.asm.op1(Fld, mem(Esp));
                    self.asm.op2(Add, SCALAR_SIZE, Esp);
                    self.emit_float_test();

                    let true_label = self.asm.generate_label();
                    let end_label = self.asm.generate_label();
                    self.asm.op1(Jne, true_label.clone());
                    self.asm.op2(Mov, 1, Eax);
                    self.asm.op1(Jmp, end_label.clone());
                    self.asm.label(true_label);
                    self.asm.op2(Mov, 0, Eax);
                    self.asm.label(end_label);

                    self.asm.op1(Push, Eax);
                }
                _ => unreachable!("invalid unary operation on float"),
            }
            return;
        }

        match op {
            TokenKind::Increment | TokenKind::Decrement => {
                self.emit_address(arg);
                self.emit_value(arg);

                self.asm.op1(Pop, Eax);
                self.asm.op1(Pop, Ebx);

                let m = if op == TokenKind::Increment { Inc } else { Dec };
                self.asm.op1(m, Eax);

                self.asm.op2(Mov, Eax, mem(Ebx));
                self.asm.op1(Push, Eax);
            }
            _ => {
                self.emit_value(arg);
                self.asm.op1(Pop, Eax);

                match op {
                    TokenKind::Asterisk => {
                        self.asm.op2(Mov, mem(Eax), Eax);
                    }
                    TokenKind::Minus => {
                        self.asm.op1(Neg, Eax);
                    }
                    TokenKind::Plus => {}
                    TokenKind::BitwiseNot => {
                        self.asm.op1(Not, Eax);
                    }
                    TokenKind::LogicNot => {
                        let true_label = self.asm.generate_label();
                        let end_label = self.asm.generate_label();

                        self.asm.op2(Cmp, 0, Eax);
                        self.asm.op1(Jne, true_label.clone());
                        self.asm.op2(Mov, 1, Eax);
                        self.asm.op1(Jmp, end_label.clone());
                        self.asm.label(true_label);
                        self.asm.op2(Mov, 0, Eax);
                        self.asm.label(end_label);
                    }
                    _ => unreachable!("invalid unary operation"),
                }

                self.asm.op1(Push, Eax);
            }
        }
    }

    /// Postfix `++`/`--`: the pushed value is the old one; the updated
    /// value is written back through the address.
    fn emit_postfix(&mut self, expr: &Expr, arg: &Expr) {
        self.emit_value(arg);
        self.emit_address(arg);

        self.asm.op1(Pop, Ebx);
        self.asm.op2(Mov, mem(Esp), Eax);

        if self.program.types.is_float(arg.ty) {
            self.asm.op0(Fld1);
            let fop = if expr.op == TokenKind::Increment { Fadd } else { Fsubr };
            self.asm.op1(fop, mem(Esp));

            // Scratch slot just below the stack top keeps the pushed old
            // value intact.
            self.asm.op1(Fstp, mem_disp(-(SCALAR_SIZE as i32), Esp));
            self.asm.op2(Mov, mem_disp(-(SCALAR_SIZE as i32), Esp), Eax);
        } else {
            let m = if expr.op == TokenKind::Increment { Inc } else { Dec };
            self.asm.op1(m, Eax);
        }

        self.asm.op2(Mov, Eax, mem(Ebx));
    }

    fn emit_binary(&mut self, expr: &Expr, left: &Expr, right: &Expr) {
        let mut op = expr.op;

        if op == TokenKind::Assign {
            self.emit_address(left);
            self.emit_value(right);
            self.perform_conversion(left.ty, right.ty);

            self.asm.op1(Pop, Eax);
            self.asm.op1(Pop, Ebx);
            self.asm.op2(Mov, Eax, mem(Ebx));
            self.asm.op1(Push, Eax);
            return;
        }

        if op == TokenKind::Comma {
            // Evaluate both; only the right value remains.
            self.emit_value(left);
            if !self.program.types.is_void(left.ty) {
                self.asm.op1(Pop, Eax);
            }
            self.emit_value(right);
            return;
        }

        let compound = op.is_compound_assignment();
        if compound {
            self.emit_address(left);
            op = compound_base(op);
        }

        let common = self.common_real_type(left.ty, right.ty);

        self.emit_value(left);
        self.perform_conversion(common, left.ty);
        self.emit_value(right);
        self.perform_conversion(common, right.ty);

        if self.program.types.is_float(common) {
            self.emit_float_binary(op);
        } else {
            self.emit_int_binary(op);
        }

        if compound {
            // Bring the result back to the stored type, then write it
            // through the saved address.
            self.asm.op1(Push, Eax);
            self.perform_conversion(left.ty, common);
            self.asm.op1(Pop, Eax);

            self.asm.op1(Pop, Ebx);
            self.asm.op2(Mov, Eax, mem(Ebx));
        }

        self.asm.op1(Push, Eax);
    }

    /// Both operands are on the stack as floats (right on top). Leaves
    /// the result in `%eax` as a bit pattern.
    fn emit_float_binary(&mut self, op: TokenKind) {
        match op {
            TokenKind::Plus | TokenKind::Minus | TokenKind::Asterisk | TokenKind::Slash => {
                self.asm.op1(Fld, mem(Esp));
                self.asm.op2(Add, SCALAR_SIZE, Esp);
                self.asm.op1(float_op(op), mem(Esp));
                self.asm.op1(Fstp, mem(Esp));
                self.asm.op1(Pop, Eax);
            }
            TokenKind::LogicAnd | TokenKind::LogicOr => {
                let short_label = self.asm.generate_label();
                let end_label = self.asm.generate_label();
                let (short_jump, short_value, other_value) = if op == TokenKind::LogicAnd {
                    (Je, 0, 1)
                } else {
                    (Jne, 1, 0)
                };

                self.asm.op1(Fld, mem_disp(SCALAR_SIZE as i32, Esp));
                self.emit_float_test();
                self.asm.op1(short_jump, short_label.clone());

                self.asm.op1(Fld, mem(Esp));
                self.emit_float_test();
                self.asm.op1(short_jump, short_label.clone());

                self.asm.op2(Mov, other_value, Eax);
                self.asm.op1(Jmp, end_label.clone());
                self.asm.label(short_label);
                self.asm.op2(Mov, short_value, Eax);
                self.asm.label(end_label);

                self.asm.op2(Add, 2 * SCALAR_SIZE, Esp);
            }
            _ if op.is_comparison() => {
                self.asm.op1(Fld, mem(Esp));
                self.asm.op1(Fld, mem_disp(SCALAR_SIZE as i32, Esp));

                self.asm.op0(Fcompp);
                self.asm.op1(Fstsw, Ax);
                self.asm.op0(Sahf);

                self.emit_flag_to_bool(float_comparison_jump(op));

                self.asm.op2(Add, 2 * SCALAR_SIZE, Esp);
            }
            _ => unreachable!("invalid float operation"),
        }
    }

    /// Both operands are on the stack as integers (right on top).
    /// Leaves the result in `%eax`.
    fn emit_int_binary(&mut self, op: TokenKind) {
        self.asm.op1(Pop, Ebx);
        self.asm.op1(Pop, Eax);

        match op {
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Asterisk
            | TokenKind::Ampersand
            | TokenKind::BitwiseOr
            | TokenKind::BitwiseXor => {
                self.asm.op2(int_op(op), Ebx, Eax);
            }
            TokenKind::Slash | TokenKind::Percent => {
                self.asm.op0(Cdq);
                self.asm.op1(Idiv, Ebx);
                if op == TokenKind::Percent {
                    self.asm.op2(Mov, Edx, Eax);
                }
            }
            TokenKind::ShiftLeft | TokenKind::ShiftRight => {
                self.asm.op2(Mov, Ebx, Ecx);
                self.asm.op2(int_op(op), Cl, Eax);
            }
            TokenKind::LogicAnd | TokenKind::LogicOr => {
                let short_label = self.asm.generate_label();
                let end_label = self.asm.generate_label();
                let (short_jump, short_value, other_value) = if op == TokenKind::LogicAnd {
                    (Je, 0, 1)
                } else {
                    (Jne, 1, 0)
                };

                self.asm.op2(Cmp, 0, Eax);
                self.asm.op1(short_jump, short_label.clone());
                self.asm.op2(Cmp, 0, Ebx);
                self.asm.op1(short_jump, short_label.clone());
                self.asm.op2(Mov, other_value, Eax);
                self.asm.op1(Jmp, end_label.clone());
                self.asm.label(short_label);
                self.asm.op2(Mov, short_value, Eax);
                self.asm.label(end_label);
            }
            _ if op.is_comparison() => {
                self.asm.op2(Cmp, Ebx, Eax);
                self.emit_flag_to_bool(int_comparison_jump(op));
            }
            _ => unreachable!("invalid integer operation"),
        }
    }

    fn emit_conditional(&mut self, expr: &Expr, cond: &Expr, then_expr: &Expr, else_expr: &Expr) {
        self.emit_value(cond);

        let else_label = self.asm.generate_label();
        let end_label = self.asm.generate_label();

        if self.program.types.is_float(cond.ty) {
            self.asm.op1(Fld, mem(Esp));
            self.asm.op2(Add, SCALAR_SIZE, Esp);
            self.emit_float_test();
        } else {
            self.asm.op1(Pop, Eax);
            self.asm.op2(Cmp, 0, Eax);
        }

        self.asm.op1(Je, else_label.clone());

        self.emit_value(then_expr);
        self.perform_conversion(expr.ty, then_expr.ty);

        self.asm.op1(Jmp, end_label.clone());
        self.asm.label(else_label);

        self.emit_value(else_expr);
        self.perform_conversion(expr.ty, else_expr.ty);

        self.asm.label(end_label);
    }

    /// cdecl call: arguments right-to-left, each converted to its formal
    /// type; caller cleans the stack; non-void results are re-pushed.
    fn emit_call(&mut self, fun: crate::symbols::FunId, name: &str, args: &[Expr]) {
        let function = self.program.function(fun);
        let formals: Vec<_> = function.parameters.variables().iter().map(|p| p.ty).collect();
        let args_size = function.arguments_size();
        let return_type = function.return_type;

        for (arg, formal) in args.iter().zip(formals.iter()).rev() {
            self.emit_value(arg);
            self.perform_conversion(*formal, arg.ty);
        }

        self.asm.op1(Call, Operand::Label(name.to_string()));
        self.asm.op2(Add, args_size, Esp);

        let types = &self.program.types;
        if types.is_float(return_type) {
            // The result arrives in st(0); reserve a slot for it.
            self.asm.op2(Sub, SCALAR_SIZE, Esp);
            self.asm.op1(Fstp, mem(Esp));
        } else if !types.is_void(return_type) {
            self.asm.op1(Push, Eax);
        }
    }
}
