//! The address visitor: evaluate an lvalue expression to the address it
//! designates and push that address.
//!
//! Mutually recursive with the value visitor: `*p` in address context
//! is the value of `p`; `a[i]` is base plus scaled index, where the
//! base comes from the address visitor for real arrays and from the
//! value visitor for pointers; `a.b` adds the field offset to the
//! address of `a`; `p->b` adds it to the value of `p`.

use super::asm::{mem_disp, mem_indexed};
use super::{CodeGen, Mnemonic::*, Register::*};
use crate::ast::{Expr, ExprKind};
use crate::scanner::TokenKind;

impl<'a> CodeGen<'a> {
    /// Push the address `expr` designates. Only reachable for
    /// expressions the semantic analysis accepted as lvalues (or
    /// dereference/subscript results).
    pub(super) fn emit_address(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Variable(v) => {
                if v.global {
                    self.asm.op1(Push, format!("${}", v.name));
                } else {
                    self.asm.op2(Lea, mem_disp(v.offset, Ebp), Eax);
                    self.asm.op1(Push, Eax);
                }
            }
            ExprKind::Unary { arg } if expr.op == TokenKind::Asterisk => {
                // The pointer's value is the address.
                self.emit_value(arg);
            }
            ExprKind::ArrayAccess { left, right } => {
                let (base, index) = if self.program.types.is_pointer(left.ty) {
                    (left, right)
                } else {
                    (right, left)
                };

                if self.program.types.is_array(base.ty) {
                    self.emit_address(base);
                } else {
                    self.emit_value(base);
                }
                self.emit_value(index);

                let element_size = self.program.types.size(expr.ty);
                self.asm.op1(Pop, Eax);
                self.asm.op2(Mov, element_size, Ebx);
                self.asm.op2(Imul, Ebx, Eax);
                self.asm.op1(Pop, Ebx);

                self.asm.op2(Lea, mem_indexed(0, Ebx, Eax, 1), Eax);
                self.asm.op1(Push, Eax);
            }
            ExprKind::StructAccess { object, field } => {
                self.emit_address(object);
                self.asm.op1(Pop, Ebx);

                self.asm.op2(Mov, field.offset, Eax);

                self.asm.op2(Lea, mem_indexed(0, Ebx, Eax, 1), Eax);
                self.asm.op1(Push, Eax);
            }
            ExprKind::IndirectAccess { pointer, field } => {
                self.emit_value(pointer);
                self.asm.op1(Pop, Ebx);

                self.asm.op2(Mov, field.offset, Eax);

                self.asm.op2(Lea, mem_indexed(0, Ebx, Eax, 1), Eax);
                self.asm.op1(Push, Eax);
            }
            // Anything else never reaches address context.
            _ => {}
        }
    }
}
