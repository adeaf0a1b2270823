//! Statement lowering: blocks and frames, control flow, switch
//! dispatch, gotos and returns.

use super::asm::mem;
use super::{CodeGen, Mnemonic::*, Register::*};
use crate::ast::{BlockStatement, Statement, SwitchStatement};

impl<'a> CodeGen<'a> {
    /// Lower a block. At nesting level zero this is a function body and
    /// carries the `.globl`/label/prologue and the return-label/epilogue
    /// around it; every level allocates and releases its own locals.
    pub(super) fn emit_block(&mut self, block: &BlockStatement) {
        if self.block_nesting > 0 && block.statements.is_empty() {
            return;
        }

        if self.block_nesting == 0 {
            let name = self.ctx().name.clone();
            let has_frame = self.ctx().has_frame;

            self.asm.directive("globl", name.clone());
            self.asm.label(name);
            if has_frame {
                self.asm.op1(Push, Ebp);
                self.asm.op2(Mov, Esp, Ebp);
            }
        }

        self.asm.op2(Sub, block.locals.elements_size(), Esp);

        self.block_nesting += 1;
        for stmt in &block.statements {
            self.emit_statement(stmt);
        }
        self.block_nesting -= 1;

        if self.block_nesting == 0 {
            let name = self.ctx().name.clone();
            self.asm.label(format!(".RL{}", name));
        }

        self.asm.op2(Add, block.locals.elements_size(), Esp);

        if self.block_nesting == 0 {
            if self.ctx().has_frame {
                self.asm.op2(Mov, Ebp, Esp);
                self.asm.op1(Pop, Ebp);
            }
            self.asm.op0(Ret);
        }
    }

    pub(super) fn emit_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Null => {}
            Statement::Expression(e) => self.emit_expression_statement(e),
            Statement::Block(b) => self.emit_block(b),
            Statement::If {
                cond,
                then_stmt,
                else_stmt,
            } => {
                self.emit_value(cond);

                let else_label = self.asm.generate_label();
                let end_label = self.asm.generate_label();

                self.asm.op1(Pop, Eax);
                self.asm.op2(Cmp, 0, Eax);
                self.asm.op1(Je, else_label.clone());

                self.emit_statement(then_stmt);

                self.asm.op1(Jmp, end_label.clone());
                self.asm.label(else_label);

                if let Some(else_stmt) = else_stmt {
                    self.emit_statement(else_stmt);
                }

                self.asm.label(end_label);
            }
            Statement::For {
                init,
                cond,
                update,
                body,
            } => {
                let start = self.asm.generate_label();
                let end = self.asm.generate_label();
                let continue_label = self.asm.generate_label();

                if let Some(init) = init {
                    self.emit_expression_statement(init);
                }

                self.asm.label(start.clone());

                if let Some(cond) = cond {
                    self.emit_value(cond);
                    self.asm.op1(Pop, Eax);
                    self.asm.op2(Cmp, 0, Eax);
                    self.asm.op1(Je, end.clone());
                }

                self.break_labels.push(end.clone());
                self.continue_labels.push(continue_label.clone());
                self.emit_statement(body);
                self.break_labels.pop();
                self.continue_labels.pop();

                self.asm.label(continue_label);

                if let Some(update) = update {
                    self.emit_expression_statement(update);
                }
                self.asm.op1(Jmp, start);
                self.asm.label(end);
            }
            Statement::While { cond, body } => {
                let start = self.asm.generate_label();
                let end = self.asm.generate_label();

                self.asm.label(start.clone());

                self.emit_value(cond);
                self.asm.op1(Pop, Eax);
                self.asm.op2(Cmp, 0, Eax);
                self.asm.op1(Je, end.clone());

                // `continue` retests the condition.
                self.break_labels.push(end.clone());
                self.continue_labels.push(start.clone());
                self.emit_statement(body);
                self.break_labels.pop();
                self.continue_labels.pop();

                self.asm.op1(Jmp, start);
                self.asm.label(end);
            }
            Statement::Do { body, cond } => {
                let start = self.asm.generate_label();
                let end = self.asm.generate_label();
                let continue_label = self.asm.generate_label();

                self.asm.label(start.clone());

                self.break_labels.push(end.clone());
                self.continue_labels.push(continue_label.clone());
                self.emit_statement(body);
                self.break_labels.pop();
                self.continue_labels.pop();

                self.asm.label(continue_label);

                self.emit_value(cond);
                self.asm.op1(Pop, Eax);
                self.asm.op2(Cmp, 0, Eax);
                self.asm.op1(Jne, start);

                self.asm.label(end);
            }
            Statement::Label { name, next } => {
                let label = format!(".CL{}_{}", self.ctx().name, name);
                self.asm.label(label);
                self.emit_statement(next);
            }
            Statement::CaseLabel { id, next, .. } | Statement::DefaultLabel { id, next } => {
                let label = self
                    .case_labels
                    .remove(id)
                    .expect("case label outside its switch dispatch");
                self.asm.label(label);
                self.emit_statement(next);
            }
            Statement::Goto { label, .. } => {
                let target = format!(".CL{}_{}", self.ctx().name, label);
                self.asm.op1(Jmp, target);
            }
            Statement::Break => {
                let target = self.break_labels.last().expect("break outside loop or switch").clone();
                self.asm.op1(Jmp, target);
            }
            Statement::Continue => {
                let target = self.continue_labels.last().expect("continue outside loop").clone();
                self.asm.op1(Jmp, target);
            }
            Statement::Return { expr } => {
                if let Some(expr) = expr {
                    self.emit_value(expr);

                    let return_type = self.ctx().return_type;
                    self.perform_conversion(return_type, expr.ty);

                    if self.program.types.is_float(return_type) {
                        // cdecl float return travels in st(0).
                        self.asm.op1(Fld, mem(Esp));
                        self.asm.op2(Add, 4, Esp);
                    } else {
                        self.asm.op1(Pop, Eax);
                    }
                }

                let target = format!(".RL{}", self.ctx().name);
                self.asm.op1(Jmp, target);
            }
            Statement::Switch(s) => self.emit_switch(s),
        }
    }

    /// Switch lowering: evaluate the controlling expression, emit a
    /// `cmp`/`je` dispatch table over all collected cases, then the body
    /// with the end label doubling as the break target.
    fn emit_switch(&mut self, switch: &SwitchStatement) {
        self.emit_value(&switch.test);
        self.asm.op1(Pop, Edx);

        for case in &switch.cases {
            self.asm.op2(Mov, case.value, Eax);

            let label = self.asm.generate_label();
            self.case_labels.insert(case.id, label.clone());

            self.asm.op2(Cmp, Eax, Edx);
            self.asm.op1(Je, label);
        }

        if let Some(default_id) = switch.default_case {
            let label = self.asm.generate_label();
            self.case_labels.insert(default_id, label.clone());
            self.asm.op1(Jmp, label);
        }

        let end = self.asm.generate_label();
        self.asm.op1(Jmp, end.clone());

        self.break_labels.push(end.clone());
        self.emit_statement(&switch.body);
        self.break_labels.pop();

        self.asm.label(end);
    }
}
