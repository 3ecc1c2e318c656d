//! AST-directed code generation.
//!
//! The emitter walks the simplified AST once, allocating local slots,
//! inferring a type for every expression, and lowering statements into the
//! symbolic instruction set. Reactive arithmetic and printing dispatch into
//! the runtime library by name; everything else is plain stack-machine code.

mod classfile;
mod instr;

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{
    BinaryOp, Block, Declaration, Expression, FunctionDecl, Parameter, Program, Statement, Type,
    UnaryOp, VariableDecl,
};
use crate::error::{Error, Result};
use crate::token::{Token, TokenKind};
use classfile::{ClassBuilder, MethodSpec, VType, ACC_PUBLIC, ACC_STATIC};
use instr::{Cond, Instr, Label};

const STREAM_CLASS: &str = "org/cesium/Stream";
const REACTIVE_CLASS: &str = "org/cesium/Reactive";
const REACTIVE_OPS_CLASS: &str = "org/cesium/ReactiveOps";
const UTIL_CLASS: &str = "org/cesium/Util";

/// Generates the class file for an optimized program.
pub fn emit(program: &Program, class_name: &str) -> Result<Vec<u8>> {
    Emitter::new(class_name).emit_program(program)
}

#[derive(Clone, Copy, Debug)]
struct Variable {
    slot: u8,
    ty: Type,
}

/// Per-method compilation state: the scope table, the next free slot, and
/// the code being laid out.
#[derive(Debug)]
struct MethodFrame {
    name: String,
    descriptor: String,
    is_main: bool,
    code: Vec<Instr>,
    variables: HashMap<String, Variable>,
    slot_types: Vec<VType>,
    param_slots: usize,
    next_label: Label,
}

#[derive(Clone, Debug)]
struct FunctionSig {
    descriptor: String,
    params: Vec<Type>,
}

#[derive(Debug)]
struct Emitter {
    class: ClassBuilder,
    class_name: String,
    frames: Vec<MethodFrame>,
    functions: HashMap<String, FunctionSig>,
}

impl Emitter {
    fn new(class_name: &str) -> Self {
        let internal = class_name.replace('.', "/");
        Emitter {
            class: ClassBuilder::new(&internal),
            class_name: internal,
            frames: Vec::new(),
            functions: HashMap::new(),
        }
    }

    fn emit_program(mut self, program: &Program) -> Result<Vec<u8>> {
        self.emit_default_constructor()?;

        self.start_method("main", "([Ljava/lang/String;)V", &[], true);
        for statement in &program.statements {
            self.emit_statement(statement)?;
        }
        self.push(Instr::ReturnVoid);
        self.end_method();

        let bytes = self.class.finish()?;
        debug!(bytes = bytes.len(), "assembled class file");
        Ok(bytes)
    }

    /// `public <ClassName>() { super(); }`
    fn emit_default_constructor(&mut self) -> Result<()> {
        let object_init = self.class.method_id("java/lang/Object", "<init>", "()V")?;
        self.class.add_method(MethodSpec {
            access: ACC_PUBLIC,
            name: "<init>".to_string(),
            descriptor: "()V".to_string(),
            code: vec![
                Instr::LoadRef(0),
                Instr::InvokeSpecial(object_init),
                Instr::ReturnVoid,
            ],
            slot_types: vec![VType::Ref("java/lang/Object".to_string())],
            param_slots: 1,
        });
        Ok(())
    }

    /// Pushes a fresh method frame. `main` reserves slot 0 for the argument
    /// array; functions bind their parameters from slot 0 upward.
    fn start_method(&mut self, name: &str, descriptor: &str, params: &[Parameter], is_main: bool) {
        let mut variables = HashMap::new();
        let mut slot_types = Vec::new();
        if is_main {
            slot_types.push(VType::Ref("[Ljava/lang/String;".to_string()));
        } else {
            for (slot, param) in params.iter().enumerate() {
                variables.insert(
                    param.name.clone(),
                    Variable {
                        slot: slot as u8,
                        ty: param.ty,
                    },
                );
                slot_types.push(param_vtype(param.ty));
            }
        }
        let param_slots = slot_types.len();
        self.frames.push(MethodFrame {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_main,
            code: Vec::new(),
            variables,
            slot_types,
            param_slots,
            next_label: 0,
        });
    }

    /// Finalizes the current frame into a class method.
    fn end_method(&mut self) {
        let frame = self.frames.pop().expect("active method frame");
        self.class.add_method(MethodSpec {
            access: ACC_PUBLIC | ACC_STATIC,
            name: frame.name,
            descriptor: frame.descriptor,
            code: frame.code,
            slot_types: frame.slot_types,
            param_slots: frame.param_slots,
        });
    }

    fn frame(&mut self) -> &mut MethodFrame {
        self.frames.last_mut().expect("active method frame")
    }

    fn push(&mut self, instr: Instr) {
        self.frame().code.push(instr);
    }

    fn new_label(&mut self) -> Label {
        let frame = self.frame();
        let label = frame.next_label;
        frame.next_label += 1;
        label
    }

    /// Looks a variable up in the current method's scope.
    fn lookup(&self, name: &str) -> Result<Variable> {
        self.frames
            .last()
            .and_then(|frame| frame.variables.get(name))
            .copied()
            .ok_or_else(|| Error::codegen(format!("undeclared variable '{}'", name)))
    }

    /// Allocates the next local slot for a declared variable. Every variable
    /// occupies exactly one slot regardless of type.
    fn allocate(&mut self, name: &str, ty: Type) -> Result<u8> {
        let frame = self.frame();
        let slot = frame.slot_types.len();
        if slot > u8::MAX as usize {
            return Err(Error::codegen("too many local variables"));
        }
        frame.slot_types.push(local_vtype(ty));
        frame.variables.insert(
            name.to_string(),
            Variable {
                slot: slot as u8,
                ty,
            },
        );
        Ok(slot as u8)
    }

    // Statements

    fn emit_statement(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::Declaration(Declaration::Variable(decl)) => {
                self.emit_variable_declaration(decl)
            }
            Statement::Declaration(Declaration::Function(decl)) => {
                self.emit_function_declaration(decl)
            }
            Statement::Assignment { name, value } => self.emit_assignment(name, value),
            Statement::Expression(expression) => self.emit_expression_statement(expression),
            Statement::Print(expression) => self.emit_print(expression),
            Statement::If {
                condition,
                then_block,
                else_block,
            } => self.emit_if(condition, then_block, else_block.as_ref()),
            Statement::While { condition, body } => self.emit_while(condition, body),
            Statement::For {
                init,
                condition,
                update,
                body,
            } => self.emit_for(init.as_deref(), condition.as_ref(), update.as_deref(), body),
            Statement::Return(expression) => self.emit_return(expression),
            Statement::Block(block) => {
                for statement in &block.statements {
                    self.emit_statement(statement)?;
                }
                Ok(())
            }
        }
    }

    fn emit_variable_declaration(&mut self, decl: &VariableDecl) -> Result<()> {
        let slot = self.allocate(&decl.name, decl.ty)?;

        let initializer = match &decl.initializer {
            Some(initializer) => initializer,
            None => return self.emit_default_value(decl.ty, slot),
        };

        // A Stream initialized with a literal constructs a fresh Stream and
        // seeds its value through the library helper.
        if decl.ty == Type::Stream {
            if let Expression::Literal(token) = initializer {
                return self.emit_stream_with_literal(slot, token);
            }
        }

        let value_ty = self.expression_type(initializer)?;
        self.emit_expression(initializer)?;
        self.coerce(decl.ty, value_ty, &decl.name)?;
        self.store_variable(decl.ty, slot);
        Ok(())
    }

    fn emit_default_value(&mut self, ty: Type, slot: u8) -> Result<()> {
        match ty {
            Type::Int => {
                self.push(Instr::PushInt(0));
                self.push(Instr::StoreInt(slot));
            }
            Type::Float => {
                self.push(Instr::PushFloat(0.0));
                self.push(Instr::StoreFloat(slot));
            }
            Type::Str => {
                let empty = self.class.string_id("")?;
                self.push(Instr::PushString(empty));
                self.push(Instr::StoreRef(slot));
            }
            Type::Stream => {
                self.emit_new_stream(slot)?;
            }
            Type::Reactive => {
                self.push(Instr::PushNull);
                self.push(Instr::StoreRef(slot));
            }
        }
        Ok(())
    }

    /// `new Stream()` stored into the given slot.
    fn emit_new_stream(&mut self, slot: u8) -> Result<()> {
        let stream_class = self.class.class_id(STREAM_CLASS)?;
        let stream_init = self.class.method_id(STREAM_CLASS, "<init>", "()V")?;
        self.push(Instr::New(stream_class));
        self.push(Instr::Dup);
        self.push(Instr::InvokeSpecial(stream_init));
        self.push(Instr::StoreRef(slot));
        Ok(())
    }

    fn emit_stream_with_literal(&mut self, slot: u8, token: &Token) -> Result<()> {
        if token.kind != TokenKind::NumericLiteral || token.lexeme.contains('.') {
            return Err(Error::codegen(format!(
                "cannot initialize Stream with non-integer literal '{}'",
                token.lexeme
            )));
        }
        let value = parse_int(token)?;
        self.emit_new_stream(slot)?;
        let set_value = self
            .class
            .method_id(UTIL_CLASS, "setValue", "(Lorg/cesium/Stream;I)V")?;
        self.push(Instr::LoadRef(slot));
        self.push(Instr::PushInt(value));
        self.push(Instr::InvokeStatic(set_value));
        Ok(())
    }

    fn emit_function_declaration(&mut self, decl: &FunctionDecl) -> Result<()> {
        if self.frames.len() > 1 {
            return Err(Error::codegen(
                "nested function declarations are not supported",
            ));
        }
        if self.functions.contains_key(&decl.name) {
            return Err(Error::codegen(format!(
                "function '{}' is already defined",
                decl.name
            )));
        }

        let mut descriptor = String::from("(");
        for param in &decl.params {
            descriptor.push_str(type_descriptor(param.ty));
        }
        descriptor.push_str(")I");

        // Registered before the body so recursive calls resolve.
        self.functions.insert(
            decl.name.clone(),
            FunctionSig {
                descriptor: descriptor.clone(),
                params: decl.params.iter().map(|p| p.ty).collect(),
            },
        );

        self.start_method(&decl.name, &descriptor, &decl.params, false);
        for statement in &decl.body.statements {
            self.emit_statement(statement)?;
        }
        // Fallthrough guard: a function without an explicit return yields 0.
        self.push(Instr::PushInt(0));
        self.push(Instr::ReturnInt);
        self.end_method();
        Ok(())
    }

    fn emit_assignment(&mut self, name: &str, value: &Expression) -> Result<()> {
        let variable = self.lookup(name)?;
        let value_ty = self.expression_type(value)?;
        self.emit_expression(value)?;
        self.coerce(variable.ty, value_ty, name)?;
        self.store_variable(variable.ty, variable.slot);
        Ok(())
    }

    /// Widens int to float where a float is expected; any other mismatch is
    /// an error.
    fn coerce(&mut self, expected: Type, found: Type, name: &str) -> Result<()> {
        if expected == found {
            return Ok(());
        }
        if expected == Type::Float && found == Type::Int {
            self.push(Instr::IntToFloat);
            return Ok(());
        }
        Err(Error::codegen(format!(
            "cannot assign {} value to '{}' of type {}",
            found, name, expected
        )))
    }

    fn emit_expression_statement(&mut self, expression: &Expression) -> Result<()> {
        // The setValue builtin returns nothing, so there is no value to pop.
        if let Expression::Call { name, args } = expression {
            if name == "setValue" {
                return self.emit_set_value(args);
            }
        }
        self.emit_expression(expression)?;
        self.push(Instr::Pop);
        Ok(())
    }

    fn emit_set_value(&mut self, args: &[Expression]) -> Result<()> {
        if args.len() != 2 {
            return Err(Error::codegen(format!(
                "setValue expects a stream and an integer value, found {} arguments",
                args.len()
            )));
        }
        let stream_ty = self.expression_type(&args[0])?;
        let value_ty = self.expression_type(&args[1])?;
        if stream_ty != Type::Stream || value_ty != Type::Int {
            return Err(Error::codegen(format!(
                "setValue expects a Stream and an int, found {} and {}",
                stream_ty, value_ty
            )));
        }
        self.emit_expression(&args[0])?;
        self.emit_expression(&args[1])?;
        let set_value = self
            .class
            .method_id(UTIL_CLASS, "setValue", "(Lorg/cesium/Stream;I)V")?;
        self.push(Instr::InvokeStatic(set_value));
        Ok(())
    }

    fn emit_print(&mut self, expression: &Expression) -> Result<()> {
        let ty = self.expression_type(expression)?;

        if ty == Type::Reactive {
            // Reactive values print through the library so an absent value
            // appears as "null".
            self.emit_expression(expression)?;
            let get_value = self
                .class
                .method_id(REACTIVE_CLASS, "getValue", "()Ljava/lang/Integer;")?;
            let print_reactive =
                self.class
                    .method_id(UTIL_CLASS, "printReactiveValue", "(Ljava/lang/Integer;)V")?;
            self.push(Instr::InvokeVirtual(get_value));
            self.push(Instr::InvokeStatic(print_reactive));
            return Ok(());
        }

        let out = self
            .class
            .field_id("java/lang/System", "out", "Ljava/io/PrintStream;")?;
        self.push(Instr::GetStatic(out));
        self.emit_expression(expression)?;
        let descriptor = match ty {
            Type::Int => "(I)V",
            Type::Float => "(F)V",
            Type::Str => "(Ljava/lang/String;)V",
            Type::Stream | Type::Reactive => "(Ljava/lang/Object;)V",
        };
        let println = self
            .class
            .method_id("java/io/PrintStream", "println", descriptor)?;
        self.push(Instr::InvokeVirtual(println));
        Ok(())
    }

    fn emit_condition(&mut self, condition: &Expression, context: &str) -> Result<()> {
        let ty = self.expression_type(condition)?;
        if ty != Type::Int {
            return Err(Error::codegen(format!(
                "{} condition must be an int expression, found {}",
                context, ty
            )));
        }
        self.emit_expression(condition)
    }

    fn emit_if(
        &mut self,
        condition: &Expression,
        then_block: &Block,
        else_block: Option<&Block>,
    ) -> Result<()> {
        let else_label = self.new_label();
        let end_label = self.new_label();

        self.emit_condition(condition, "if")?;
        self.push(Instr::Branch(Cond::Eq, else_label));

        for statement in &then_block.statements {
            self.emit_statement(statement)?;
        }
        self.push(Instr::Jump(end_label));

        self.push(Instr::Bind(else_label));
        if let Some(else_block) = else_block {
            for statement in &else_block.statements {
                self.emit_statement(statement)?;
            }
        }
        self.push(Instr::Bind(end_label));
        Ok(())
    }

    fn emit_while(&mut self, condition: &Expression, body: &Block) -> Result<()> {
        let start_label = self.new_label();
        let end_label = self.new_label();

        self.push(Instr::Bind(start_label));
        self.emit_condition(condition, "while")?;
        self.push(Instr::Branch(Cond::Eq, end_label));

        for statement in &body.statements {
            self.emit_statement(statement)?;
        }
        self.push(Instr::Jump(start_label));
        self.push(Instr::Bind(end_label));
        Ok(())
    }

    fn emit_for(
        &mut self,
        init: Option<&Statement>,
        condition: Option<&Expression>,
        update: Option<&Statement>,
        body: &Block,
    ) -> Result<()> {
        if let Some(init) = init {
            self.emit_statement(init)?;
        }
        let start_label = self.new_label();
        let end_label = self.new_label();

        self.push(Instr::Bind(start_label));
        if let Some(condition) = condition {
            self.emit_condition(condition, "for")?;
            self.push(Instr::Branch(Cond::Eq, end_label));
        }
        for statement in &body.statements {
            self.emit_statement(statement)?;
        }
        if let Some(update) = update {
            self.emit_statement(update)?;
        }
        self.push(Instr::Jump(start_label));
        self.push(Instr::Bind(end_label));
        Ok(())
    }

    fn emit_return(&mut self, expression: &Expression) -> Result<()> {
        if self.frame().is_main {
            // Top-level return discards its value and leaves main.
            self.emit_expression(expression)?;
            self.push(Instr::Pop);
            self.push(Instr::ReturnVoid);
            return Ok(());
        }
        let ty = self.expression_type(expression)?;
        if ty != Type::Int {
            return Err(Error::codegen(format!(
                "function must return int, found {}",
                ty
            )));
        }
        self.emit_expression(expression)?;
        self.push(Instr::ReturnInt);
        Ok(())
    }

    // Expressions

    fn emit_expression(&mut self, expression: &Expression) -> Result<()> {
        match expression {
            Expression::Literal(token) => self.emit_literal(token),
            Expression::Variable(name) => {
                let variable = self.lookup(name)?;
                self.load_variable(variable.ty, variable.slot);
                Ok(())
            }
            Expression::Unary { op, operand } => self.emit_unary(*op, operand),
            Expression::Binary { left, op, right } => self.emit_binary(left, *op, right),
            Expression::Call { name, args } => self.emit_call(name, args),
        }
    }

    fn emit_literal(&mut self, token: &Token) -> Result<()> {
        match token.kind {
            TokenKind::NumericLiteral => {
                if token.lexeme.contains('.') {
                    let value: f32 = token.lexeme.parse().map_err(|_| {
                        Error::codegen(format!("malformed float literal '{}'", token.lexeme))
                    })?;
                    self.push(Instr::PushFloat(value));
                } else {
                    self.push(Instr::PushInt(parse_int(token)?));
                }
            }
            TokenKind::BooleanLiteral => {
                let value = if token.lexeme == "true" { 1 } else { 0 };
                self.push(Instr::PushInt(value));
            }
            TokenKind::StringLiteral => {
                let id = self.class.string_id(&token.lexeme)?;
                self.push(Instr::PushString(id));
            }
            _ => {
                return Err(Error::codegen(format!(
                    "unsupported literal '{}'",
                    token.lexeme
                )))
            }
        }
        Ok(())
    }

    fn emit_unary(&mut self, op: UnaryOp, operand: &Expression) -> Result<()> {
        let ty = self.expression_type(operand)?;
        match op {
            UnaryOp::Not => {
                if ty != Type::Int {
                    return Err(Error::codegen(format!(
                        "'!' requires an int operand, found {}",
                        ty
                    )));
                }
                self.emit_expression(operand)?;
                let true_label = self.new_label();
                let end_label = self.new_label();
                self.push(Instr::Branch(Cond::Eq, true_label));
                self.push(Instr::PushInt(0));
                self.push(Instr::Jump(end_label));
                self.push(Instr::Bind(true_label));
                self.push(Instr::PushInt(1));
                self.push(Instr::Bind(end_label));
            }
            UnaryOp::Neg => {
                self.emit_expression(operand)?;
                match ty {
                    Type::Int => self.push(Instr::NegInt),
                    Type::Float => self.push(Instr::NegFloat),
                    _ => {
                        return Err(Error::codegen(format!(
                            "unary minus on non-numeric type {}",
                            ty
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    fn emit_binary(&mut self, left: &Expression, op: BinaryOp, right: &Expression) -> Result<()> {
        let left_ty = self.expression_type(left)?;
        let right_ty = self.expression_type(right)?;

        if op.is_logical() {
            if left_ty != Type::Int || right_ty != Type::Int {
                return Err(Error::codegen(format!(
                    "logical operations are only supported on int operands, found {} and {}",
                    left_ty, right_ty
                )));
            }
            return self.emit_logical(left, op, right);
        }

        if op.is_comparison() {
            if !left_ty.is_numeric() || !right_ty.is_numeric() {
                return Err(Error::codegen(format!(
                    "comparison is only supported on int and float operands, found {} and {}",
                    left_ty, right_ty
                )));
            }
            return self.emit_comparison(left, left_ty, op, right, right_ty);
        }

        // Arithmetic.
        if left_ty.is_numeric() && right_ty.is_numeric() {
            return self.emit_arithmetic(left, left_ty, op, right, right_ty);
        }
        if left_ty.is_reactive() && right_ty == Type::Int {
            return self.emit_reactive_arithmetic(left, left_ty, op, right);
        }
        if left_ty == Type::Str || right_ty == Type::Str {
            return Err(Error::codegen(format!(
                "arithmetic on non-numeric operand of type string ('{}' is not supported on strings)",
                op.lexeme()
            )));
        }
        Err(Error::codegen(format!(
            "reactive arithmetic requires a Stream or Reactive left operand and an int right operand, found {} and {}",
            left_ty, right_ty
        )))
    }

    fn emit_arithmetic(
        &mut self,
        left: &Expression,
        left_ty: Type,
        op: BinaryOp,
        right: &Expression,
        right_ty: Type,
    ) -> Result<()> {
        let float = left_ty == Type::Float || right_ty == Type::Float;

        self.emit_expression(left)?;
        if left_ty == Type::Int && right_ty == Type::Float {
            self.push(Instr::IntToFloat);
        }
        self.emit_expression(right)?;
        if left_ty == Type::Float && right_ty == Type::Int {
            self.push(Instr::IntToFloat);
        }

        let instr = match (op, float) {
            (BinaryOp::Add, false) => Instr::AddInt,
            (BinaryOp::Sub, false) => Instr::SubInt,
            (BinaryOp::Mul, false) => Instr::MulInt,
            (BinaryOp::Div, false) => Instr::DivInt,
            (BinaryOp::Add, true) => Instr::AddFloat,
            (BinaryOp::Sub, true) => Instr::SubFloat,
            (BinaryOp::Mul, true) => Instr::MulFloat,
            (BinaryOp::Div, true) => Instr::DivFloat,
            _ => unreachable!("non-arithmetic operator"),
        };
        self.push(instr);
        Ok(())
    }

    /// Arithmetic with a Stream/Reactive left operand lowers to a static
    /// call on the reactive-ops helper; the overload is picked by the left
    /// operand's type and the result is always a Reactive.
    fn emit_reactive_arithmetic(
        &mut self,
        left: &Expression,
        left_ty: Type,
        op: BinaryOp,
        right: &Expression,
    ) -> Result<()> {
        self.emit_expression(left)?;
        self.emit_expression(right)?;

        let method = match op {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "subtract",
            BinaryOp::Mul => "multiply",
            BinaryOp::Div => "divide",
            _ => unreachable!("non-arithmetic operator"),
        };
        let descriptor = if left_ty == Type::Stream {
            "(Lorg/cesium/Stream;I)Lorg/cesium/Reactive;"
        } else {
            "(Lorg/cesium/Reactive;I)Lorg/cesium/Reactive;"
        };
        let ops = self.class.method_id(REACTIVE_OPS_CLASS, method, descriptor)?;
        self.push(Instr::InvokeStatic(ops));
        Ok(())
    }

    fn emit_comparison(
        &mut self,
        left: &Expression,
        left_ty: Type,
        op: BinaryOp,
        right: &Expression,
        right_ty: Type,
    ) -> Result<()> {
        let float = left_ty == Type::Float || right_ty == Type::Float;

        self.emit_expression(left)?;
        if left_ty == Type::Int && right_ty == Type::Float {
            self.push(Instr::IntToFloat);
        }
        self.emit_expression(right)?;
        if left_ty == Type::Float && right_ty == Type::Int {
            self.push(Instr::IntToFloat);
        }

        let cond = match op {
            BinaryOp::Eq => Cond::Eq,
            BinaryOp::Ne => Cond::Ne,
            BinaryOp::Lt => Cond::Lt,
            BinaryOp::Gt => Cond::Gt,
            BinaryOp::Le => Cond::Le,
            BinaryOp::Ge => Cond::Ge,
            _ => unreachable!("non-comparison operator"),
        };

        let true_label = self.new_label();
        let end_label = self.new_label();
        if float {
            self.push(Instr::FloatCmp);
            self.push(Instr::Branch(cond, true_label));
        } else {
            self.push(Instr::BranchCmpInt(cond, true_label));
        }

        // Materialize the result as 0 or 1 so it composes with further
        // logical or arithmetic operations.
        self.push(Instr::PushInt(0));
        self.push(Instr::Jump(end_label));
        self.push(Instr::Bind(true_label));
        self.push(Instr::PushInt(1));
        self.push(Instr::Bind(end_label));
        Ok(())
    }

    fn emit_logical(&mut self, left: &Expression, op: BinaryOp, right: &Expression) -> Result<()> {
        match op {
            BinaryOp::Or => {
                // Short-circuit: a non-zero left skips the right operand.
                let true_label = self.new_label();
                let false_label = self.new_label();
                let end_label = self.new_label();

                self.emit_expression(left)?;
                self.push(Instr::Branch(Cond::Ne, true_label));
                self.emit_expression(right)?;
                self.push(Instr::Branch(Cond::Eq, false_label));
                self.push(Instr::PushInt(1));
                self.push(Instr::Jump(end_label));
                self.push(Instr::Bind(false_label));
                self.push(Instr::PushInt(0));
                self.push(Instr::Jump(end_label));
                self.push(Instr::Bind(true_label));
                self.push(Instr::PushInt(1));
                self.push(Instr::Bind(end_label));
            }
            BinaryOp::And => {
                // Short-circuit: a zero left skips the right operand.
                let false_label = self.new_label();
                let end_label = self.new_label();

                self.emit_expression(left)?;
                self.push(Instr::Branch(Cond::Eq, false_label));
                self.emit_expression(right)?;
                self.push(Instr::Branch(Cond::Eq, false_label));
                self.push(Instr::PushInt(1));
                self.push(Instr::Jump(end_label));
                self.push(Instr::Bind(false_label));
                self.push(Instr::PushInt(0));
                self.push(Instr::Jump(end_label));
                self.push(Instr::Bind(end_label));
            }
            _ => unreachable!("non-logical operator"),
        }
        Ok(())
    }

    fn emit_call(&mut self, name: &str, args: &[Expression]) -> Result<()> {
        if name == "setValue" {
            return Err(Error::codegen("setValue does not produce a value"));
        }
        let sig = match self.functions.get(name) {
            Some(sig) => sig.clone(),
            None => {
                return Err(Error::codegen(format!(
                    "call to undefined function '{}'",
                    name
                )))
            }
        };
        if args.len() != sig.params.len() {
            return Err(Error::codegen(format!(
                "function '{}' expects {} arguments, found {}",
                name,
                sig.params.len(),
                args.len()
            )));
        }
        for (arg, &param_ty) in args.iter().zip(&sig.params) {
            let arg_ty = self.expression_type(arg)?;
            self.emit_expression(arg)?;
            if arg_ty == param_ty {
                continue;
            }
            if param_ty == Type::Float && arg_ty == Type::Int {
                self.push(Instr::IntToFloat);
                continue;
            }
            return Err(Error::codegen(format!(
                "cannot pass {} argument for {} parameter in call to '{}'",
                arg_ty, param_ty, name
            )));
        }
        let method = self
            .class
            .method_id(&self.class_name, name, &sig.descriptor)?;
        self.push(Instr::InvokeStatic(method));
        Ok(())
    }

    fn load_variable(&mut self, ty: Type, slot: u8) {
        let instr = match ty {
            Type::Int => Instr::LoadInt(slot),
            Type::Float => Instr::LoadFloat(slot),
            Type::Str | Type::Stream | Type::Reactive => Instr::LoadRef(slot),
        };
        self.push(instr);
    }

    fn store_variable(&mut self, ty: Type, slot: u8) {
        let instr = match ty {
            Type::Int => Instr::StoreInt(slot),
            Type::Float => Instr::StoreFloat(slot),
            Type::Str | Type::Stream | Type::Reactive => Instr::StoreRef(slot),
        };
        self.push(instr);
    }

    /// Post-order type inference. Literal numerics split on the presence of
    /// a decimal point; booleans are ints; user functions return int by
    /// fiat; arithmetic with a reactive operand produces a Reactive.
    fn expression_type(&self, expression: &Expression) -> Result<Type> {
        match expression {
            Expression::Literal(token) => match token.kind {
                TokenKind::NumericLiteral => {
                    if token.lexeme.contains('.') {
                        Ok(Type::Float)
                    } else {
                        Ok(Type::Int)
                    }
                }
                TokenKind::BooleanLiteral => Ok(Type::Int),
                TokenKind::StringLiteral => Ok(Type::Str),
                _ => Err(Error::codegen(format!(
                    "unsupported literal '{}'",
                    token.lexeme
                ))),
            },
            Expression::Variable(name) => Ok(self.lookup(name)?.ty),
            Expression::Unary { op, operand } => match op {
                UnaryOp::Not => Ok(Type::Int),
                UnaryOp::Neg => self.expression_type(operand),
            },
            Expression::Binary { left, op, right } => {
                if op.is_logical() || op.is_comparison() {
                    return Ok(Type::Int);
                }
                let left_ty = self.expression_type(left)?;
                let right_ty = self.expression_type(right)?;
                if left_ty.is_reactive() || right_ty.is_reactive() {
                    Ok(Type::Reactive)
                } else if left_ty == Type::Float || right_ty == Type::Float {
                    Ok(Type::Float)
                } else {
                    Ok(Type::Int)
                }
            }
            Expression::Call { .. } => Ok(Type::Int),
        }
    }
}

fn type_descriptor(ty: Type) -> &'static str {
    match ty {
        Type::Int => "I",
        Type::Float => "F",
        Type::Str => "Ljava/lang/String;",
        // Stream and Reactive cross function boundaries as plain objects.
        Type::Stream | Type::Reactive => "Ljava/lang/Object;",
    }
}

/// Verification type of a declared local slot.
fn local_vtype(ty: Type) -> VType {
    match ty {
        Type::Int => VType::Int,
        Type::Float => VType::Float,
        Type::Str => VType::Ref("java/lang/String".to_string()),
        Type::Stream => VType::Ref(STREAM_CLASS.to_string()),
        Type::Reactive => VType::Ref(REACTIVE_CLASS.to_string()),
    }
}

/// Verification type of a parameter slot; it must match the descriptor, so
/// Stream/Reactive parameters are plain objects.
fn param_vtype(ty: Type) -> VType {
    match ty {
        Type::Stream | Type::Reactive => VType::Ref("java/lang/Object".to_string()),
        other => local_vtype(other),
    }
}

fn parse_int(token: &Token) -> Result<i32> {
    token
        .lexeme
        .parse()
        .map_err(|_| Error::codegen(format!("integer literal out of range: '{}'", token.lexeme)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::optimizer::simplify;
    use crate::parser::parse;

    fn compile(source: &str) -> Result<Vec<u8>> {
        let program = simplify(&parse(lex(source).unwrap()).unwrap());
        emit(&program, "Test")
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn emits_simple_arithmetic_program() {
        let bytes = compile("int a = 2 + 3 * 4; print(a);").unwrap();
        assert_eq!(&[0xCA, 0xFE, 0xBA, 0xBE], &bytes[..4]);
        assert!(contains(&bytes, b"java/io/PrintStream"));
    }

    #[test]
    fn reactive_pipeline_links_against_the_runtime_library() {
        let source = "Stream s = 5; Reactive r = s * 2; print(r); setValue(s, 7); print(r);";
        let bytes = compile(source).unwrap();
        assert!(contains(&bytes, b"org/cesium/Stream"));
        assert!(contains(&bytes, b"org/cesium/ReactiveOps"));
        assert!(contains(&bytes, b"multiply"));
        assert!(contains(&bytes, b"printReactiveValue"));
    }

    #[test]
    fn reactive_ops_overload_follows_left_operand() {
        let source = "Stream s; Reactive r = s + 1; Reactive q = r - 2;";
        let bytes = compile(source).unwrap();
        assert!(contains(&bytes, b"(Lorg/cesium/Stream;I)Lorg/cesium/Reactive;"));
        assert!(contains(&bytes, b"(Lorg/cesium/Reactive;I)Lorg/cesium/Reactive;"));
        assert!(contains(&bytes, b"subtract"));
    }

    #[test]
    fn dead_branch_is_absent_from_the_artifact() {
        let bytes =
            compile("if (1 < 2) { print(\"taken\"); } else { print(\"dropped\"); }").unwrap();
        assert!(contains(&bytes, b"taken"));
        assert!(!contains(&bytes, b"dropped"));
    }

    #[test]
    fn while_false_leaves_no_trace() {
        let bytes = compile("while (0) { print(\"never\"); } print(\"after\");").unwrap();
        assert!(!contains(&bytes, b"never"));
        assert!(contains(&bytes, b"after"));
    }

    #[test]
    fn functions_get_int_descriptors() {
        let source = "function addOne(int x) { return x + 1; } print(addOne(1));";
        let bytes = compile(source).unwrap();
        assert!(contains(&bytes, b"addOne"));
        assert!(contains(&bytes, b"(I)I"));
    }

    #[test]
    fn empty_function_compiles() {
        assert!(compile("function f() {}").is_ok());
    }

    #[test]
    fn mixed_parameter_descriptors() {
        let source = "function f(int a, float b, string c, Stream d) { return 0; }";
        let bytes = compile(source).unwrap();
        assert!(contains(&bytes, b"(IFLjava/lang/String;Ljava/lang/Object;)I"));
    }

    #[test]
    fn for_loop_compiles() {
        assert!(compile("for (int i = 0; i < 3; i = i + 1) { print(i); }").is_ok());
    }

    #[test]
    fn for_without_condition_compiles() {
        assert!(compile("for (;;) {} print(1);").is_ok());
    }

    #[test]
    fn statement_after_top_level_return_compiles() {
        assert!(compile("return 0; print(1);").is_ok());
    }

    #[test]
    fn float_comparison_and_mixed_arithmetic() {
        let source = "float x = 1.5; if (x < 2) { print(x + 1); }";
        assert!(compile(source).is_ok());
    }

    #[test]
    fn emission_is_deterministic() {
        let source = "Stream s = 5; Reactive r = s * 2; function f(int n) { return n; } print(f(3));";
        assert_eq!(compile(source).unwrap(), compile(source).unwrap());
    }

    #[test]
    fn undeclared_variable_is_rejected() {
        let err = compile("x = 1;").unwrap_err();
        assert_eq!(
            "Code generation error: undeclared variable 'x'",
            err.to_string()
        );
    }

    #[test]
    fn undefined_function_is_rejected() {
        let err = compile("print(g(1));").unwrap_err();
        assert_eq!(
            "Code generation error: call to undefined function 'g'",
            err.to_string()
        );
    }

    #[test]
    fn string_concatenation_is_rejected() {
        let err = compile("print(\"a\" + \"b\");").unwrap_err();
        assert!(err
            .to_string()
            .contains("arithmetic on non-numeric operand of type string"));
    }

    #[test]
    fn reactive_on_the_right_alone_is_rejected() {
        let err = compile("Stream s; Reactive r = 2 * s;").unwrap_err();
        assert!(err.to_string().contains("reactive arithmetic"));
    }

    #[test]
    fn reactive_with_float_is_rejected() {
        let err = compile("Stream s; Reactive r = s * 2.5;").unwrap_err();
        assert!(err.to_string().contains("reactive arithmetic"));
    }

    #[test]
    fn comparison_on_stream_is_rejected() {
        let err = compile("Stream s; if (s < 1) {}").unwrap_err();
        assert!(err.to_string().contains("comparison is only supported"));
    }

    #[test]
    fn nested_function_is_rejected() {
        let err = compile("function f() { function g() {} }").unwrap_err();
        assert_eq!(
            "Code generation error: nested function declarations are not supported",
            err.to_string()
        );
    }

    #[test]
    fn stream_with_float_initializer_is_rejected() {
        let err = compile("Stream s = 1.5;").unwrap_err();
        assert!(err
            .to_string()
            .contains("cannot initialize Stream with non-integer literal"));
    }

    #[test]
    fn set_value_in_expression_position_is_rejected() {
        let err = compile("Stream s; int x = setValue(s, 1);").unwrap_err();
        assert_eq!(
            "Code generation error: setValue does not produce a value",
            err.to_string()
        );
    }

    #[test]
    fn too_many_locals_is_rejected() {
        let mut source = String::new();
        for i in 0..300 {
            source.push_str(&format!("int x{} = {};\n", i, i));
        }
        let err = compile(&source).unwrap_err();
        assert_eq!(
            "Code generation error: too many local variables",
            err.to_string()
        );
    }

    #[test]
    fn declared_variables_print_their_defaults() {
        // `int x; print(x);` emits a load of the zero-initialized slot.
        assert!(compile("int x; print(x);").is_ok());
        assert!(compile("string s; print(s);").is_ok());
        assert!(compile("Reactive r; print(r);").is_ok());
    }
}
