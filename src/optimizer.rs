//! AST-to-AST simplification: constant folding and dead-code elimination.
//!
//! The pass is pure and total. It assumes Cesium expressions other than
//! function calls and reactive operations are side-effect-free, and it never
//! evaluates anything but numeric literals. Folded comparison, logical, and
//! boolean-negation results are always the numeric lexemes `1`/`0` so they
//! stay inside the numeric pipeline downstream.

use crate::ast::{
    BinaryOp, Block, Declaration, Expression, FunctionDecl, Program, Statement, UnaryOp,
    VariableDecl,
};
use crate::token::{Token, TokenKind};

/// Simplifies a whole program. Idempotent: simplifying a simplified program
/// is a no-op.
pub fn simplify(program: &Program) -> Program {
    let statements = program
        .statements
        .iter()
        .filter_map(simplify_statement)
        .collect();
    Program { statements }
}

fn simplify_statement(statement: &Statement) -> Option<Statement> {
    match statement {
        Statement::Declaration(Declaration::Variable(decl)) => Some(Statement::Declaration(
            Declaration::Variable(VariableDecl {
                ty: decl.ty,
                name: decl.name.clone(),
                initializer: decl.initializer.as_ref().map(simplify_expression),
            }),
        )),
        Statement::Declaration(Declaration::Function(decl)) => Some(Statement::Declaration(
            Declaration::Function(FunctionDecl {
                name: decl.name.clone(),
                params: decl.params.clone(),
                body: simplify_block(&decl.body),
            }),
        )),
        Statement::Assignment { name, value } => Some(Statement::Assignment {
            name: name.clone(),
            value: simplify_expression(value),
        }),
        Statement::Expression(expression) => {
            Some(Statement::Expression(simplify_expression(expression)))
        }
        Statement::Print(expression) => Some(Statement::Print(simplify_expression(expression))),
        Statement::If {
            condition,
            then_block,
            else_block,
        } => simplify_if(condition, then_block, else_block.as_ref()),
        Statement::While { condition, body } => {
            let condition = simplify_expression(condition);
            let body = simplify_block(body);
            // A loop that can never be entered disappears entirely.
            if literal_truth(&condition) == Some(false) {
                return None;
            }
            Some(Statement::While { condition, body })
        }
        Statement::For {
            init,
            condition,
            update,
            body,
        } => simplify_for(init.as_deref(), condition.as_ref(), update.as_deref(), body),
        Statement::Return(expression) => Some(Statement::Return(simplify_expression(expression))),
        Statement::Block(block) => Some(Statement::Block(simplify_block(block))),
    }
}

fn simplify_if(
    condition: &Expression,
    then_block: &Block,
    else_block: Option<&Block>,
) -> Option<Statement> {
    let condition = simplify_expression(condition);
    let then_block = simplify_block(then_block);
    let else_block = else_block.map(simplify_block);

    match literal_truth(&condition) {
        Some(true) => Some(Statement::Block(then_block)),
        Some(false) => else_block.map(Statement::Block),
        None => Some(Statement::If {
            condition,
            then_block,
            else_block,
        }),
    }
}

fn simplify_for(
    init: Option<&Statement>,
    condition: Option<&Expression>,
    update: Option<&Statement>,
    body: &Block,
) -> Option<Statement> {
    let init = init.and_then(simplify_statement).map(Box::new);
    let condition = condition.map(simplify_expression);
    let update = update.and_then(simplify_statement).map(Box::new);
    let body = simplify_block(body);

    // A for-loop whose condition is constantly false runs only its
    // initialization; the init is kept inside a block.
    if let Some(condition) = &condition {
        if literal_truth(condition) == Some(false) {
            let statements = init.map(|boxed| *boxed).into_iter().collect();
            return Some(Statement::Block(Block { statements }));
        }
    }

    Some(Statement::For {
        init,
        condition,
        update,
        body,
    })
}

fn simplify_block(block: &Block) -> Block {
    let statements = block
        .statements
        .iter()
        .filter_map(simplify_statement)
        .collect();
    Block { statements }
}

fn simplify_expression(expression: &Expression) -> Expression {
    match expression {
        Expression::Literal(_) | Expression::Variable(_) => expression.clone(),
        Expression::Call { name, args } => Expression::Call {
            name: name.clone(),
            args: args.iter().map(simplify_expression).collect(),
        },
        Expression::Unary { op, operand } => simplify_unary(*op, operand),
        Expression::Binary { left, op, right } => simplify_binary(left, *op, right),
    }
}

fn simplify_unary(op: UnaryOp, operand: &Expression) -> Expression {
    let operand = simplify_expression(operand);

    if let Expression::Literal(token) = &operand {
        if token.kind == TokenKind::NumericLiteral {
            match op {
                // Negation flips the lexeme sign textually.
                UnaryOp::Neg => {
                    let lexeme = match token.lexeme.strip_prefix('-') {
                        Some(positive) => positive.to_string(),
                        None => format!("-{}", token.lexeme),
                    };
                    return numeric_literal(lexeme, token.line);
                }
                UnaryOp::Not => {
                    if let Some(truth) = literal_truth(&operand) {
                        return bool_literal(!truth, token.line);
                    }
                }
            }
        }
    }

    Expression::Unary {
        op,
        operand: Box::new(operand),
    }
}

fn simplify_binary(left: &Expression, op: BinaryOp, right: &Expression) -> Expression {
    let left = simplify_expression(left);
    let right = simplify_expression(right);

    if let (Expression::Literal(left_token), Expression::Literal(right_token)) = (&left, &right) {
        if left_token.kind == TokenKind::NumericLiteral
            && right_token.kind == TokenKind::NumericLiteral
        {
            if let Some(folded) = fold_numeric(left_token, op, right_token) {
                return folded;
            }
        }
    }

    Expression::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// Folds a binary operation over two numeric literal tokens, or returns
/// `None` when the expression must be left intact (division by zero,
/// non-finite results).
fn fold_numeric(left: &Token, op: BinaryOp, right: &Token) -> Option<Expression> {
    let left_value: f32 = left.lexeme.parse().ok()?;
    let right_value: f32 = right.lexeme.parse().ok()?;
    let line = left.line;

    if op.is_arithmetic() {
        let value = match op {
            BinaryOp::Add => left_value + right_value,
            BinaryOp::Sub => left_value - right_value,
            BinaryOp::Mul => left_value * right_value,
            BinaryOp::Div => {
                if right_value == 0.0 {
                    return None;
                }
                left_value / right_value
            }
            _ => unreachable!(),
        };
        if !value.is_finite() {
            return None;
        }
        let all_int = !left.lexeme.contains('.') && !right.lexeme.contains('.');
        return Some(numeric_literal(format_numeric(value, all_int), line));
    }

    if op.is_comparison() {
        let result = match op {
            BinaryOp::Eq => left_value == right_value,
            BinaryOp::Ne => left_value != right_value,
            BinaryOp::Lt => left_value < right_value,
            BinaryOp::Gt => left_value > right_value,
            BinaryOp::Le => left_value <= right_value,
            BinaryOp::Ge => left_value >= right_value,
            _ => unreachable!(),
        };
        return Some(bool_literal(result, line));
    }

    // Logical operators; short-circuit is moot between two literals.
    let result = match op {
        BinaryOp::And => left_value != 0.0 && right_value != 0.0,
        BinaryOp::Or => left_value != 0.0 || right_value != 0.0,
        _ => unreachable!(),
    };
    Some(bool_literal(result, line))
}

/// The result text keeps integer form only when both operands were integer
/// lexemes and the value is exactly integral; otherwise it carries a decimal
/// point so later stages classify it as a float.
fn format_numeric(value: f32, all_int: bool) -> String {
    if all_int && value == (value as i32) as f32 {
        return (value as i32).to_string();
    }
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn numeric_literal(lexeme: String, line: usize) -> Expression {
    Expression::Literal(Token::new(TokenKind::NumericLiteral, lexeme, line))
}

fn bool_literal(value: bool, line: usize) -> Expression {
    numeric_literal(if value { "1" } else { "0" }.to_string(), line)
}

/// Evaluates a numeric literal to its truth value; anything else is unknown.
fn literal_truth(expression: &Expression) -> Option<bool> {
    match expression {
        Expression::Literal(token) if token.kind == TokenKind::NumericLiteral => {
            let value: f32 = token.lexeme.parse().ok()?;
            Some(value != 0.0)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn simplify_source(source: &str) -> Program {
        simplify(&parse(lex(source).unwrap()).unwrap())
    }

    fn expr_of(program: &Program) -> &Expression {
        match &program.statements[0] {
            Statement::Expression(expression) => expression,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    fn assert_folds_to(source: &str, lexeme: &str) {
        let program = simplify_source(&format!("{};", source));
        match expr_of(&program) {
            Expression::Literal(token) => {
                assert_eq!(TokenKind::NumericLiteral, token.kind);
                assert_eq!(lexeme, token.lexeme);
            }
            other => panic!("expected folded literal, got {:?}", other),
        }
    }

    #[test]
    fn folds_integer_arithmetic() {
        assert_folds_to("2 + 3 * 4", "14");
        assert_folds_to("10 - 4", "6");
        assert_folds_to("8 / 2", "4");
    }

    #[test]
    fn inexact_integer_division_becomes_float() {
        assert_folds_to("7 / 2", "3.5");
    }

    #[test]
    fn float_operand_forces_float_result() {
        assert_folds_to("1.5 + 2.5", "4.0");
        assert_folds_to("2.0 * 3", "6.0");
    }

    #[test]
    fn division_by_zero_is_left_intact() {
        let program = simplify_source("1 / 0;");
        assert!(matches!(expr_of(&program), Expression::Binary { .. }));
    }

    #[test]
    fn folds_comparisons_to_one_and_zero() {
        assert_folds_to("1 < 2", "1");
        assert_folds_to("2 <= 1", "0");
        assert_folds_to("3 == 3", "1");
        assert_folds_to("3 != 3", "0");
    }

    #[test]
    fn folds_logical_operators() {
        assert_folds_to("1 && 2", "1");
        assert_folds_to("1 && 0", "0");
        assert_folds_to("0 || 0", "0");
        assert_folds_to("0 || 5", "1");
    }

    #[test]
    fn folds_unary_negation_textually() {
        assert_folds_to("-5", "-5");
        assert_folds_to("--5", "5");
        assert_folds_to("!0", "1");
        assert_folds_to("!7", "0");
    }

    #[test]
    fn true_branch_replaces_constant_if() {
        let program = simplify_source("if (1 < 2) { print(1); } else { print(0); }");
        match &program.statements[0] {
            Statement::Block(block) => {
                assert_eq!(vec![Statement::Print(numeric_literal("1".into(), 1))], block.statements);
            }
            other => panic!("expected then-block, got {:?}", other),
        }
    }

    #[test]
    fn false_if_without_else_disappears() {
        let program = simplify_source("if (0) { print(1); } print(2);");
        assert_eq!(1, program.statements.len());
        assert!(matches!(&program.statements[0], Statement::Print(_)));
    }

    #[test]
    fn while_false_is_removed() {
        let program = simplify_source("while (false == true) { print(99); } print(1);");
        // `false == true` involves boolean literals and is not folded, so the
        // loop survives; only a numeric-literal condition is evaluated.
        assert_eq!(2, program.statements.len());

        let program = simplify_source("while (1 > 2) { print(99); } print(1);");
        assert_eq!(1, program.statements.len());
        assert!(matches!(&program.statements[0], Statement::Print(_)));
    }

    #[test]
    fn for_with_false_condition_keeps_only_init() {
        let program = simplify_source("for (int i = 0; 1 > 2; i = i + 1) { print(i); }");
        match &program.statements[0] {
            Statement::Block(block) => {
                assert_eq!(1, block.statements.len());
                assert!(matches!(
                    &block.statements[0],
                    Statement::Declaration(Declaration::Variable(_))
                ));
            }
            other => panic!("expected init-only block, got {:?}", other),
        }
    }

    #[test]
    fn non_literal_conditions_are_not_evaluated() {
        let program = simplify_source("int x = 0; while (x) { print(1); }");
        assert_eq!(2, program.statements.len());
    }

    #[test]
    fn nested_folding_reaches_function_bodies() {
        let program = simplify_source("function f() { return 2 * 3; }");
        match &program.statements[0] {
            Statement::Declaration(Declaration::Function(decl)) => {
                assert_eq!(
                    vec![Statement::Return(numeric_literal("6".into(), 1))],
                    decl.body.statements
                );
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn simplify_is_idempotent() {
        let source = "
            int a = 2 + 3 * 4;
            if (1 < 2) { print(a); } else { print(0); }
            while (0) { print(99); }
            for (int i = 0; 0; i = i + 1) { print(i); }
            function f(int n) { return n * (2 - 1); }
        ";
        let once = simplify_source(source);
        let twice = simplify(&once);
        assert_eq!(once, twice);
    }
}
