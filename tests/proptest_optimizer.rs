//! Property tests for the simplification pass.

use cesium::ast::{BinaryOp, Expression, Program, Statement, UnaryOp};
use cesium::optimizer::simplify;
use cesium::token::{Token, TokenKind};
use proptest::prelude::*;

fn numeric(lexeme: String) -> Expression {
    Expression::Literal(Token::new(TokenKind::NumericLiteral, lexeme, 1))
}

fn expr_strategy() -> impl Strategy<Value = Expression> {
    let leaf = prop_oneof![
        (0u32..1000).prop_map(|n| numeric(n.to_string())),
        (0u32..100, 0u32..100).prop_map(|(a, b)| numeric(format!("{}.{}", a, b))),
        any::<bool>().prop_map(|b| {
            let lexeme = if b { "true" } else { "false" };
            Expression::Literal(Token::new(TokenKind::BooleanLiteral, lexeme, 1))
        }),
        "[a-z]{1,6}".prop_map(Expression::Variable),
    ];
    leaf.prop_recursive(4, 48, 2, |inner| {
        let binary_op = proptest::sample::select(vec![
            BinaryOp::Add,
            BinaryOp::Sub,
            BinaryOp::Mul,
            BinaryOp::Div,
            BinaryOp::Eq,
            BinaryOp::Ne,
            BinaryOp::Lt,
            BinaryOp::Gt,
            BinaryOp::Le,
            BinaryOp::Ge,
            BinaryOp::And,
            BinaryOp::Or,
        ]);
        let unary_op = proptest::sample::select(vec![UnaryOp::Not, UnaryOp::Neg]);
        prop_oneof![
            (inner.clone(), binary_op, inner.clone()).prop_map(|(left, op, right)| {
                Expression::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                }
            }),
            (unary_op, inner).prop_map(|(op, operand)| Expression::Unary {
                op,
                operand: Box::new(operand),
            }),
        ]
    })
}

proptest! {
    #[test]
    fn simplify_is_idempotent(expression in expr_strategy()) {
        let program = Program {
            statements: vec![Statement::Expression(expression)],
        };
        let once = simplify(&program);
        let twice = simplify(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn integer_addition_folds_exactly(a in 0i32..1000, b in 0i32..1000) {
        let program = Program {
            statements: vec![Statement::Expression(Expression::Binary {
                left: Box::new(numeric(a.to_string())),
                op: BinaryOp::Add,
                right: Box::new(numeric(b.to_string())),
            })],
        };
        let simplified = simplify(&program);
        let expected = Statement::Expression(numeric((a + b).to_string()));
        prop_assert_eq!(&simplified.statements[0], &expected);
    }

    #[test]
    fn integer_comparisons_fold_to_one_or_zero(a in 0i32..100, b in 0i32..100) {
        let program = Program {
            statements: vec![Statement::Expression(Expression::Binary {
                left: Box::new(numeric(a.to_string())),
                op: BinaryOp::Lt,
                right: Box::new(numeric(b.to_string())),
            })],
        };
        let simplified = simplify(&program);
        let expected = Statement::Expression(numeric(if a < b { "1" } else { "0" }.to_string()));
        prop_assert_eq!(&simplified.statements[0], &expected);
    }
}
