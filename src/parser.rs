//! LL(1) recursive-descent parser producing a [`Program`] AST.

use crate::ast::{
    BinaryOp, Block, Declaration, Expression, FunctionDecl, Parameter, Program, Statement, Type,
    UnaryOp, VariableDecl,
};
use crate::error::{Error, Result};
use crate::token::{Token, TokenKind};

/// Parses a token stream into a program. The first violation of the grammar
/// aborts the parse; there is no recovery.
pub fn parse(tokens: Vec<Token>) -> Result<Program> {
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_program()
}

#[derive(Debug)]
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    // Helper functions

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// Looks one token past the current one; used only to split assignments
    /// from expression statements.
    fn peek_second(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Describes the current token for error messages, or "EOF".
    fn found(&self) -> String {
        match self.peek() {
            Some(token) => format!("'{}'", token.lexeme),
            None => "EOF".to_string(),
        }
    }

    fn err_expected(&self, expected: &str) -> Error {
        Error::parse(format!("expected {}, found {}", expected, self.found()))
    }

    /// Consumes the current token if it is the given delimiter.
    fn try_delimiter(&mut self, lexeme: &str) -> bool {
        match self.peek() {
            Some(token) if token.is(TokenKind::Delimiter, lexeme) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_delimiter(&mut self, lexeme: &str) -> Result<()> {
        if self.try_delimiter(lexeme) {
            Ok(())
        } else {
            Err(self.err_expected(&format!("'{}'", lexeme)))
        }
    }

    fn expect_operator(&mut self, lexeme: &str) -> Result<()> {
        match self.peek() {
            Some(token) if token.is(TokenKind::Operator, lexeme) => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.err_expected(&format!("'{}'", lexeme))),
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Identifier => {
                let name = token.lexeme.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.err_expected("identifier")),
        }
    }

    /// Whether the current token is a type keyword.
    fn peek_type(&self) -> Option<Type> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Keyword => Type::from_keyword(&token.lexeme),
            _ => None,
        }
    }

    // Statements

    fn parse_program(&mut self) -> Result<Program> {
        let mut statements = Vec::new();
        while self.peek().is_some() {
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        let token = match self.peek() {
            Some(token) => token,
            None => return Err(self.err_expected("statement")),
        };
        match token.kind {
            TokenKind::Keyword => match token.lexeme.as_str() {
                "if" => self.parse_if(),
                "while" => self.parse_while(),
                "for" => self.parse_for(),
                "function" => self.parse_function(),
                "return" => self.parse_return(),
                "print" => self.parse_print(),
                _ if self.peek_type().is_some() => {
                    let decl = self.parse_variable_declaration()?;
                    self.expect_delimiter(";")?;
                    Ok(Statement::Declaration(Declaration::Variable(decl)))
                }
                _ => Err(self.err_expected("statement")),
            },
            TokenKind::Identifier => {
                // `name =` starts an assignment; anything else is an
                // expression statement (including call statements).
                let is_assignment = matches!(
                    self.peek_second(),
                    Some(second) if second.is(TokenKind::Operator, "=")
                );
                if is_assignment {
                    let statement = self.parse_assignment()?;
                    self.expect_delimiter(";")?;
                    Ok(statement)
                } else {
                    self.parse_expression_statement()
                }
            }
            TokenKind::Delimiter if token.lexeme == "{" => {
                Ok(Statement::Block(self.parse_block()?))
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<Statement> {
        let expression = self.parse_expression()?;
        self.expect_delimiter(";")?;
        Ok(Statement::Expression(expression))
    }

    /// Parses `Type Ident ('=' Expr)?` without a terminator, so the same
    /// rule serves both statements and for-loop headers.
    fn parse_variable_declaration(&mut self) -> Result<VariableDecl> {
        let ty = match self.peek_type() {
            Some(ty) => ty,
            None => return Err(self.err_expected("type")),
        };
        self.next();
        let name = self.expect_identifier()?;
        let initializer = match self.peek() {
            Some(token) if token.is(TokenKind::Operator, "=") => {
                self.next();
                Some(self.parse_expression()?)
            }
            _ => None,
        };
        Ok(VariableDecl {
            ty,
            name,
            initializer,
        })
    }

    /// Parses `Ident '=' Expr` without a terminator.
    fn parse_assignment(&mut self) -> Result<Statement> {
        let name = self.expect_identifier()?;
        self.expect_operator("=")?;
        let value = self.parse_expression()?;
        Ok(Statement::Assignment { name, value })
    }

    fn parse_if(&mut self) -> Result<Statement> {
        self.next(); // 'if' keyword
        self.expect_delimiter("(")?;
        let condition = self.parse_expression()?;
        self.expect_delimiter(")")?;
        let then_block = self.parse_block()?;
        let else_block = match self.peek() {
            Some(token) if token.is(TokenKind::Keyword, "else") => {
                self.next();
                Some(self.parse_block()?)
            }
            _ => None,
        };
        Ok(Statement::If {
            condition,
            then_block,
            else_block,
        })
    }

    fn parse_while(&mut self) -> Result<Statement> {
        self.next(); // 'while' keyword
        self.expect_delimiter("(")?;
        let condition = self.parse_expression()?;
        self.expect_delimiter(")")?;
        let body = self.parse_block()?;
        Ok(Statement::While { condition, body })
    }

    fn parse_for(&mut self) -> Result<Statement> {
        self.next(); // 'for' keyword
        self.expect_delimiter("(")?;

        // Each header clause may be empty.
        let init = if self.peek_type().is_some() {
            let decl = self.parse_variable_declaration()?;
            Some(Box::new(Statement::Declaration(Declaration::Variable(
                decl,
            ))))
        } else if matches!(self.peek(), Some(t) if t.kind == TokenKind::Identifier) {
            Some(Box::new(self.parse_assignment()?))
        } else {
            None
        };
        self.expect_delimiter(";")?;

        let condition = match self.peek() {
            Some(token) if token.is(TokenKind::Delimiter, ";") => None,
            _ => Some(self.parse_expression()?),
        };
        self.expect_delimiter(";")?;

        let update = if matches!(self.peek(), Some(t) if t.kind == TokenKind::Identifier) {
            Some(Box::new(self.parse_assignment()?))
        } else {
            None
        };
        self.expect_delimiter(")")?;

        let body = self.parse_block()?;
        Ok(Statement::For {
            init,
            condition,
            update,
            body,
        })
    }

    fn parse_function(&mut self) -> Result<Statement> {
        self.next(); // 'function' keyword
        let name = self.expect_identifier()?;
        self.expect_delimiter("(")?;
        let mut params = Vec::new();
        if !self.try_delimiter(")") {
            loop {
                let ty = match self.peek_type() {
                    Some(ty) => ty,
                    None => return Err(self.err_expected("parameter type")),
                };
                self.next();
                let name = self.expect_identifier()?;
                params.push(Parameter { ty, name });
                if !self.try_delimiter(",") {
                    break;
                }
            }
            self.expect_delimiter(")")?;
        }
        let body = self.parse_block()?;
        Ok(Statement::Declaration(Declaration::Function(FunctionDecl {
            name,
            params,
            body,
        })))
    }

    fn parse_return(&mut self) -> Result<Statement> {
        self.next(); // 'return' keyword
        let expression = self.parse_expression()?;
        self.expect_delimiter(";")?;
        Ok(Statement::Return(expression))
    }

    fn parse_print(&mut self) -> Result<Statement> {
        self.next(); // 'print' keyword
        self.expect_delimiter("(")?;
        let expression = self.parse_expression()?;
        self.expect_delimiter(")")?;
        self.expect_delimiter(";")?;
        Ok(Statement::Print(expression))
    }

    fn parse_block(&mut self) -> Result<Block> {
        self.expect_delimiter("{")?;
        let mut statements = Vec::new();
        loop {
            match self.peek() {
                Some(token) if token.is(TokenKind::Delimiter, "}") => break,
                Some(_) => statements.push(self.parse_statement()?),
                None => return Err(self.err_expected("'}'")),
            }
        }
        self.expect_delimiter("}")?;
        Ok(Block { statements })
    }

    // Expressions, lowest precedence first. All binary operators are
    // left-associative.

    fn parse_expression(&mut self) -> Result<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut left = self.parse_and()?;
        while self.try_binary_op(&["||"]).is_some() {
            let right = self.parse_and()?;
            left = binary(left, BinaryOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut left = self.parse_equality()?;
        while self.try_binary_op(&["&&"]).is_some() {
            let right = self.parse_equality()?;
            left = binary(left, BinaryOp::And, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expression> {
        let mut left = self.parse_comparison()?;
        while let Some(op) = self.try_binary_op(&["==", "!="]) {
            let right = self.parse_comparison()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expression> {
        let mut left = self.parse_addition()?;
        while let Some(op) = self.try_binary_op(&["<", ">", "<=", ">="]) {
            let right = self.parse_addition()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_addition(&mut self) -> Result<Expression> {
        let mut left = self.parse_multiplication()?;
        while let Some(op) = self.try_binary_op(&["+", "-"]) {
            let right = self.parse_multiplication()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_multiplication(&mut self) -> Result<Expression> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.try_binary_op(&["*", "/"]) {
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        let op = match self.peek() {
            Some(token) if token.is(TokenKind::Operator, "!") => UnaryOp::Not,
            Some(token) if token.is(TokenKind::Operator, "-") => UnaryOp::Neg,
            _ => return self.parse_primary(),
        };
        self.next();
        let operand = self.parse_unary()?;
        Ok(Expression::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(self.err_expected("expression")),
        };
        match token.kind {
            TokenKind::NumericLiteral | TokenKind::StringLiteral | TokenKind::BooleanLiteral => {
                self.next();
                Ok(Expression::Literal(token))
            }
            TokenKind::Identifier => {
                self.next();
                if self.try_delimiter("(") {
                    let args = self.parse_arguments()?;
                    Ok(Expression::Call {
                        name: token.lexeme,
                        args,
                    })
                } else {
                    Ok(Expression::Variable(token.lexeme))
                }
            }
            TokenKind::Delimiter if token.lexeme == "(" => {
                self.next();
                let expression = self.parse_expression()?;
                self.expect_delimiter(")")?;
                Ok(expression)
            }
            _ => Err(self.err_expected("expression")),
        }
    }

    /// Parses a call's argument list; the opening `(` is already consumed.
    fn parse_arguments(&mut self) -> Result<Vec<Expression>> {
        let mut args = Vec::new();
        if self.try_delimiter(")") {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if !self.try_delimiter(",") {
                break;
            }
        }
        self.expect_delimiter(")")?;
        Ok(args)
    }

    /// Consumes the current token if it is one of the given binary operator
    /// lexemes.
    fn try_binary_op(&mut self, candidates: &[&str]) -> Option<BinaryOp> {
        let token = self.peek()?;
        if token.kind != TokenKind::Operator || !candidates.contains(&token.lexeme.as_str()) {
            return None;
        }
        let op = BinaryOp::from_lexeme(&token.lexeme);
        self.pos += 1;
        op
    }
}

fn binary(left: Expression, op: BinaryOp, right: Expression) -> Expression {
    Expression::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn parse_source(source: &str) -> Result<Program> {
        parse(lex(source).unwrap())
    }

    fn parse_expr(source: &str) -> Expression {
        let program = parse_source(&format!("{};", source)).unwrap();
        match program.statements.into_iter().next().unwrap() {
            Statement::Expression(expression) => expression,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    fn num(lexeme: &str) -> Expression {
        Expression::Literal(Token::new(TokenKind::NumericLiteral, lexeme, 1))
    }

    fn var(name: &str) -> Expression {
        Expression::Variable(name.to_string())
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expected = binary(num("2"), BinaryOp::Add, binary(num("3"), BinaryOp::Mul, num("4")));
        assert_eq!(expected, parse_expr("2 + 3 * 4"));
    }

    #[test]
    fn binary_operators_are_left_associative() {
        let expected = binary(binary(num("1"), BinaryOp::Sub, num("2")), BinaryOp::Sub, num("3"));
        assert_eq!(expected, parse_expr("1 - 2 - 3"));
    }

    #[test]
    fn parentheses_override_precedence() {
        let expected = binary(binary(num("2"), BinaryOp::Add, num("3")), BinaryOp::Mul, num("4"));
        assert_eq!(expected, parse_expr("(2 + 3) * 4"));
    }

    #[test]
    fn comparison_binds_tighter_than_logical() {
        let expected = binary(
            binary(var("a"), BinaryOp::Lt, var("b")),
            BinaryOp::And,
            binary(var("c"), BinaryOp::Ge, var("d")),
        );
        assert_eq!(expected, parse_expr("a < b && c >= d"));
    }

    #[test]
    fn unary_operators_nest() {
        let expected = Expression::Unary {
            op: UnaryOp::Not,
            operand: Box::new(Expression::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(var("x")),
            }),
        };
        assert_eq!(expected, parse_expr("!-x"));
    }

    #[test]
    fn declaration_with_and_without_initializer() {
        let program = parse_source("int x; float y = 1.5;").unwrap();
        assert_eq!(
            program.statements,
            vec![
                Statement::Declaration(Declaration::Variable(VariableDecl {
                    ty: Type::Int,
                    name: "x".to_string(),
                    initializer: None,
                })),
                Statement::Declaration(Declaration::Variable(VariableDecl {
                    ty: Type::Float,
                    name: "y".to_string(),
                    initializer: Some(num("1.5")),
                })),
            ]
        );
    }

    #[test]
    fn call_statement_is_an_expression_statement() {
        let program = parse_source("setValue(s, 7);").unwrap();
        assert_eq!(
            program.statements,
            vec![Statement::Expression(Expression::Call {
                name: "setValue".to_string(),
                args: vec![var("s"), num("7")],
            })]
        );
    }

    #[test]
    fn if_with_else() {
        let program = parse_source("if (1) { print(1); } else { print(0); }").unwrap();
        match &program.statements[0] {
            Statement::If {
                else_block: Some(block),
                ..
            } => assert_eq!(1, block.statements.len()),
            other => panic!("expected if with else, got {:?}", other),
        }
    }

    #[test]
    fn for_clauses_may_each_be_empty() {
        let program = parse_source("for (;;) { }").unwrap();
        assert_eq!(
            program.statements,
            vec![Statement::For {
                init: None,
                condition: None,
                update: None,
                body: Block { statements: vec![] },
            }]
        );
    }

    #[test]
    fn for_with_declaration_header() {
        let source = "for (int i = 0; i < 3; i = i + 1) { print(i); }";
        let program = parse_source(source).unwrap();
        match &program.statements[0] {
            Statement::For {
                init: Some(init),
                condition: Some(_),
                update: Some(update),
                ..
            } => {
                assert!(matches!(
                    init.as_ref(),
                    Statement::Declaration(Declaration::Variable(_))
                ));
                assert!(matches!(update.as_ref(), Statement::Assignment { .. }));
            }
            other => panic!("expected full for header, got {:?}", other),
        }
    }

    #[test]
    fn function_declaration_with_parameters() {
        let source = indoc! {"
            function addOne(int x) {
                return x + 1;
            }
        "};
        let program = parse_source(source).unwrap();
        match &program.statements[0] {
            Statement::Declaration(Declaration::Function(decl)) => {
                assert_eq!("addOne", decl.name);
                assert_eq!(
                    vec![Parameter {
                        ty: Type::Int,
                        name: "x".to_string(),
                    }],
                    decl.params
                );
            }
            other => panic!("expected function declaration, got {:?}", other),
        }
    }

    #[test]
    fn empty_function_body_is_valid() {
        assert!(parse_source("function f() {}").is_ok());
    }

    #[test]
    fn missing_expression_after_assignment() {
        let err = parse_source("a = ;").unwrap_err();
        assert_eq!("Parse error: expected expression, found ';'", err.to_string());
    }

    #[test]
    fn unclosed_parenthesized_expression() {
        let err = parse_source("x = (1 + 2;").unwrap_err();
        assert_eq!("Parse error: expected ')', found ';'", err.to_string());
    }

    #[test]
    fn missing_semicolon() {
        let err = parse_source("int a = 1").unwrap_err();
        assert_eq!("Parse error: expected ';', found EOF", err.to_string());
    }

    #[test]
    fn missing_parameter_type() {
        let err = parse_source("function f(x) {}").unwrap_err();
        assert_eq!("Parse error: expected parameter type, found 'x'", err.to_string());
    }

    #[test]
    fn reserved_reactive_keyword_is_rejected() {
        let err = parse_source("reactive r;").unwrap_err();
        assert_eq!("Parse error: expected statement, found 'reactive'", err.to_string());
    }

    #[test]
    fn unexpected_eof_in_block() {
        let err = parse_source("while (1) { print(1);").unwrap_err();
        assert_eq!("Parse error: expected '}', found EOF", err.to_string());
    }
}
