//! The guard language and its compilation to EVM code.
//!
//! A guard is a boolean expression over call context and storage:
//!
//! ```text
//! caller() == sload(0) && callvalue() <= 1000000000000000000
//! ```
//!
//! Supported are decimal and hex literals, `true`/`false`, builtin calls that map one-to-one
//! onto opcodes (`caller()`, `sload(slot)`, `add(a, b)`, ...), the C operators
//! `|| && | ^ & == != < <= > >= + - * / %` with C precedence, and prefix `! ~ -`.
//! Values are 256-bit words; comparisons are unsigned.
//!
//! A compiled guard reverts with empty data when the condition is zero and otherwise falls
//! through, so several guards can be stacked at one entry point.

use crate::translate::translate;
use crate::{Error, Result};
use alloy::primitives::U256;
use serde::Serialize;
use splint_core::Opcode;
use splint_core::asm::{Assembler, Fragment};

/// A guard ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledGuard {
    /// Condition as written in the patch specification.
    pub condition: String,
    /// Condition after identifier translation, the text that was compiled.
    pub translated: String,
    pub payload: Fragment,
}

/// Translates, parses and compiles one guard condition.
pub fn compile_guard(condition: &str) -> Result<CompiledGuard> {
    let translated = translate(condition);
    let expr = parse(&translated)?;

    let mut asm = Assembler::new();
    let pass = asm.new_label();
    emit(&expr, &mut asm)?;
    asm.push_label(pass)
        .op(Opcode::JUMPI)
        .push_u64(0)
        .ops(&[Opcode::DUP(1), Opcode::REVERT])
        .bind(pass);

    Ok(CompiledGuard {
        condition: condition.to_string(),
        translated,
        payload: asm.finish(),
    })
}

/// Payload that unconditionally reverts with empty data.
pub fn revert_payload() -> Fragment {
    let mut asm = Assembler::new();
    asm.push_u64(0).ops(&[Opcode::DUP(1), Opcode::REVERT]);
    asm.finish()
}

/// Parsed guard expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(U256),
    Call { builtin: Builtin, args: Vec<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    BitNot,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    fn from_symbol(symbol: &str) -> Option<(u8, Self)> {
        let entry = match symbol {
            "||" => (1, Self::Or),
            "&&" => (2, Self::And),
            "|" => (3, Self::BitOr),
            "^" => (4, Self::BitXor),
            "&" => (5, Self::BitAnd),
            "==" => (6, Self::Eq),
            "!=" => (6, Self::Ne),
            "<" => (7, Self::Lt),
            "<=" => (7, Self::Le),
            ">" => (7, Self::Gt),
            ">=" => (7, Self::Ge),
            "+" => (8, Self::Add),
            "-" => (8, Self::Sub),
            "*" => (9, Self::Mul),
            "/" => (9, Self::Div),
            "%" => (9, Self::Mod),
            _ => return None,
        };
        Some(entry)
    }
}

/// Opcode-backed builtin functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtin {
    pub name: &'static str,
    pub opcode: Opcode,
    pub arity: usize,
}

const BUILTINS: &[(&str, Opcode, usize)] = &[
    ("caller", Opcode::CALLER, 0),
    ("callvalue", Opcode::CALLVALUE, 0),
    ("origin", Opcode::ORIGIN, 0),
    ("address", Opcode::ADDRESS, 0),
    ("selfbalance", Opcode::SELFBALANCE, 0),
    ("timestamp", Opcode::TIMESTAMP, 0),
    ("number", Opcode::NUMBER, 0),
    ("gas", Opcode::GAS, 0),
    ("calldatasize", Opcode::CALLDATASIZE, 0),
    ("sload", Opcode::SLOAD, 1),
    ("balance", Opcode::BALANCE, 1),
    ("calldataload", Opcode::CALLDATALOAD, 1),
    ("iszero", Opcode::ISZERO, 1),
    ("not", Opcode::NOT, 1),
    ("add", Opcode::ADD, 2),
    ("sub", Opcode::SUB, 2),
    ("mul", Opcode::MUL, 2),
    ("div", Opcode::DIV, 2),
    ("mod", Opcode::MOD, 2),
    ("lt", Opcode::LT, 2),
    ("gt", Opcode::GT, 2),
    ("slt", Opcode::SLT, 2),
    ("sgt", Opcode::SGT, 2),
    ("eq", Opcode::EQ, 2),
    ("and", Opcode::AND, 2),
    ("or", Opcode::OR, 2),
    ("xor", Opcode::XOR, 2),
    ("shr", Opcode::SHR, 2),
];

fn builtin(name: &str) -> Option<Builtin> {
    BUILTINS
        .iter()
        .find(|(candidate, _, _)| *candidate == name)
        .map(|&(name, opcode, arity)| Builtin {
            name,
            opcode,
            arity,
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(U256),
    Ident(String),
    Symbol(&'static str),
    LParen,
    RParen,
    Comma,
}

const SYMBOLS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "&", "|", "^", "!",
    "~",
];

/// Parses a guard expression (already translated).
pub fn parse(expression: &str) -> Result<Expr> {
    let tokens = lex(expression)?;
    let mut parser = Parser {
        expression,
        tokens,
        position: 0,
        depth: 0,
    };
    let expr = parser.expression(0)?;
    if let Some((column, token)) = parser.tokens.get(parser.position) {
        return Err(parser.error(*column, format!("unexpected {token:?} after expression")));
    }
    Ok(expr)
}

fn lex(expression: &str) -> Result<Vec<(usize, Token)>> {
    let error = |column: usize, message: String| Error::Parse {
        expression: expression.to_string(),
        column,
        message,
    };

    let mut tokens = Vec::new();
    let mut index = 0;
    let bytes = expression.as_bytes();

    while index < bytes.len() {
        let c = bytes[index] as char;
        let column = index + 1;

        if c.is_ascii_whitespace() {
            index += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let end = expression[index..]
                .find(|c: char| !c.is_ascii_alphanumeric())
                .map_or(bytes.len(), |offset| index + offset);
            let text = &expression[index..end];
            let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                Some(digits) if !digits.is_empty() => U256::from_str_radix(digits, 16),
                Some(_) => return Err(error(column, format!("empty hex literal `{text}`"))),
                None => U256::from_str_radix(text, 10),
            }
            .map_err(|e| error(column, format!("bad literal `{text}`: {e}")))?;
            tokens.push((column, Token::Number(value)));
            index = end;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let end = expression[index..]
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .map_or(bytes.len(), |offset| index + offset);
            tokens.push((column, Token::Ident(expression[index..end].to_string())));
            index = end;
            continue;
        }

        let simple = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = simple {
            tokens.push((column, token));
            index += 1;
            continue;
        }

        match SYMBOLS
            .iter()
            .find(|symbol| expression[index..].starts_with(**symbol))
        {
            Some(&symbol) => {
                tokens.push((column, Token::Symbol(symbol)));
                index += symbol.len();
            }
            None => {
                let ch = expression[index..].chars().next().unwrap_or(c);
                return Err(error(column, format!("unexpected character `{ch}`")));
            }
        }
    }
    Ok(tokens)
}

/// Deepest nesting of parentheses, calls and prefix operators a guard may use.
const MAX_NESTING: usize = 64;

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<(usize, Token)>,
    position: usize,
    depth: usize,
}

impl Parser<'_> {
    fn error(&self, column: usize, message: String) -> Error {
        Error::Parse {
            expression: self.expression.to_string(),
            column,
            message,
        }
    }

    fn end_column(&self) -> usize {
        self.expression.len() + 1
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(_, token)| token)
    }

    fn next(&mut self) -> Result<(usize, Token)> {
        let entry = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| self.error(self.end_column(), "unexpected end of expression".into()))?;
        self.position += 1;
        Ok(entry)
    }

    fn descend(&mut self, column: usize) -> Result<()> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(column, "expression nested too deeply".into()));
        }
        self.depth += 1;
        Ok(())
    }

    fn expect(&mut self, wanted: Token) -> Result<()> {
        let (column, token) = self.next()?;
        if token == wanted {
            Ok(())
        } else {
            Err(self.error(column, format!("expected {wanted:?}, found {token:?}")))
        }
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(Token::Symbol(symbol)) = self.peek() {
            let Some((precedence, op)) = BinaryOp::from_symbol(symbol) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.position += 1;
            let rhs = self.expression(precedence + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Some(Token::Symbol("!")) => UnaryOp::Not,
            Some(Token::Symbol("~")) => UnaryOp::BitNot,
            Some(Token::Symbol("-")) => UnaryOp::Neg,
            _ => return self.primary(),
        };
        let (column, _) = self.next()?;
        self.descend(column)?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn primary(&mut self) -> Result<Expr> {
        let (column, token) = self.next()?;
        match token {
            Token::Number(value) => Ok(Expr::Literal(value)),
            Token::LParen => {
                self.descend(column)?;
                let inner = self.expression(0)?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            Token::Ident(name) if name == "true" => Ok(Expr::Literal(U256::from(1))),
            Token::Ident(name) if name == "false" => Ok(Expr::Literal(U256::ZERO)),
            Token::Ident(name) => {
                let builtin = builtin(&name).ok_or_else(|| {
                    self.error(column, format!("unknown identifier `{name}`"))
                })?;
                self.expect(Token::LParen)?;
                self.descend(column)?;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        args.push(self.expression(0)?);
                        if self.peek() == Some(&Token::Comma) {
                            self.position += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RParen)?;
                self.depth -= 1;
                if args.len() != builtin.arity {
                    return Err(self.error(
                        column,
                        format!(
                            "{}() takes {} argument(s), got {}",
                            builtin.name,
                            builtin.arity,
                            args.len()
                        ),
                    ));
                }
                Ok(Expr::Call { builtin, args })
            }
            other => Err(self.error(column, format!("unexpected {other:?}"))),
        }
    }
}

/// Emits code leaving the value of `expr` on top of the stack.
pub fn emit(expr: &Expr, asm: &mut Assembler) -> Result<()> {
    match expr {
        Expr::Literal(value) => {
            asm.push(&value.to_be_bytes::<32>())?;
        }
        Expr::Call { builtin, args } => {
            // first argument ends up on top, as the opcode expects
            for arg in args.iter().rev() {
                emit(arg, asm)?;
            }
            asm.op(builtin.opcode);
        }
        Expr::Unary { op, operand } => {
            emit(operand, asm)?;
            match op {
                UnaryOp::Not => asm.op(Opcode::ISZERO),
                UnaryOp::BitNot => asm.op(Opcode::NOT),
                UnaryOp::Neg => asm.push_u64(0).op(Opcode::SUB),
            };
        }
        Expr::Binary { op, lhs, rhs } => {
            let logical = matches!(op, BinaryOp::And | BinaryOp::Or);
            emit(rhs, asm)?;
            if logical {
                asm.ops(&[Opcode::ISZERO, Opcode::ISZERO]);
            }
            emit(lhs, asm)?;
            if logical {
                asm.ops(&[Opcode::ISZERO, Opcode::ISZERO]);
            }
            let tail: &[Opcode] = match op {
                BinaryOp::Or | BinaryOp::BitOr => &[Opcode::OR],
                BinaryOp::And | BinaryOp::BitAnd => &[Opcode::AND],
                BinaryOp::BitXor => &[Opcode::XOR],
                BinaryOp::Eq => &[Opcode::EQ],
                BinaryOp::Ne => &[Opcode::EQ, Opcode::ISZERO],
                BinaryOp::Lt => &[Opcode::LT],
                BinaryOp::Le => &[Opcode::GT, Opcode::ISZERO],
                BinaryOp::Gt => &[Opcode::GT],
                BinaryOp::Ge => &[Opcode::LT, Opcode::ISZERO],
                BinaryOp::Add => &[Opcode::ADD],
                BinaryOp::Sub => &[Opcode::SUB],
                BinaryOp::Mul => &[Opcode::MUL],
                BinaryOp::Div => &[Opcode::DIV],
                BinaryOp::Mod => &[Opcode::MOD],
            };
            asm.ops(tail);
        }
    }
    Ok(())
}
