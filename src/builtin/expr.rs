// src/builtin/expr.rs

//! Small expression language for `basic/evaluate` blocks.
//!
//! Supported: number/string/bool/nil literals, array literals, the `inputs`
//! variable with `[i]` and `.field` access, unary `-` and `!`, arithmetic,
//! comparisons, `&&`, `||` and `cond ? a : b`. `+` concatenates when either
//! side is a string.
//!
//! Parsing is a Pratt parser over a flat token list; evaluation works
//! directly on `serde_json::Value`.

use serde_json::{Number, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("parse error at {pos}: {msg}")]
    Parse { pos: usize, msg: String },

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("type mismatch: {0}")]
    Type(String),

    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
}

const OPERATORS: [&str; 22] = [
    "&&", "||", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "!", "<", ">", "?", ":", "(",
    ")", "[", "]", ",", ".",
];

fn tokenize(src: &str) -> Result<Vec<(usize, Tok)>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;

        if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n = text.parse::<f64>().map_err(|_| ExprError::Parse {
                pos: start,
                msg: format!("invalid number '{text}'"),
            })?;
            out.push((start, Tok::Num(n)));
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            let mut s = String::new();
            loop {
                let Some(&ch) = chars.get(i) else {
                    return Err(ExprError::Parse {
                        pos: start,
                        msg: "unterminated string".into(),
                    });
                };
                i += 1;
                if ch == quote {
                    break;
                }
                if ch == '\\' {
                    let esc = chars.get(i).copied().ok_or(ExprError::Parse {
                        pos: i,
                        msg: "dangling escape".into(),
                    })?;
                    i += 1;
                    s.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                } else {
                    s.push(ch);
                }
            }
            out.push((start, Tok::Str(s)));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            out.push((start, Tok::Ident(chars[start..i].iter().collect())));
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        let op = OPERATORS
            .iter()
            .copied()
            .find(|op| rest.starts_with(op))
            .ok_or_else(|| ExprError::Parse {
                pos: start,
                msg: format!("unexpected character '{c}'"),
            })?;
        i += op.chars().count();
        out.push((start, Tok::Op(op)));
    }

    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Var(String),
    Array(Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Unary(&'static str, Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
}

const PREFIX_BP: u8 = 15;
const POSTFIX_BP: u8 = 17;

fn infix_bp(op: &str) -> Option<(u8, u8)> {
    Some(match op {
        "?" => (2, 1),
        "||" => (3, 4),
        "&&" => (5, 6),
        "==" | "!=" => (7, 8),
        "<" | "<=" | ">" | ">=" => (9, 10),
        "+" | "-" => (11, 12),
        "*" | "/" | "%" => (13, 14),
        _ => return None,
    })
}

struct Parser {
    toks: Vec<(usize, Tok)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.toks.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        t
    }

    fn error(&self, msg: impl Into<String>) -> ExprError {
        ExprError::Parse {
            pos: self.offset(),
            msg: msg.into(),
        }
    }

    fn expect(&mut self, op: &str) -> Result<(), ExprError> {
        match self.peek() {
            Some(Tok::Op(o)) if *o == op => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error(format!("expected '{op}'"))),
        }
    }

    fn expr(&mut self, min_bp: u8) -> Result<Expr, ExprError> {
        let mut lhs = self.prefix()?;

        loop {
            let op = match self.peek() {
                Some(Tok::Op(op)) => *op,
                Some(_) => return Err(self.error("expected operator")),
                None => break,
            };

            if op == "[" || op == "." {
                if POSTFIX_BP < min_bp {
                    break;
                }
                self.pos += 1;
                lhs = if op == "[" {
                    let index = self.expr(0)?;
                    self.expect("]")?;
                    Expr::Index(Box::new(lhs), Box::new(index))
                } else {
                    match self.next() {
                        Some(Tok::Ident(field)) => Expr::Index(
                            Box::new(lhs),
                            Box::new(Expr::Literal(Value::String(field))),
                        ),
                        _ => return Err(self.error("expected field name after '.'")),
                    }
                };
                continue;
            }

            let Some((l_bp, r_bp)) = infix_bp(op) else {
                break;
            };
            if l_bp < min_bp {
                break;
            }
            self.pos += 1;

            lhs = if op == "?" {
                let then = self.expr(0)?;
                self.expect(":")?;
                let otherwise = self.expr(r_bp)?;
                Expr::Cond(Box::new(lhs), Box::new(then), Box::new(otherwise))
            } else {
                let rhs = self.expr(r_bp)?;
                Expr::Binary(op, Box::new(lhs), Box::new(rhs))
            };
        }

        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, ExprError> {
        let at = self.offset();
        match self.next() {
            Some(Tok::Num(n)) => Ok(Expr::Literal(number(n))),
            Some(Tok::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Tok::Ident(id)) => Ok(match id.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "nil" | "null" => Expr::Literal(Value::Null),
                _ => Expr::Var(id),
            }),
            Some(Tok::Op("(")) => {
                let inner = self.expr(0)?;
                self.expect(")")?;
                Ok(inner)
            }
            Some(Tok::Op("[")) => {
                let mut items = Vec::new();
                if !matches!(self.peek(), Some(Tok::Op("]"))) {
                    loop {
                        items.push(self.expr(0)?);
                        if matches!(self.peek(), Some(Tok::Op(","))) {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect("]")?;
                Ok(Expr::Array(items))
            }
            Some(Tok::Op(op @ ("-" | "!"))) => {
                let operand = self.expr(PREFIX_BP)?;
                Ok(Expr::Unary(op, Box::new(operand)))
            }
            Some(other) => Err(ExprError::Parse {
                pos: at,
                msg: format!("unexpected token {other:?}"),
            }),
            None => Err(ExprError::Parse {
                pos: at,
                msg: "unexpected end of expression".into(),
            }),
        }
    }
}

/// Parse and evaluate `src` with `inputs` bound to the given values.
pub fn evaluate(src: &str, inputs: &[Value]) -> Result<Value, ExprError> {
    let toks = tokenize(src)?;
    let mut parser = Parser {
        toks,
        pos: 0,
        end: src.chars().count(),
    };
    let ast = parser.expr(0)?;
    if parser.peek().is_some() {
        return Err(parser.error("trailing input"));
    }

    let env = Value::Array(inputs.to_vec());
    eval(&ast, &env)
}

fn eval(expr: &Expr, inputs: &Value) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(name) if name == "inputs" => Ok(inputs.clone()),
        Expr::Var(name) => Err(ExprError::UnknownVariable(name.clone())),
        Expr::Array(items) => items
            .iter()
            .map(|e| eval(e, inputs))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Index(target, index) => {
            let target = eval(target, inputs)?;
            let index = eval(index, inputs)?;
            index_value(&target, &index)
        }
        Expr::Unary(op, operand) => {
            let v = eval(operand, inputs)?;
            match *op {
                "-" => Ok(number(-as_number(&v, "-")?)),
                _ => Ok(Value::Bool(!as_bool(&v, "!")?)),
            }
        }
        Expr::Cond(cond, then, otherwise) => {
            if as_bool(&eval(cond, inputs)?, "?:")? {
                eval(then, inputs)
            } else {
                eval(otherwise, inputs)
            }
        }
        Expr::Binary(op, lhs, rhs) => match *op {
            "&&" => {
                if !as_bool(&eval(lhs, inputs)?, "&&")? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(as_bool(&eval(rhs, inputs)?, "&&")?))
            }
            "||" => {
                if as_bool(&eval(lhs, inputs)?, "||")? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(as_bool(&eval(rhs, inputs)?, "||")?))
            }
            _ => {
                let l = eval(lhs, inputs)?;
                let r = eval(rhs, inputs)?;
                binary(op, &l, &r)
            }
        },
    }
}

fn binary(op: &str, l: &Value, r: &Value) -> Result<Value, ExprError> {
    match op {
        "+" if l.is_string() || r.is_string() => {
            Ok(Value::String(format!("{}{}", display(l), display(r))))
        }
        "+" | "-" | "*" | "/" | "%" => {
            let a = as_number(l, op)?;
            let b = as_number(r, op)?;
            let out = match op {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                _ if b == 0.0 => return Err(ExprError::DivisionByZero),
                "/" => a / b,
                _ => a % b,
            };
            Ok(number(out))
        }
        "==" => Ok(Value::Bool(loose_eq(l, r))),
        "!=" => Ok(Value::Bool(!loose_eq(l, r))),
        _ => {
            let ord = match (l, r) {
                (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                _ => as_number(l, op)?.partial_cmp(&as_number(r, op)?),
            };
            let Some(ord) = ord else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match op {
                "<" => ord.is_lt(),
                "<=" => ord.is_le(),
                ">" => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, ExprError> {
    match (target, index) {
        (Value::Array(items), Value::Number(_)) => {
            let raw = as_number(index, "[]")?;
            if raw.fract() != 0.0 {
                return Err(ExprError::Type(format!("non-integer index {raw}")));
            }
            let i = raw as i64;
            usize::try_from(i)
                .ok()
                .and_then(|u| items.get(u))
                .cloned()
                .ok_or(ExprError::IndexOutOfRange {
                    index: i,
                    len: items.len(),
                })
        }
        (Value::Object(map), Value::String(key)) => {
            Ok(map.get(key).cloned().unwrap_or(Value::Null))
        }
        _ => Err(ExprError::Type(format!(
            "cannot index {} with {}",
            super::cast::type_name(target),
            super::cast::type_name(index)
        ))),
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => l == r,
    }
}

fn as_number(v: &Value, op: &str) -> Result<f64, ExprError> {
    v.as_f64().ok_or_else(|| {
        ExprError::Type(format!(
            "operator '{op}' expects a number, got {}",
            super::cast::type_name(v)
        ))
    })
}

fn as_bool(v: &Value, op: &str) -> Result<bool, ExprError> {
    v.as_bool().ok_or_else(|| {
        ExprError::Type(format!(
            "operator '{op}' expects a bool, got {}",
            super::cast::type_name(v)
        ))
    })
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Integral results stay integers so `1 + 1` renders as `2`.
fn number(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        Value::Number(Number::from(f as i64))
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval_str(src: &str) -> Value {
        evaluate(src, &[json!(3), json!("ab"), json!({"score": 80})]).unwrap()
    }

    #[test]
    fn arithmetic_respects_precedence() {
        assert_eq!(eval_str("1 + 2 * 3"), json!(7));
        assert_eq!(eval_str("(1 + 2) * 3"), json!(9));
        assert_eq!(eval_str("10 / 4"), json!(2.5));
        assert_eq!(eval_str("7 % 4 - -1"), json!(4));
        assert_eq!(eval_str("2 - 3 - 4"), json!(-5));
    }

    #[test]
    fn inputs_are_indexable() {
        assert_eq!(eval_str("inputs[0] * 10"), json!(30));
        assert_eq!(eval_str("inputs[1] + '!'"), json!("ab!"));
        assert_eq!(eval_str("inputs[2].score"), json!(80));
        assert_eq!(eval_str("inputs[2].missing"), Value::Null);
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval_str("inputs[0] >= 3 && inputs[1] == 'ab'"), json!(true));
        assert_eq!(eval_str("!(1 < 2) || false"), json!(false));
        assert_eq!(eval_str("1 == 1.0"), json!(true));
        assert_eq!(eval_str("'a' < 'b'"), json!(true));
    }

    #[test]
    fn ternary_is_right_associative() {
        assert_eq!(eval_str("inputs[0] > 5 ? 100 : inputs[0] > 2 ? 50 : 0"), json!(50));
    }

    #[test]
    fn string_concatenation_with_numbers() {
        assert_eq!(eval_str("\"n=\" + inputs[0]"), json!("n=3"));
        assert_eq!(eval_str("[1, 'x', nil]"), json!([1, "x", null]));
    }

    #[test]
    fn errors_are_reported() {
        let inputs = [json!(1)];
        assert_eq!(evaluate("1 / 0", &inputs), Err(ExprError::DivisionByZero));
        assert_eq!(
            evaluate("foo + 1", &inputs),
            Err(ExprError::UnknownVariable("foo".into()))
        );
        assert_eq!(
            evaluate("inputs[3]", &inputs),
            Err(ExprError::IndexOutOfRange { index: 3, len: 1 })
        );
        assert!(matches!(evaluate("1 +", &inputs), Err(ExprError::Parse { .. })));
        assert!(matches!(evaluate("1 2", &inputs), Err(ExprError::Parse { .. })));
        assert!(matches!(evaluate("'open", &inputs), Err(ExprError::Parse { .. })));
        assert!(matches!(evaluate("-'a'", &inputs), Err(ExprError::Type(_))));
    }
}
