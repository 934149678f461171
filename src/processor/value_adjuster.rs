use anyhow::{Result, anyhow, bail};
use tracing::warn;

use crate::models::{TargetTable, VALUE_COLUMN};

/// Arithmetic over the resolved cell, e.g. `round(value * 1.19, 2)` or
/// `value + " cm"`. The only variable is `value` (also written `{value}`).
#[derive(Debug, Clone)]
pub struct ValueAdjuster {
    expression: Expr,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Function {
    Round,
    Abs,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Text(String),
    Value,
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    /// A number, with the cell text it was read from when it came from the
    /// cell unchanged.
    Number(f64, Option<String>),
    Text(String),
}

impl Operand {
    fn bind(value: &str) -> Self {
        match value.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => Operand::Number(number, Some(value.to_string())),
            _ => Operand::Text(value.to_string()),
        }
    }

    fn number(&self) -> Result<f64> {
        match self {
            Operand::Number(n, _) => Ok(*n),
            Operand::Text(s) => Err(anyhow!("'{}' is not a number", s)),
        }
    }

    fn render(&self) -> String {
        match self {
            Operand::Number(_, Some(raw)) => raw.clone(),
            Operand::Number(n, None) => format_number(*n),
            Operand::Text(s) => s.clone(),
        }
    }
}

/// Whole numbers are rendered without a fractional part.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

impl ValueAdjuster {
    pub fn parse(expression: &str) -> Result<Self> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser { tokens, pos: 0 };
        let parsed = parser.expression()?;
        if let Some(token) = parser.peek() {
            bail!("Unexpected {:?} in adjust expression '{}'", token, expression);
        }

        Ok(ValueAdjuster { expression: parsed })
    }

    /// Evaluate the expression with `value` bound to the given cell.
    pub fn apply(&self, value: &str) -> Result<String> {
        Ok(evaluate(&self.expression, &Operand::bind(value))?.render())
    }

    /// Adjust every non-empty `value` cell in place. Cells the expression
    /// cannot handle are left as they are. Returns the number of cells
    /// changed.
    pub fn adjust_column(&self, target: &mut TargetTable) -> Result<usize> {
        let position = target
            .column_position(VALUE_COLUMN)
            .ok_or_else(|| anyhow!("Value adjustment needs a '{}' column", VALUE_COLUMN))?;

        let mut adjusted = 0;
        for row in target.rows_mut() {
            let cell = &mut row.values[position];
            if cell.is_empty() {
                continue;
            }
            match self.apply(cell) {
                Ok(new_value) => {
                    if *cell != new_value {
                        adjusted += 1;
                    }
                    *cell = new_value;
                }
                Err(e) => warn!("Could not adjust value '{}' of row {}: {}", cell, row.index, e),
            }
        }
        Ok(adjusted)
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '{' => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '}')
                    .ok_or_else(|| anyhow!("Unclosed '{{' in adjust expression"))?;
                let name: String = chars[i + 1..i + end].iter().collect();
                tokens.push(Token::Ident(name.trim().to_string()));
                i += end + 1;
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| anyhow!("Unclosed string in adjust expression"))?;
                tokens.push(Token::Text(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| anyhow!("Invalid number '{}' in adjust expression", literal))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => bail!("Unexpected character '{}' in adjust expression", other),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => bail!("Expected {:?}, found {:?}", expected, other),
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Text(s)) => Ok(Expr::Text(s)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) if name == "value" => Ok(Expr::Value),
            Some(Token::Ident(name)) => {
                let function = match name.as_str() {
                    "round" => Function::Round,
                    "abs" => Function::Abs,
                    "min" => Function::Min,
                    "max" => Function::Max,
                    _ => bail!("Unknown name '{}' in adjust expression", name),
                };
                let args = self.arguments()?;
                let arity_ok = match function {
                    Function::Round => matches!(args.len(), 1 | 2),
                    Function::Abs => args.len() == 1,
                    Function::Min | Function::Max => args.len() == 2,
                };
                if !arity_ok {
                    bail!("Wrong number of arguments for '{}'", name);
                }
                Ok(Expr::Call(function, args))
            }
            other => bail!("Unexpected {:?} in adjust expression", other),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                other => bail!("Expected ',' or ')', found {:?}", other),
            }
        }
    }
}

fn evaluate(expr: &Expr, value: &Operand) -> Result<Operand> {
    let result = match expr {
        Expr::Number(n) => Operand::Number(*n, None),
        Expr::Text(s) => Operand::Text(s.clone()),
        Expr::Value => value.clone(),
        Expr::Neg(inner) => Operand::Number(-evaluate(inner, value)?.number()?, None),
        Expr::Binary(op, lhs, rhs) => {
            let lhs = evaluate(lhs, value)?;
            let rhs = evaluate(rhs, value)?;
            let number = match (op, &lhs, &rhs) {
                (BinaryOp::Add, Operand::Number(a, _), Operand::Number(b, _)) => a + b,
                (BinaryOp::Add, _, _) => return Ok(Operand::Text(lhs.render() + &rhs.render())),
                (BinaryOp::Sub, _, _) => lhs.number()? - rhs.number()?,
                (BinaryOp::Mul, _, _) => lhs.number()? * rhs.number()?,
                (BinaryOp::Div, _, _) => {
                    let divisor = rhs.number()?;
                    if divisor == 0.0 {
                        bail!("Division by zero");
                    }
                    lhs.number()? / divisor
                }
            };
            Operand::Number(number, None)
        }
        Expr::Call(function, args) => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, value))
                .collect::<Result<Vec<_>>>()?;
            let number = match function {
                Function::Round => {
                    let digits = match args.get(1) {
                        Some(d) => d.number()?.trunc() as i32,
                        None => 0,
                    };
                    let factor = 10f64.powi(digits);
                    (args[0].number()? * factor).round() / factor
                }
                Function::Abs => args[0].number()?.abs(),
                Function::Min => args[0].number()?.min(args[1].number()?),
                Function::Max => args[0].number()?.max(args[1].number()?),
            };
            Operand::Number(number, None)
        }
    };

    if let Operand::Number(n, _) = result {
        if !n.is_finite() {
            bail!("Adjust expression produced a non-finite number");
        }
    }
    Ok(result)
}
