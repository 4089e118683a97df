//! Boolean row formulas such as `salary > 0 and bonus <= salary * 0.1`.
//!
//! Supported: number and quoted string literals, `true`/`false`/`null`,
//! field names (letters, digits, `_`), `+ - * / %`, comparisons
//! `== != < <= > >=`, `and`/`or`/`not`, and parentheses.

use std::cmp::Ordering;
use std::fmt;

use crate::table::Row;
use crate::types::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    Op(&'static str),
    Open,
    Close,
}

const OPERATORS: [&str; 12] = ["==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "="];

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push(Token::Open);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::Close);
            i += 1;
        } else if c == '"' || c == '\'' {
            let end = chars[i + 1..]
                .iter()
                .position(|&d| d == c)
                .ok_or_else(|| format!("unterminated string at offset {}", i))?;
            tokens.push(Token::Text(chars[i + 1..i + 1 + end].iter().collect()));
            i += end + 2;
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Optional exponent: [eE][+-]?digits
            if matches!(chars.get(i), Some('e' | 'E')) {
                let sign = usize::from(matches!(chars.get(i + 1), Some('+' | '-')));
                if chars.get(i + 1 + sign).is_some_and(|d| d.is_ascii_digit()) {
                    i += 1 + sign;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let number = text.parse().map_err(|_| format!("invalid number \"{}\"", text))?;
            tokens.push(Token::Number(number));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let op: &'static str = OPERATORS
                .iter()
                .copied()
                .find(|op| rest.starts_with(op))
                .ok_or_else(|| format!("unexpected character \"{}\"", c))?;
            // A lone `=` reads as equality.
            tokens.push(Token::Op(if op == "=" { "==" } else { op }));
            i += op.len();
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Boolean(b) => Scalar::Bool(*b),
            Value::Integer(_) | Value::Number(_) => {
                value.as_f64().map(Scalar::Number).unwrap_or(Scalar::Null)
            }
            Value::String(s) => Scalar::Text(s.clone()),
            other => Scalar::Text(other.to_string()),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::Number(n) => *n != 0.0,
            Scalar::Text(s) => !s.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Scalar),
    Field(String),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
}

struct ExprParser {
    tokens: Vec<Token>,
    position: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(w)) if w == word) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn operator(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.position += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn or(&mut self) -> Result<Expr, String> {
        let mut left = self.and()?;
        while self.keyword("or") {
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut left = self.not()?;
        while self.keyword("and") {
            left = Expr::And(Box::new(left), Box::new(self.not()?));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, String> {
        if self.keyword("not") {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        let left = self.sum()?;
        match self.operator(&["==", "!=", "<", "<=", ">", ">="]) {
            Some(op) => Ok(Expr::Binary(op, Box::new(left), Box::new(self.sum()?))),
            None => Ok(left),
        }
    }

    fn sum(&mut self) -> Result<Expr, String> {
        let mut left = self.product()?;
        while let Some(op) = self.operator(&["+", "-"]) {
            left = Expr::Binary(op, Box::new(left), Box::new(self.product()?));
        }
        Ok(left)
    }

    fn product(&mut self) -> Result<Expr, String> {
        let mut left = self.unary()?;
        while let Some(op) = self.operator(&["*", "/", "%"]) {
            left = Expr::Binary(op, Box::new(left), Box::new(self.unary()?));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.operator(&["-"]).is_some() {
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Scalar::Number(n))),
            Some(Token::Text(s)) => Ok(Expr::Literal(Scalar::Text(s))),
            Some(Token::Ident(word)) => Ok(match word.as_str() {
                "true" | "True" => Expr::Literal(Scalar::Bool(true)),
                "false" | "False" => Expr::Literal(Scalar::Bool(false)),
                "null" | "None" => Expr::Literal(Scalar::Null),
                "and" | "or" | "not" => return Err(format!("unexpected \"{}\"", word)),
                _ => Expr::Field(word.clone()),
            }),
            Some(Token::Open) => {
                let inner = self.or()?;
                match self.advance() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err("expected \")\"".to_string()),
                }
            }
            Some(token) => Err(format!("unexpected token {:?}", token)),
            None => Err("unexpected end of formula".to_string()),
        }
    }
}

fn collect_fields(expr: &Expr, names: &mut Vec<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Field(name) => {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Expr::Not(inner) | Expr::Negate(inner) => collect_fields(inner, names),
        Expr::And(a, b) | Expr::Or(a, b) | Expr::Binary(_, a, b) => {
            collect_fields(a, names);
            collect_fields(b, names);
        }
    }
}

fn arithmetic(op: &str, left: Scalar, right: Scalar) -> Result<Scalar, String> {
    match (op, left, right) {
        ("+", Scalar::Text(a), Scalar::Text(b)) => Ok(Scalar::Text(a + &b)),
        (op, Scalar::Number(a), Scalar::Number(b)) => match op {
            "+" => Ok(Scalar::Number(a + b)),
            "-" => Ok(Scalar::Number(a - b)),
            "*" => Ok(Scalar::Number(a * b)),
            "/" | "%" if b == 0.0 => Err("division by zero".to_string()),
            "/" => Ok(Scalar::Number(a / b)),
            _ => Ok(Scalar::Number(a % b)),
        },
        (op, left, right) => Err(format!("cannot apply \"{}\" to {:?} and {:?}", op, left, right)),
    }
}

fn compare(op: &str, left: &Scalar, right: &Scalar) -> Result<bool, String> {
    let ordering = match (left, right) {
        (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b),
        (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (Scalar::Null, Scalar::Null) => Some(Ordering::Equal),
        _ => None,
    };
    match (op, ordering) {
        ("==", ordering) => Ok(ordering == Some(Ordering::Equal)),
        ("!=", ordering) => Ok(ordering != Some(Ordering::Equal)),
        (_, None) => Err(format!("cannot compare {:?} and {:?}", left, right)),
        ("<", Some(o)) => Ok(o == Ordering::Less),
        ("<=", Some(o)) => Ok(o != Ordering::Greater),
        (">", Some(o)) => Ok(o == Ordering::Greater),
        (_, Some(o)) => Ok(o != Ordering::Less),
    }
}

/// A parsed row formula.
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, String> {
        let tokens = tokenize(source)?;
        let mut parser = ExprParser { tokens, position: 0 };
        let expr = parser.or()?;
        if let Some(token) = parser.peek() {
            return Err(format!("unexpected token {:?}", token));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Field names the formula reads, in first-use order.
    pub fn fields(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_fields(&self.expr, &mut names);
        names
    }

    /// Evaluate against a row; the result is the truthiness of the expression.
    pub fn evaluate(&self, row: &Row) -> Result<bool, String> {
        Ok(self.eval(&self.expr, row)?.truthy())
    }

    fn eval(&self, expr: &Expr, row: &Row) -> Result<Scalar, String> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Field(name) => row
                .get(name)
                .map(Scalar::from_value)
                .ok_or_else(|| format!("unknown field \"{}\"", name)),
            Expr::Not(inner) => Ok(Scalar::Bool(!self.eval(inner, row)?.truthy())),
            Expr::Negate(inner) => match self.eval(inner, row)? {
                Scalar::Number(n) => Ok(Scalar::Number(-n)),
                other => Err(format!("cannot negate {:?}", other)),
            },
            Expr::And(a, b) => Ok(Scalar::Bool(
                self.eval(a, row)?.truthy() && self.eval(b, row)?.truthy(),
            )),
            Expr::Or(a, b) => Ok(Scalar::Bool(
                self.eval(a, row)?.truthy() || self.eval(b, row)?.truthy(),
            )),
            Expr::Binary(op, a, b) => {
                let left = self.eval(a, row)?;
                let right = self.eval(b, row)?;
                if matches!(*op, "==" | "!=" | "<" | "<=" | ">" | ">=") {
                    compare(op, &left, &right).map(Scalar::Bool)
                } else {
                    arithmetic(op, left, right)
                }
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Schema};
    use crate::types::FieldType;
    use std::sync::Arc;

    fn row(salary: &str, bonus: &str, name: &str) -> Row {
        let schema = Schema::with_fields(vec![
            Field::new("salary", FieldType::Number),
            Field::new("bonus", FieldType::Integer),
            Field::new("name", FieldType::String),
        ]);
        let names: Arc<[String]> = schema.field_names().iter().map(|n| n.to_string()).collect();
        Row::new(
            &schema,
            names,
            Arc::from(vec![1, 2, 3]),
            vec![salary.to_string(), bonus.to_string(), name.to_string()],
            2,
            1,
        )
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        let formula = Formula::parse("salary > 0 and bonus <= salary * 0.1").unwrap();
        assert_eq!(formula.fields(), vec!["salary", "bonus"]);
        assert_eq!(formula.evaluate(&row("1000", "100", "a")), Ok(true));
        assert_eq!(formula.evaluate(&row("1000", "101", "a")), Ok(false));
    }

    #[test]
    fn test_precedence_and_parentheses() {
        let formula = Formula::parse("not (bonus == 1 or bonus == 2) and -bonus < 0").unwrap();
        assert_eq!(formula.evaluate(&row("1", "3", "a")), Ok(true));
        assert_eq!(formula.evaluate(&row("1", "2", "a")), Ok(false));
        assert_eq!(Formula::parse("1 + 2 * 3 == 7").unwrap().evaluate(&row("1", "1", "a")), Ok(true));
    }

    #[test]
    fn test_exponent_literals() {
        let formula = Formula::parse("salary < 1e3 and bonus > 2.5E-1").unwrap();
        assert_eq!(formula.evaluate(&row("999", "1", "a")), Ok(true));
        assert_eq!(formula.evaluate(&row("1000", "1", "a")), Ok(false));
        assert_eq!(Formula::parse("1E+2 == 100").unwrap().evaluate(&row("1", "1", "a")), Ok(true));
        assert!(Formula::parse("salary < 1e").is_err());
    }

    #[test]
    fn test_strings_and_nulls() {
        let formula = Formula::parse("name == 'ann' or name = null").unwrap();
        assert_eq!(formula.evaluate(&row("1", "1", "ann")), Ok(true));
        assert_eq!(formula.evaluate(&row("1", "1", "")), Ok(true));
        assert_eq!(formula.evaluate(&row("1", "1", "bob")), Ok(false));
        assert!(Formula::parse("bonus > 1").unwrap().evaluate(&row("1", "", "a")).is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Formula::parse("salary >").is_err());
        assert!(Formula::parse("(salary > 1").is_err());
        assert!(Formula::parse("salary ? 1").is_err());
        assert!(Formula::parse("'open").is_err());
        assert!(Formula::parse("salary 1").is_err());
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        assert!(Formula::parse("salary / 0 > 1").unwrap().evaluate(&row("1", "1", "a")).is_err());
    }
}
