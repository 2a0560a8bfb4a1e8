//! Parsed expressions and statements.
//!
//! The markup layer owns parsing; the engine receives these trees ready-made.
//! The only text the engine splits itself is a string template, whose `{...}`
//! segments are restricted to member paths.

use std::rc::Rc;

use crate::error::EvalError;
use crate::value::Value;

#[derive(Clone, Debug)]
pub enum Expr {
    Literal(Value),
    Identifier(String),
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Element>,
    },
    Arrow(Rc<ArrowExpr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Object(Vec<Property>),
    Array(Vec<Element>),
    Template(Vec<TemplatePart>),
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Sequence(Vec<Expr>),
}

/// Array literal item or call argument.
#[derive(Clone, Debug)]
pub enum Element {
    Item(Expr),
    Spread(Expr),
}

#[derive(Clone, Debug)]
pub enum Property {
    KeyValue(String, Expr),
    Spread(Expr),
}

#[derive(Clone, Debug)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

#[derive(Clone, Debug)]
pub struct ArrowExpr {
    pub params: Vec<String>,
    pub body: ArrowBody,
}

#[derive(Clone, Debug)]
pub enum ArrowBody {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
    Void,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Nullish,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOp {
    Inc,
    Dec,
}

#[derive(Clone, Debug)]
pub enum Stmt {
    Expr(Expr),
    Let {
        name: String,
        init: Option<Expr>,
        constant: bool,
    },
    Block(Vec<Stmt>),
    If {
        test: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForOf {
        binding: String,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        catch: Option<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Empty,
}

#[derive(Clone, Debug)]
pub struct CatchClause {
    pub param: Option<String>,
    pub body: Vec<Stmt>,
}

// Builders for hosts (and tests) that assemble trees by hand.
impl Expr {
    pub fn lit(v: impl Into<Value>) -> Expr {
        Expr::Literal(v.into())
    }

    pub fn ident(name: &str) -> Expr {
        Expr::Identifier(name.to_string())
    }

    pub fn member(object: Expr, property: &str) -> Expr {
        Expr::Member {
            object: Box::new(object),
            property: property.to_string(),
            optional: false,
        }
    }

    pub fn index(object: Expr, index: Expr) -> Expr {
        Expr::Index {
            object: Box::new(object),
            index: Box::new(index),
            optional: false,
        }
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call {
            callee: Box::new(callee),
            args: args.into_iter().map(Element::Item).collect(),
        }
    }

    pub fn arrow(params: &[&str], body: Expr) -> Expr {
        Expr::Arrow(Rc::new(ArrowExpr {
            params: params.iter().map(|p| p.to_string()).collect(),
            body: ArrowBody::Expr(Box::new(body)),
        }))
    }

    pub fn arrow_block(params: &[&str], body: Vec<Stmt>) -> Expr {
        Expr::Arrow(Rc::new(ArrowExpr {
            params: params.iter().map(|p| p.to_string()).collect(),
            body: ArrowBody::Block(body),
        }))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
        Expr::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Expr {
        Self::assign_op(AssignOp::Assign, target, value)
    }

    pub fn assign_op(op: AssignOp, target: Expr, value: Expr) -> Expr {
        Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    pub fn increment(target: Expr) -> Expr {
        Expr::Update {
            op: UpdateOp::Inc,
            prefix: false,
            target: Box::new(target),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn object(props: Vec<(&str, Expr)>) -> Expr {
        Expr::Object(
            props
                .into_iter()
                .map(|(k, v)| Property::KeyValue(k.to_string(), v))
                .collect(),
        )
    }

    pub fn array(items: Vec<Expr>) -> Expr {
        Expr::Array(items.into_iter().map(Element::Item).collect())
    }

    /// The arrow expression, if this is one.
    pub fn as_arrow(&self) -> Option<&Rc<ArrowExpr>> {
        match self {
            Expr::Arrow(a) => Some(a),
            _ => None,
        }
    }
}

impl Stmt {
    pub fn expr(e: Expr) -> Stmt {
        Stmt::Expr(e)
    }

    pub fn let_(name: &str, init: Expr) -> Stmt {
        Stmt::Let {
            name: name.to_string(),
            init: Some(init),
            constant: false,
        }
    }

    pub fn const_(name: &str, init: Expr) -> Stmt {
        Stmt::Let {
            name: name.to_string(),
            init: Some(init),
            constant: true,
        }
    }

    pub fn while_(test: Expr, body: Vec<Stmt>) -> Stmt {
        Stmt::While {
            test,
            body: Box::new(Stmt::Block(body)),
        }
    }

    pub fn for_of(binding: &str, iterable: Expr, body: Vec<Stmt>) -> Stmt {
        Stmt::ForOf {
            binding: binding.to_string(),
            iterable,
            body: Box::new(Stmt::Block(body)),
        }
    }

    pub fn if_(test: Expr, then: Vec<Stmt>, otherwise: Option<Vec<Stmt>>) -> Stmt {
        Stmt::If {
            test,
            then: Box::new(Stmt::Block(then)),
            otherwise: otherwise.map(|o| Box::new(Stmt::Block(o))),
        }
    }

    pub fn ret(e: Expr) -> Stmt {
        Stmt::Return(Some(e))
    }
}

/// A declarative binding: a literal, a string template or a parsed expression.
#[derive(Clone, Debug)]
pub enum Binding {
    Literal(Value),
    Template(Rc<Template>),
    Expr { source: Rc<str>, expr: Rc<Expr> },
}

impl Binding {
    pub fn literal(v: impl Into<Value>) -> Binding {
        Binding::Literal(v.into())
    }

    pub fn expr(source: &str, expr: Expr) -> Binding {
        Binding::Expr {
            source: Rc::from(source),
            expr: Rc::new(expr),
        }
    }

    /// Literal strings without braces stay literal; anything else is split as
    /// a template.
    pub fn text(src: &str) -> Result<Binding, EvalError> {
        if src.contains('{') {
            Ok(Binding::Template(Rc::new(Template::parse(src)?)))
        } else {
            Ok(Binding::Literal(Value::string(src)))
        }
    }

    pub fn source_text(&self) -> String {
        match self {
            Binding::Literal(v) => format!("{v:?}"),
            Binding::Template(t) => t.source.to_string(),
            Binding::Expr { source, .. } => source.to_string(),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Binding::Literal(_))
    }

    /// Declared as an arrow expression, i.e. produces a function.
    pub fn is_function(&self) -> bool {
        matches!(self, Binding::Expr { expr, .. } if expr.as_arrow().is_some())
    }
}

#[derive(Clone, Debug)]
pub struct Template {
    pub source: Rc<str>,
    pub parts: Vec<TemplatePart>,
}

impl Template {
    /// Splits `"Hello {user.name}!"` into text and member-path segments.
    /// `\{` escapes a literal brace.
    pub fn parse(src: &str) -> Result<Template, EvalError> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut chars = src.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' if matches!(chars.peek(), Some('{') | Some('}')) => {
                    if let Some(escaped) = chars.next() {
                        text.push(escaped);
                    }
                }
                '{' => {
                    let mut segment = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        segment.push(c);
                    }
                    if !closed {
                        return Err(EvalError::InvalidTemplate(segment));
                    }
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(TemplatePart::Expr(parse_member_path(segment.trim())?));
                }
                other => text.push(other),
            }
        }
        if !text.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        Ok(Template {
            source: Rc::from(src),
            parts,
        })
    }

    /// A template made of exactly one segment yields the raw value.
    pub fn single_expr(&self) -> Option<&Expr> {
        match self.parts.as_slice() {
            [TemplatePart::Expr(e)] => Some(e),
            _ => None,
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// `a`, `a.b`, `a[0]`, `a["key"]`, `a['key']`.
fn parse_member_path(segment: &str) -> Result<Expr, EvalError> {
    let invalid = || EvalError::InvalidTemplate(segment.to_string());
    let chars: Vec<char> = segment.chars().collect();
    let mut pos = 0;

    let read_ident = |pos: &mut usize| -> Option<String> {
        let start = *pos;
        if !chars.get(*pos).copied().is_some_and(is_ident_start) {
            return None;
        }
        while chars.get(*pos).copied().is_some_and(is_ident_char) {
            *pos += 1;
        }
        Some(chars[start..*pos].iter().collect())
    };

    let root = read_ident(&mut pos).ok_or_else(invalid)?;
    let mut expr = Expr::Identifier(root);
    while pos < chars.len() {
        match chars[pos] {
            '.' => {
                pos += 1;
                let prop = read_ident(&mut pos).ok_or_else(invalid)?;
                expr = Expr::member(expr, &prop);
            }
            '[' => {
                pos += 1;
                let close = chars[pos..]
                    .iter()
                    .position(|c| *c == ']')
                    .ok_or_else(invalid)?;
                let inner: String = chars[pos..pos + close].iter().collect();
                pos += close + 1;
                let inner = inner.trim();
                let index = if let Ok(n) = inner.parse::<usize>() {
                    Expr::lit(n)
                } else if inner.len() >= 2
                    && ((inner.starts_with('"') && inner.ends_with('"'))
                        || (inner.starts_with('\'') && inner.ends_with('\'')))
                {
                    Expr::lit(&inner[1..inner.len() - 1])
                } else {
                    return Err(invalid());
                };
                expr = Expr::index(expr, index);
            }
            _ => return Err(invalid()),
        }
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_splits_text_and_paths() {
        let t = Template::parse("Hi {user.name}, #{items[0]} \\{x\\}").unwrap();
        assert_eq!(t.parts.len(), 5);
        assert!(matches!(&t.parts[0], TemplatePart::Text(s) if s == "Hi "));
        assert!(matches!(&t.parts[1], TemplatePart::Expr(Expr::Member { property, .. }) if property == "name"));
        assert!(matches!(&t.parts[4], TemplatePart::Text(s) if s == " {x}"));
    }

    #[test]
    fn template_rejects_non_path_segments() {
        assert!(Template::parse("{a + b}").is_err());
        assert!(Template::parse("{open").is_err());
        assert!(Template::parse("{a['k']}").is_ok());
    }

    #[test]
    fn single_segment_template() {
        let t = Template::parse("{count}").unwrap();
        assert!(t.single_expr().is_some());
        assert!(Template::parse("n={count}").unwrap().single_expr().is_none());
    }
}
