use crate::value::Value;

/// A value-producing expression inside tag or output markup.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    /// The `empty` keyword; compares by emptiness of the other operand.
    Empty,
    /// The `blank` keyword; compares by blankness of the other operand.
    Blank,
    Lookup(Box<VariableLookup>),
    /// `(a..b)` whose ends are only known at render time.
    Range(Box<Expression>, Box<Expression>),
    /// Segments applied to a value that is not a variable, as in
    /// `(1..5).size`.
    Path(Box<Expression>, Vec<Segment>),
}

impl Expression {
    pub fn nil() -> Self {
        Expression::Literal(Value::Nil)
    }

    /// A lookup of a single top-level variable, e.g. `product`.
    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Lookup(Box::new(VariableLookup {
            name: Expression::Literal(Value::Str(name.into())),
            segments: Vec::new(),
        }))
    }
}

/// `foo.bar[0]["baz"]`: a root name followed by path segments.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableLookup {
    /// Usually a string literal; `[expr]` at the start makes it dynamic.
    pub name: Expression,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub key: Expression,
    /// Written with a dot (`.size`), so derived accessors may answer it.
    pub command: bool,
}

/// `| name: arg, key: value`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expression>,
    pub keywords: Vec<(String, Expression)>,
}

/// An expression with its filter chain, as found in `{{ }}`, `echo` and
/// on the right-hand side of `assign`.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub expression: Expression,
    pub filters: Vec<FilterCall>,
    pub line_number: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Contains,
}

impl Operator {
    pub fn from_symbol(op: &str) -> Option<Self> {
        Some(match op {
            "==" => Operator::Eq,
            "!=" | "<>" => Operator::NotEq,
            "<" => Operator::Lt,
            "<=" => Operator::LtEq,
            ">" => Operator::Gt,
            ">=" => Operator::GtEq,
            "contains" => Operator::Contains,
            _ => return None,
        })
    }
}

/// Boolean condition of `if`, `unless`, `elsif` and `when`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `left` alone tests truthiness; with an operator it compares.
    Compare {
        left: Expression,
        op: Option<(Operator, Expression)>,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    /// Always true; used for `else` branches.
    Else,
}

impl Condition {
    pub fn truthy(left: Expression) -> Self {
        Condition::Compare { left, op: None }
    }

    pub fn compare(left: Expression, op: Operator, right: Expression) -> Self {
        Condition::Compare {
            left,
            op: Some((op, right)),
        }
    }
}
