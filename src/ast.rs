//! Abstract Syntax Tree types for the expressions the compiler consumes
//!
//! The tree is produced by an external parser and is immutable during compilation.
//! Every node owns its children; there is no sharing.

use crate::compiler::Register;
use crate::string_dict::StringDict;
use crate::value::{CheapClone, JsString};

/// A compilation unit (script, function body or eval code)
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub body: Vec<Statement>,
}

// ============ STATEMENTS ============

#[derive(Debug, Clone)]
pub enum Statement {
    /// Expression evaluated for its side effects only
    Expression(Expression),
    VariableDeclaration(VariableDeclaration),
    Return(Expression),
}

#[derive(Debug, Clone)]
pub struct VariableDeclaration {
    pub kind: VariableKind,
    pub declarations: Vec<VariableDeclarator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Var,
    Let,
    Const,
}

impl VariableKind {
    pub fn is_lexical(self) -> bool {
        matches!(self, VariableKind::Let | VariableKind::Const)
    }
}

#[derive(Debug, Clone)]
pub struct VariableDeclarator {
    pub target: AssignmentTarget,
    pub init: Option<Expression>,
}

// ============ EXPRESSIONS ============

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub name: JsString,
}

#[derive(Debug, Clone)]
pub enum Expression {
    Identifier(Identifier),
    Literal(LiteralValue),
    Member(MemberExpression),
    Array(ArrayExpression),
    Object(ObjectExpression),
    Unary(UnaryExpression),
    Binary(BinaryExpression),
    Logical(LogicalExpression),
    Conditional(ConditionalExpression),
    Assignment(AssignmentExpression),
    Update(UpdateExpression),
    Sequence(Vec<Expression>),
    Call(CallExpression),
    /// A value the compiler has already placed in a register
    RegisterReference(Register),
}

/// Discriminant of an [`Expression`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionKind {
    Identifier,
    Literal,
    Member,
    Array,
    Object,
    Unary,
    Binary,
    Logical,
    Conditional,
    Assignment,
    Update,
    Sequence,
    Call,
    RegisterReference,
}

impl Expression {
    pub fn kind(&self) -> ExpressionKind {
        match self {
            Expression::Identifier(_) => ExpressionKind::Identifier,
            Expression::Literal(_) => ExpressionKind::Literal,
            Expression::Member(_) => ExpressionKind::Member,
            Expression::Array(_) => ExpressionKind::Array,
            Expression::Object(_) => ExpressionKind::Object,
            Expression::Unary(_) => ExpressionKind::Unary,
            Expression::Binary(_) => ExpressionKind::Binary,
            Expression::Logical(_) => ExpressionKind::Logical,
            Expression::Conditional(_) => ExpressionKind::Conditional,
            Expression::Assignment(_) => ExpressionKind::Assignment,
            Expression::Update(_) => ExpressionKind::Update,
            Expression::Sequence(_) => ExpressionKind::Sequence,
            Expression::Call(_) => ExpressionKind::Call,
            Expression::RegisterReference(_) => ExpressionKind::RegisterReference,
        }
    }

    pub fn as_identifier(&self) -> Option<&Identifier> {
        match self {
            Expression::Identifier(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(JsString),
}

#[derive(Debug, Clone)]
pub struct MemberExpression {
    pub object: Box<Expression>,
    pub property: MemberProperty,
}

#[derive(Debug, Clone)]
pub enum MemberProperty {
    /// `obj.name`
    Identifier(Identifier),
    /// `obj[expr]`
    Expression(Box<Expression>),
}

#[derive(Debug, Clone)]
pub struct ArrayExpression {
    pub elements: Vec<Expression>,
}

#[derive(Debug, Clone)]
pub struct ObjectExpression {
    pub properties: Vec<ObjectProperty>,
}

#[derive(Debug, Clone)]
pub struct ObjectProperty {
    pub key: PropertyKey,
    pub value: Expression,
}

#[derive(Debug, Clone)]
pub enum PropertyKey {
    Name(JsString),
    Index(u32),
    Computed(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    Typeof,
    Void,
}

#[derive(Debug, Clone)]
pub struct UnaryExpression {
    pub operator: UnaryOp,
    pub argument: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone)]
pub struct BinaryExpression {
    pub operator: BinaryOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    NullishCoalescing,
}

#[derive(Debug, Clone)]
pub struct LogicalExpression {
    pub operator: LogicalOp,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

#[derive(Debug, Clone)]
pub struct ConditionalExpression {
    pub test: Box<Expression>,
    pub consequent: Box<Expression>,
    pub alternate: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    NullishAssign,
}

#[derive(Debug, Clone)]
pub struct AssignmentExpression {
    pub operator: AssignmentOp,
    pub target: AssignmentTarget,
    pub value: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone)]
pub struct UpdateExpression {
    pub operator: UpdateOp,
    pub prefix: bool,
    pub argument: Box<AssignmentTarget>,
}

#[derive(Debug, Clone)]
pub struct CallExpression {
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
}

// ============ ASSIGNMENT TARGETS ============

/// Left-hand side of an assignment or declaration
#[derive(Debug, Clone)]
pub enum AssignmentTarget {
    Identifier(Identifier),
    Member(MemberExpression),
    ArrayPattern(ArrayPattern),
    ObjectPattern(ObjectPattern),
    /// `target = default` inside a pattern
    Default(DefaultTarget),
}

impl AssignmentTarget {
    pub fn as_identifier(&self) -> Option<&Identifier> {
        match self {
            AssignmentTarget::Identifier(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArrayPattern {
    /// `None` is an elision (`[, b]`)
    pub elements: Vec<Option<AssignmentTarget>>,
    pub rest: Option<Box<AssignmentTarget>>,
}

#[derive(Debug, Clone)]
pub struct ObjectPattern {
    pub properties: Vec<ObjectPatternProperty>,
    pub rest: Option<Box<AssignmentTarget>>,
}

#[derive(Debug, Clone)]
pub struct ObjectPatternProperty {
    pub key: PropertyKey,
    pub target: AssignmentTarget,
}

#[derive(Debug, Clone)]
pub struct DefaultTarget {
    pub target: Box<AssignmentTarget>,
    pub default: Box<Expression>,
}

// ============ CONSTRUCTION ============

/// Builds trees with interned identifier names.
///
/// This is the construction surface the parser (or a test) uses; it performs no
/// validation beyond what the types enforce.
#[derive(Default)]
pub struct AstBuilder {
    names: StringDict,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self {
            names: StringDict::with_common_strings(),
        }
    }

    pub fn name(&mut self, name: &str) -> JsString {
        self.names.get_or_insert(name)
    }

    pub fn identifier(&mut self, name: &str) -> Identifier {
        Identifier {
            name: self.name(name),
        }
    }

    pub fn ident(&mut self, name: &str) -> Expression {
        Expression::Identifier(self.identifier(name))
    }

    pub fn number(&self, n: f64) -> Expression {
        Expression::Literal(LiteralValue::Number(n))
    }

    pub fn string(&mut self, s: &str) -> Expression {
        Expression::Literal(LiteralValue::String(self.name(s)))
    }

    pub fn boolean(&self, b: bool) -> Expression {
        Expression::Literal(LiteralValue::Boolean(b))
    }

    pub fn null(&self) -> Expression {
        Expression::Literal(LiteralValue::Null)
    }

    pub fn undefined(&self) -> Expression {
        Expression::Literal(LiteralValue::Undefined)
    }

    pub fn member(&mut self, object: Expression, property: &str) -> Expression {
        Expression::Member(self.member_expr(object, property))
    }

    pub fn member_expr(&mut self, object: Expression, property: &str) -> MemberExpression {
        MemberExpression {
            object: Box::new(object),
            property: MemberProperty::Identifier(self.identifier(property)),
        }
    }

    pub fn computed_member(&self, object: Expression, property: Expression) -> Expression {
        Expression::Member(MemberExpression {
            object: Box::new(object),
            property: MemberProperty::Expression(Box::new(property)),
        })
    }

    pub fn array(&self, elements: Vec<Expression>) -> Expression {
        Expression::Array(ArrayExpression { elements })
    }

    pub fn object(&mut self, properties: Vec<(&str, Expression)>) -> Expression {
        let properties = properties
            .into_iter()
            .map(|(key, value)| ObjectProperty {
                key: PropertyKey::Name(self.name(key)),
                value,
            })
            .collect();
        Expression::Object(ObjectExpression { properties })
    }

    pub fn unary(&self, operator: UnaryOp, argument: Expression) -> Expression {
        Expression::Unary(UnaryExpression {
            operator,
            argument: Box::new(argument),
        })
    }

    pub fn binary(&self, operator: BinaryOp, left: Expression, right: Expression) -> Expression {
        Expression::Binary(BinaryExpression {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn logical(&self, operator: LogicalOp, left: Expression, right: Expression) -> Expression {
        Expression::Logical(LogicalExpression {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn and(&self, left: Expression, right: Expression) -> Expression {
        self.logical(LogicalOp::And, left, right)
    }

    pub fn or(&self, left: Expression, right: Expression) -> Expression {
        self.logical(LogicalOp::Or, left, right)
    }

    pub fn nullish(&self, left: Expression, right: Expression) -> Expression {
        self.logical(LogicalOp::NullishCoalescing, left, right)
    }

    pub fn conditional(
        &self,
        test: Expression,
        consequent: Expression,
        alternate: Expression,
    ) -> Expression {
        Expression::Conditional(ConditionalExpression {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    pub fn assign(&self, target: AssignmentTarget, value: Expression) -> Expression {
        self.assign_op(AssignmentOp::Assign, target, value)
    }

    pub fn assign_op(
        &self,
        operator: AssignmentOp,
        target: AssignmentTarget,
        value: Expression,
    ) -> Expression {
        Expression::Assignment(AssignmentExpression {
            operator,
            target,
            value: Box::new(value),
        })
    }

    pub fn update(&self, operator: UpdateOp, prefix: bool, argument: AssignmentTarget) -> Expression {
        Expression::Update(UpdateExpression {
            operator,
            prefix,
            argument: Box::new(argument),
        })
    }

    pub fn sequence(&self, expressions: Vec<Expression>) -> Expression {
        Expression::Sequence(expressions)
    }

    pub fn call(&mut self, callee: &str, arguments: Vec<Expression>) -> Expression {
        Expression::Call(CallExpression {
            callee: Box::new(self.ident(callee)),
            arguments,
        })
    }

    // Targets

    pub fn target(&mut self, name: &str) -> AssignmentTarget {
        AssignmentTarget::Identifier(self.identifier(name))
    }

    pub fn member_target(&mut self, object: Expression, property: &str) -> AssignmentTarget {
        AssignmentTarget::Member(self.member_expr(object, property))
    }

    pub fn computed_target(&self, object: Expression, property: Expression) -> AssignmentTarget {
        AssignmentTarget::Member(MemberExpression {
            object: Box::new(object),
            property: MemberProperty::Expression(Box::new(property)),
        })
    }

    pub fn array_pattern(&self, elements: Vec<Option<AssignmentTarget>>) -> AssignmentTarget {
        AssignmentTarget::ArrayPattern(ArrayPattern {
            elements,
            rest: None,
        })
    }

    pub fn array_pattern_with_rest(
        &self,
        elements: Vec<Option<AssignmentTarget>>,
        rest: AssignmentTarget,
    ) -> AssignmentTarget {
        AssignmentTarget::ArrayPattern(ArrayPattern {
            elements,
            rest: Some(Box::new(rest)),
        })
    }

    pub fn object_pattern(
        &mut self,
        properties: Vec<(&str, AssignmentTarget)>,
        rest: Option<AssignmentTarget>,
    ) -> AssignmentTarget {
        let properties = properties
            .into_iter()
            .map(|(key, target)| ObjectPatternProperty {
                key: PropertyKey::Name(self.name(key)),
                target,
            })
            .collect();
        AssignmentTarget::ObjectPattern(ObjectPattern {
            properties,
            rest: rest.map(Box::new),
        })
    }

    pub fn with_default(&self, target: AssignmentTarget, default: Expression) -> AssignmentTarget {
        AssignmentTarget::Default(DefaultTarget {
            target: Box::new(target),
            default: Box::new(default),
        })
    }

    // Statements

    pub fn expr_stmt(&self, expression: Expression) -> Statement {
        Statement::Expression(expression)
    }

    pub fn ret(&self, expression: Expression) -> Statement {
        Statement::Return(expression)
    }

    pub fn declare(
        &self,
        kind: VariableKind,
        target: AssignmentTarget,
        init: Option<Expression>,
    ) -> Statement {
        Statement::VariableDeclaration(VariableDeclaration {
            kind,
            declarations: vec![VariableDeclarator { target, init }],
        })
    }

    pub fn let_decl(&mut self, name: &str, init: Option<Expression>) -> Statement {
        let target = self.target(name);
        self.declare(VariableKind::Let, target, init)
    }

    pub fn const_decl(&mut self, name: &str, init: Expression) -> Statement {
        let target = self.target(name);
        self.declare(VariableKind::Const, target, Some(init))
    }

    pub fn var_decl(&mut self, name: &str, init: Option<Expression>) -> Statement {
        let target = self.target(name);
        self.declare(VariableKind::Var, target, init)
    }

    pub fn program(&self, body: Vec<Statement>) -> Program {
        Program { body }
    }
}

impl Identifier {
    pub fn new(name: JsString) -> Self {
        Self { name }
    }

    pub fn name(&self) -> JsString {
        self.name.cheap_clone()
    }
}
