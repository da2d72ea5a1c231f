//! Identifier collection
//!
//! [`Identifiers`] walks an expression or assignment target and yields every
//! identifier it references, in subtree order, tagged with whether the position
//! writes the binding. The walk is lazy; cloning the iterator (or calling
//! [`Identifiers::restart`]) starts it again from the root.

use crate::ast::{
    AssignmentTarget, Expression, MemberExpression, MemberProperty, PropertyKey,
};
use crate::value::JsString;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierUse<'a> {
    pub name: &'a JsString,
    pub access: Access,
}

impl IdentifierUse<'_> {
    pub fn is_write(&self) -> bool {
        self.access == Access::Write
    }
}

#[derive(Debug, Clone, Copy)]
enum Node<'a> {
    Expression(&'a Expression),
    Target(&'a AssignmentTarget),
}

#[derive(Debug, Clone)]
pub struct Identifiers<'a> {
    root: Node<'a>,
    stack: Vec<Node<'a>>,
}

impl<'a> Identifiers<'a> {
    pub fn of_expression(expr: &'a Expression) -> Self {
        Self::from_root(Node::Expression(expr))
    }

    pub fn of_target(target: &'a AssignmentTarget) -> Self {
        Self::from_root(Node::Target(target))
    }

    fn from_root(root: Node<'a>) -> Self {
        Self {
            root,
            stack: vec![root],
        }
    }

    pub fn restart(&mut self) {
        self.stack.clear();
        self.stack.push(self.root);
    }

    fn push_member(&mut self, member: &'a MemberExpression) {
        if let MemberProperty::Expression(key) = &member.property {
            self.stack.push(Node::Expression(key));
        }
        self.stack.push(Node::Expression(&member.object));
    }

    fn push_key(&mut self, key: &'a PropertyKey) {
        if let PropertyKey::Computed(expr) = key {
            self.stack.push(Node::Expression(expr));
        }
    }

    fn push_expressions(&mut self, exprs: &'a [Expression]) {
        self.stack
            .extend(exprs.iter().rev().map(Node::Expression));
    }

    fn visit_expression(&mut self, expr: &'a Expression) -> Option<IdentifierUse<'a>> {
        match expr {
            Expression::Identifier(id) => {
                return Some(IdentifierUse {
                    name: &id.name,
                    access: Access::Read,
                });
            }
            Expression::Literal(_) | Expression::RegisterReference(_) => {}
            Expression::Member(member) => self.push_member(member),
            Expression::Array(array) => self.push_expressions(&array.elements),
            Expression::Object(object) => {
                for property in object.properties.iter().rev() {
                    self.stack.push(Node::Expression(&property.value));
                    self.push_key(&property.key);
                }
            }
            Expression::Unary(unary) => self.stack.push(Node::Expression(&unary.argument)),
            Expression::Binary(binary) => {
                self.stack.push(Node::Expression(&binary.right));
                self.stack.push(Node::Expression(&binary.left));
            }
            Expression::Logical(logical) => {
                self.stack.push(Node::Expression(&logical.right));
                self.stack.push(Node::Expression(&logical.left));
            }
            Expression::Conditional(cond) => {
                self.stack.push(Node::Expression(&cond.alternate));
                self.stack.push(Node::Expression(&cond.consequent));
                self.stack.push(Node::Expression(&cond.test));
            }
            Expression::Assignment(assign) => {
                self.stack.push(Node::Expression(&assign.value));
                self.stack.push(Node::Target(&assign.target));
            }
            Expression::Update(update) => self.stack.push(Node::Target(&update.argument)),
            Expression::Sequence(exprs) => self.push_expressions(exprs),
            Expression::Call(call) => {
                self.push_expressions(&call.arguments);
                self.stack.push(Node::Expression(&call.callee));
            }
        }
        None
    }

    fn visit_target(&mut self, target: &'a AssignmentTarget) -> Option<IdentifierUse<'a>> {
        match target {
            AssignmentTarget::Identifier(id) => {
                return Some(IdentifierUse {
                    name: &id.name,
                    access: Access::Write,
                });
            }
            AssignmentTarget::Member(member) => self.push_member(member),
            AssignmentTarget::ArrayPattern(pattern) => {
                if let Some(rest) = &pattern.rest {
                    self.stack.push(Node::Target(rest));
                }
                self.stack
                    .extend(pattern.elements.iter().rev().flatten().map(Node::Target));
            }
            AssignmentTarget::ObjectPattern(pattern) => {
                if let Some(rest) = &pattern.rest {
                    self.stack.push(Node::Target(rest));
                }
                for property in pattern.properties.iter().rev() {
                    self.stack.push(Node::Target(&property.target));
                    self.push_key(&property.key);
                }
            }
            AssignmentTarget::Default(default) => {
                self.stack.push(Node::Expression(&default.default));
                self.stack.push(Node::Target(&default.target));
            }
        }
        None
    }
}

impl<'a> Iterator for Identifiers<'a> {
    type Item = IdentifierUse<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            let found = match node {
                Node::Expression(expr) => self.visit_expression(expr),
                Node::Target(target) => self.visit_target(target),
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

/// Names a declaration target binds, in source order
pub fn bound_names(target: &AssignmentTarget) -> Vec<&JsString> {
    let mut names = Vec::new();
    collect_bound_names(target, &mut names);
    names
}

fn collect_bound_names<'a>(target: &'a AssignmentTarget, names: &mut Vec<&'a JsString>) {
    match target {
        AssignmentTarget::Identifier(id) => names.push(&id.name),
        AssignmentTarget::Member(_) => {}
        AssignmentTarget::ArrayPattern(pattern) => {
            for element in pattern.elements.iter().flatten() {
                collect_bound_names(element, names);
            }
            if let Some(rest) = &pattern.rest {
                collect_bound_names(rest, names);
            }
        }
        AssignmentTarget::ObjectPattern(pattern) => {
            for property in &pattern.properties {
                collect_bound_names(&property.target, names);
            }
            if let Some(rest) = &pattern.rest {
                collect_bound_names(rest, names);
            }
        }
        AssignmentTarget::Default(default) => collect_bound_names(&default.target, names),
    }
}
