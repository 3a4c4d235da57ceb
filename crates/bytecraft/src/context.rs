//! Evaluation scopes used while parsing, building and sizing.
//!
//! Each aggregate owns a fresh [Context] for the duration of its call. The
//! context borrows its enclosing context immutably, so lookups can walk
//! outward while ownership stays with the call stack.

use crate::{
    errors::{ExpressionError, Result},
    value::{Container, Value},
};

/// Named values visible to expressions, plus the enclosing scope.
#[derive(Debug, Default)]
pub struct Context<'a> {
    fields: Container,
    parent: Option<&'a Context<'a>>,
    index: Option<usize>,
    item: Option<&'a Value>,
    items: Option<&'a [Value]>,
}

impl Context<'static> {
    /// Root context with no fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Root context seeded with caller-supplied parameters.
    pub fn from_container(fields: Container) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }
}

impl<'a> Context<'a> {
    /// Child scope whose lookups fall back to `parent`.
    pub fn with_parent(parent: &'a Context<'a>) -> Self {
        Self {
            fields: Container::new(),
            parent: Some(parent),
            index: None,
            item: None,
            items: None,
        }
    }

    /// Child scope exposing the element under test and the elements so far,
    /// used when evaluating a repeater predicate.
    pub fn with_item(parent: &'a Context<'a>, item: &'a Value, items: &'a [Value]) -> Self {
        Self {
            item: Some(item),
            items: Some(items),
            ..Self::with_parent(parent)
        }
    }

    pub fn parent(&self) -> Option<&'a Context<'a>> {
        self.parent
    }

    /// Looks `name` up locally, then in each enclosing scope.
    pub fn get(&self, name: &str) -> Result<&Value> {
        let mut scope = Some(self);
        while let Some(ctx) = scope {
            if let Some(value) = ctx.fields.get(name) {
                return Ok(value);
            }
            scope = ctx.parent;
        }

        Err(ExpressionError::MissingKey(name.to_string()).into())
    }

    /// Looks `name` up in this scope only.
    pub fn get_local(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name, value);
    }

    pub fn fields(&self) -> &Container {
        &self.fields
    }

    pub fn into_fields(self) -> Container {
        self.fields
    }

    /// Index of the innermost repeater element being processed.
    pub fn index(&self) -> Option<usize> {
        let mut scope = Some(self);
        while let Some(ctx) = scope {
            if ctx.index.is_some() {
                return ctx.index;
            }
            scope = ctx.parent;
        }
        None
    }

    /// Sets the repeater index of this scope, returning the previous one.
    pub fn set_index(&mut self, index: Option<usize>) -> Option<usize> {
        std::mem::replace(&mut self.index, index)
    }

    /// Element under test by the innermost repeater predicate.
    pub fn item(&self) -> Option<&'a Value> {
        let mut scope = Some(self);
        while let Some(ctx) = scope {
            if ctx.item.is_some() {
                return ctx.item;
            }
            scope = ctx.parent;
        }
        None
    }

    /// Elements collected so far by the innermost repeater predicate.
    pub fn items(&self) -> Option<&'a [Value]> {
        let mut scope = Some(self);
        while let Some(ctx) = scope {
            if ctx.items.is_some() {
                return ctx.items;
            }
            scope = ctx.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_walks_parents() {
        let mut root = Context::new();
        root.insert("a", Value::Int(1));
        root.insert("b", Value::Int(2));

        let mut child = Context::with_parent(&root);
        child.insert("b", Value::Int(20));

        assert_eq!(child.get("a").unwrap(), &Value::Int(1));
        assert_eq!(child.get("b").unwrap(), &Value::Int(20));
        assert_eq!(child.get_local("a"), None);
        assert!(child.get("c").is_err());
    }

    #[test]
    fn test_index_is_inherited() {
        let mut root = Context::new();
        assert_eq!(root.set_index(Some(3)), None);
        let child = Context::with_parent(&root);
        assert_eq!(child.index(), Some(3));
    }

    #[test]
    fn test_item_scope() {
        let root = Context::new();
        let item = Value::Int(7);
        let items = vec![Value::Int(1), Value::Int(7)];
        let scope = Context::with_item(&root, &item, &items);
        assert_eq!(scope.item(), Some(&Value::Int(7)));
        assert_eq!(scope.items().map(<[Value]>::len), Some(2));
        assert_eq!(root.item(), None);
    }

    #[test]
    fn test_into_fields_keeps_order() {
        let mut ctx = Context::new();
        ctx.insert("b", Value::Int(1));
        ctx.insert("a", Value::Int(2));
        let fields = ctx.into_fields();
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
