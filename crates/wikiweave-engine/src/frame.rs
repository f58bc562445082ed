//! Expansion frames: which template is being expanded, with which
//! arguments, on behalf of whom.

use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use wikiweave_syntax::{Attribute, Token};

use crate::tokens::trim_tokens;

pub const LOOP_MESSAGE: &str = "Error: Template loop detected: ";
pub const DEPTH_MESSAGE: &str = "Error: Expansion depth limit exceeded: ";

/// Ordered call arguments, as written at the call site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(pub Vec<Attribute>);

/// Arguments by name: positional ones numbered from 1.
#[derive(Debug, Clone, Default)]
pub struct NamedArgs {
    values: HashMap<String, Vec<Token>>,
    named: HashSet<String>,
}

impl NamedArgs {
    /// Value of an argument. Named values are trimmed; positional values
    /// keep their whitespace.
    pub fn get(&self, name: &str) -> Option<Vec<Token>> {
        let value = self.values.get(name)?.clone();
        Some(if self.named.contains(name) {
            trim_tokens(value)
        } else {
            value
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Params {
    /// Later duplicates win, named keys are trimmed.
    pub fn named(&self) -> NamedArgs {
        let mut args = NamedArgs::default();
        let mut position = 1;
        for attr in &self.0 {
            let key = attr.key_string();
            let value = attr.value.to_tokens();
            if key.is_empty() {
                args.values.insert(position.to_string(), value);
                position += 1;
            } else {
                let key = key.trim().to_string();
                args.named.insert(key.clone());
                args.values.insert(key, value);
            }
        }
        args
    }
}

#[derive(Debug)]
pub struct Frame {
    /// Canonical title of the page or template being expanded.
    pub title: String,
    pub args: Params,
    parent: Option<Weak<Frame>>,
    pub depth: usize,
}

impl Frame {
    /// The frame of the top-level page.
    pub fn root(title: impl Into<String>) -> Rc<Frame> {
        Rc::new(Frame {
            title: title.into(),
            args: Params::default(),
            parent: None,
            depth: 0,
        })
    }

    pub fn child(self: &Rc<Self>, title: impl Into<String>, args: Vec<Attribute>) -> Rc<Frame> {
        Rc::new(Frame {
            title: title.into(),
            args: Params(args),
            parent: Some(Rc::downgrade(self)),
            depth: self.depth + 1,
        })
    }

    pub fn parent(&self) -> Option<Rc<Frame>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Diagnostic prefix when expanding `title` from this frame would loop
    /// or nest too deeply.
    pub fn loop_and_depth_check(&self, title: &str, max_depth: usize) -> Option<&'static str> {
        if self.depth >= max_depth {
            return Some(DEPTH_MESSAGE);
        }
        if self.title == title {
            return Some(LOOP_MESSAGE);
        }
        let mut ancestor = self.parent();
        while let Some(frame) = ancestor {
            if frame.title == title {
                return Some(LOOP_MESSAGE);
            }
            ancestor = frame.parent();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wikiweave_syntax::tokens_to_string;

    fn arg(key: &str, value: &str) -> Attribute {
        Attribute::new(key, value)
    }

    #[test]
    fn positional_args_are_numbered_and_named_ones_trimmed() {
        let params = Params(vec![
            arg("", " a "),
            arg(" name ", " b "),
            arg("", "c"),
            arg("1", "override"),
        ]);
        let named = params.named();
        assert_eq!(named.len(), 3);
        assert_eq!(tokens_to_string(&named.get("1").unwrap()), "override");
        assert_eq!(tokens_to_string(&named.get("2").unwrap()), "c");
        assert_eq!(tokens_to_string(&named.get("name").unwrap()), "b");
    }

    #[test]
    fn positional_values_keep_whitespace() {
        let named = Params(vec![arg("", " a ")]).named();
        assert_eq!(tokens_to_string(&named.get("1").unwrap()), " a ");
    }

    #[test]
    fn detects_loops_through_ancestors() {
        let root = Frame::root("Main_Page");
        let a = root.child("Template:A", vec![]);
        let b = a.child("Template:B", vec![]);
        assert_eq!(b.depth, 2);
        assert_eq!(b.loop_and_depth_check("Template:A", 40), Some(LOOP_MESSAGE));
        assert_eq!(b.loop_and_depth_check("Template:B", 40), Some(LOOP_MESSAGE));
        assert_eq!(b.loop_and_depth_check("Template:C", 40), None);
    }

    #[test]
    fn depth_limit_applies_before_loop_check() {
        let root = Frame::root("Main_Page");
        let a = root.child("Template:A", vec![]);
        assert_eq!(a.loop_and_depth_check("Template:Z", 1), Some(DEPTH_MESSAGE));
        assert_eq!(root.loop_and_depth_check("Template:Z", 1), None);
    }
}
