//! Names of bound variables, looked up by de Bruijn index.

/// A `Vec` of names that is searched from the last to the first pushed name.
///
/// The nth element of `Locals` is the nth-*last* pushed name,
/// which is the de Bruijn index of the corresponding binder.
#[derive(Clone, Debug, Default)]
pub struct Locals(Vec<String>);

impl Locals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a name, shadowing earlier bindings of the same name.
    pub fn push(&mut self, name: String) {
        self.0.push(name)
    }

    pub fn pop(&mut self) -> Option<String> {
        self.0.pop()
    }

    /// Remove the n most recently bound names.
    pub fn pop_many(&mut self, n: usize) {
        self.0.truncate(self.len() - n)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// De Bruijn index of the innermost binding of a name.
    pub fn index(&self, name: &str) -> Option<usize> {
        self.iter().position(|x| x == name)
    }

    /// Iterate through the names starting from the most recently bound.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter().rev()
    }
}

#[test]
fn shadowing() {
    let mut locals = Locals::new();
    locals.push("x".into());
    locals.push("y".into());
    locals.push("x".into());
    assert_eq!(locals.index("x"), Some(0));
    assert_eq!(locals.index("y"), Some(1));
    locals.pop_many(2);
    assert_eq!(locals.index("x"), Some(0));
    assert_eq!(locals.index("y"), None);
}
