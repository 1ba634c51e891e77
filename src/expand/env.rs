// ABOUTME: Macro environment mapping names to definitions, with lexical parent chains

use crate::ast::{Ast, Position};
use crate::error::Diagnostic;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Handler for a built-in macro form
pub type BuiltinHandler = fn(&mut crate::expand::Expander, &[Ast], &Position) -> Result<Ast, Diagnostic>;

/// A macro definition: either a built-in handler or a user template.
///
/// User macros carry their parameter list, an optional rest parameter
/// (written `& name`), and the body forms evaluated by the compile-time
/// interpreter at expansion sites.
#[derive(Debug, Clone)]
pub enum MacroDef {
    Builtin(BuiltinHandler),
    User {
        params: Vec<String>,
        rest: Option<String>,
        body: Vec<Ast>,
    },
}

/// Per-scope macro table. Outer-scope macros stay visible to inner forms
/// through the parent pointer chain.
#[derive(Debug)]
pub struct MacroEnv {
    defs: RefCell<HashMap<String, MacroDef>>,
    parent: Option<Rc<MacroEnv>>,
}

impl MacroEnv {
    pub fn new() -> Rc<Self> {
        Rc::new(MacroEnv {
            defs: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn with_parent(parent: Rc<MacroEnv>) -> Rc<Self> {
        Rc::new(MacroEnv {
            defs: RefCell::new(HashMap::new()),
            parent: Some(parent),
        })
    }

    /// Defines a macro in THIS scope
    pub fn define(&self, name: String, def: MacroDef) {
        self.defs.borrow_mut().insert(name, def);
    }

    /// Looks up a macro here and then up the parent chain
    pub fn get(&self, name: &str) -> Option<MacroDef> {
        if let Some(def) = self.defs.borrow().get(name) {
            return Some(def.clone());
        }
        if let Some(ref parent) = self.parent {
            return parent.get(name);
        }
        None
    }

    pub fn is_macro(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// User macros defined directly in this scope, for module export
    pub fn local_user_macros(&self) -> HashMap<String, MacroDef> {
        self.defs
            .borrow()
            .iter()
            .filter(|(_, def)| matches!(def, MacroDef::User { .. }))
            .map(|(name, def)| (name.clone(), def.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_macro() -> MacroDef {
        MacroDef::User {
            params: vec!["x".to_string()],
            rest: None,
            body: Vec::new(),
        }
    }

    #[test]
    fn test_define_and_get() {
        let env = MacroEnv::new();
        env.define("twice".to_string(), user_macro());
        assert!(env.is_macro("twice"));
        assert!(!env.is_macro("thrice"));
    }

    #[test]
    fn test_parent_chain_lookup() {
        let parent = MacroEnv::new();
        parent.define("outer".to_string(), user_macro());

        let child = MacroEnv::with_parent(parent);
        assert!(child.is_macro("outer"));
        child.define("inner".to_string(), user_macro());
        assert!(child.is_macro("inner"));
    }

    #[test]
    fn test_local_user_macros_excludes_parent() {
        let parent = MacroEnv::new();
        parent.define("outer".to_string(), user_macro());

        let child = MacroEnv::with_parent(parent);
        child.define("inner".to_string(), user_macro());

        let local = child.local_user_macros();
        assert!(local.contains_key("inner"));
        assert!(!local.contains_key("outer"));
    }
}
