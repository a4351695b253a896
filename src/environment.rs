use crate::evaluator::{Error, Result};
use crate::types::{Arity, Value};
use itertools::Itertools;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A mutable cell holding at most one value. Empty slots are pre-declared
/// names whose initializer has not run yet.
pub type Slot = Rc<RefCell<Option<Value>>>;

pub fn empty_slot() -> Slot {
    Rc::new(RefCell::new(None))
}

pub fn filled_slot(value: Value) -> Slot {
    Rc::new(RefCell::new(Some(value)))
}

pub struct Environment {
    bindings: RefCell<HashMap<String, Slot>>,
    parent: Option<Rc<Environment>>,
    level: usize,
}

impl Environment {
    pub fn create(parent: Option<&Rc<Environment>>) -> Rc<Self> {
        Rc::new(Environment {
            bindings: RefCell::new(HashMap::new()),
            parent: parent.cloned(),
            level: parent.map_or(0, |p| p.level + 1),
        })
    }

    pub fn extend(parent: &Rc<Environment>) -> Rc<Self> {
        Self::create(Some(parent))
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Fills the local slot for `name`, creating it if needed. An existing
    /// slot is updated in place so anything holding it observes the change.
    pub fn bind<T: Into<String>>(&self, name: T, value: Value) {
        let name = name.into();
        let existing = self.bindings.borrow().get(&name).cloned();
        match existing {
            Some(slot) => {
                slot.replace(Some(value));
            }
            None => {
                self.bindings.borrow_mut().insert(name, filled_slot(value));
            }
        }
    }

    /// Installs `slot` as the local binding for `name`, replacing any
    /// previous slot.
    pub fn bind_local<T: Into<String>>(&self, name: T, slot: Slot) {
        self.bindings.borrow_mut().insert(name.into(), slot);
    }

    pub fn bind_list(&self, names: &[String], values: Vec<Value>) -> Result<()> {
        Arity::exactly(names.len()).validate_for(values.len(), "bind-list")?;
        for (name, value) in names.iter().zip(values) {
            self.bind(name.clone(), value);
        }
        Ok(())
    }

    pub fn bind_local_list(&self, names: &[String], slots: Vec<Slot>) -> Result<()> {
        Arity::exactly(names.len()).validate_for(slots.len(), "bind-local-list")?;
        for (name, slot) in names.iter().zip(slots) {
            self.bind_local(name.clone(), slot);
        }
        Ok(())
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    /// The slot bound to `name` in this frame only.
    pub fn lookup_local_slot(&self, name: &str) -> Option<Slot> {
        self.bindings.borrow().get(name).cloned()
    }

    /// Walks the parent chain for the slot bound to `name`.
    pub fn lookup_slot(&self, name: &str) -> Option<Slot> {
        match self.lookup_local_slot(name) {
            Some(slot) => Some(slot),
            None => self.parent.as_ref().and_then(|p| p.lookup_slot(name)),
        }
    }

    /// Resolves `name`, including `module.symbol` dotted names. An empty slot
    /// reads as `Value::Unspecified`.
    pub fn lookup(&self, name: &str) -> Result {
        if let Some(slot) = self.lookup_slot(name) {
            let value = slot.borrow().clone();
            return Ok(value.unwrap_or(Value::Unspecified));
        }
        match split_dotted(name) {
            Some((module, member)) => self.lookup_in_module(module, member, name),
            None => Err(Error::NameNotFound(name.to_string())),
        }
    }

    fn lookup_in_module(&self, module: &str, member: &str, full: &str) -> Result {
        match self.lookup(module) {
            Ok(Value::Module(m)) => {
                let exported = member.split('.').next().unwrap_or(member);
                if !m.exports(exported) {
                    return Err(Error::NameNotFound(full.to_string()));
                }
                log::trace!("resolve {} inside module {}", member, m.name);
                m.env.lookup(member)
            }
            Ok(_) => Err(Error::NotAModule(module.to_string())),
            Err(Error::NameNotFound(_)) => Err(Error::NameNotFound(full.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Names bound directly in this environment, sorted.
    pub fn names(&self) -> Vec<String> {
        self.bindings.borrow().keys().cloned().sorted().collect()
    }

    /// Names visible from this environment through the whole chain, sorted.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names = self.names();
        if let Some(parent) = &self.parent {
            names.extend(parent.visible_names());
        }
        names.into_iter().sorted().dedup().collect()
    }
}

fn split_dotted(name: &str) -> Option<(&str, &str)> {
    let dot = name.find('.')?;
    let (module, member) = (&name[..dot], &name[dot + 1..]);
    match module.is_empty() || member.is_empty() {
        true => None,
        false => Some((module, member)),
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<env level {}: {}>", self.level, self.names().join(" "))
    }
}

impl fmt::Debug for Environment {
    // Values may refer back to this environment, so only names are shown.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment{{level: {}, names: {:?}}}", self.level, self.names())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Module;

    #[test]
    fn lookup_walks_the_chain() {
        let root = Environment::create(None);
        root.bind("x", Value::Int(1));
        let child = Environment::extend(&root);
        assert_eq!(child.level(), 1);
        assert_eq!(child.lookup("x").unwrap(), Value::Int(1));
        child.bind("x", Value::Int(2));
        assert_eq!(child.lookup("x").unwrap(), Value::Int(2));
        assert_eq!(root.lookup("x").unwrap(), Value::Int(1));
    }

    #[test]
    fn missing_names_are_reported() {
        let env = Environment::create(None);
        match env.lookup("nope") {
            Err(Error::NameNotFound(name)) => assert_eq!(name, "nope"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_slot_reads_unspecified_until_filled() {
        let env = Environment::create(None);
        let slot = empty_slot();
        env.bind_local("f", slot.clone());
        assert_eq!(env.lookup("f").unwrap(), Value::Unspecified);
        slot.replace(Some(Value::Int(7)));
        assert_eq!(env.lookup("f").unwrap(), Value::Int(7));
    }

    #[test]
    fn bind_fills_an_existing_slot_in_place() {
        let env = Environment::create(None);
        env.bind("x", Value::Int(1));
        let held = env.lookup_slot("x").unwrap();
        env.bind("x", Value::Int(2));
        assert_eq!(*held.borrow(), Some(Value::Int(2)));
    }

    #[test]
    fn local_slots_ignore_the_parent_chain() {
        let root = Environment::create(None);
        root.bind("x", Value::Int(1));
        let child = Environment::extend(&root);
        assert!(child.lookup_local_slot("x").is_none());
        assert!(child.lookup_slot("x").is_some());
        child.bind("x", Value::Int(2));
        assert_eq!(*child.lookup_local_slot("x").unwrap().borrow(), Some(Value::Int(2)));
    }

    #[test]
    fn bind_list_checks_lengths() {
        let env = Environment::create(None);
        let names = vec!["a".to_string(), "b".to_string()];
        assert!(env.bind_list(&names, vec![Value::Int(1)]).is_err());
        env.bind_list(&names, vec![Value::Int(1), Value::Int(2)])
            .unwrap();
        assert_eq!(env.lookup("b").unwrap(), Value::Int(2));
        assert!(env.bind_local_list(&names, vec![empty_slot()]).is_err());
    }

    #[test]
    fn dotted_names_reach_module_exports() {
        let root = Environment::create(None);
        let inner = Environment::extend(&root);
        inner.bind("y", Value::Int(10));
        inner.bind("hidden", Value::Int(0));
        let module = Module {
            name: "m".into(),
            env: inner,
            exports: vec!["y".into()],
        };
        root.bind("m", Value::Module(Rc::new(module)));
        root.bind("n", Value::Int(3));

        assert_eq!(root.lookup("m.y").unwrap(), Value::Int(10));
        assert!(matches!(root.lookup("m.hidden"), Err(Error::NameNotFound(_))));
        assert!(matches!(root.lookup("n.y"), Err(Error::NotAModule(_))));
        assert!(matches!(root.lookup("q.y"), Err(Error::NameNotFound(_))));
    }
}
