use crate::ast::{self, Expr, ImportSpec, ModuleRef};
use crate::environment::Environment;
use crate::evaluator::{eval_toplevel, Context, Error, Result};
use crate::reader;
use crate::types::{Module, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const FILE_EXTENSION: &str = "mlisp";

/// Registry of defined modules plus the files already loaded from disk.
/// Every borrow is short-lived: loading a file re-enters the loader.
pub struct ModuleLoader {
    search_paths: Vec<PathBuf>,
    registry: RefCell<HashMap<String, Rc<Module>>>,
    files: RefCell<HashMap<PathBuf, Rc<Module>>>,
    loading: RefCell<Vec<PathBuf>>,
}

fn load_error(path: &Path, reason: impl ToString) -> Error {
    Error::ModuleLoadError {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

impl ModuleLoader {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        ModuleLoader {
            search_paths,
            registry: RefCell::new(HashMap::new()),
            files: RefCell::new(HashMap::new()),
            loading: RefCell::new(Vec::new()),
        }
    }

    /// Evaluates a module body beneath `env` and binds its name in `env`.
    /// Only modules defined at the top level are registered by name; one
    /// defined inside a function stays private to that call.
    pub fn define(
        &self,
        name: &str,
        exports: &[String],
        body: &[Expr],
        env: &Rc<Environment>,
        ctx: &Context,
    ) -> Result<Rc<Module>> {
        let module_env = Environment::extend(env);
        let mut current = module_env.clone();
        for expr in body {
            let (_, next) = eval_toplevel(expr, &current, ctx)?;
            current = next;
        }
        if let Some(missing) = exports.iter().find(|e| !module_env.contains_local(e)) {
            return Err(load_error(
                Path::new(name),
                format!("exported name {} is not defined", missing),
            ));
        }
        let module = Rc::new(Module {
            name: name.to_string(),
            env: module_env,
            exports: exports.to_vec(),
        });
        log::debug!("defined module {} exporting {:?}", name, exports);
        if Rc::ptr_eq(env, &ctx.root) {
            self.register(&module);
        }
        env.bind(name, Value::Module(module.clone()));
        Ok(module)
    }

    /// Finds a module by name (bound value, registry, then search path) or
    /// loads it from an explicit path.
    pub fn resolve(&self, target: &ModuleRef, env: &Rc<Environment>, ctx: &Context) -> Result<Rc<Module>> {
        let name = match target {
            ModuleRef::Path(path) => return self.load_file(&self.locate(Path::new(path)), ctx),
            ModuleRef::Name(name) => name,
        };
        match env.lookup(name) {
            Ok(Value::Module(m)) => return Ok(m),
            Ok(_) => return Err(Error::NotAModule(name.clone())),
            Err(Error::NameNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        let registered = self.registry.borrow().get(name).cloned();
        if let Some(module) = registered {
            return Ok(module);
        }
        match self.find(name) {
            Some(path) => self.load_file(&path, ctx),
            None => Err(load_error(
                Path::new(&format!("{}.{}", name, FILE_EXTENSION)),
                "not found in search path",
            )),
        }
    }

    fn register(&self, module: &Rc<Module>) {
        self.registry
            .borrow_mut()
            .insert(module.name.clone(), module.clone());
    }

    fn find(&self, name: &str) -> Option<PathBuf> {
        let file = format!("{}.{}", name, FILE_EXTENSION);
        self.search_paths
            .iter()
            .map(|dir| dir.join(&file))
            .find(|candidate| candidate.is_file())
    }

    /// Relative paths that do not exist from the working directory are tried
    /// against each search directory.
    fn locate(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        self.search_paths
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| path.to_path_buf())
    }

    pub fn load_file(&self, path: &Path, ctx: &Context) -> Result<Rc<Module>> {
        let canonical = path.canonicalize().map_err(|e| load_error(path, e))?;
        let cached = self.files.borrow().get(&canonical).cloned();
        if let Some(module) = cached {
            log::debug!("module {} already loaded from {}", module.name, canonical.display());
            return Ok(module);
        }
        if self.loading.borrow().contains(&canonical) {
            return Err(load_error(path, "circular import"));
        }

        self.loading.borrow_mut().push(canonical.clone());
        let result = self.evaluate_file(&canonical, ctx);
        self.loading.borrow_mut().retain(|p| p != &canonical);

        let module = result?;
        self.files.borrow_mut().insert(canonical, module.clone());
        Ok(module)
    }

    fn evaluate_file(&self, path: &Path, ctx: &Context) -> Result<Rc<Module>> {
        log::debug!("loading {}", path.display());
        let source = fs::read_to_string(path).map_err(|e| load_error(path, e))?;
        let forms = reader::read_all(&source).map_err(|e| load_error(path, e))?;

        let file_env = Environment::extend(&ctx.root);
        let mut current = file_env.clone();
        for form in &forms {
            let expr = ast::build(form)?;
            let (_, next) = eval_toplevel(&expr, &current, ctx)?;
            current = next;
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| load_error(path, "file name is not valid unicode"))?
            .to_string();
        // Modules defined at the top of the file count as top-level ones.
        let mut defined = None;
        for name in file_env.names() {
            if let Ok(Value::Module(m)) = file_env.lookup(&name) {
                if m.name == name {
                    self.register(&m);
                    if name == stem {
                        defined = Some(m);
                    }
                }
            }
        }
        let module = match defined {
            Some(module) => module,
            None => {
                let module = Rc::new(Module {
                    name: stem,
                    exports: file_env.names(),
                    env: file_env,
                });
                self.register(&module);
                module
            }
        };
        Ok(module)
    }

    /// Brings a module's exports into `env`: all of them, a chosen few, or
    /// the module itself under another name.
    pub fn import(&self, module: &Rc<Module>, spec: &ImportSpec, env: &Rc<Environment>) -> Result {
        match spec {
            ImportSpec::All => {
                for name in &module.exports {
                    env.bind(name.clone(), module.env.lookup(name)?);
                }
            }
            ImportSpec::Only(names) => {
                for name in names {
                    if !module.exports(name) {
                        return Err(Error::NameNotFound(format!("{}.{}", module.name, name)));
                    }
                    env.bind(name.clone(), module.env.lookup(name)?);
                }
            }
            ImportSpec::Alias(alias) => env.bind(alias.clone(), Value::Module(module.clone())),
        }
        log::debug!("imported {} ({:?})", module.name, spec);
        Ok(Value::Module(module.clone()))
    }
}
