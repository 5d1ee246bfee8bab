//! Scoped variable storage for pipeline execution
//!
//! Each running pipeline gets its own [`Environment`]. Reads fall back to the
//! enclosing pipeline's environment; writes always land in the local scope,
//! shadowing any ancestor binding for this pipeline and its descendants.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::RuntimeError;
use crate::parser::Pipeline;

/// Exit code of the most recent STEP in this scope.
pub const LAST_RC: &str = "LAST_RC";

/// Names that pipeline files cannot assign.
pub const RESERVED_VARIABLES: [&str; 4] = [LAST_RC, "name", "helper_image", "start_command"];

static VARIABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$[A-Za-z_][A-Za-z0-9_]*").expect("variable reference pattern is valid")
});

/// Variables visible to one pipeline frame
#[derive(Debug, Default)]
pub struct Environment<'p> {
    /// Values assigned in this scope, including `LAST_RC`
    variables: HashMap<String, String>,
    /// The pipeline's declared parameters, read-only
    properties: Vec<(&'static str, String)>,
    parent: Option<&'p Environment<'p>>,
}

impl<'p> Environment<'p> {
    /// Create an empty scope with no parent
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the scope for `pipeline`, exposing its declared parameters
    pub fn for_pipeline(pipeline: &Pipeline, parent: Option<&'p Environment<'p>>) -> Self {
        let mut properties = vec![("name", pipeline.name.clone())];
        if let Some(image) = &pipeline.helper_image {
            properties.push(("helper_image", image.clone()));
        }
        if let Some(command) = &pipeline.start_command {
            properties.push(("start_command", command.clone()));
        }

        Self {
            variables: HashMap::new(),
            properties,
            parent,
        }
    }

    /// Resolve a variable in this scope or any ancestor
    pub fn get(&self, name: &str) -> Result<&str, RuntimeError> {
        self.lookup(name)
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))
    }

    /// Like [`get`](Self::get), without the error
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.local(name)
            .or_else(|| self.parent.and_then(|parent| parent.lookup(name)))
    }

    /// Resolve a variable in this scope only
    pub fn local(&self, name: &str) -> Option<&str> {
        self.property(name)
            .or_else(|| self.variables.get(name).map(String::as_str))
    }

    fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Bind a variable in this scope
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), RuntimeError> {
        let name = name.into();
        if self.properties.iter().any(|(key, _)| *key == name) {
            return Err(RuntimeError::ReadOnlyVariable(name));
        }
        self.variables.insert(name, value.into());
        Ok(())
    }

    /// Overwrite this scope's `LAST_RC`
    pub fn record_exit_code(&mut self, code: i32) {
        self.variables.insert(LAST_RC.to_string(), code.to_string());
    }

    /// Replace every `$identifier` in `text` with its value.
    ///
    /// Identifiers are matched greedily (`$arch_x` reads `arch_x`). A `$` that
    /// does not start an identifier is kept as-is; an identifier that is not
    /// defined anywhere in scope is an error.
    pub fn interpolate(&self, text: &str) -> Result<String, RuntimeError> {
        let mut output = String::with_capacity(text.len());
        let mut last = 0;

        for reference in VARIABLE_REFERENCE.find_iter(text) {
            output.push_str(&text[last..reference.start()]);
            output.push_str(self.get(&reference.as_str()[1..])?);
            last = reference.end();
        }
        output.push_str(&text[last..]);

        Ok(output)
    }

    /// Every visible binding, nearest scope winning
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut all = self
            .parent
            .map(|parent| parent.flatten())
            .unwrap_or_default();

        for (key, value) in &self.variables {
            all.insert(key.clone(), value.clone());
        }
        for (key, value) in &self.properties {
            all.insert((*key).to_string(), value.clone());
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(name: &str, image: Option<&str>) -> Pipeline {
        Pipeline {
            name: name.to_string(),
            helper_image: image.map(str::to_string),
            start_command: None,
            statements: Vec::new(),
            line: 1,
        }
    }

    #[test]
    fn test_interpolate_replaces_references() {
        let mut env = Environment::new();
        env.set("arch", "armv7").unwrap();
        assert_eq!(env.interpolate("$arch is armv7").unwrap(), "armv7 is armv7");
    }

    #[test]
    fn test_interpolate_keeps_lone_dollar() {
        let env = Environment::new();
        assert_eq!(env.interpolate("costs $5 or $ more").unwrap(), "costs $5 or $ more");
    }

    #[test]
    fn test_interpolate_undefined_is_error() {
        let env = Environment::new();
        let err = env.interpolate("hello $nobody").unwrap_err();
        assert!(matches!(err, RuntimeError::UndefinedVariable(name) if name == "nobody"));
    }

    #[test]
    fn test_interpolate_greedy_identifier() {
        let mut env = Environment::new();
        env.set("a", "short").unwrap();
        env.set("a_b", "long").unwrap();
        assert_eq!(env.interpolate("$a_b/$a").unwrap(), "long/short");
    }

    #[test]
    fn test_parent_fallback_and_shadowing() {
        let mut root = Environment::for_pipeline(&pipeline("root", Some("img")), None);
        root.set("arch", "x86").unwrap();
        root.set("os", "linux").unwrap();

        let mut child = Environment::for_pipeline(&pipeline("child", None), Some(&root));
        assert_eq!(child.get("arch").unwrap(), "x86");

        child.set("arch", "armv7").unwrap();
        assert_eq!(child.get("arch").unwrap(), "armv7");
        assert_eq!(child.get("os").unwrap(), "linux");

        {
            let grandchild = Environment::for_pipeline(&pipeline("gc", None), Some(&child));
            assert_eq!(grandchild.get("arch").unwrap(), "armv7");
        }

        assert_eq!(root.get("arch").unwrap(), "x86");
    }

    #[test]
    fn test_properties_are_read_only() {
        let mut env = Environment::for_pipeline(&pipeline("build", Some("alpine")), None);
        assert_eq!(env.get("name").unwrap(), "build");
        assert_eq!(env.get("helper_image").unwrap(), "alpine");
        assert!(env.lookup("start_command").is_none());
        assert!(matches!(
            env.set("name", "other"),
            Err(RuntimeError::ReadOnlyVariable(_))
        ));
    }

    #[test]
    fn test_nested_properties_fall_back_to_ancestor() {
        let root = Environment::for_pipeline(&pipeline("root", Some("img")), None);
        let child = Environment::for_pipeline(&pipeline("child", None), Some(&root));
        assert_eq!(child.get("name").unwrap(), "child");
        assert_eq!(child.get("helper_image").unwrap(), "img");
    }

    #[test]
    fn test_last_rc_is_scope_local() {
        let mut root = Environment::new();
        root.record_exit_code(0);

        let mut child = Environment::new();
        child.parent = Some(&root);
        assert_eq!(child.get(LAST_RC).unwrap(), "0");

        child.record_exit_code(3);
        assert_eq!(child.get(LAST_RC).unwrap(), "3");
        assert_eq!(root.get(LAST_RC).unwrap(), "0");
    }

    #[test]
    fn test_flatten_nearest_wins() {
        let mut root = Environment::for_pipeline(&pipeline("root", Some("img")), None);
        root.set("a", "1").unwrap();
        root.set("b", "2").unwrap();
        let mut child = Environment::for_pipeline(&pipeline("child", None), Some(&root));
        child.set("b", "3").unwrap();

        let vars = child.flatten();
        assert_eq!(vars.get("a").map(String::as_str), Some("1"));
        assert_eq!(vars.get("b").map(String::as_str), Some("3"));
        assert_eq!(vars.get("name").map(String::as_str), Some("child"));
        assert_eq!(vars.get("helper_image").map(String::as_str), Some("img"));
    }
}
