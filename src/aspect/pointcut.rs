use crate::di::Definition;
use regex::Regex;
use std::fmt;

/// Selects which objects a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetMatcher {
    /// Exactly one definition, by identifier.
    Id(String),
    /// Definitions whose type name matches a glob (`*` and `?`).
    ///
    /// The glob is tried against the full path (`app::service::OrderService`)
    /// and the bare name (`OrderService`).
    TypeName(String),
}

/// Where advice applies: which objects, and which of their operations.
///
/// # Example
/// ```
/// use beanstack::aspect::Pointcut;
///
/// let pointcut = Pointcut::type_name("*Service").operations("save*");
/// assert_eq!(pointcut.to_string(), "type(*Service).save*");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointcut {
    target: TargetMatcher,
    operations: String,
}

impl Pointcut {
    pub fn bean(id: impl Into<String>) -> Self {
        Self {
            target: TargetMatcher::Id(id.into()),
            operations: "*".to_string(),
        }
    }

    pub fn type_name(glob: impl Into<String>) -> Self {
        Self {
            target: TargetMatcher::TypeName(glob.into()),
            operations: "*".to_string(),
        }
    }

    /// Restrict to operations whose name matches `glob`. Defaults to `*`.
    pub fn operations(mut self, glob: impl Into<String>) -> Self {
        self.operations = glob.into();
        self
    }

    pub fn target(&self) -> &TargetMatcher {
        &self.target
    }

    pub fn operation_glob(&self) -> &str {
        &self.operations
    }

    pub(crate) fn compile(&self) -> Result<CompiledPointcut, regex::Error> {
        let target = match &self.target {
            TargetMatcher::Id(id) => CompiledTarget::Id(id.clone()),
            TargetMatcher::TypeName(glob) => CompiledTarget::TypeName(glob_to_regex(glob)?),
        };
        Ok(CompiledPointcut {
            target,
            operations: glob_to_regex(&self.operations)?,
        })
    }
}

impl fmt::Display for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            TargetMatcher::Id(id) => write!(f, "bean({}).{}", id, self.operations),
            TargetMatcher::TypeName(glob) => write!(f, "type({}).{}", glob, self.operations),
        }
    }
}

#[derive(Debug, Clone)]
enum CompiledTarget {
    Id(String),
    TypeName(Regex),
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledPointcut {
    target: CompiledTarget,
    operations: Regex,
}

impl CompiledPointcut {
    pub(crate) fn matches_target(&self, definition: &Definition) -> bool {
        match &self.target {
            CompiledTarget::Id(id) => definition.id() == id,
            CompiledTarget::TypeName(regex) => {
                let full = definition.type_name();
                let short = full.rsplit("::").next().unwrap_or(full);
                regex.is_match(full) || regex.is_match(short)
            }
        }
    }

    pub(crate) fn matches_operation(&self, operation: &str) -> bool {
        self.operations.is_match(operation)
    }
}

/// Convert a glob to an anchored regex: `*` is any run, `?` any one char.
fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    let mut literal = String::new();
    for c in glob.chars() {
        match c {
            '*' | '?' => {
                pattern.push_str(&regex::escape(&literal));
                literal.clear();
                pattern.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    pattern.push_str(&regex::escape(&literal));
    pattern.push('$');
    Regex::new(&pattern)
}
