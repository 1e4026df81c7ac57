use dashmap::DashMap;
use std::env;
use std::str::FromStr;
use std::sync::Arc;

/// Property key holding the operating system name (`linux`, `macos`, `windows`, ...).
pub const OS_NAME: &str = "os.name";
/// Property key holding the CPU architecture.
pub const OS_ARCH: &str = "os.arch";

/// Property source consulted by registration conditions and factories.
///
/// Cloning is cheap; clones share the same properties.
#[derive(Clone, Debug)]
pub struct Environment {
    properties: Arc<DashMap<String, String>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An environment holding only the platform properties.
    pub fn new() -> Self {
        let environment = Self {
            properties: Arc::new(DashMap::new()),
        };
        environment.set(OS_NAME, env::consts::OS);
        environment.set(OS_ARCH, env::consts::ARCH);
        environment
    }

    /// Platform properties plus every process environment variable.
    pub fn from_env() -> Self {
        let environment = Self::new();
        for (key, value) in env::vars() {
            environment.set(&key, &value);
        }
        environment
    }

    /// Builder-style override, mostly useful in tests.
    pub fn with(self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.properties.get(key).map(|v| v.clone())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a property, returning `None` when it is absent or malformed.
    pub fn get_as<T: FromStr>(&self, key: &str) -> Option<T> {
        self.properties.get(key).and_then(|v| v.parse().ok())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.properties.insert(key.to_string(), value.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
