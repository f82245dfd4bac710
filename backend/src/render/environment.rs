//! Rendering environment construction.

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use std::sync::Arc;
use std::time::Duration;

use super::extensions::{self, HierarchyCache};
use super::plugins::PluginRegistry;
use crate::models::extension_of;

/// Everything an environment is built from. No global state is consulted.
#[derive(Clone)]
pub struct EnvironmentConfig {
    /// Fail on undefined variables instead of rendering them empty.
    pub strict_undefined: bool,
    /// Timeout for `get_status_code`.
    pub http_timeout: Duration,
    /// Memo cache for expensive domain functions.
    pub hierarchy_cache: Option<HierarchyCache>,
    pub plugins: Arc<PluginRegistry>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            strict_undefined: false,
            http_timeout: Duration::from_secs(10),
            hierarchy_cache: None,
            plugins: Arc::new(PluginRegistry::new()),
        }
    }
}

/// HTML/XML escaping for markup outputs, none for everything else.
pub fn auto_escape_for(name: &str) -> AutoEscape {
    match extension_of(name).as_str() {
        "html" | "htm" | "xml" => AutoEscape::Html,
        _ => AutoEscape::None,
    }
}

/// Build an environment with the domain functions and plugins registered.
pub fn build_environment(config: &EnvironmentConfig) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(false);
    env.set_undefined_behavior(if config.strict_undefined {
        UndefinedBehavior::Strict
    } else {
        UndefinedBehavior::Lenient
    });
    env.set_auto_escape_callback(auto_escape_for);
    env.set_unknown_method_callback(minijinja_contrib::pycompat::unknown_method_callback);
    minijinja_contrib::add_to_environment(&mut env);

    extensions::register(&mut env, config.http_timeout, config.hierarchy_cache.clone());
    config.plugins.apply(&mut env);
    env
}
