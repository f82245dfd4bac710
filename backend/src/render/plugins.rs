//! Plugin interface for extra template functions.
//!
//! Plugins are collected in a [`PluginRegistry`] once at startup and applied
//! to every environment built afterwards. A plugin that fails to register is
//! logged and skipped; the others still load.
//!
//! Besides compiled-in plugins, a directory of `*.jinja` / `*.j2` files can be
//! scanned: each file becomes a function (and filter) named after its stem.
//! Call arguments are exposed to the file as `args`, so a filter's input is
//! `args[0]`:
//!
//! ```jinja
//! {# plugins/sku.j2 #}
//! {{ args[0]|upper }}-{{ args[1]|default('X') }}
//! ```

use minijinja::value::Rest;
use minijinja::{context, Environment, Error, State, Value};
use std::path::Path;

use crate::api::logs::{log_info, log_warning};

/// Something that adds functions, filters or globals to an environment.
pub trait TemplatePlugin: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, env: &mut Environment<'static>) -> Result<(), Error>;
}

/// Plugins applied to every rendering environment.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn TemplatePlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: impl TemplatePlugin + 'static) {
        self.plugins.push(Box::new(plugin));
    }

    /// Registry holding one [`TemplateFunctionPlugin`] per template file in `dir`.
    ///
    /// Files are read once, here. Unreadable files are skipped with a warning.
    pub fn from_dir(dir: &Path) -> std::io::Result<Self> {
        let mut registry = Self::new();
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case("jinja") || e.eq_ignore_ascii_case("j2"))
            })
            .collect();
        entries.sort();

        for path in entries {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(source) => registry.register(TemplateFunctionPlugin::new(name, source)),
                Err(e) => log_warning(format!("Plugin '{}' skipped: {}", path.display(), e)),
            }
        }
        Ok(registry)
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Register every plugin, returns how many succeeded.
    pub fn apply(&self, env: &mut Environment<'static>) -> usize {
        let mut loaded = 0;
        for plugin in &self.plugins {
            match plugin.register(env) {
                Ok(()) => loaded += 1,
                Err(e) => log_warning(format!("Plugin '{}' failed to load: {}", plugin.name(), e)),
            }
        }
        if loaded > 0 {
            log_info(format!("{} template plugin(s) loaded", loaded));
        }
        loaded
    }
}

/// A template file exposed as a function and a filter.
pub struct TemplateFunctionPlugin {
    name: String,
    source: String,
}

impl TemplateFunctionPlugin {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    fn template_name(&self) -> String {
        format!("plugins/{}", self.name)
    }
}

impl TemplatePlugin for TemplateFunctionPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, env: &mut Environment<'static>) -> Result<(), Error> {
        let template_name = self.template_name();
        env.add_template_owned(template_name.clone(), self.source.clone())?;

        let call = move |state: &State, args: Rest<Value>| -> Result<Value, Error> {
            let rendered = state
                .env()
                .get_template(&template_name)?
                .render(context! { args => args.0 })?;
            Ok(Value::from_safe_string(rendered))
        };
        env.add_function(self.name.clone(), call.clone());
        env.add_filter(self.name.clone(), call);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Greeting;

    impl TemplatePlugin for Greeting {
        fn name(&self) -> &str {
            "greeting"
        }

        fn register(&self, env: &mut Environment<'static>) -> Result<(), Error> {
            env.add_function("greet", |who: String| format!("Hello {}", who));
            Ok(())
        }
    }

    #[test]
    fn test_compiled_plugin() {
        let mut registry = PluginRegistry::new();
        registry.register(Greeting);
        let mut env = Environment::new();

        assert_eq!(registry.apply(&mut env), 1);
        assert_eq!(env.render_str("{{ greet('you') }}", ()).unwrap(), "Hello you");
    }

    #[test]
    fn test_directory_plugins_and_broken_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("sku.j2"), "{{ args[0]|upper }}-{{ args[1] }}").unwrap();
        std::fs::write(dir.path().join("broken.jinja"), "{% if %}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = PluginRegistry::from_dir(dir.path()).unwrap();
        assert_eq!(registry.names(), vec!["broken", "sku"]);

        let mut env = Environment::new();
        assert_eq!(registry.apply(&mut env), 1);

        let out = env
            .render_str("{{ sku('ab', 7) }} {{ 'cd'|sku(8) }}", ())
            .unwrap();
        assert_eq!(out, "AB-7 CD-8");
    }
}
