//! Localizable server messages for linechat.
//!
//! Messages live in TOML tables that are flattened into dot-separated keys.
//! Placeholders are written as `{{name}}`.
//!
//! ```
//! use linechat::i18n::I18n;
//!
//! let i18n = I18n::builtin("ru").unwrap();
//! assert_eq!(i18n.greeting("alice"), "Привет, alice!");
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::LocaleConfig;

/// Default locale.
pub const DEFAULT_LOCALE: &str = "ru";

/// Locales compiled into the binary.
pub const BUILTIN_LOCALES: &[&str] = &["ru", "en"];

/// Key of the greeting sent after a successful login.
pub const GREETING_KEY: &str = "session.greeting";

/// Key of the rejection sent when a login is already taken.
pub const LOGIN_TAKEN_KEY: &str = "session.login_taken";

const RU_MESSAGES: &str = r#"
[session]
greeting = "Привет, {{login}}!"
login_taken = "Логин {{login}} занят, попробуйте другой!"
"#;

const EN_MESSAGES: &str = r#"
[session]
greeting = "Hello, {{login}}!"
login_taken = "Login {{login}} occupied, try another!"
"#;

/// I18n-related errors.
#[derive(Error, Debug)]
pub enum I18nError {
    /// Failed to read locale file.
    #[error("failed to read locale file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse locale file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Locale not found.
    #[error("locale not found: {0}")]
    LocaleNotFound(String),
}

/// Result type for i18n operations.
pub type Result<T> = std::result::Result<T, I18nError>;

/// A message catalogue for one locale.
#[derive(Debug, Clone)]
pub struct I18n {
    locale: String,
    messages: HashMap<String, String>,
}

impl I18n {
    /// Get a catalogue compiled into the binary.
    pub fn builtin(locale: &str) -> Result<Self> {
        let content = match locale {
            "ru" => RU_MESSAGES,
            "en" => EN_MESSAGES,
            other => return Err(I18nError::LocaleNotFound(other.to_string())),
        };
        Self::from_str(locale, content)
    }

    /// Load `<locale>.toml` from `locales_dir`.
    ///
    /// Keys missing from the file fall back to the built-in catalogue of the
    /// same locale, when there is one.
    pub fn load<P: AsRef<Path>>(locale: &str, locales_dir: P) -> Result<Self> {
        let path = locales_dir.as_ref().join(format!("{locale}.toml"));

        if !path.exists() {
            return Err(I18nError::LocaleNotFound(locale.to_string()));
        }

        let content = fs::read_to_string(&path)?;
        let loaded = Self::from_str(locale, &content)?;

        match Self::builtin(locale) {
            Ok(mut base) => {
                base.merge(&loaded);
                Ok(base)
            }
            Err(_) => Ok(loaded),
        }
    }

    /// Build the catalogue selected by the locale configuration.
    pub fn from_config(config: &LocaleConfig) -> Result<Self> {
        match &config.path {
            Some(dir) => Self::load(&config.language, dir),
            None => Self::builtin(&config.language),
        }
    }

    /// Create a catalogue from a TOML string.
    pub fn from_str(locale: &str, content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content)?;

        let mut messages = HashMap::new();
        flatten_toml("", &toml::Value::Table(table), &mut messages);

        Ok(Self {
            locale: locale.to_string(),
            messages,
        })
    }

    /// Get the locale code.
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Translate a key. Unknown keys translate to themselves.
    pub fn t<'a>(&'a self, key: &'a str) -> &'a str {
        self.messages.get(key).map(|s| s.as_str()).unwrap_or(key)
    }

    /// Translate a key and substitute `{{name}}` placeholders.
    pub fn t_with(&self, key: &str, params: &[(&str, &str)]) -> String {
        let mut result = self.t(key).to_string();

        for (name, value) in params {
            let placeholder = format!("{{{{{name}}}}}");
            result = result.replace(&placeholder, value);
        }

        result
    }

    /// Check if a translation key exists.
    pub fn has_key(&self, key: &str) -> bool {
        self.messages.contains_key(key)
    }

    /// Merge another catalogue into this one, overriding existing keys.
    pub fn merge(&mut self, other: &I18n) {
        for (key, value) in &other.messages {
            self.messages.insert(key.clone(), value.clone());
        }
    }

    /// Greeting for a freshly logged-in client.
    pub fn greeting(&self, login: &str) -> String {
        self.t_with(GREETING_KEY, &[("login", login)])
    }

    /// Rejection for a login that is already in use.
    pub fn login_taken(&self, login: &str) -> String {
        self.t_with(LOGIN_TAKEN_KEY, &[("login", login)])
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::from_str(DEFAULT_LOCALE, RU_MESSAGES).unwrap_or_else(|_| Self {
            locale: DEFAULT_LOCALE.to_string(),
            messages: HashMap::new(),
        })
    }
}

/// Flatten a TOML value into a HashMap with dot-separated keys.
fn flatten_toml(prefix: &str, value: &toml::Value, map: &mut HashMap<String, String>) {
    match value {
        toml::Value::Table(table) => {
            for (key, val) in table {
                let new_prefix = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_toml(&new_prefix, val, map);
            }
        }
        toml::Value::String(s) => {
            map.insert(prefix.to_string(), s.clone());
        }
        toml::Value::Integer(i) => {
            map.insert(prefix.to_string(), i.to_string());
        }
        toml::Value::Float(f) => {
            map.insert(prefix.to_string(), f.to_string());
        }
        toml::Value::Boolean(b) => {
            map.insert(prefix.to_string(), b.to_string());
        }
        toml::Value::Array(_) => {}
        toml::Value::Datetime(dt) => {
            map.insert(prefix.to_string(), dt.to_string());
        }
    }
}
