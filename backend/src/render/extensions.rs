//! Domain functions available to templates, both as filters and globals.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use minijinja::value::{from_args, Kwargs, Object, ObjectRepr};
use minijinja::{Environment, Error, ErrorKind, State, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use unicode_normalization::UnicodeNormalization;

use crate::api::logs::{log_info, log_warning};
use crate::cache::{ContentCache, ContentKey};
use crate::render::hierarchy::{groups_with_articles, HierarchyColumns};

/// Row separator understood by the spreadsheet fan-out.
pub const ROW_SEPARATOR: &str = "##";

/// Memo cache shared by the hierarchy resolver.
pub type HierarchyCache = Arc<ContentCache<Vec<serde_json::Value>>>;

/// Decompose and drop everything outside ASCII (`"Crème brûlée"` → `"Creme brulee"`).
pub fn remove_accents(input: &str) -> String {
    input.nfkd().filter(char::is_ascii).collect()
}

/// Strip the leading run of characters found in `symbol`.
pub fn remove_leading_symbol<'a>(input: &'a str, symbol: &str) -> &'a str {
    input.trim_start_matches(|c| symbol.contains(c))
}

/// Drop records whose `Status` is `Inactive`.
pub fn remove_inactive_products(records: &[serde_json::Value]) -> Vec<serde_json::Value> {
    records
        .iter()
        .filter(|r| r.get("Status").and_then(|s| s.as_str()) != Some("Inactive"))
        .cloned()
        .collect()
}

/// Why a status probe produced no status code.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("request timed out")]
    Timeout,
    #[error("host unreachable: {0}")]
    Unreachable(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// GET `url` and return its status code.
pub fn probe_status(url: &str, timeout: Duration) -> Result<u16, ProbeError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ProbeError::InvalidUrl(e.to_string()))?;
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProbeError::Unreachable(e.to_string()))?;

    match client.get(parsed).send() {
        Ok(response) => Ok(response.status().as_u16()),
        Err(e) if e.is_timeout() => Err(ProbeError::Timeout),
        Err(e) if e.is_builder() => Err(ProbeError::InvalidUrl(e.to_string())),
        Err(e) => Err(ProbeError::Unreachable(e.to_string())),
    }
}

/// Date or timestamp exposed to templates, Python `date`/`datetime` style.
#[derive(Debug, Clone)]
pub struct DateValue {
    value: NaiveDateTime,
    with_time: bool,
}

impl DateValue {
    pub fn now() -> Self {
        Self {
            value: Local::now().naive_local(),
            with_time: true,
        }
    }

    pub fn date(year: i32, month: u32, day: u32) -> Option<Self> {
        let value = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
        Some(Self {
            value,
            with_time: false,
        })
    }

    /// Format with strftime directives, rejecting invalid ones.
    pub fn strftime(&self, format: &str) -> Result<String, Error> {
        let mut out = String::new();
        write!(out, "{}", self.value.format(format)).map_err(|_| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("invalid strftime format '{}'", format),
            )
        })?;
        Ok(out)
    }

    pub fn isoformat(&self) -> String {
        if self.with_time {
            self.value.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
        } else {
            self.value.format("%Y-%m-%d").to_string()
        }
    }
}

impl Object for DateValue {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let v = &self.value;
        let field = match key.as_str()? {
            "year" => v.year() as i64,
            "month" => v.month() as i64,
            "day" => v.day() as i64,
            "hour" if self.with_time => v.hour() as i64,
            "minute" if self.with_time => v.minute() as i64,
            "second" if self.with_time => v.second() as i64,
            "microsecond" if self.with_time => (v.nanosecond() / 1_000) as i64,
            _ => return None,
        };
        Some(Value::from(field))
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "strftime" => {
                let (format,): (&str,) = from_args(args)?;
                Ok(Value::from(self.strftime(format)?))
            }
            "isoformat" => {
                from_args::<()>(args)?;
                Ok(Value::from(self.isoformat()))
            }
            "weekday" => {
                from_args::<()>(args)?;
                Ok(Value::from(self.value.weekday().num_days_from_monday()))
            }
            "isoweekday" => {
                from_args::<()>(args)?;
                Ok(Value::from(self.value.weekday().number_from_monday()))
            }
            "date" => {
                from_args::<()>(args)?;
                Ok(Value::from_object(DateValue {
                    value: self.value.date().and_time(chrono::NaiveTime::MIN),
                    with_time: false,
                }))
            }
            _ => Err(Error::from(ErrorKind::UnknownMethod)),
        }
    }

    fn render(self: &Arc<Self>, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    where
        Self: Sized + 'static,
    {
        if self.with_time {
            write!(f, "{}", self.value.format("%Y-%m-%d %H:%M:%S%.6f"))
        } else {
            write!(f, "{}", self.value.format("%Y-%m-%d"))
        }
    }
}

fn text_of(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None if value.is_undefined() || value.is_none() => String::new(),
        None => value.to_string(),
    }
}

fn to_json(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|e| {
        Error::new(ErrorKind::InvalidOperation, "value is not serializable").with_source(e)
    })
}

/// Register every domain function as filter and global.
pub fn register(env: &mut Environment<'static>, http_timeout: Duration, cache: Option<HierarchyCache>) {
    env.add_global("split", ROW_SEPARATOR);

    let accents = |value: Value| remove_accents(&text_of(&value));
    env.add_filter("remove_accents", accents);
    env.add_function("remove_accents", accents);

    let leading = |value: Value, symbol: Value| {
        remove_leading_symbol(&text_of(&value), &text_of(&symbol)).to_string()
    };
    env.add_filter("remove_leading_symbol", leading);
    env.add_function("remove_leading_symbol", leading);

    let now = || Value::from_object(DateValue::now());
    env.add_filter("current_datetime", move |_: Value| now());
    env.add_function("current_datetime", now);

    let date = |year: i32, month: u32, day: u32| -> Result<Value, Error> {
        DateValue::date(year, month, day)
            .map(Value::from_object)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("invalid date {:04}-{:02}-{:02}", year, month, day),
                )
            })
    };
    env.add_filter("custom_date", date);
    env.add_function("custom_date", date);

    let log = |message: Value, alert: Option<bool>, kwargs: Kwargs| -> Result<String, Error> {
        let alert = match alert {
            Some(alert) => alert,
            None => kwargs.get::<Option<bool>>("alert")?.unwrap_or(false),
        };
        kwargs.assert_all_used()?;
        if alert {
            log_warning(text_of(&message));
        } else {
            log_info(text_of(&message));
        }
        Ok(String::new())
    };
    env.add_filter("log", log);
    env.add_function("log", log);

    let status = move |url: Value| -> Value {
        match probe_status(&text_of(&url), http_timeout) {
            Ok(code) => Value::from(code),
            Err(e) => {
                log_warning(format!("get_status_code({}): {}", text_of(&url), e));
                Value::from(())
            }
        }
    };
    env.add_filter("get_status_code", status);
    env.add_function("get_status_code", status);

    let inactive_cache = cache.clone();
    let inactive = move |records: Value| -> Result<Value, Error> {
        let records = to_json(&records)?;
        let Some(items) = records.as_array() else {
            return Ok(Value::from_serialize(&records));
        };
        let kept = match &inactive_cache {
            Some(cache) => {
                let key = ContentKey::builder()
                    .part("remove_inactive_products")
                    .json(&records)
                    .finish();
                cache.get_or_insert_with(key, || Ok::<_, Error>(remove_inactive_products(items)))?
            }
            None => remove_inactive_products(items),
        };
        Ok(Value::from_serialize(&kept))
    };
    env.add_filter("remove_inactive_products", inactive.clone());
    env.add_function("remove_inactive_products", inactive);

    let hierarchy = move |articles: Value,
                          groups: Value,
                          delimiter: Option<String>,
                          kwargs: Kwargs|
          -> Result<Value, Error> {
        let delimiter = match delimiter {
            Some(d) => d,
            None => kwargs.get::<Option<String>>("delimiter")?.unwrap_or_else(|| ",".to_string()),
        };
        let defaults = HierarchyColumns::default();
        let columns = HierarchyColumns {
            structure: kwargs
                .get::<Option<String>>("CATALOG_STRUCTURE")?
                .unwrap_or(defaults.structure),
            group_id: kwargs.get::<Option<String>>("GROUP_ID")?.unwrap_or(defaults.group_id),
            parent_id: kwargs.get::<Option<String>>("PARENT_ID")?.unwrap_or(defaults.parent_id),
            catalog_group_id: kwargs
                .get::<Option<String>>("CATALOG_GROUP_ID")?
                .unwrap_or(defaults.catalog_group_id),
        };
        kwargs.assert_all_used()?;

        let articles = to_json(&articles)?;
        let groups = to_json(&groups)?;
        let resolve = || {
            groups_with_articles(&articles, &groups, &delimiter, &columns)
                .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
        };
        let ids = match &cache {
            Some(cache) => {
                let key = ContentKey::builder()
                    .part("get_groups_with_articles")
                    .json(&articles)
                    .json(&groups)
                    .part(&delimiter)
                    .json(&columns)
                    .finish();
                cache.get_or_insert_with(key, resolve)?
            }
            None => resolve()?,
        };
        Ok(Value::from_serialize(&ids))
    };
    env.add_filter("get_groups_with_articles", hierarchy.clone());
    env.add_function("get_groups_with_articles", hierarchy);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::hierarchy::tests::{fixture_articles, fixture_groups};
    use minijinja::context;
    use std::num::NonZeroUsize;

    fn env() -> Environment<'static> {
        let mut env = Environment::new();
        register(&mut env, Duration::from_secs(2), None);
        env
    }

    #[test]
    fn test_remove_accents_is_ascii_and_idempotent() {
        let once = remove_accents("Crème brûlée, naïve façade, Ærøskøbing");
        assert!(once.is_ascii());
        assert_eq!(once, remove_accents(&once));
        assert!(once.starts_with("Creme brulee, naive facade"));
    }

    #[test]
    fn test_remove_leading_symbol() {
        assert_eq!(remove_leading_symbol("000123", "0"), "123");
        assert_eq!(remove_leading_symbol("#-#abc#", "#-"), "abc#");
        assert_eq!(remove_leading_symbol("abc", ""), "abc");
        assert_eq!(remove_leading_symbol("000", "0"), "");
        assert_eq!(remove_leading_symbol("", "0"), "");
        assert_eq!(remove_leading_symbol("", ""), "");
    }

    #[test]
    fn test_filters_and_globals_in_templates() {
        let env = env();
        let out = env
            .render_str(
                "{{ 'Éclair'|remove_accents }}|{{ remove_leading_symbol('--x', '-') }}|{{ split }}",
                (),
            )
            .unwrap();
        assert_eq!(out, "Eclair|x|##");
    }

    #[test]
    fn test_custom_date() {
        let env = env();
        let out = env
            .render_str(
                "{{ custom_date(2024, 2, 29).strftime('%d/%m/%Y') }} {{ custom_date(2024, 2, 29) }} {{ custom_date(2024, 2, 29).year }}",
                (),
            )
            .unwrap();
        assert_eq!(out, "29/02/2024 2024-02-29 2024");
        assert!(env.render_str("{{ custom_date(2023, 2, 29) }}", ()).is_err());
    }

    #[test]
    fn test_current_datetime_year() {
        let env = env();
        let out = env.render_str("{{ current_datetime().year }}", ()).unwrap();
        assert_eq!(out, Local::now().year().to_string());
    }

    #[test]
    fn test_log_returns_empty_string() {
        let env = env();
        let out = env
            .render_str("a{{ log('hello') }}b{{ log('careful', alert=true) }}c", ())
            .unwrap();
        assert_eq!(out, "abc");
    }

    #[test]
    fn test_get_status_code() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/ok").with_status(204).create();
        let env = env();

        let out = env
            .render_str("{{ get_status_code(url) }}", context! { url => format!("{}/ok", server.url()) })
            .unwrap();
        assert_eq!(out, "204");

        let out = env
            .render_str("{{ get_status_code('not a url') is none }}", ())
            .unwrap();
        assert_eq!(out, "true");
    }

    #[test]
    fn test_probe_error_kinds() {
        assert!(matches!(
            probe_status("::nope::", Duration::from_secs(1)),
            Err(ProbeError::InvalidUrl(_))
        ));
        assert!(matches!(
            probe_status("http://127.0.0.1:1/", Duration::from_secs(2)),
            Err(ProbeError::Unreachable(_))
        ));
    }

    #[test]
    fn test_groups_with_articles_in_template() {
        let env = env();
        let out = env
            .render_str(
                "{% set ids = get_groups_with_articles(articles, groups) %}{{ '201201' in ids }} {{ '204' in ids }} {{ ids|length }}",
                context! { articles => fixture_articles(), groups => fixture_groups() },
            )
            .unwrap();
        assert_eq!(out, "true false 11");
    }

    #[test]
    fn test_groups_with_articles_rejects_unknown_kwargs() {
        let env = env();
        let result = env.render_str(
            "{{ get_groups_with_articles(a, g, COLOR='x') }}",
            context! { a => fixture_articles(), g => fixture_groups() },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_hierarchy_results_are_memoized() {
        let cache: HierarchyCache = ContentCache::shared(NonZeroUsize::new(8).unwrap());
        let mut env = Environment::new();
        register(&mut env, Duration::from_secs(2), Some(cache.clone()));

        let ctx = context! { articles => fixture_articles(), groups => fixture_groups() };
        let first = env
            .render_str("{{ get_groups_with_articles(articles, groups)|length }}", ctx.clone())
            .unwrap();
        let second = env
            .render_str("{{ get_groups_with_articles(articles, groups)|length }}", ctx)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_inactive_products() {
        let env = env();
        let out = env
            .render_str(
                "{% for p in products|remove_inactive_products %}{{ p.SKU }}{% endfor %}",
                context! { products => serde_json::json!([
                    {"SKU": "a", "Status": "Active"},
                    {"SKU": "b", "Status": "Inactive"},
                    {"SKU": "c"},
                ]) },
            )
            .unwrap();
        assert_eq!(out, "ac");
    }
}
