//! template::funcs
//!
//! Built-in template functions.

use chrono::format::{Item, StrftimeItems};
use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use super::{TemplateError, Value};

const FUNCTIONS: &[&str] = &[
    "printf",
    "truncate",
    "truncate_sha256",
    "sha256",
    "uppercase",
    "lowercase",
    "replace",
    "random",
    "unix_time",
    "unix_time_millis",
    "timestamp",
    "uuid",
];

/// Check whether a function name is known.
pub(crate) fn exists(name: &str) -> bool {
    FUNCTIONS.contains(&name)
}

/// Invoke a function with already-evaluated arguments.
pub(crate) fn call(name: &str, args: Vec<Value>) -> Result<Value, TemplateError> {
    match name {
        "printf" => {
            let (format, rest) = args
                .split_first()
                .ok_or_else(|| arity(name, "at least 1", 0))?;
            printf(format.as_str(name)?, rest).map(Value::Str)
        }
        "truncate" => {
            let [max, s] = exact::<2>(name, args)?;
            let max = non_negative(name, max.as_int(name)?)?;
            if max == 0 {
                return Err(TemplateError::Render(
                    "truncate: max length must be greater than 0".into(),
                ));
            }
            Ok(Value::Str(truncate(&s.to_string(), max)))
        }
        "truncate_sha256" => {
            let [max, s] = exact::<2>(name, args)?;
            let max = non_negative(name, max.as_int(name)?)?;
            truncate_sha256(&s.to_string(), max).map(Value::Str)
        }
        "sha256" => {
            let [s] = exact::<1>(name, args)?;
            Ok(Value::Str(sha256_hex(&s.to_string())))
        }
        "uppercase" => {
            let [s] = exact::<1>(name, args)?;
            Ok(Value::Str(s.to_string().to_uppercase()))
        }
        "lowercase" => {
            let [s] = exact::<1>(name, args)?;
            Ok(Value::Str(s.to_string().to_lowercase()))
        }
        "replace" => {
            let [find, with, s] = exact::<3>(name, args)?;
            Ok(Value::Str(
                s.to_string()
                    .replace(find.as_str(name)?, with.as_str(name)?),
            ))
        }
        "random" => {
            let [n] = exact::<1>(name, args)?;
            let n = non_negative(name, n.as_int(name)?)?;
            Ok(Value::Str(random_alphanumeric(n)))
        }
        "unix_time" => {
            exact::<0>(name, args)?;
            Ok(Value::Int(Utc::now().timestamp()))
        }
        "unix_time_millis" => {
            exact::<0>(name, args)?;
            Ok(Value::Int(Utc::now().timestamp_millis()))
        }
        "timestamp" => {
            let [format] = exact::<1>(name, args)?;
            timestamp(format.as_str(name)?).map(Value::Str)
        }
        "uuid" => {
            exact::<0>(name, args)?;
            Ok(Value::Str(uuid::Uuid::new_v4().to_string()))
        }
        other => Err(TemplateError::UnknownFunction(other.to_string())),
    }
}

fn arity(name: &str, expected: &str, got: usize) -> TemplateError {
    TemplateError::Render(format!(
        "wrong number of args for {}: want {} got {}",
        name, expected, got
    ))
}

fn exact<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], TemplateError> {
    let got = args.len();
    args.try_into()
        .map_err(|_| arity(name, &N.to_string(), got))
}

fn non_negative(name: &str, n: i64) -> Result<usize, TemplateError> {
    usize::try_from(n)
        .map_err(|_| TemplateError::Render(format!("{}: length must be non-negative", name)))
}

/// Truncate to at most `max` characters.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Truncate to `max` characters, replacing the tail with 8 hex chars of the
/// input's SHA-256 so truncated values stay distinguishable.
fn truncate_sha256(s: &str, max: usize) -> Result<String, TemplateError> {
    if s.chars().count() <= max {
        return Ok(s.to_string());
    }
    if max <= 8 {
        return Err(TemplateError::Render(
            "truncate_sha256: max length must be greater than 8".into(),
        ));
    }
    let hash = sha256_hex(s);
    Ok(format!("{}{}", truncate(s, max - 8), &hash[..8]))
}

fn sha256_hex(s: &str) -> String {
    hex::encode(Sha256::digest(s.as_bytes()))
}

fn random_alphanumeric(n: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

fn timestamp(format: &str) -> Result<String, TemplateError> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(TemplateError::Render(format!(
            "timestamp: invalid format {:?}",
            format
        )));
    }
    Ok(Utc::now().format_with_items(items.into_iter()).to_string())
}

/// Minimal `printf`: `%s`, `%d`, `%v` and `%%`.
fn printf(format: &str, args: &[Value]) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(verb @ ('s' | 'd' | 'v')) => {
                let arg = args.next().ok_or_else(|| {
                    TemplateError::Render(format!("printf: missing argument for %{}", verb))
                })?;
                if verb == 'd' {
                    out.push_str(&arg.as_int("printf")?.to_string());
                } else {
                    out.push_str(&arg.to_string());
                }
            }
            Some(other) => {
                return Err(TemplateError::Render(format!(
                    "printf: unsupported verb %{}",
                    other
                )))
            }
            None => return Err(TemplateError::Render("printf: trailing %".into())),
        }
    }

    if args.next().is_some() {
        return Err(TemplateError::Render("printf: too many arguments".into()));
    }
    Ok(out)
}
