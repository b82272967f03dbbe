//! Built-in matcher functions and the function registry

use globset::GlobBuilder;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::{Arc, OnceLock};

use super::error::{ExprError, Result};

/// A function callable from matcher expressions
pub type Function = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Named functions available to matchers
///
/// `FunctionMap::default()` holds every built-in; [`FunctionMap::add`]
/// registers more or replaces one.
#[derive(Clone)]
pub struct FunctionMap {
    functions: HashMap<String, Function>,
}

impl FunctionMap {
    /// Registry with no functions at all
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Register `function` under `name`, replacing any previous entry
    pub fn add(&mut self, name: impl Into<String>, function: Function) {
        self.functions.insert(name.into(), function);
    }

    /// Look up a function
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    fn add_matcher(&mut self, name: &'static str, matcher: fn(&str, &str) -> Result<bool>) {
        self.add(
            name,
            Arc::new(move |args: &[Value]| -> Result<Value> {
                let [key, pattern] = string_args::<2>(name, args)?;
                matcher(key, pattern).map(Value::Bool)
            }),
        );
    }
}

impl Default for FunctionMap {
    fn default() -> Self {
        let mut map = Self::empty();
        map.add_matcher("keyMatch", key_match);
        map.add_matcher("keyMatch2", key_match2);
        map.add_matcher("keyMatch3", key_match3);
        map.add_matcher("regexMatch", regex_match);
        map.add_matcher("globMatch", glob_match);
        map.add_matcher("ipMatch", ip_match);
        map
    }
}

impl fmt::Debug for FunctionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionMap").field("functions", &names).finish()
    }
}

/// Extract exactly `N` string arguments
pub fn string_args<'a, const N: usize>(name: &str, args: &'a [Value]) -> Result<[&'a str; N]> {
    if args.len() != N {
        return Err(ExprError::Arity {
            name: name.to_string(),
            expected: match N {
                1 => "1",
                2 => "2",
                3 => "3",
                _ => "a fixed number of",
            },
            got: args.len(),
        });
    }

    let mut out = [""; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = arg.as_str().ok_or_else(|| {
            ExprError::TypeMismatch(format!("{} expects string arguments, got {}", name, arg))
        })?;
    }
    Ok(out)
}

fn function_error(name: &str, reason: impl fmt::Display) -> ExprError {
    ExprError::FunctionError {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Compiled patterns kept across calls; policy fields repeat on every enforce
const PATTERN_CACHE_CAPACITY: usize = 1024;

fn pattern_cache() -> &'static Mutex<LruCache<String, Regex>> {
    static CACHE: OnceLock<Mutex<LruCache<String, Regex>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        let capacity = NonZeroUsize::new(PATTERN_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Mutex::new(LruCache::new(capacity))
    })
}

/// Compile `pattern`, reusing a cached regex when one exists
fn compiled(name: &str, pattern: &str) -> Result<Regex> {
    if let Some(regex) = pattern_cache().lock().get(pattern) {
        return Ok(regex.clone());
    }

    let regex = Regex::new(pattern).map_err(|e| function_error(name, e))?;
    pattern_cache().lock().put(pattern.to_string(), regex.clone());
    Ok(regex)
}

fn colon_params() -> Option<&'static Regex> {
    static PARAMS: OnceLock<Option<Regex>> = OnceLock::new();
    PARAMS.get_or_init(|| Regex::new(r":[^/]+").ok()).as_ref()
}

fn brace_params() -> Option<&'static Regex> {
    static PARAMS: OnceLock<Option<Regex>> = OnceLock::new();
    PARAMS.get_or_init(|| Regex::new(r"\{[^/]+?\}").ok()).as_ref()
}

/// `key2` may end in `*`: "/foo/bar" matches "/foo/*"
///
/// # Example
/// ```text
/// keyMatch(r.obj, p.obj)
/// ```
pub fn key_match(key1: &str, key2: &str) -> Result<bool> {
    let Some(star) = key2.find('*') else {
        return Ok(key1 == key2);
    };

    let prefix = &key2[..star];
    Ok(key1.starts_with(prefix))
}

/// `key2` may contain `:param` segments and `/*`: "/resource1" matches "/:resource"
pub fn key_match2(key1: &str, key2: &str) -> Result<bool> {
    let pattern = key2.replace("/*", "/.*");
    let params = colon_params().ok_or_else(|| function_error("keyMatch2", "parameter pattern unavailable"))?;
    let pattern = params.replace_all(&pattern, "[^/]+");
    Ok(compiled("keyMatch2", &format!("^{}$", pattern))?.is_match(key1))
}

/// `key2` may contain `{param}` segments and `/*`: "/resource1" matches "/{resource}"
pub fn key_match3(key1: &str, key2: &str) -> Result<bool> {
    let pattern = key2.replace("/*", "/.*");
    let params = brace_params().ok_or_else(|| function_error("keyMatch3", "parameter pattern unavailable"))?;
    let pattern = params.replace_all(&pattern, "[^/]+");
    Ok(compiled("keyMatch3", &format!("^{}$", pattern))?.is_match(key1))
}

/// `key1` matches the regular expression `pattern`
pub fn regex_match(key1: &str, pattern: &str) -> Result<bool> {
    Ok(compiled("regexMatch", pattern)?.is_match(key1))
}

/// `key1` matches the glob `pattern`; `*` never crosses a `/`
pub fn glob_match(key1: &str, pattern: &str) -> Result<bool> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| function_error("globMatch", e))?;
    Ok(glob.compile_matcher().is_match(key1))
}

/// `ip1` equals `ip2`, or lies inside `ip2` when it is a CIDR block
pub fn ip_match(ip1: &str, ip2: &str) -> Result<bool> {
    let addr: IpAddr = ip1
        .trim()
        .parse()
        .map_err(|_| function_error("ipMatch", format!("invalid IP address '{}'", ip1)))?;

    let (network, prefix) = match ip2.split_once('/') {
        Some((network, prefix)) => {
            let prefix: u32 = prefix
                .parse()
                .map_err(|_| function_error("ipMatch", format!("invalid CIDR prefix in '{}'", ip2)))?;
            (network, Some(prefix))
        }
        None => (ip2, None),
    };
    let network: IpAddr = network
        .trim()
        .parse()
        .map_err(|_| function_error("ipMatch", format!("invalid IP address '{}'", ip2)))?;

    match (addr, network) {
        (IpAddr::V4(a), IpAddr::V4(n)) => {
            let prefix = prefix.unwrap_or(32);
            if prefix > 32 {
                return Err(function_error("ipMatch", format!("invalid CIDR prefix in '{}'", ip2)));
            }
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            Ok(u32::from(a) & mask == u32::from(n) & mask)
        }
        (IpAddr::V6(a), IpAddr::V6(n)) => {
            let prefix = prefix.unwrap_or(128);
            if prefix > 128 {
                return Err(function_error("ipMatch", format!("invalid CIDR prefix in '{}'", ip2)));
            }
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            Ok(u128::from(a) & mask == u128::from(n) & mask)
        }
        _ => Ok(false),
    }
}
