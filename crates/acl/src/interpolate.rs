//! Request variable interpolation.
//!
//! Two flavours share one token vocabulary:
//! * predicate text, where a bound token becomes a quoted literal and an
//!   unbound one disappears ([`interpolate_predicate`]);
//! * JSON documents (read/write filters, merge documents), where a string
//!   leaf that is exactly a token is replaced by the resolved value or
//!   `null` ([`interpolate_document`]).

use chrono::Utc;
use docgate_core_types::{flatten, get_path, Account, FlatDocument, QueryParams};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use serde_json::{json, Map, Value};

pub const DEFAULT_RND_MAX_BITS: u32 = 4096;

const USER_PREFIX: &str = "@user.";
const BODY_PREFIX: &str = "@request.body.";
const REQUEST_PREFIX: &str = "@request.";
const QPARAMS_OPEN: &str = "@qparams[";
const MASK_LITERAL: &str = "\"0\"";

/// Request attributes exposed as `@request` / `@request.<prop>`.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
}

/// Everything a token can resolve against, captured once per request.
#[derive(Clone, Debug)]
pub struct BindingContext {
    user: Option<Value>,
    user_flat: FlatDocument,
    body: Option<Value>,
    body_flat: FlatDocument,
    request: Value,
    request_flat: FlatDocument,
    query: Option<QueryParams>,
    rnd_max_bits: u32,
}

impl Default for BindingContext {
    fn default() -> Self {
        Self::new(None, None, RequestSummary::default(), None)
    }
}

impl BindingContext {
    pub fn new(
        account: Option<&Account>,
        body: Option<&Value>,
        request: RequestSummary,
        query: Option<&QueryParams>,
    ) -> Self {
        let user = account.map(Account::to_document);
        let request = serde_json::to_value(&request).unwrap_or(Value::Null);
        Self {
            user_flat: user.as_ref().map(|u| flatten(u, false)).unwrap_or_default(),
            body_flat: body.map(|b| flatten(b, false)).unwrap_or_default(),
            request_flat: flatten(&request, false),
            user,
            body: body.cloned(),
            request,
            query: query.cloned(),
            rnd_max_bits: DEFAULT_RND_MAX_BITS,
        }
    }

    pub fn with_rnd_max_bits(mut self, bits: u32) -> Self {
        self.rnd_max_bits = bits;
        self
    }

    /// Applies the `@user.`, `@request.body.`, `@request.` and `@qparams[..]`
    /// passes to predicate text, in that order.
    pub fn interpolate_all(&self, text: &str) -> String {
        let text = interpolate_predicate(text, USER_PREFIX, &self.user_flat);
        let text = interpolate_predicate(&text, BODY_PREFIX, &self.body_flat);
        let text = interpolate_predicate(&text, REQUEST_PREFIX, &self.request_flat);
        scan_outside_literals(&text, |rest| {
            let (len, name) = qparams_token(rest)?;
            let bound = self.qparam(name).map(Value::String);
            Some((len, bound.as_ref().and_then(quote_literal)))
        })
    }

    /// Replaces every token with a neutral literal. Used to syntax-check
    /// templated predicate text without binding it.
    pub fn mask_tokens(text: &str) -> String {
        let text = mask_prefix(text, USER_PREFIX);
        let text = mask_prefix(&text, BODY_PREFIX);
        let text = mask_prefix(&text, REQUEST_PREFIX);
        scan_outside_literals(&text, |rest| {
            let (len, _) = qparams_token(rest)?;
            Some((len, Some(MASK_LITERAL.to_string())))
        })
    }

    pub fn interpolate_document(&self, doc: &Value) -> Value {
        match doc {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.interpolate_document(v)))
                    .collect::<Map<_, _>>(),
            ),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.interpolate_document(v)).collect())
            }
            Value::String(s) => self.resolve_token(s).unwrap_or_else(|| doc.clone()),
            other => other.clone(),
        }
    }

    /// Resolves a whole-string token. `None` means the string is not a
    /// token; an unresolved token yields `Some(Value::Null)`.
    pub fn resolve_token(&self, token: &str) -> Option<Value> {
        match token {
            "%USER" => return Some(lookup(self.user.as_ref(), "name")),
            "%ROLES" => {
                return Some(
                    self.user
                        .as_ref()
                        .and_then(|u| u.get("roles"))
                        .cloned()
                        .unwrap_or_else(|| json!([])),
                )
            }
            "%NOW" => return Some(now()),
            _ => {}
        }
        if !token.starts_with('@') {
            return None;
        }
        if token == "@user" {
            return Some(self.user.clone().unwrap_or(Value::Null));
        }
        if let Some(path) = token.strip_prefix(USER_PREFIX) {
            return Some(lookup(self.user.as_ref(), path));
        }
        if let Some(path) = token.strip_prefix(BODY_PREFIX) {
            return Some(lookup(self.body.as_ref(), path));
        }
        if token == "@request" {
            return Some(self.request.clone());
        }
        if let Some(path) = token.strip_prefix(REQUEST_PREFIX) {
            return Some(lookup(Some(&self.request), path));
        }
        if token == "@now" {
            return Some(now());
        }
        if let Some(arg) = token
            .strip_prefix("@rnd(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return Some(
                random_hex(arg, self.rnd_max_bits)
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
        }
        match qparams_token(token) {
            Some((len, name)) if len == token.len() => Some(
                self.qparam(name)
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            ),
            _ => None,
        }
    }

    fn qparam(&self, name: &str) -> Option<String> {
        self.query
            .as_ref()
            .and_then(|q| q.first(name))
            .map(str::to_string)
    }
}

/// Free-function form of [`BindingContext::interpolate_document`].
pub fn interpolate_document(ctx: &BindingContext, doc: &Value) -> Value {
    ctx.interpolate_document(doc)
}

/// Replaces every `prefix<path>` token that appears outside quoted literals.
/// Tokens bound to a primitive become a quoted literal; anything else is
/// removed.
pub fn interpolate_predicate(text: &str, prefix: &str, bindings: &FlatDocument) -> String {
    replace_prefixed(text, prefix, |path| bindings.get(path).and_then(quote_literal))
}

fn mask_prefix(text: &str, prefix: &str) -> String {
    replace_prefixed(text, prefix, |_| Some(MASK_LITERAL.to_string()))
}

fn replace_prefixed<F>(text: &str, prefix: &str, resolve: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = if prefix.ends_with('.') {
        prefix.to_string()
    } else {
        format!("{prefix}.")
    };
    scan_outside_literals(text, |rest| {
        let after = rest.strip_prefix(prefix.as_str())?;
        let path_len = after
            .char_indices()
            .find(|(_, c)| !is_path_char(*c))
            .map(|(idx, _)| idx)
            .unwrap_or(after.len());
        let path = after[..path_len].trim_end_matches('.');
        Some((prefix.len() + path.len(), resolve(path)))
    })
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '-' | '.')
}

/// Walks `text`, copying quoted literals verbatim. At every other position
/// `matcher` may claim a token by returning its byte length and the
/// replacement (`None` drops the token).
fn scan_outside_literals<F>(text: &str, mut matcher: F) -> String
where
    F: FnMut(&str) -> Option<(usize, Option<String>)>,
{
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut idx = 0;
    while idx < text.len() {
        let rest = &text[idx..];
        let Some(c) = rest.chars().next() else {
            break;
        };
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            idx += c.len_utf8();
            continue;
        }
        if let Some((len, replacement)) = matcher(rest) {
            if let Some(replacement) = replacement {
                out.push_str(&replacement);
            }
            idx += len.max(1);
            continue;
        }
        if c == '\'' || c == '"' {
            quote = Some(c);
        }
        out.push(c);
        idx += c.len_utf8();
    }
    out
}

/// Quotes a primitive as a predicate literal. Containers and null have no
/// literal form.
fn quote_literal(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Some(quoted)
}

/// Matches `@qparams['name']` or `@qparams["name"]` at the start of `text`,
/// returning the token length and the parameter name.
fn qparams_token(text: &str) -> Option<(usize, &str)> {
    let rest = text.strip_prefix(QPARAMS_OPEN)?;
    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let body = &rest[1..];
    let end = body.find(quote)?;
    let name = &body[..end];
    body[end + 1..].strip_prefix(']')?;
    Some((QPARAMS_OPEN.len() + 1 + end + 1 + 1, name))
}

fn now() -> Value {
    json!({ "$date": Utc::now().timestamp_millis() })
}

fn lookup(root: Option<&Value>, path: &str) -> Value {
    root.and_then(|r| get_path(r, path))
        .cloned()
        .unwrap_or(Value::Null)
}

fn random_hex(arg: &str, max_bits: u32) -> Option<String> {
    let bits: i64 = arg.trim().parse().ok()?;
    if bits <= 0 || bits > i64::from(max_bits) {
        return None;
    }
    let bits = bits as usize;
    let mut bytes = vec![0u8; (bits + 7) / 8];
    OsRng.fill_bytes(&mut bytes);
    let mut hex = hex::encode(bytes);
    hex.truncate((bits + 3) / 4);
    let spare = bits % 4;
    if spare != 0 {
        let first = u8::from_str_radix(&hex[..1], 16).ok()? & ((1u8 << spare) - 1);
        hex.replace_range(..1, &format!("{first:x}"));
    }
    Some(hex)
}
