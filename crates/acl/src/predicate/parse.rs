use std::collections::HashMap;
use std::str::FromStr;

use docgate_core_types::Method;
use nom::branch::alt;
use nom::bytes::complete::{tag_no_case, take_while1};
use nom::character::complete::{char, multispace0, satisfy};
use nom::combinator::{all_consuming, map, not, opt, value};
use nom::error::{Error as NomError, ErrorKind as NomErrorKind};
use nom::multi::{separated_list0, separated_list1};
use nom::sequence::{delimited, preceded, terminated, tuple};
use nom::IResult;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use super::custom::{builtin_factories, CustomFactory};
use super::{CustomMatcher, Operand, PathMatcher, Predicate};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PredicateParseError {
    #[error("invalid predicate syntax near `{near}` in `{input}`")]
    Syntax { input: String, near: String },
    #[error("unknown predicate `{0}`")]
    UnknownPredicate(String),
    #[error("invalid arguments for `{predicate}`: {reason}")]
    InvalidArguments { predicate: String, reason: String },
    #[error("invalid regex `{pattern}`: {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

impl PredicateParseError {
    pub fn invalid_args(predicate: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            predicate: predicate.to_string(),
            reason: reason.into(),
        }
    }
}

/// Call argument, optionally named (`key=value`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: ArgValue,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgValue {
    Empty,
    Text { text: String, quoted: bool },
    List(Vec<ArgValue>),
}

impl ArgValue {
    fn collect_texts(&self, out: &mut Vec<String>) {
        match self {
            ArgValue::Empty => {}
            ArgValue::Text { text, .. } => out.push(text.clone()),
            ArgValue::List(items) => items.iter().for_each(|v| v.collect_texts(out)),
        }
    }

    fn has_gap(&self) -> bool {
        match self {
            ArgValue::Empty => true,
            ArgValue::Text { .. } => false,
            ArgValue::List(items) => items.iter().any(ArgValue::has_gap),
        }
    }

    /// Flattened texts of this value; an empty slot yields nothing.
    pub fn texts(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_texts(&mut out);
        out
    }
}

/// Text of every unnamed argument, lists flattened and empty slots skipped.
pub fn positional_texts(args: &[Arg]) -> Vec<String> {
    let mut out = Vec::new();
    for arg in args.iter().filter(|a| a.name.is_none()) {
        arg.value.collect_texts(&mut out);
    }
    out
}

/// Positional texts with no empty slot among them. An empty slot is what an
/// unbound interpolation token leaves behind, so list predicates refuse it.
pub fn gapless_texts(predicate: &str, args: &[Arg]) -> Result<Vec<String>, PredicateParseError> {
    if args.iter().filter(|a| a.name.is_none()).any(|a| a.value.has_gap()) {
        return Err(PredicateParseError::invalid_args(
            predicate,
            "empty argument in list",
        ));
    }
    Ok(positional_texts(args))
}

pub fn named<'a>(args: &'a [Arg], name: &str) -> Option<&'a ArgValue> {
    args.iter()
        .find(|a| a.name.as_deref() == Some(name))
        .map(|a| &a.value)
}

fn positional(args: &[Arg]) -> Vec<&ArgValue> {
    args.iter()
        .filter(|a| a.name.is_none())
        .map(|a| &a.value)
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Bool(bool),
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Not(Box<Expr>),
    Call { name: String, args: Vec<Arg> },
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn ident(input: &str) -> IResult<&str, &str> {
    take_while1(is_ident_char)(input)
}

fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag_no_case(kw), not(satisfy(is_ident_char)))
}

fn quoted(input: &str) -> IResult<&str, String> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, c @ ('\'' | '"'))) => c,
        _ => return Err(nom::Err::Error(NomError::new(input, NomErrorKind::Char))),
    };
    let mut out = String::new();
    let mut escaped = false;
    for (idx, c) in chars {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((&input[idx + c.len_utf8()..], out));
        } else {
            out.push(c);
        }
    }
    Err(nom::Err::Error(NomError::new(input, NomErrorKind::Char)))
}

fn bare(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| {
        !c.is_whitespace() && !matches!(c, ',' | '(' | ')' | '[' | ']' | '\'' | '"' | '=')
    })(input)
}

fn bare_in_braces(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| {
        !c.is_whitespace() && !matches!(c, ',' | '{' | '}' | '\'' | '"')
    })(input)
}

/// `{a, 'b'}` list form; items are plain values, never nested lists.
fn brace_list(input: &str) -> IResult<&str, ArgValue> {
    map(
        delimited(
            ws(char('{')),
            separated_list0(
                char(','),
                ws(alt((
                    map(quoted, |text| ArgValue::Text { text, quoted: true }),
                    map(bare_in_braces, |text: &str| ArgValue::Text {
                        text: text.to_string(),
                        quoted: false,
                    }),
                ))),
            ),
            ws(char('}')),
        ),
        ArgValue::List,
    )(input)
}

fn arg_value(input: &str) -> IResult<&str, ArgValue> {
    alt((
        map(quoted, |text| ArgValue::Text { text, quoted: true }),
        map(
            delimited(
                ws(char('[')),
                separated_list0(char(','), ws(arg_value)),
                ws(char(']')),
            ),
            ArgValue::List,
        ),
        brace_list,
        map(bare, |text: &str| ArgValue::Text {
            text: text.to_string(),
            quoted: false,
        }),
    ))(input)
}

fn arg(input: &str) -> IResult<&str, Arg> {
    let (input, name) = opt(terminated(ws(ident), char('=')))(input)?;
    let (input, value) = ws(opt(arg_value))(input)?;
    Ok((
        input,
        Arg {
            name: name.map(str::to_string),
            value: value.unwrap_or(ArgValue::Empty),
        },
    ))
}

fn call(input: &str) -> IResult<&str, Expr> {
    map(
        tuple((
            ident,
            ws(char('(')),
            separated_list0(char(','), arg),
            char(')'),
        )),
        |(name, _, args, _)| Expr::Call {
            name: name.to_ascii_lowercase(),
            args,
        },
    )(input)
}

fn factor(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        map(preceded(keyword("not"), factor), |e| Expr::Not(Box::new(e))),
        delimited(char('('), expr, char(')')),
        value(Expr::Bool(true), keyword("true")),
        value(Expr::Bool(false), keyword("false")),
        call,
    )))(input)
}

fn term(input: &str) -> IResult<&str, Expr> {
    map(separated_list1(keyword("and"), factor), |mut items| {
        if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::And(items)
        }
    })(input)
}

fn expr(input: &str) -> IResult<&str, Expr> {
    map(separated_list1(keyword("or"), term), |mut items| {
        if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Or(items)
        }
    })(input)
}

/// Compiles predicate text. Holds the custom predicate factories, so a
/// parser is built once and shared.
#[derive(Clone)]
pub struct PredicateParser {
    customs: HashMap<String, CustomFactory>,
}

impl Default for PredicateParser {
    fn default() -> Self {
        let customs = builtin_factories()
            .into_iter()
            .map(|(name, factory)| (name.to_string(), factory))
            .collect();
        Self { customs }
    }
}

impl std::fmt::Debug for PredicateParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.customs.keys().collect();
        names.sort();
        f.debug_struct("PredicateParser")
            .field("customs", &names)
            .finish()
    }
}

impl PredicateParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a custom predicate under `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: CustomFactory) {
        self.customs.insert(name.into().to_ascii_lowercase(), factory);
    }

    pub fn parse(&self, text: &str) -> Result<Predicate, PredicateParseError> {
        let (_, tree) = all_consuming(ws(expr))(text).map_err(|err| {
            let near = match err {
                nom::Err::Error(e) | nom::Err::Failure(e) => e.input.to_string(),
                nom::Err::Incomplete(_) => String::new(),
            };
            PredicateParseError::Syntax {
                input: text.to_string(),
                near,
            }
        })?;
        self.build(tree)
    }

    fn build(&self, tree: Expr) -> Result<Predicate, PredicateParseError> {
        Ok(match tree {
            Expr::Bool(value) => Predicate::Const(value),
            Expr::Not(inner) => Predicate::Not(Box::new(self.build(*inner)?)),
            Expr::And(items) => Predicate::And(self.build_all(items)?),
            Expr::Or(items) => Predicate::Or(self.build_all(items)?),
            Expr::Call { name, args } => {
                self.build_call(canonical_name(&name), normalize_args(args))?
            }
        })
    }

    fn build_all(&self, items: Vec<Expr>) -> Result<Vec<Predicate>, PredicateParseError> {
        items.into_iter().map(|e| self.build(e)).collect()
    }

    fn build_call(&self, name: &str, args: Vec<Arg>) -> Result<Predicate, PredicateParseError> {
        match name {
            "method" => {
                let methods = required_texts(name, &args)?
                    .iter()
                    .map(|m| Method::from_str(m).unwrap_or(Method::Other))
                    .collect();
                Ok(Predicate::MethodMatch(methods))
            }
            "path" => Ok(Predicate::PathMatch(PathMatcher::Exact(required_texts(
                name, &args,
            )?))),
            "path-prefix" => Ok(Predicate::PathMatch(PathMatcher::Prefix(required_texts(
                name, &args,
            )?))),
            "path-template" => Ok(Predicate::PathMatch(PathMatcher::Template(
                required_texts(name, &args)?,
            ))),
            "regex" => {
                let pattern = match named(&args, "pattern") {
                    Some(ArgValue::Text { text, .. }) => text.clone(),
                    _ => single_text(name, &args)?,
                };
                let re = Regex::new(&pattern).map_err(|e| PredicateParseError::InvalidRegex {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                Ok(Predicate::PathMatch(PathMatcher::Regex(re)))
            }
            "equals" => {
                let operands = positional(&args);
                if operands.len() != 2 {
                    return Err(PredicateParseError::invalid_args(
                        name,
                        "expected exactly two operands",
                    ));
                }
                Ok(Predicate::ValueEq(
                    operand(name, operands[0])?,
                    operand(name, operands[1])?,
                ))
            }
            "field-equals" => {
                let operands = positional(&args);
                let key = named(&args, "key").or_else(|| operands.first().copied());
                let expected = named(&args, "value").or_else(|| operands.get(1).copied());
                let key = match key {
                    Some(ArgValue::Text { text, .. }) => text.clone(),
                    _ => String::new(),
                };
                let value = match expected {
                    Some(ArgValue::Text { text, .. }) => Some(
                        serde_json::from_str::<Value>(text)
                            .unwrap_or_else(|_| Value::String(text.clone())),
                    ),
                    _ => None,
                };
                Ok(Predicate::FieldEq { key, value })
            }
            "field-exists" => Ok(Predicate::FieldExists(required_texts(name, &args)?)),
            "doc-contains" => Ok(Predicate::DocContains(required_texts(name, &args)?)),
            other => {
                let factory = self
                    .customs
                    .get(other)
                    .ok_or_else(|| PredicateParseError::UnknownPredicate(other.to_string()))?;
                Ok(Predicate::Custom(CustomMatcher {
                    name: other.to_string(),
                    inner: factory(&args)?,
                }))
            }
        }
    }
}

/// Names accepted for compatibility with older rule files.
fn canonical_name(name: &str) -> &str {
    match name {
        "bson-request-contains" => "doc-contains",
        "bson-request-whitelist" => "doc-whitelist",
        "bson-request-blacklist" => "doc-blacklist",
        "bson-request-prop-equals" => "field-equals",
        "bson-request-array-contains" => "doc-array-contains",
        "bson-request-array-is-subset" => "doc-array-is-subset",
        other => other,
    }
}

/// `f()` parses as one empty argument; treat it as no arguments.
fn normalize_args(args: Vec<Arg>) -> Vec<Arg> {
    match args.as_slice() {
        [Arg {
            name: None,
            value: ArgValue::Empty,
        }] => Vec::new(),
        _ => args,
    }
}

fn required_texts(name: &str, args: &[Arg]) -> Result<Vec<String>, PredicateParseError> {
    let texts = positional_texts(args);
    if texts.is_empty() {
        return Err(PredicateParseError::invalid_args(
            name,
            "at least one argument is required",
        ));
    }
    Ok(texts)
}

fn single_text(name: &str, args: &[Arg]) -> Result<String, PredicateParseError> {
    let mut texts = positional_texts(args);
    if texts.len() != 1 {
        return Err(PredicateParseError::invalid_args(
            name,
            "expected exactly one argument",
        ));
    }
    Ok(texts.remove(0))
}

fn operand(name: &str, value: &ArgValue) -> Result<Operand, PredicateParseError> {
    Ok(match value {
        ArgValue::Empty => Operand::Missing,
        ArgValue::Text { text, quoted: true } => Operand::Literal(text.clone()),
        ArgValue::Text { text, quoted: false } => match text.as_str() {
            "%u" | "%{USER}" => Operand::UserName,
            "%m" | "%{METHOD}" => Operand::Method,
            "%R" | "%r" | "%{PATH}" => Operand::Path,
            _ => Operand::Literal(text.clone()),
        },
        ArgValue::List(_) => {
            return Err(PredicateParseError::invalid_args(
                name,
                "list operands are not supported",
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_tree(text: &str) -> Expr {
        all_consuming(ws(expr))(text).map(|(_, e)| e).unwrap()
    }

    #[test]
    fn precedence_binds_and_tighter() {
        let tree = parse_tree("method(GET) or path('/a') and not true");
        let Expr::Or(items) = tree else {
            panic!("expected or");
        };
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[1], Expr::And(parts) if parts.len() == 2));
    }

    #[test]
    fn arguments_accept_names_lists_and_gaps() {
        let tree = parse_tree(r#"f(key=a.b, value='"x"', [p, 'q r'], , )"#);
        let Expr::Call { name, args } = tree else {
            panic!("expected call");
        };
        assert_eq!(name, "f");
        assert_eq!(args.len(), 5);
        assert_eq!(args[0].name.as_deref(), Some("key"));
        assert_eq!(
            args[1].value,
            ArgValue::Text {
                text: "\"x\"".into(),
                quoted: true
            }
        );
        assert!(matches!(&args[2].value, ArgValue::List(items) if items.len() == 2));
        assert_eq!(args[3].value, ArgValue::Empty);
    }

    #[test]
    fn brace_lists_hold_plain_values() {
        let tree = parse_tree(r#"f(key=a, values={'"bar"', foo})"#);
        let Expr::Call { args, .. } = tree else {
            panic!("expected call");
        };
        assert_eq!(
            args[1].value,
            ArgValue::List(vec![
                ArgValue::Text {
                    text: "\"bar\"".into(),
                    quoted: true
                },
                ArgValue::Text {
                    text: "foo".into(),
                    quoted: false
                },
            ])
        );
    }

    #[test]
    fn older_names_are_aliases() {
        let parser = PredicateParser::new();
        assert!(matches!(
            parser.parse("bson-request-contains(a, b.c)").unwrap(),
            Predicate::DocContains(keys) if keys.len() == 2
        ));
        assert!(matches!(
            parser.parse(r#"bson-request-prop-equals(key=foo, value='"bar"')"#).unwrap(),
            Predicate::FieldEq { .. }
        ));
        assert!(matches!(
            parser.parse("bson-request-whitelist(a, us.d)").unwrap(),
            Predicate::Custom(c) if c.name == "doc-whitelist"
        ));
        assert!(parser.parse("bson-request-blacklist(secret)").is_ok());
    }

    #[test]
    fn gaps_in_lists_are_rejected() {
        let args = vec![
            Arg {
                name: None,
                value: ArgValue::Empty,
            },
            Arg {
                name: None,
                value: ArgValue::Text {
                    text: "b".into(),
                    quoted: false,
                },
            },
        ];
        assert!(gapless_texts("qparams-blacklist", &args).is_err());
        assert_eq!(gapless_texts("qparams-blacklist", &args[1..]).unwrap(), vec!["b"]);
    }

    #[test]
    fn escapes_inside_quotes() {
        let (rest, text) = quoted(r#"'it\'s' tail"#).unwrap();
        assert_eq!(text, "it's");
        assert_eq!(rest, " tail");
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        let parser = PredicateParser::new();
        assert!(matches!(
            parser.parse("nope(1)"),
            Err(PredicateParseError::UnknownPredicate(_))
        ));
        assert!(matches!(
            parser.parse("path('/a'"),
            Err(PredicateParseError::Syntax { .. })
        ));
        assert!(matches!(
            parser.parse("regex('[')"),
            Err(PredicateParseError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn field_equals_reads_json_or_text() {
        let parser = PredicateParser::new();
        match parser.parse(r#"field-equals(key=n, value=42)"#).unwrap() {
            Predicate::FieldEq { key, value } => {
                assert_eq!(key, "n");
                assert_eq!(value, Some(serde_json::json!(42)));
            }
            other => panic!("unexpected {other:?}"),
        }
        match parser.parse(r#"field-equals(key=owner, value=)"#).unwrap() {
            Predicate::FieldEq { value, .. } => assert_eq!(value, None),
            other => panic!("unexpected {other:?}"),
        }
    }
}
