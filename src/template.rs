//! Message templates.
//!
//! A small text/template dialect: literal text interleaved with `{{ ... }}`
//! actions. An action is a pipeline of commands separated by `|`; each stage
//! after the first is a function call that receives the previous result as its
//! final argument.
//!
//! ```text
//! {"lat": {{.lat}}, "lon": {{ .lon | printf "%.5f" }}, "seq": {{.count}}}
//! ```
//!
//! `{{-` and `-}}` trim whitespace around an action and `{{/* ... */}}` is a
//! comment. Unknown functions are rejected when the template is compiled;
//! references to keys missing from the render parameters fail at render time.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::TemplateError;
use crate::funcs::{self, Func};

type Result<T> = std::result::Result<T, TemplateError>;

/// Parameters a template is rendered against, addressed as `.key`.
pub type Params = HashMap<String, Value>;

/// A value flowing through a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Float(f64),
    Int(i64),
    Str(String),
    Bool(bool),
}

impl Value {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "float64",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::Bool(_) => "bool",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(x) => f.write_str(&funcs::format_float(*x)),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Self::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Self::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// A compiled template, immutable and cheap to render repeatedly.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Action(Pipeline),
}

#[derive(Debug, Clone)]
struct Pipeline {
    commands: Vec<Command>,
}

#[derive(Debug, Clone)]
struct Command {
    args: Vec<Arg>,
}

#[derive(Debug, Clone)]
enum Arg {
    Field(String),
    Literal(Value),
    Func(Func),
    Sub(Pipeline),
}

impl Template {
    /// Parse `src`, resolving every function name against the helper library.
    pub fn compile(src: &str) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut pos = 0;
        let mut trim_next = false;

        while pos < src.len() {
            let Some(found) = src[pos..].find("{{") else {
                push_text(&mut nodes, &src[pos..], trim_next, false);
                break;
            };
            let open = pos + found;
            let mut start = open + 2;
            let trim_prev = is_left_trim(&src[start..]);
            if trim_prev {
                start += 1;
            }
            push_text(&mut nodes, &src[pos..open], trim_next, trim_prev);

            let (action, end, trim_after) = parse_action(src, start)?;
            if let Some(pipeline) = action {
                nodes.push(Node::Action(pipeline));
            }
            pos = end;
            trim_next = trim_after;
        }

        Ok(Self { nodes })
    }

    /// Execute the template against `params`.
    pub fn render(&self, params: &Params) -> Result<String> {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipeline) => {
                    let value = eval_pipeline(pipeline, params)?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(out)
    }
}

fn push_text(nodes: &mut Vec<Node>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_string()));
    }
}

/// `{{- ` needs whitespace after the dash so `{{-3}}` stays a number.
fn is_left_trim(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

// ---- lexer ----

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Field(String),
    Ident(String),
    Literal(Value),
    Pipe,
    LParen,
    RParen,
}

/// Lex and parse one action starting just after `{{` (and any trim dash).
/// Returns the pipeline (None for comments), the offset just past `}}`, and
/// whether the action ended with a `-}}` trim marker.
fn parse_action(src: &str, start: usize) -> Result<(Option<Pipeline>, usize, bool)> {
    let bytes = src.as_bytes();
    let mut i = skip_whitespace(bytes, start);

    if src[i..].starts_with("/*") {
        let Some(close) = src[i + 2..].find("*/") else {
            return Err(TemplateError::syntax(i, "unclosed comment"));
        };
        i = i + 2 + close + 2;
        let (end, trim) = expect_close(src, i)?;
        return Ok((None, end, trim));
    }

    let mut tokens: Vec<(usize, Token)> = Vec::new();
    loop {
        let ws = skip_whitespace(bytes, i);
        if src[ws..].starts_with("-}}") && ws > i {
            let pipeline = parse_tokens(&tokens, start)?;
            return Ok((Some(pipeline), ws + 3, true));
        }
        i = ws;
        if src[i..].starts_with("}}") {
            let pipeline = parse_tokens(&tokens, start)?;
            return Ok((Some(pipeline), i + 2, false));
        }
        let Some(c) = src[i..].chars().next() else {
            return Err(TemplateError::syntax(start, "unclosed action"));
        };
        let (token, next) = match c {
            '|' => (Token::Pipe, i + 1),
            '(' => (Token::LParen, i + 1),
            ')' => (Token::RParen, i + 1),
            '"' => lex_quoted(src, i)?,
            '`' => lex_raw(src, i)?,
            '.' => lex_field(src, i)?,
            '$' => return Err(TemplateError::syntax(i, "variables are not supported")),
            c if c.is_ascii_digit() || c == '-' || c == '+' => lex_number(src, i)?,
            c if c.is_alphabetic() || c == '_' => lex_ident(src, i),
            c => return Err(TemplateError::syntax(i, format!("unexpected {c:?} in action"))),
        };
        tokens.push((i, token));
        i = next;
    }
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn expect_close(src: &str, i: usize) -> Result<(usize, bool)> {
    let ws = skip_whitespace(src.as_bytes(), i);
    if src[ws..].starts_with("-}}") && ws > i {
        Ok((ws + 3, true))
    } else if src[ws..].starts_with("}}") {
        Ok((ws + 2, false))
    } else {
        Err(TemplateError::syntax(ws, "comment ends before closing delimiter"))
    }
}

fn word_end(src: &str, start: usize) -> usize {
    src[start..]
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map_or(src.len(), |(n, _)| start + n)
}

fn lex_field(src: &str, i: usize) -> Result<(Token, usize)> {
    let end = word_end(src, i + 1);
    if end == i + 1 {
        return Err(TemplateError::syntax(i, "bare '.' is not supported, use .key"));
    }
    if src[end..].starts_with('.') {
        return Err(TemplateError::syntax(end, "nested field access is not supported"));
    }
    Ok((Token::Field(src[i + 1..end].to_string()), end))
}

fn lex_ident(src: &str, i: usize) -> (Token, usize) {
    let end = word_end(src, i);
    let word = &src[i..end];
    let token = match word {
        "true" => Token::Literal(Value::Bool(true)),
        "false" => Token::Literal(Value::Bool(false)),
        _ => Token::Ident(word.to_string()),
    };
    (token, end)
}

fn lex_number(src: &str, i: usize) -> Result<(Token, usize)> {
    let end = src[i + 1..]
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-')))
        .map_or(src.len(), |(n, _)| i + 1 + n);
    let text = &src[i..end];
    let digits = text.replace('_', "");
    let value = if let Ok(n) = digits.parse::<i64>() {
        Value::Int(n)
    } else if let Ok(x) = digits.parse::<f64>() {
        Value::Float(x)
    } else {
        return Err(TemplateError::syntax(i, format!("bad number syntax: {text:?}")));
    };
    Ok((Token::Literal(value), end))
}

fn lex_quoted(src: &str, i: usize) -> Result<(Token, usize)> {
    let mut out = String::new();
    let mut chars = src[i + 1..].char_indices();
    while let Some((n, c)) = chars.next() {
        match c {
            '"' => return Ok((Token::Literal(Value::Str(out)), i + 1 + n + 1)),
            '\\' => {
                let Some((_, esc)) = chars.next() else { break };
                out.push(match esc {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    '\\' => '\\',
                    '"' => '"',
                    '\'' => '\'',
                    other => {
                        return Err(TemplateError::syntax(
                            i + 1 + n,
                            format!("unknown escape sequence \\{other}"),
                        ));
                    }
                });
            }
            '\n' => return Err(TemplateError::syntax(i, "newline in string")),
            c => out.push(c),
        }
    }
    Err(TemplateError::syntax(i, "unterminated quoted string"))
}

fn lex_raw(src: &str, i: usize) -> Result<(Token, usize)> {
    match src[i + 1..].find('`') {
        Some(n) => Ok((
            Token::Literal(Value::Str(src[i + 1..i + 1 + n].to_string())),
            i + 1 + n + 1,
        )),
        None => Err(TemplateError::syntax(i, "unterminated raw quoted string")),
    }
}

// ---- parser ----

fn parse_tokens(tokens: &[(usize, Token)], start: usize) -> Result<Pipeline> {
    let mut idx = 0;
    let pipeline = parse_pipeline(tokens, &mut idx, start)?;
    match tokens.get(idx) {
        None => Ok(pipeline),
        Some((offset, token)) => Err(TemplateError::syntax(
            *offset,
            format!("unexpected {token:?} in operand"),
        )),
    }
}

fn parse_pipeline(tokens: &[(usize, Token)], idx: &mut usize, start: usize) -> Result<Pipeline> {
    let mut commands = Vec::new();
    loop {
        let offset = tokens.get(*idx).map_or(start, |(o, _)| *o);
        let command = parse_command(tokens, idx, offset)?;
        if !commands.is_empty() && !matches!(command.args[0], Arg::Func(_)) {
            return Err(TemplateError::syntax(
                offset,
                format!("non executable command in pipeline stage {}", commands.len() + 1),
            ));
        }
        commands.push(command);
        match tokens.get(*idx) {
            Some((_, Token::Pipe)) => *idx += 1,
            _ => return Ok(Pipeline { commands }),
        }
    }
}

fn parse_command(tokens: &[(usize, Token)], idx: &mut usize, offset: usize) -> Result<Command> {
    let mut args = Vec::new();
    while let Some((at, token)) = tokens.get(*idx) {
        let arg = match token {
            Token::Pipe | Token::RParen => break,
            Token::Field(name) => Arg::Field(name.clone()),
            Token::Literal(value) => Arg::Literal(value.clone()),
            Token::Ident(name) => match funcs::lookup(name) {
                Some(f) => Arg::Func(f),
                None => return Err(TemplateError::UnknownFunction(name.clone())),
            },
            Token::LParen => {
                *idx += 1;
                let sub = parse_pipeline(tokens, idx, *at)?;
                match tokens.get(*idx) {
                    Some((_, Token::RParen)) => {}
                    _ => return Err(TemplateError::syntax(*at, "unclosed left paren")),
                }
                Arg::Sub(sub)
            }
        };
        args.push(arg);
        *idx += 1;
    }
    if args.is_empty() {
        return Err(TemplateError::syntax(offset, "missing value for command"));
    }
    if args.len() > 1 && !matches!(args[0], Arg::Func(_)) {
        return Err(TemplateError::syntax(offset, "can't give argument to non-function"));
    }
    Ok(Command { args })
}

// ---- evaluation ----

fn eval_pipeline(pipeline: &Pipeline, params: &Params) -> Result<Value> {
    let mut piped = None;
    for command in &pipeline.commands {
        piped = Some(eval_command(command, params, piped)?);
    }
    piped.ok_or_else(|| TemplateError::syntax(0, "empty pipeline"))
}

fn eval_command(command: &Command, params: &Params, piped: Option<Value>) -> Result<Value> {
    match &command.args[0] {
        Arg::Func(f) => {
            let mut args = command.args[1..]
                .iter()
                .map(|arg| eval_arg(arg, params))
                .collect::<Result<Vec<_>>>()?;
            args.extend(piped);
            f.call(&args)
        }
        operand => eval_arg(operand, params),
    }
}

fn eval_arg(arg: &Arg, params: &Params) -> Result<Value> {
    match arg {
        Arg::Field(key) => params
            .get(key)
            .cloned()
            .ok_or_else(|| TemplateError::MissingKey(key.clone())),
        Arg::Literal(value) => Ok(value.clone()),
        Arg::Func(f) => f.call(&[]),
        Arg::Sub(pipeline) => eval_pipeline(pipeline, params),
    }
}
