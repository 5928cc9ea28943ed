//! Naming template rendering
//!
//! Templates are plain text with `{{ ... }}` actions. An action names a
//! context field and may pipe it through string functions:
//!
//! ```text
//! {{ .Project }}_{{ .Tag | trimPrefix `v` }}_{{ .Os }}-{{ .Arch | upper }}
//! ```
//!
//! Supported functions: `upper`, `lower`, `trimPrefix s`, `trimSuffix s`,
//! `replace old new`. String arguments use backticks or double quotes.

use std::sync::OnceLock;

use regex_lite::Regex;
use relforge_plugin::BuildInfo;

/// Template errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unclosed action in template {0:?}")]
    Unclosed(String),

    #[error("empty action in template {0:?}")]
    EmptyAction(String),

    #[error("unterminated string in action {0:?}")]
    UnterminatedString(String),

    #[error("action {0:?} must start with a field reference like .Tag")]
    BadField(String),

    #[error("unknown field .{0}")]
    UnknownField(String),

    #[error("unknown function {0:?}")]
    UnknownFunction(String),

    #[error("function {func} takes {expected} argument(s), got {got}")]
    BadArguments {
        func: String,
        expected: usize,
        got: usize,
    },
}

/// Source of field values for rendering
pub trait TemplateContext {
    /// Look up a field by name (without the leading dot)
    fn field(&self, name: &str) -> Option<&str>;
}

impl TemplateContext for BuildInfo {
    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "Project" => Some(&self.project),
            "Tag" => Some(&self.tag),
            "Os" | "Goos" => Some(&self.os),
            "Arch" | "Goarch" => Some(&self.arch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Func {
    Upper,
    Lower,
    TrimPrefix(String),
    TrimSuffix(String),
    Replace(String, String),
}

impl Func {
    fn apply(&self, value: String) -> String {
        match self {
            Func::Upper => value.to_uppercase(),
            Func::Lower => value.to_lowercase(),
            Func::TrimPrefix(p) => value.strip_prefix(p.as_str()).map(str::to_string).unwrap_or(value),
            Func::TrimSuffix(s) => value.strip_suffix(s.as_str()).map(str::to_string).unwrap_or(value),
            Func::Replace(old, new) => value.replace(old.as_str(), new),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Action { field: String, funcs: Vec<Func> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Str(String),
    Pipe,
}

/// A parsed naming template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

fn action_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(.*?)\}\}").expect("valid action regex"))
}

impl Template {
    /// Parse a template, validating syntax and function names
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut parts = Vec::new();
        let mut last = 0;

        for caps in action_regex().captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            push_text(&mut parts, source, &source[last..whole.start()])?;
            parts.push(parse_action(caps.get(1).map_or("", |m| m.as_str()))?);
            last = whole.end();
        }
        push_text(&mut parts, source, &source[last..])?;

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    /// Render against a context
    pub fn render<C: TemplateContext>(&self, ctx: &C) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Action { field, funcs } => {
                    let value = ctx
                        .field(field)
                        .ok_or_else(|| TemplateError::UnknownField(field.clone()))?;
                    let value = funcs.iter().fold(value.to_string(), |v, f| f.apply(v));
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }

    /// The template text as written
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Parse and render in one step.
pub fn render<C: TemplateContext>(source: &str, ctx: &C) -> Result<String, TemplateError> {
    Template::parse(source)?.render(ctx)
}

fn push_text(parts: &mut Vec<Part>, source: &str, text: &str) -> Result<(), TemplateError> {
    if text.contains("{{") {
        return Err(TemplateError::Unclosed(source.to_string()));
    }
    if !text.is_empty() {
        parts.push(Part::Text(text.to_string()));
    }
    Ok(())
}

fn parse_action(body: &str) -> Result<Part, TemplateError> {
    let tokens = tokenize(body)?;
    let mut commands = tokens.split(|t| *t == Token::Pipe);

    let field = match commands.next() {
        Some([Token::Word(word)]) => word
            .strip_prefix('.')
            .filter(|name| !name.is_empty())
            .ok_or_else(|| TemplateError::BadField(body.trim().to_string()))?
            .to_string(),
        Some([]) | None => return Err(TemplateError::EmptyAction(body.to_string())),
        Some(_) => return Err(TemplateError::BadField(body.trim().to_string())),
    };

    let funcs = commands.map(parse_func).collect::<Result<Vec<_>, _>>()?;
    Ok(Part::Action { field, funcs })
}

fn parse_func(command: &[Token]) -> Result<Func, TemplateError> {
    let (name, args) = match command.split_first() {
        Some((Token::Word(name), args)) => (name.as_str(), args),
        Some((Token::Str(s), _)) => return Err(TemplateError::UnknownFunction(s.clone())),
        _ => return Err(TemplateError::UnknownFunction(String::new())),
    };

    let args: Vec<String> = args
        .iter()
        .map(|t| match t {
            Token::Str(s) | Token::Word(s) => s.clone(),
            Token::Pipe => String::new(),
        })
        .collect();

    let expect = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(TemplateError::BadArguments {
                func: name.to_string(),
                expected: n,
                got: args.len(),
            })
        }
    };

    match name {
        "upper" => expect(0).map(|_| Func::Upper),
        "lower" => expect(0).map(|_| Func::Lower),
        "trimPrefix" => expect(1).map(|_| Func::TrimPrefix(args[0].clone())),
        "trimSuffix" => expect(1).map(|_| Func::TrimSuffix(args[0].clone())),
        "replace" => expect(2).map(|_| Func::Replace(args[0].clone(), args[1].clone())),
        other => Err(TemplateError::UnknownFunction(other.to_string())),
    }
}

fn tokenize(body: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '`' | '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == c => break,
                        Some(ch) => s.push(ch),
                        None => return Err(TemplateError::UnterminatedString(body.to_string())),
                    }
                }
                tokens.push(Token::Str(s));
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || ch == '|' || ch == '`' || ch == '"' {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    Ok(tokens)
}
