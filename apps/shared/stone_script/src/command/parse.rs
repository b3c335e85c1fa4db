//! Command line tokenizing and argument coercion

use super::selector::{Selector, SelectorScope, display_name};
use super::types::{ArgType, ArgValue, CommandArgs, Overload};
use crate::error::CommandError;

/// One whitespace-separated token
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token text with quotes removed and escapes applied
    pub text: String,
    /// Byte offset of the token in the raw line
    pub start: usize,
}

/// Split a line on whitespace; double quotes group words and `\"` escapes a quote
///
/// An unterminated quote runs to the end of the line.
pub fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut text = String::new();
        let mut quoted = false;
        while let Some(&(_, c)) = chars.peek() {
            match c {
                '"' => {
                    quoted = !quoted;
                    chars.next();
                }
                '\\' if quoted => {
                    chars.next();
                    if let Some((_, escaped)) = chars.next() {
                        text.push(escaped);
                    }
                }
                c if c.is_whitespace() && !quoted => break,
                c => {
                    text.push(c);
                    chars.next();
                }
            }
        }
        tokens.push(Token { text, start });
    }
    tokens
}

/// A command line split into its name and argument tokens
#[derive(Debug, Clone)]
pub struct CommandLine<'a> {
    pub raw: &'a str,
    /// Lowercased command name without the leading `/`
    pub name: String,
    pub args: Vec<Token>,
}

impl<'a> CommandLine<'a> {
    pub fn parse(line: &'a str) -> Result<Self, CommandError> {
        let raw = line.trim();
        let raw = raw.strip_prefix('/').unwrap_or(raw);
        let mut tokens = tokenize(raw);
        if tokens.is_empty() {
            return Err(CommandError::Empty);
        }
        let name = tokens.remove(0).text.to_lowercase();
        Ok(Self {
            raw,
            name,
            args: tokens,
        })
    }

    /// Raw text from argument `index` to the end of the line
    fn rest(&self, index: usize) -> &'a str {
        self.args
            .get(index)
            .map_or("", |token| self.raw[token.start..].trim_end())
    }
}

/// Bind the line's tokens to an overload
///
/// Arguments consume tokens left to right: `position` takes three, `text`
/// and `message` take the rest, every other type one. A missing optional
/// argument is `None`; a missing required argument, a failed coercion or a
/// leftover token rejects the overload.
pub fn bind(overload: &Overload, line: &CommandLine<'_>, scope: &mut SelectorScope<'_>) -> Option<CommandArgs> {
    let tokens = &line.args;
    let mut next = 0;
    let mut bound = CommandArgs::default();

    for spec in &overload.args {
        if next >= tokens.len() {
            if !spec.optional {
                return None;
            }
            bound.push(&spec.name, None);
            continue;
        }

        let value = match spec.ty {
            ArgType::Text => ArgValue::String(line.rest(next).to_string()),
            ArgType::Message => ArgValue::String(render_message(&tokens[next..], scope)),
            ty => coerce(ty, tokens.get(next..next + ty.width())?, scope)?,
        };
        next = if spec.ty.is_greedy() {
            tokens.len()
        } else {
            next + spec.ty.width()
        };
        bound.push(&spec.name, Some(value));
    }

    (next == tokens.len()).then_some(bound)
}

/// Coerce the tokens of one non-greedy argument
pub fn coerce(ty: ArgType, tokens: &[Token], scope: &mut SelectorScope<'_>) -> Option<ArgValue> {
    let first = tokens.first()?.text.as_str();
    match ty {
        ArgType::String => Some(ArgValue::String(first.to_string())),
        ArgType::Int => first.parse::<i32>().ok().map(ArgValue::Int),
        ArgType::Float => parse_finite(first).map(ArgValue::Float),
        ArgType::Bool => match first {
            "true" => Some(ArgValue::Bool(true)),
            "false" => Some(ArgValue::Bool(false)),
            _ => None,
        },
        ArgType::Position => {
            let reference = scope.origin.world_pos;
            let mut position = [0.0; 3];
            for (axis, token) in tokens.iter().enumerate() {
                position[axis] = coordinate(&token.text, reference[axis])?;
            }
            Some(ArgValue::Position(position))
        }
        ArgType::Selector | ArgType::PlayerSelector => {
            let selector = first.parse::<Selector>().ok()?;
            let players_only = ty == ArgType::PlayerSelector;
            Some(ArgValue::Entities(selector.resolve(players_only, scope)))
        }
        ArgType::Text | ArgType::Message => Some(ArgValue::String(first.to_string())),
    }
}

fn parse_finite(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `N`, `~` or `~N` against the reference coordinate
fn coordinate(token: &str, reference: f64) -> Option<f64> {
    match token.strip_prefix('~') {
        Some("") => Some(reference),
        Some(offset) => parse_finite(offset).map(|offset| reference + offset),
        None => parse_finite(token),
    }
}

/// Join message tokens, replacing `@` selectors with the names they match
fn render_message(tokens: &[Token], scope: &mut SelectorScope<'_>) -> String {
    let mut words = Vec::with_capacity(tokens.len());
    for token in tokens {
        let selector = token
            .text
            .starts_with('@')
            .then(|| token.text.parse::<Selector>().ok())
            .flatten();
        match selector {
            Some(selector) => {
                let ctx = scope.ctx;
                let names: Vec<String> = selector
                    .resolve(false, scope)
                    .into_iter()
                    .map(|entity| display_name(ctx.entities, ctx.components, entity))
                    .collect();
                words.push(names.join(", "));
            }
            None => words.push(token.text.clone()),
        }
    }
    words.join(" ")
}
