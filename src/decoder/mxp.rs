//! MXP tag and entity parsing
//!
//! Tokenizes the contents of an MXP tag (`<...>`) into a name and a list
//! of positional/keyword arguments, with quote handling, and resolves
//! entity references (`&...;`). The decoder applies the parsed tags to
//! its style and tag-stack state.

use std::collections::HashMap;

/// One parsed tag argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// Lowercased keyword, or `None` for a positional argument
    pub name: Option<String>,
    pub value: String,
}

/// A parsed MXP tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Lowercased element name
    pub name: String,
    pub is_closing: bool,
    pub args: Vec<Argument>,
}

impl Tag {
    /// Parse the text between `<` and `>`
    pub fn parse(text: &str) -> Result<Self, String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err("empty tag".to_owned());
        }
        let (is_closing, body) = match trimmed.strip_prefix('/') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };
        let mut tokens = tokenize(body)?;
        if tokens.is_empty() {
            return Err("tag has no name".to_owned());
        }
        let first = tokens.remove(0);
        if first.name.is_some() {
            return Err(format!("tag name may not carry a value: {text}"));
        }
        let name = first.value.to_ascii_lowercase();
        if is_closing && !tokens.is_empty() {
            return Err(format!("closing tag may not carry arguments: {text}"));
        }
        Ok(Self {
            name,
            is_closing,
            args: tokens,
        })
    }

    /// Keyword argument lookup, case-insensitive
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|arg| arg.name.as_deref() == Some(keyword))
            .map(|arg| arg.value.as_str())
    }

    /// Nth positional argument
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.args
            .iter()
            .filter(|arg| arg.name.is_none())
            .nth(index)
            .map(|arg| arg.value.as_str())
    }

    /// Whether a bare keyword (flag) is present
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args
            .iter()
            .any(|arg| arg.name.is_none() && arg.value.eq_ignore_ascii_case(flag))
    }
}

/// Split a tag body into arguments, honoring single and double quotes
fn tokenize(body: &str) -> Result<Vec<Argument>, String> {
    let mut args = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut name: Option<String> = None;
        let mut value = String::new();
        let mut quote: Option<char> = None;
        loop {
            let Some(&c) = chars.peek() else {
                if quote.is_some() {
                    return Err("unterminated quote in tag".to_owned());
                }
                break;
            };
            match quote {
                Some(q) if c == q => {
                    quote = None;
                    chars.next();
                }
                Some(_) => {
                    value.push(c);
                    chars.next();
                }
                None if c == '"' || c == '\'' => {
                    quote = Some(c);
                    chars.next();
                }
                None if c.is_whitespace() => break,
                None if c == '=' && name.is_none() => {
                    name = Some(std::mem::take(&mut value).to_ascii_lowercase());
                    chars.next();
                }
                None => {
                    value.push(c);
                    chars.next();
                }
            }
        }
        if let Some(ref keyword) = name {
            if keyword.is_empty() {
                return Err("argument with empty keyword".to_owned());
            }
        }
        args.push(Argument { name, value });
    }
    Ok(args)
}

/// Server-defined entities, plus the XML builtins
#[derive(Debug, Clone, Default)]
pub struct EntityMap {
    entities: HashMap<String, String>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.entities.insert(name.to_owned(), value.to_owned());
    }

    pub fn unset(&mut self, name: &str) {
        self.entities.remove(name);
    }

    /// Resolve an entity name (the text between `&` and `;`)
    pub fn resolve(&self, name: &str) -> Option<String> {
        if let Some(digits) = name.strip_prefix('#') {
            return numeric_entity(digits);
        }
        match name {
            "amp" => Some("&".to_owned()),
            "lt" => Some("<".to_owned()),
            "gt" => Some(">".to_owned()),
            "quot" => Some("\"".to_owned()),
            "apos" => Some("'".to_owned()),
            "nbsp" => Some("\u{a0}".to_owned()),
            _ => self.entities.get(name).cloned(),
        }
    }
}

/// `&#nn;` (decimal) or `&#xhh;` (hex) character reference
fn numeric_entity(digits: &str) -> Option<String> {
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code).map(String::from)
}

/// Whether a byte may appear in an entity reference
pub fn is_entity_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'#' | b'_' | b'-' | b'.')
}
