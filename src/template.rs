//! printf-style command templates.
//!
//! Command tables write set commands the way instrument manuals print them,
//! e.g. `":MEAS:VOLT:DC %s"` or `"SOUR:FREQ %.3f"`. A template is parsed once at
//! registration: each `%` placeholder is located with a regex and rewritten into
//! a `strfmt` format spec, which renders the value.
//!
//! Supported conversions: `%s`, `%d`, `%i`, `%x`, `%X`, `%o`, `%f`, `%e`, `%E`,
//! `%g`, with the flags `-`, `+`, space, `0` and `#`, a width and a `.N`
//! precision. `%%` renders a literal percent sign.
//!
//! `%g` renders the shortest decimal that round-trips; `%.Ng` renders `N`
//! significant digits in exponent form.

use crate::value::Value;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use strfmt::strfmt;
use thiserror::Error;

/// Matches `%%` or one printf placeholder: flags, width, precision, conversion.
static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%(?:(%)|([-+ 0#]*)(\d*)(?:\.(\d*))?(.?))").expect("Invalid placeholder regex")
});

/// Name of the `n`-th placeholder in the rewritten format string.
fn slot(n: usize) -> String {
    format!("v{}", n)
}

/// Errors raised while parsing or rendering a template.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// Wrong number of placeholders for the direction the template is used in.
    #[error("template '{template}' has {found} placeholder(s), expected {expected}")]
    PlaceholderCount {
        /// Template source.
        template: String,
        /// Placeholders found.
        found: usize,
        /// Placeholders required.
        expected: usize,
    },

    /// Conversion character outside the supported set.
    #[error("unsupported conversion '%{conversion}' in template '{template}'")]
    UnsupportedConversion {
        /// Template source.
        template: String,
        /// Offending conversion character.
        conversion: char,
    },

    /// Template ends inside a placeholder.
    #[error("incomplete placeholder at end of template '{0}'")]
    Incomplete(String),

    /// Flags, width and precision that do not combine with the conversion.
    #[error("invalid placeholder '{placeholder}' in template '{template}': {message}")]
    InvalidPlaceholder {
        /// Template source.
        template: String,
        /// The placeholder as written.
        placeholder: String,
        /// Formatter message.
        message: String,
    },

    /// The value cannot be rendered with the template's conversion.
    #[error("cannot format {value} ({}) with '%{conversion}'", .value.type_name())]
    Incompatible {
        /// Value being rendered.
        value: Value,
        /// Conversion character.
        conversion: char,
    },

    /// The formatter rejected the rendered command.
    #[error("cannot render template '{template}': {message}")]
    Render {
        /// Template source.
        template: String,
        /// Formatter message.
        message: String,
    },
}

/// What a conversion renders its value as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Argument {
    Text,
    Integer,
    Float,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    symbol: char,
    argument: Argument,
    spec: String,
    written: String,
}

impl Placeholder {
    fn from_captures(source: &str, caps: &Captures<'_>) -> Result<Self, TemplateError> {
        let written = caps.get(0).map_or("", |m| m.as_str()).to_string();
        let flags = caps.get(2).map_or("", |m| m.as_str());
        let width = caps.get(3).map_or("", |m| m.as_str());
        let precision = caps
            .get(4)
            .map(|m| m.as_str().parse::<usize>().unwrap_or(0));
        let symbol = caps
            .get(5)
            .and_then(|m| m.as_str().chars().next())
            .ok_or_else(|| TemplateError::Incomplete(source.to_string()))?;

        let (argument, ty) = match symbol {
            's' => (Argument::Text, None),
            'd' | 'i' => (Argument::Integer, None),
            'x' | 'X' | 'o' => (Argument::Integer, Some(symbol)),
            'f' | 'e' | 'E' => (Argument::Float, Some(symbol)),
            'g' => (Argument::Float, precision.map(|_| 'e')),
            other => {
                return Err(TemplateError::UnsupportedConversion {
                    template: source.to_string(),
                    conversion: other,
                })
            }
        };

        // printf flags in strfmt's [[fill]align][sign][#][width][.precision][type] order
        let mut spec = String::new();
        if !width.is_empty() {
            if flags.contains('-') {
                spec.push('<');
            } else if flags.contains('0') && argument != Argument::Text {
                spec.push_str("0=");
            } else {
                spec.push('>');
            }
        }
        if argument != Argument::Text {
            if flags.contains('+') {
                spec.push('+');
            } else if flags.contains(' ') {
                spec.push(' ');
            }
            if flags.contains('#') && argument == Argument::Integer {
                spec.push('#');
            }
        }
        spec.push_str(width);
        match (symbol, precision) {
            ('s', Some(p)) => spec.push_str(&format!(".{}", p)),
            ('f' | 'e' | 'E', p) => spec.push_str(&format!(".{}", p.unwrap_or(6))),
            ('g', Some(p)) => spec.push_str(&format!(".{}", p.max(1) - 1)),
            _ => {}
        }
        if let Some(ty) = ty {
            spec.push(ty);
        }

        let placeholder = Self {
            symbol,
            argument,
            spec,
            written,
        };
        placeholder.check(source)?;
        Ok(placeholder)
    }

    /// strfmt field for slot `n`.
    fn field(&self, n: usize) -> String {
        if self.spec.is_empty() {
            format!("{{{}}}", slot(n))
        } else {
            format!("{{{}:{}}}", slot(n), self.spec)
        }
    }

    /// Render a neutral value so a bad spec fails at registration.
    fn check(&self, source: &str) -> Result<(), TemplateError> {
        let sample = match self.argument {
            Argument::Text => Value::from(""),
            Argument::Integer => Value::Int(0),
            Argument::Float => Value::Float(0.0),
        };
        self.render(&self.field(0), &sample)
            .map(|_| ())
            .map_err(|e| TemplateError::InvalidPlaceholder {
                template: source.to_string(),
                placeholder: self.written.clone(),
                message: e,
            })
    }

    fn render(&self, format: &str, value: &Value) -> Result<String, String> {
        let key = slot(0);
        let rendered = match self.argument {
            Argument::Text => {
                let text = match value {
                    // SCPI booleans travel as 1/0
                    Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
                    other => other.to_string(),
                };
                strfmt(format, &HashMap::from([(key, text)]))
            }
            Argument::Integer => {
                let int = self.integer(value).ok_or_else(|| self.incompatible(value))?;
                strfmt(format, &HashMap::from([(key, int)]))
            }
            Argument::Float => {
                let float = self.float(value).ok_or_else(|| self.incompatible(value))?;
                strfmt(format, &HashMap::from([(key, float)]))
            }
        };
        rendered.map_err(|e| e.to_string())
    }

    fn integer(&self, value: &Value) -> Option<i64> {
        match value {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    fn float(&self, value: &Value) -> Option<f64> {
        match value {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            other => other.as_f64().filter(|f| f.is_finite()),
        }
    }

    fn incompatible(&self, value: &Value) -> String {
        TemplateError::Incompatible {
            value: value.clone(),
            conversion: self.symbol,
        }
        .to_string()
    }
}

/// A parsed command template.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTemplate {
    source: String,
    format: String,
    placeholders: Vec<Placeholder>,
}

impl CommandTemplate {
    /// Parse a template, accepting any number of placeholders.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut format = String::new();
        let mut placeholders = Vec::new();
        let mut last = 0;

        for caps in PLACEHOLDER_REGEX.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            format.push_str(&escape_braces(&source[last..whole.start()]));
            last = whole.end();

            if caps.get(1).is_some() {
                format.push('%');
                continue;
            }
            let placeholder = Placeholder::from_captures(source, &caps)?;
            format.push_str(&placeholder.field(placeholders.len()));
            placeholders.push(placeholder);
        }
        format.push_str(&escape_braces(&source[last..]));

        Ok(Self {
            source: source.to_string(),
            format,
            placeholders,
        })
    }

    /// Parse a template that must contain exactly `expected` placeholders.
    pub fn parse_with_placeholders(source: &str, expected: usize) -> Result<Self, TemplateError> {
        let template = Self::parse(source)?;
        if template.placeholders.len() != expected {
            return Err(TemplateError::PlaceholderCount {
                template: source.to_string(),
                found: template.placeholders.len(),
                expected,
            });
        }
        Ok(template)
    }

    /// The template as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of placeholders.
    pub fn placeholder_count(&self) -> usize {
        self.placeholders.len()
    }

    /// Render a template without placeholders (a fixed query).
    pub fn render_fixed(&self) -> Result<String, TemplateError> {
        if !self.placeholders.is_empty() {
            return Err(TemplateError::PlaceholderCount {
                template: self.source.clone(),
                found: self.placeholders.len(),
                expected: 0,
            });
        }
        strfmt(&self.format, &HashMap::<String, String>::new()).map_err(|e| {
            TemplateError::Render {
                template: self.source.clone(),
                message: e.to_string(),
            }
        })
    }

    /// Render a single-placeholder template with `value`.
    pub fn render(&self, value: &Value) -> Result<String, TemplateError> {
        let [placeholder] = self.placeholders.as_slice() else {
            return Err(TemplateError::PlaceholderCount {
                template: self.source.clone(),
                found: self.placeholders.len(),
                expected: 1,
            });
        };
        let representable = match placeholder.argument {
            Argument::Text => true,
            Argument::Integer => placeholder.integer(value).is_some(),
            Argument::Float => placeholder.float(value).is_some(),
        };
        if !representable {
            return Err(TemplateError::Incompatible {
                value: value.clone(),
                conversion: placeholder.symbol,
            });
        }
        placeholder
            .render(&self.format, value)
            .map_err(|message| TemplateError::Render {
                template: self.source.clone(),
                message,
            })
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn escape_braces(literal: &str) -> String {
    literal.replace('{', "{{").replace('}', "}}")
}
