// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command templates with per-host placeholder substitution.
//!
//! Supported placeholders:
//! - `%s` takes the next positional value
//! - `%(name)s` looks `name` up in a named mapping
//! - `%%` is a literal percent sign
//!
//! A template uses either positional or named placeholders, never both.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("incomplete placeholder at offset {position}")]
    Incomplete { position: usize },

    #[error("unsupported conversion '%{conversion}' at offset {position}")]
    UnsupportedConversion { position: usize, conversion: char },

    #[error("template mixes positional and named placeholders")]
    MixedPlaceholders,

    #[error("template needs {expected} positional values, got {supplied}")]
    NotEnoughArguments { expected: usize, supplied: usize },

    #[error("template takes {expected} positional values, got {supplied}")]
    TooManyArguments { expected: usize, supplied: usize },

    #[error("no value for placeholder '{key}'")]
    MissingKey { key: String },

    #[error("template uses named placeholders but positional values were given")]
    ExpectedMapping,

    #[error("template uses positional placeholders but a mapping was given")]
    ExpectedPositional,
}

/// Values substituted into a template for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostArgs {
    Positional(Vec<String>),
    Named(HashMap<String, String>),
}

impl From<Vec<String>> for HostArgs {
    fn from(values: Vec<String>) -> Self {
        HostArgs::Positional(values)
    }
}

impl From<Vec<&str>> for HostArgs {
    fn from(values: Vec<&str>) -> Self {
        HostArgs::Positional(values.into_iter().map(String::from).collect())
    }
}

impl From<&str> for HostArgs {
    fn from(value: &str) -> Self {
        HostArgs::Positional(vec![value.to_string()])
    }
}

impl From<String> for HostArgs {
    fn from(value: String) -> Self {
        HostArgs::Positional(vec![value])
    }
}

impl From<HashMap<String, String>> for HostArgs {
    fn from(values: HashMap<String, String>) -> Self {
        HostArgs::Named(values)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for HostArgs {
    fn from(pairs: [(&str, &str); N]) -> Self {
        HostArgs::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Positional,
    Named(String),
}

/// A parsed command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    segments: Vec<Segment>,
    positional: usize,
    named: usize,
}

impl CommandTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut positional = 0;
        let mut named = 0;
        let mut chars = template.char_indices().peekable();

        while let Some((position, c)) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            match chars.next() {
                Some((_, '%')) => literal.push('%'),
                Some((_, 's')) => {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    segments.push(Segment::Positional);
                    positional += 1;
                }
                Some((_, '(')) => {
                    let mut key = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == ')' {
                            closed = true;
                            break;
                        }
                        key.push(c);
                    }
                    match chars.next() {
                        Some((_, 's')) if closed => {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                            segments.push(Segment::Named(key));
                            named += 1;
                        }
                        Some((_, conversion)) if closed => {
                            return Err(TemplateError::UnsupportedConversion {
                                position,
                                conversion,
                            })
                        }
                        _ => return Err(TemplateError::Incomplete { position }),
                    }
                }
                Some((_, conversion)) => {
                    return Err(TemplateError::UnsupportedConversion {
                        position,
                        conversion,
                    })
                }
                None => return Err(TemplateError::Incomplete { position }),
            }
        }
        segments.push(Segment::Literal(literal));
        segments.retain(|s| !matches!(s, Segment::Literal(l) if l.is_empty()));

        if positional > 0 && named > 0 {
            return Err(TemplateError::MixedPlaceholders);
        }

        Ok(Self {
            segments,
            positional,
            named,
        })
    }

    /// Number of `%s` placeholders.
    pub fn positional_count(&self) -> usize {
        self.positional
    }

    /// Names used by `%(name)s` placeholders, in order of appearance.
    pub fn keys(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Named(key) => Some(key.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn render(&self, args: &HostArgs) -> Result<String, TemplateError> {
        match args {
            HostArgs::Positional(values) => {
                if self.named > 0 {
                    return Err(TemplateError::ExpectedMapping);
                }
                if values.len() < self.positional {
                    return Err(TemplateError::NotEnoughArguments {
                        expected: self.positional,
                        supplied: values.len(),
                    });
                }
                if values.len() > self.positional {
                    return Err(TemplateError::TooManyArguments {
                        expected: self.positional,
                        supplied: values.len(),
                    });
                }
            }
            HostArgs::Named(_) if self.positional > 0 => {
                return Err(TemplateError::ExpectedPositional)
            }
            HostArgs::Named(_) => {}
        }

        let mut values = match args {
            HostArgs::Positional(values) => values.as_slice(),
            HostArgs::Named(_) => &[],
        }
        .iter();
        let mut out = String::new();
        for segment in &self.segments {
            match (segment, args) {
                (Segment::Literal(text), _) => out.push_str(text),
                (Segment::Positional, _) => {
                    if let Some(value) = values.next() {
                        out.push_str(value);
                    }
                }
                (Segment::Named(key), HostArgs::Named(map)) => {
                    let value = map
                        .get(key)
                        .ok_or_else(|| TemplateError::MissingKey { key: key.clone() })?;
                    out.push_str(value);
                }
                (Segment::Named(_), HostArgs::Positional(_)) => {
                    return Err(TemplateError::ExpectedMapping)
                }
            }
        }
        Ok(out)
    }
}
