//! Description parser: placeholders in a block description become an ordered list of
//! argument converters.
//!
//! | placeholder  | converter                         |
//! |--------------|-----------------------------------|
//! | `%s`         | text, unchanged                   |
//! | `%n`         | number (`f64`)                    |
//! | `%b`         | boolean, case-insensitive `true`  |
//! | `%m.<menu>`  | strict menu lookup                |
//! | `%d.<menu>`  | editable menu lookup              |

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::block::BlockError;
use crate::descriptor::DefinitionError;
use crate::menu::{Menu, MenuChecker};
use crate::value::Value;

// Menu names end at whitespace or a dot, so "%m.hands." names "hands".
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%(s|n|b|[md]\.[^\s.]+)").expect("placeholder regex"));

/// Failure converting one raw argument.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("not a number: {0:?}")]
    NotANumber(String),
    #[error("{token:?} is not in menu {menu}")]
    NotInMenu { menu: String, token: String },
}

#[derive(Debug, Clone)]
pub enum Converter {
    Text,
    Number,
    Boolean,
    Menu(MenuChecker),
}

impl Converter {
    pub fn convert(&self, raw: &str) -> Result<Value, ConversionError> {
        match self {
            Converter::Text => Ok(Value::Text(raw.to_string())),
            Converter::Number => raw
                .trim()
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| ConversionError::NotANumber(raw.to_string())),
            Converter::Boolean => Ok(Value::Bool(raw.to_lowercase() == "true")),
            Converter::Menu(checker) => checker.convert(raw),
        }
    }

    /// Accepted tokens. Only menu converters enumerate.
    pub fn elements(&self) -> Option<Vec<String>> {
        match self {
            Converter::Menu(checker) => Some(checker.elements()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Signature {
    converters: Vec<Converter>,
}

impl Signature {
    /// Parse `template`, resolving menu placeholders against `menus`.
    pub fn parse(
        template: &str,
        menus: &BTreeMap<String, Arc<Menu>>,
    ) -> Result<Self, DefinitionError> {
        let mut converters = Vec::new();
        for cap in PLACEHOLDER.captures_iter(template) {
            let spec = &cap[1];
            let converter = match spec {
                "s" => Converter::Text,
                "n" => Converter::Number,
                "b" => Converter::Boolean,
                _ => {
                    let (kind, name) = spec.split_at(1);
                    let name = &name[1..];
                    let menu = menus
                        .get(name)
                        .cloned()
                        .ok_or_else(|| DefinitionError::MissingMenu(name.to_string()))?;
                    if kind == "m" {
                        Converter::Menu(MenuChecker::strict(name, menu))
                    } else {
                        Converter::Menu(MenuChecker::editable(name, menu))
                    }
                }
            };
            converters.push(converter);
        }
        Ok(Self { converters })
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    pub fn converters(&self) -> &[Converter] {
        &self.converters
    }

    /// Arity must match exactly; each argument goes through its positional converter.
    pub fn convert<S: AsRef<str>>(&self, raw: &[S]) -> Result<Vec<Value>, BlockError> {
        if raw.len() != self.converters.len() {
            return Err(BlockError::Arity {
                expected: self.converters.len(),
                got: raw.len(),
            });
        }
        self.converters
            .iter()
            .zip(raw)
            .map(|(c, r)| c.convert(r.as_ref()).map_err(BlockError::from))
            .collect()
    }
}
