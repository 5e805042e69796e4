//! Menus constrain one argument position. A checker converts raw wire tokens against one.

use std::fmt;
use std::sync::Arc;

use crate::descriptor::DefinitionError;
use crate::signature::ConversionError;
use crate::value::Value;

/// Default applied by an editable menu when a token is not listed.
#[derive(Clone)]
pub enum Fallback {
    Value(Value),
    Map(Arc<dyn Fn(&str) -> Value + Send + Sync>),
}

impl Fallback {
    pub fn map(f: impl Fn(&str) -> Value + Send + Sync + 'static) -> Self {
        Fallback::Map(Arc::new(f))
    }

    fn apply(&self, token: &str) -> Value {
        match self {
            Fallback::Value(v) => v.clone(),
            Fallback::Map(f) => f(token),
        }
    }
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Fallback::Map(_) => f.write_str("Map(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Menu {
    /// Allowed tokens, passed through unchanged.
    Items(Vec<String>),
    /// Token to semantic value.
    Mapping {
        entries: Vec<(String, Value)>,
        fallback: Option<Fallback>,
    },
}

impl Menu {
    pub fn items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Menu::Items(items.into_iter().map(Into::into).collect())
    }

    pub fn mapping<I, S, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        Menu::Mapping {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            fallback: None,
        }
    }

    /// Attach the editable-menu default. An item menu becomes an identity mapping.
    pub fn with_fallback(self, fallback: Fallback) -> Self {
        match self {
            Menu::Items(items) => Menu::Mapping {
                entries: items
                    .into_iter()
                    .map(|t| {
                        let v = Value::Text(t.clone());
                        (t, v)
                    })
                    .collect(),
                fallback: Some(fallback),
            },
            Menu::Mapping { entries, .. } => Menu::Mapping {
                entries,
                fallback: Some(fallback),
            },
        }
    }

    /// Listed tokens, in declaration order.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Menu::Items(items) => items.clone(),
            Menu::Mapping { entries, .. } => entries.iter().map(|(k, _)| k.clone()).collect(),
        }
    }

    fn lookup(&self, token: &str) -> Option<Value> {
        match self {
            Menu::Items(items) => items
                .iter()
                .any(|t| t == token)
                .then(|| Value::Text(token.to_string())),
            Menu::Mapping { entries, .. } => entries
                .iter()
                .find(|(k, _)| k == token)
                .map(|(_, v)| v.clone()),
        }
    }

    fn fallback(&self) -> Option<&Fallback> {
        match self {
            Menu::Items(_) => None,
            Menu::Mapping { fallback, .. } => fallback.as_ref(),
        }
    }

    /// Arrays become item menus, objects become mappings. Anything else is rejected.
    pub fn from_json(name: &str, json: &serde_json::Value) -> Result<Self, DefinitionError> {
        match json {
            serde_json::Value::Array(items) => Ok(Menu::Items(
                items
                    .iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            )),
            serde_json::Value::Object(map) => Ok(Menu::Mapping {
                entries: map
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                    .collect(),
                fallback: None,
            }),
            _ => Err(DefinitionError::InvalidMenuType(name.to_string())),
        }
    }
}

/// Converter for `%m.<menu>` (strict) and `%d.<menu>` (editable) placeholders.
#[derive(Debug, Clone)]
pub struct MenuChecker {
    menu_name: String,
    menu: Arc<Menu>,
    editable: bool,
}

impl MenuChecker {
    pub fn strict(menu_name: impl Into<String>, menu: Arc<Menu>) -> Self {
        Self {
            menu_name: menu_name.into(),
            menu,
            editable: false,
        }
    }

    pub fn editable(menu_name: impl Into<String>, menu: Arc<Menu>) -> Self {
        Self {
            menu_name: menu_name.into(),
            menu,
            editable: true,
        }
    }

    pub fn menu_name(&self) -> &str {
        &self.menu_name
    }

    /// Strict checkers fail on unlisted tokens; editable ones never fail.
    pub fn convert(&self, token: &str) -> Result<Value, ConversionError> {
        if let Some(v) = self.menu.lookup(token) {
            return Ok(v);
        }
        if !self.editable {
            return Err(ConversionError::NotInMenu {
                menu: self.menu_name.clone(),
                token: token.to_string(),
            });
        }
        Ok(match self.menu.fallback() {
            Some(f) => f.apply(token),
            None => Value::Text(token.to_string()),
        })
    }

    pub fn elements(&self) -> Vec<String> {
        self.menu.tokens()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hands() -> Arc<Menu> {
        Arc::new(Menu::items(["left", "right"]))
    }

    #[test]
    fn strict_item_menu() {
        let c = MenuChecker::strict("hands", hands());
        assert_eq!(c.convert("left").unwrap(), Value::from("left"));
        assert!(matches!(
            c.convert("up"),
            Err(ConversionError::NotInMenu { ref menu, ref token }) if menu == "hands" && token == "up"
        ));
        assert_eq!(c.elements(), vec!["left", "right"]);
    }

    #[test]
    fn strict_mapping_menu() {
        let m = Arc::new(Menu::mapping([("one", 1), ("two", 2)]));
        let c = MenuChecker::strict("n", m);
        assert_eq!(c.convert("two").unwrap(), Value::from(2));
        assert!(c.convert("three").is_err());
    }

    #[test]
    fn editable_without_fallback_stringifies() {
        let c = MenuChecker::editable("hands", hands());
        assert_eq!(c.convert("right").unwrap(), Value::from("right"));
        assert_eq!(c.convert("12").unwrap(), Value::from("12"));
    }

    #[test]
    fn editable_fallback_value_and_map() {
        let m = Arc::new(Menu::mapping([("one", 1)]).with_fallback(Fallback::Value(Value::from(0))));
        let c = MenuChecker::editable("n", m);
        assert_eq!(c.convert("one").unwrap(), Value::from(1));
        assert_eq!(c.convert("xx").unwrap(), Value::from(0));

        let m = Arc::new(
            Menu::items(["a"]).with_fallback(Fallback::map(|t| Value::from(t.len() as i64))),
        );
        let c = MenuChecker::editable("len", m);
        assert_eq!(c.convert("a").unwrap(), Value::from("a"));
        assert_eq!(c.convert("abcd").unwrap(), Value::from(4));
    }

    #[test]
    fn strict_checker_ignores_fallback() {
        let m = Arc::new(Menu::items(["a"]).with_fallback(Fallback::Value(Value::from(0))));
        assert!(MenuChecker::strict("m", m).convert("b").is_err());
    }

    #[test]
    fn from_json_shapes() {
        let m = Menu::from_json("m", &serde_json::json!(["a", 3])).unwrap();
        assert_eq!(m.tokens(), vec!["a", "3"]);
        let m = Menu::from_json("m", &serde_json::json!({"on": true})).unwrap();
        let c = MenuChecker::strict("m", Arc::new(m));
        assert_eq!(c.convert("on").unwrap(), Value::from(true));
        assert!(matches!(
            Menu::from_json("m", &serde_json::json!(4)),
            Err(DefinitionError::InvalidMenuType(ref n)) if n == "m"
        ));
    }
}
