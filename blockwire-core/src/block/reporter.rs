use std::collections::HashSet;
use std::sync::Arc;

use super::{Block, BlockError, Busy, Cgi, PollMap, ReadFn, ResetFn, Shared};
use crate::descriptor::BlockDescriptor;
use crate::signature::Signature;
use crate::value::{Value, ValueTree};

/// Sensor with arguments. Values are kept per converted argument tuple.
#[derive(Clone)]
pub struct Reporter {
    shared: Arc<Shared<ValueTree, ReadFn>>,
}

impl Reporter {
    pub fn new(descriptor: Arc<BlockDescriptor>, extension: &str) -> Self {
        let tree = ValueTree::with_fallback(descriptor.default().clone());
        Self {
            shared: Shared::new(descriptor, extension, tree),
        }
    }

    /// Convert `raw`, read through the callback if installed, and return the resolved value.
    pub fn get<S: AsRef<str>>(&self, raw: &[S]) -> Result<Value, BlockError> {
        let args = self.shared.descriptor.signature().convert(raw)?;
        self.read(&args)
    }

    pub(crate) fn read(&self, args: &[Value]) -> Result<Value, BlockError> {
        let fresh = match self.shared.callback() {
            Some(read) => read(args).map_err(BlockError::Callback)?,
            None => Value::Null,
        };
        let mut state = self.shared.state.lock();
        if !fresh.is_null() {
            state.value.store(fresh, args);
        }
        Ok(state.value.resolve(args))
    }

    /// Store `value` for `raw` without invoking the callback.
    pub fn set<S: AsRef<str>>(&self, value: impl Into<Value>, raw: &[S]) -> Result<(), BlockError> {
        let args = self.shared.descriptor.signature().convert(raw)?;
        self.store(value.into(), &args);
        Ok(())
    }

    pub(crate) fn store(&self, value: Value, args: &[Value]) {
        self.shared.state.lock().value.store(value, args);
    }

    /// Resolved value for `raw`, without reading.
    pub fn value<S: AsRef<str>>(&self, raw: &[S]) -> Result<Value, BlockError> {
        let args = self.shared.descriptor.signature().convert(raw)?;
        Ok(self.shared.state.lock().value.resolve(&args))
    }

    pub fn set_do_read(&self, read: Option<ReadFn>) {
        self.shared.set_callback(read);
    }

    pub fn has_do_read(&self) -> bool {
        self.shared.callback.read().is_some()
    }

    pub(crate) fn claim(&self, path: &str) -> Option<Vec<String>> {
        self.shared.claim(path)
    }
}

/// Every known argument tuple mapped to its resolved value.
///
/// Menu positions enumerate their tokens (keyed by the token, looked up by its converted
/// value) plus any other keys stored at that depth; other positions enumerate the stored
/// keys only.
pub(crate) fn poll_tree(signature: &Signature, tree: &ValueTree) -> PollMap {
    let mut out = PollMap::new();
    let mut shown = Vec::with_capacity(signature.len());
    let mut lookup = Vec::with_capacity(signature.len());
    walk(signature, 0, tree, Some(tree), &mut shown, &mut lookup, &mut out);
    out
}

fn walk(
    signature: &Signature,
    pos: usize,
    root: &ValueTree,
    level: Option<&ValueTree>,
    shown: &mut Vec<Value>,
    lookup: &mut Vec<Value>,
    out: &mut PollMap,
) {
    let Some(converter) = signature.converters().get(pos) else {
        out.insert(shown.clone(), root.resolve(lookup));
        return;
    };
    let mut candidates: Vec<(Value, Value)> = match converter.elements() {
        Some(tokens) => tokens
            .into_iter()
            .filter_map(|t| {
                let key = converter.convert(&t).ok()?;
                Some((Value::Text(t), key))
            })
            .collect(),
        None => Vec::new(),
    };
    // Stored keys outside the menu (editable menus accept free tokens).
    if let Some(l) = level {
        let extra: Vec<(Value, Value)> = l
            .keys()
            .filter(|k| !candidates.iter().any(|(_, key)| key == *k))
            .map(|k| (k.clone(), k.clone()))
            .collect();
        candidates.extend(extra);
    }
    for (show, key) in candidates {
        let next = level.and_then(|l| l.child(&key));
        shown.push(show);
        lookup.push(key);
        walk(signature, pos + 1, root, next, shown, lookup, out);
        shown.pop();
        lookup.pop();
    }
}

impl Block for Reporter {
    fn descriptor(&self) -> &Arc<BlockDescriptor> {
        &self.shared.descriptor
    }

    fn extension(&self) -> &str {
        &self.shared.extension
    }

    fn busy(&self) -> HashSet<Busy> {
        self.shared.busy()
    }

    fn reset(&self) {
        let tree = ValueTree::with_fallback(self.shared.descriptor.default().clone());
        self.shared.reset_with(|v| *v = tree);
    }

    /// Scalar reporters read; argumented ones report stored values only.
    fn poll(&self) -> Result<PollMap, BlockError> {
        let signature = self.shared.descriptor.signature();
        if signature.is_empty() {
            return Ok(PollMap::from([(Vec::new(), self.read(&[])?)]));
        }
        let state = self.shared.state.lock();
        Ok(poll_tree(signature, &state.value))
    }

    fn get_cgi(&self, path: &str) -> Option<Cgi> {
        let args = self.shared.claim(path)?;
        let this = self.clone();
        Some(Cgi::new(move || Ok(this.get(&args)?.to_string())))
    }

    fn set_on_reset(&self, hook: Option<ResetFn>) {
        *self.shared.on_reset.write() = hook;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::read_fn;
    use crate::menu::Menu;

    fn hands(default: &str) -> Reporter {
        let d = BlockDescriptor::reporter("fingers")
            .description("fingers on %m.hands")
            .menu("hands", Menu::items(["a", "b"]))
            .default_value(default)
            .build()
            .unwrap();
        Reporter::new(d, "ext")
    }

    fn key(s: &str) -> Vec<Value> {
        vec![Value::from(s)]
    }

    #[test]
    fn poll_cross_product_with_defaults() {
        let r = hands("d");
        let p = r.poll().unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p[&key("a")], Value::from("d"));
        assert_eq!(p[&key("b")], Value::from("d"));

        r.set("x", &["a"]).unwrap();
        let p = r.poll().unwrap();
        assert_eq!(p[&key("a")], Value::from("x"));
        assert_eq!(p[&key("b")], Value::from("d"));
    }

    #[test]
    fn poll_never_reads() {
        let r = hands("d");
        r.set_do_read(Some(read_fn(|_| panic!("poll must not read"))));
        assert_eq!(r.poll().unwrap().len(), 2);
    }

    #[test]
    fn get_reads_and_stores_per_argument() {
        let r = hands("d");
        r.set_do_read(Some(read_fn(|args| {
            Ok(Value::from(format!("read {}", args[0])))
        })));
        assert_eq!(r.get(&["b"]).unwrap(), Value::from("read b"));
        r.set_do_read(None);
        assert_eq!(r.get(&["b"]).unwrap(), Value::from("read b"));
        assert_eq!(r.get(&["a"]).unwrap(), Value::from("d"));
    }

    #[test]
    fn arity_and_conversion_errors_do_not_mutate() {
        let r = hands("d");
        assert!(matches!(r.get::<&str>(&[]), Err(BlockError::Arity { expected: 1, got: 0 })));
        assert!(matches!(r.set("x", &["c"]), Err(BlockError::Conversion(_))));
        assert!(r.set("x", &["a", "b"]).is_err());
        let p = r.poll().unwrap();
        assert!(p.values().all(|v| v == &Value::from("d")));
    }

    #[test]
    fn numeric_positions_poll_seen_keys() {
        let d = BlockDescriptor::reporter("at")
            .description("value at %n %m.hands")
            .menu("hands", Menu::items(["a", "b"]))
            .default_value(0)
            .build()
            .unwrap();
        let r = Reporter::new(d, "ext");
        assert!(r.poll().unwrap().is_empty());
        r.set(7, &["2", "b"]).unwrap();
        let p = r.poll().unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p[&vec![Value::from(2), Value::from("b")]], Value::from(7));
        assert_eq!(p[&vec![Value::from(2), Value::from("a")]], Value::from(0));
    }

    #[test]
    fn mapping_menu_polls_by_token() {
        let d = BlockDescriptor::reporter("level")
            .description("level %m.ch")
            .menu("ch", Menu::mapping([("one", 1), ("two", 2)]))
            .build()
            .unwrap();
        let r = Reporter::new(d, "ext");
        r.set("hi", &["two"]).unwrap();
        let p = r.poll().unwrap();
        assert_eq!(p[&key("two")], Value::from("hi"));
        assert_eq!(p[&key("one")], Value::from(""));
    }

    #[test]
    fn editable_menu_polls_free_tokens() {
        let d = BlockDescriptor::reporter("color")
            .description("color of %d.led")
            .menu("led", Menu::items(["red", "green"]))
            .build()
            .unwrap();
        let r = Reporter::new(d, "ext");
        r.set("on", &["blue"]).unwrap();
        let p = r.poll().unwrap();
        assert_eq!(p.len(), 3);
        assert_eq!(p[&key("blue")], Value::from("on"));
        assert_eq!(p[&key("red")], Value::from(""));
    }

    #[test]
    fn scalar_reporter_collapses() {
        let d = BlockDescriptor::reporter("r").default_value(4).build().unwrap();
        let r = Reporter::new(d, "ext");
        assert_eq!(r.get::<&str>(&[]).unwrap(), Value::from(4));
        r.set(5, &[] as &[&str]).unwrap();
        assert_eq!(r.poll().unwrap()[&Vec::new()], Value::from(5));
        r.reset();
        assert_eq!(r.value::<&str>(&[]).unwrap(), Value::from(4));
    }

    #[test]
    fn cgi_claims_by_name() {
        let r = hands("d");
        r.set("x", &["a"]).unwrap();
        assert!(r.get_cgi("/other/a").is_none());
        assert_eq!(r.get_cgi("/fingers/a").unwrap().call().unwrap(), "x");
        let err = r.get_cgi("/fingers/z").unwrap().call().unwrap_err();
        assert!(err.is_client_error());
    }
}
