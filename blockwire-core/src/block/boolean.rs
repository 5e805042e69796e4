use std::collections::HashSet;
use std::sync::Arc;

use super::{Block, BlockError, Busy, Cgi, PollMap, ReadFn, Reporter, ResetFn};
use crate::descriptor::BlockDescriptor;
use crate::value::Value;

fn token(v: &Value) -> &'static str {
    if v.is_truthy() {
        "true"
    } else {
        "false"
    }
}

/// Reporter whose cells are truth values, reported as the literal tokens `true`/`false`.
#[derive(Clone)]
pub struct BooleanBlock {
    inner: Reporter,
}

impl BooleanBlock {
    pub fn new(descriptor: Arc<BlockDescriptor>, extension: &str) -> Self {
        Self {
            inner: Reporter::new(descriptor, extension),
        }
    }

    pub fn get<S: AsRef<str>>(&self, raw: &[S]) -> Result<&'static str, BlockError> {
        Ok(token(&self.inner.get(raw)?))
    }

    /// Store the truth value of `value`.
    pub fn set<S: AsRef<str>>(&self, value: impl Into<Value>, raw: &[S]) -> Result<(), BlockError> {
        let truth = value.into().is_truthy();
        self.inner.set(truth, raw)
    }

    /// Clear one cell. Non-boolean defaults are restored as declared.
    pub fn clear<S: AsRef<str>>(&self, raw: &[S]) -> Result<(), BlockError> {
        let cleared = match self.descriptor().default() {
            Value::Bool(_) | Value::Null => Value::Bool(false),
            other => other.clone(),
        };
        self.inner.set(cleared, raw)
    }

    pub fn set_do_read(&self, read: Option<ReadFn>) {
        self.inner.set_do_read(read);
    }

    pub fn has_do_read(&self) -> bool {
        self.inner.has_do_read()
    }
}

impl Block for BooleanBlock {
    fn descriptor(&self) -> &Arc<BlockDescriptor> {
        self.inner.descriptor()
    }

    fn extension(&self) -> &str {
        self.inner.extension()
    }

    fn busy(&self) -> HashSet<Busy> {
        self.inner.busy()
    }

    fn reset(&self) {
        self.inner.reset();
    }

    fn poll(&self) -> Result<PollMap, BlockError> {
        Ok(self
            .inner
            .poll()?
            .into_iter()
            .map(|(k, v)| (k, Value::from(token(&v))))
            .collect())
    }

    fn get_cgi(&self, path: &str) -> Option<Cgi> {
        let args = self.inner.claim(path)?;
        let this = self.clone();
        Some(Cgi::new(move || Ok(this.get(&args)?.to_string())))
    }

    fn set_on_reset(&self, hook: Option<ResetFn>) {
        self.inner.set_on_reset(hook);
    }
}
