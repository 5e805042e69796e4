//! Live blocks and their value protocol.
//!
//! Every block keeps its value and busy set under one lock. Callbacks run outside that
//! lock; only map mutations happen while it is held. Asynchronous kinds run their callback
//! on a detached worker thread and correlate it with a caller-supplied busy token.

mod any;
mod boolean;
mod command;
mod hat;
mod reporter;
mod requester;
mod sensor;

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::descriptor::{BlockDescriptor, BlockKind};
use crate::signature::{ConversionError, Signature};
use crate::value::Value;

pub use any::AnyBlock;
pub use boolean::BooleanBlock;
pub use command::{Command, WaiterCommand};
pub use hat::Hat;
pub use reporter::Reporter;
pub use requester::Requester;
pub use sensor::Sensor;

/// Caller-supplied token correlating an asynchronous request with its result.
pub type Busy = i64;

pub type CallbackError = Box<dyn Error + Send + Sync>;

/// Reads a value for the converted arguments. `Value::Null` keeps the stored value.
pub type ReadFn = Arc<dyn Fn(&[Value]) -> Result<Value, CallbackError> + Send + Sync>;
pub type CommandFn = Arc<dyn Fn(&[Value]) -> Result<(), CallbackError> + Send + Sync>;
pub type FlagFn = Arc<dyn Fn() -> bool + Send + Sync>;
/// Runs while the block lock is held; must not call back into the block.
pub type ResetFn = Arc<dyn Fn() + Send + Sync>;

/// Argument tuple (empty for scalar blocks) to resolved value.
pub type PollMap = HashMap<Vec<Value>, Value>;

/// Value recorded for a failed asynchronous read.
pub const INVALID: &str = "invalid";

/// The primary callback a block is driven by.
#[derive(Clone)]
pub enum Callback {
    Read(ReadFn),
    Command(CommandFn),
    Flag(FlagFn),
}

impl Callback {
    pub fn family(&self) -> &'static str {
        match self {
            Callback::Read(_) => "read",
            Callback::Command(_) => "command",
            Callback::Flag(_) => "flag",
        }
    }
}

impl From<ReadFn> for Callback {
    fn from(f: ReadFn) -> Self {
        Callback::Read(f)
    }
}

impl From<CommandFn> for Callback {
    fn from(f: CommandFn) -> Self {
        Callback::Command(f)
    }
}

impl From<FlagFn> for Callback {
    fn from(f: FlagFn) -> Self {
        Callback::Flag(f)
    }
}

pub fn read_fn(
    f: impl Fn(&[Value]) -> Result<Value, CallbackError> + Send + Sync + 'static,
) -> ReadFn {
    Arc::new(f)
}

pub fn command_fn(
    f: impl Fn(&[Value]) -> Result<(), CallbackError> + Send + Sync + 'static,
) -> CommandFn {
    Arc::new(f)
}

pub fn flag_fn(f: impl Fn() -> bool + Send + Sync + 'static) -> FlagFn {
    Arc::new(f)
}

pub fn reset_fn(f: impl Fn() + Send + Sync + 'static) -> ResetFn {
    Arc::new(f)
}

#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    #[error("expected {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("busy token must be an integer, got {0:?}")]
    InvalidBusy(String),
    #[error("callback failed: {0}")]
    Callback(CallbackError),
    #[error("failed to spawn worker: {0}")]
    Spawn(std::io::Error),
    #[error("worker for busy {0} panicked")]
    WorkerPanicked(Busy),
}

impl BlockError {
    /// Errors caused by the request itself rather than by the block.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BlockError::Arity { .. } | BlockError::Conversion(_) | BlockError::InvalidBusy(_)
        )
    }
}

/// One completed asynchronous request.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncResult {
    pub busy: Busy,
    pub value: Value,
    pub error: Option<String>,
}

type Handler = Box<dyn FnOnce() -> Result<String, BlockError> + Send>;

/// A routed request, bound and ready to run. Produces the plain-text response body.
pub struct Cgi {
    handler: Handler,
    headers: Vec<(String, String)>,
}

impl Cgi {
    pub fn new(handler: impl FnOnce() -> Result<String, BlockError> + Send + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn call(self) -> Result<String, BlockError> {
        (self.handler)()
    }
}

/// Split `/<name>/<arg>...` into the url-decoded name and arguments.
/// Paths not starting with `/` are not block requests.
pub fn request_data(path: &str) -> Option<(String, Vec<String>)> {
    let rest = path.strip_prefix('/')?;
    let mut parts = rest.split('/').map(|s| {
        urlencoding::decode(s)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| s.to_string())
    });
    let name = parts.next().unwrap_or_default();
    Some((name, parts.collect()))
}

pub(crate) fn parse_busy(raw: &str) -> Result<Busy, BlockError> {
    raw.trim()
        .parse()
        .map_err(|_| BlockError::InvalidBusy(raw.to_string()))
}

/// Common surface of every block kind.
pub trait Block: Send + Sync {
    fn descriptor(&self) -> &Arc<BlockDescriptor>;

    /// Name of the owning extension.
    fn extension(&self) -> &str;

    fn name(&self) -> &str {
        self.descriptor().name()
    }

    fn kind(&self) -> BlockKind {
        self.descriptor().kind()
    }

    fn description(&self) -> &str {
        self.descriptor().description()
    }

    fn definition(&self) -> Vec<Value> {
        self.descriptor().definition()
    }

    fn signature(&self) -> &Signature {
        self.descriptor().signature()
    }

    /// Outstanding busy tokens.
    fn busy(&self) -> HashSet<Busy>;

    /// Clear busy and transient state, then run the reset hook. Stored values return to
    /// the default, except on requesters.
    fn reset(&self);

    /// Current cells. Never consumes events.
    fn poll(&self) -> Result<PollMap, BlockError> {
        Ok(PollMap::new())
    }

    /// Cells for one `/poll` response. Hats consume their sticky flag here.
    fn take_poll(&self) -> Result<PollMap, BlockError> {
        self.poll()
    }

    /// A bound handler if this block claims `path`.
    fn get_cgi(&self, _path: &str) -> Option<Cgi> {
        None
    }

    /// Drain completed asynchronous results.
    fn take_results(&self) -> Vec<AsyncResult> {
        Vec::new()
    }

    fn set_on_reset(&self, hook: Option<ResetFn>);
}

pub(crate) struct Locked<S> {
    pub(crate) value: S,
    pub(crate) busy: HashSet<Busy>,
}

/// State shared between a block handle, its clones and its workers.
pub(crate) struct Shared<S, C> {
    pub(crate) descriptor: Arc<BlockDescriptor>,
    pub(crate) extension: String,
    pub(crate) state: Mutex<Locked<S>>,
    pub(crate) changed: Condvar,
    pub(crate) on_reset: RwLock<Option<ResetFn>>,
    pub(crate) callback: RwLock<Option<C>>,
}

impl<S, C: Clone> Shared<S, C> {
    pub(crate) fn new(descriptor: Arc<BlockDescriptor>, extension: &str, value: S) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            extension: extension.to_string(),
            state: Mutex::new(Locked {
                value,
                busy: HashSet::new(),
            }),
            changed: Condvar::new(),
            on_reset: RwLock::new(None),
            callback: RwLock::new(None),
        })
    }

    pub(crate) fn callback(&self) -> Option<C> {
        self.callback.read().clone()
    }

    pub(crate) fn set_callback(&self, callback: Option<C>) {
        *self.callback.write() = callback;
    }

    pub(crate) fn busy(&self) -> HashSet<Busy> {
        self.state.lock().busy.clone()
    }

    pub(crate) fn reset_with(&self, f: impl FnOnce(&mut S)) {
        let mut state = self.state.lock();
        state.busy.clear();
        f(&mut state.value);
        if let Some(hook) = self.on_reset.read().as_ref() {
            hook();
        }
    }

    /// `Some(args)` when `path` names this block.
    pub(crate) fn claim(&self, path: &str) -> Option<Vec<String>> {
        let (name, args) = request_data(path)?;
        (name == self.descriptor.name()).then_some(args)
    }
}

/// Removes a busy token when dropped, including on unwind.
pub(crate) struct BusyGuard<S, C> {
    shared: Arc<Shared<S, C>>,
    busy: Busy,
}

impl<S, C> BusyGuard<S, C> {
    pub(crate) fn new(shared: Arc<Shared<S, C>>, busy: Busy) -> Self {
        Self { shared, busy }
    }
}

impl<S, C> Drop for BusyGuard<S, C> {
    fn drop(&mut self) {
        self.shared.state.lock().busy.remove(&self.busy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_data_decodes_segments() {
        let (name, args) = request_data("/say%20hi/a%2Fb/3").unwrap();
        assert_eq!(name, "say hi");
        assert_eq!(args, vec!["a/b", "3"]);
        let (name, args) = request_data("/poll").unwrap();
        assert_eq!(name, "poll");
        assert!(args.is_empty());
        assert!(request_data("poll").is_none());
    }

    #[test]
    fn client_errors() {
        assert!(BlockError::Arity { expected: 1, got: 0 }.is_client_error());
        assert!(BlockError::InvalidBusy("x".into()).is_client_error());
        assert!(!BlockError::Callback("boom".into()).is_client_error());
        assert!(!BlockError::WorkerPanicked(1).is_client_error());
    }

    #[test]
    fn busy_token_parse() {
        assert_eq!(parse_busy(" 42").unwrap(), 42);
        assert!(matches!(parse_busy("x"), Err(BlockError::InvalidBusy(_))));
    }

    #[test]
    fn cgi_headers_and_call() {
        let cgi = Cgi::new(|| Ok("ok".to_string())).with_header("Content-Type", "text/xml");
        assert_eq!(cgi.headers()[0].1, "text/xml");
        assert_eq!(cgi.call().unwrap(), "ok");
    }
}
