use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use super::{
    parse_busy, Block, BlockError, Busy, BusyGuard, Cgi, CommandFn, ResetFn, Shared,
};
use crate::descriptor::BlockDescriptor;
use crate::value::Value;

type CommandShared = Shared<Option<Vec<Value>>, CommandFn>;

fn last_value(args: &Option<Vec<Value>>) -> Option<Value> {
    match args.as_deref()? {
        [single] => Some(single.clone()),
        many => Some(Value::List(many.to_vec())),
    }
}

/// Wire arguments are converted through the signature; a command without placeholders
/// takes its segments as text.
fn wire_arguments(descriptor: &BlockDescriptor, raw: &[String]) -> Result<Vec<Value>, BlockError> {
    let signature = descriptor.signature();
    if signature.is_empty() {
        return Ok(raw.iter().map(|s| Value::Text(s.clone())).collect());
    }
    signature.convert(raw)
}

/// Fire-and-return action.
#[derive(Clone)]
pub struct Command {
    shared: Arc<CommandShared>,
}

impl Command {
    pub fn new(descriptor: Arc<BlockDescriptor>, extension: &str) -> Self {
        Self {
            shared: Shared::new(descriptor, extension, None),
        }
    }

    /// Run the callback (if any) synchronously, then record `args` as the last value.
    pub fn command(&self, args: Vec<Value>) -> Result<(), BlockError> {
        info!(block = %self.name(), args = ?args, "command");
        if let Some(run) = self.shared.callback() {
            run(&args).map_err(BlockError::Callback)?;
        }
        self.shared.state.lock().value = Some(args);
        Ok(())
    }

    /// `None` before the first invocation, the argument itself for one argument, else a list.
    pub fn value(&self) -> Option<Value> {
        last_value(&self.shared.state.lock().value)
    }

    pub fn set_do_command(&self, run: Option<CommandFn>) {
        self.shared.set_callback(run);
    }

    pub fn has_do_command(&self) -> bool {
        self.shared.callback.read().is_some()
    }
}

impl Block for Command {
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
        self.shared.reset_with(|_| {});
    }

    fn get_cgi(&self, path: &str) -> Option<Cgi> {
        let raw = self.shared.claim(path)?;
        let this = self.clone();
        Some(Cgi::new(move || {
            let args = wire_arguments(this.descriptor(), &raw)?;
            this.command(args)?;
            Ok(String::new())
        }))
    }

    fn set_on_reset(&self, hook: Option<ResetFn>) {
        *self.shared.on_reset.write() = hook;
    }
}

/// Long-running action executed on a worker thread and tracked by a busy token.
#[derive(Clone)]
pub struct WaiterCommand {
    shared: Arc<CommandShared>,
}

impl WaiterCommand {
    pub fn new(descriptor: Arc<BlockDescriptor>, extension: &str) -> Self {
        Self {
            shared: Shared::new(descriptor, extension, None),
        }
    }

    /// Start the callback on a worker thread tagged `busy`. The token stays in `busy()`
    /// until the callback returns, fails or panics. Without a callback nothing runs, but
    /// `args` are still recorded.
    pub fn command(
        &self,
        busy: Busy,
        args: Vec<Value>,
    ) -> Result<Option<JoinHandle<Result<(), BlockError>>>, BlockError> {
        info!(block = %self.name(), busy, args = ?args, "waiter command");
        let handle = match self.shared.callback() {
            Some(run) => {
                self.shared.state.lock().busy.insert(busy);
                let guard = BusyGuard::new(Arc::clone(&self.shared), busy);
                let name = self.name().to_string();
                let worker_args = args.clone();
                let spawned = thread::Builder::new()
                    .name(format!("command {} [{}]", name, busy))
                    .spawn(move || {
                        let _guard = guard;
                        run(&worker_args).map_err(|e| {
                            warn!(block = %name, busy, error = %e, "waiter command failed");
                            BlockError::Callback(e)
                        })
                    });
                // A failed spawn drops the closure, and with it the guard.
                Some(spawned.map_err(BlockError::Spawn)?)
            }
            None => None,
        };
        self.shared.state.lock().value = Some(args);
        Ok(handle)
    }

    pub fn value(&self) -> Option<Value> {
        last_value(&self.shared.state.lock().value)
    }

    pub fn set_do_command(&self, run: Option<CommandFn>) {
        self.shared.set_callback(run);
    }

    pub fn has_do_command(&self) -> bool {
        self.shared.callback.read().is_some()
    }
}

impl Block for WaiterCommand {
    fn descriptor(&self) -> &Arc<BlockDescriptor> {
        &self.shared.descriptor
    }

    fn extension(&self) -> &str {
        &self.shared.extension
    }

    fn busy(&self) -> HashSet<Busy> {
        self.shared.busy()
    }

    /// Forgets outstanding tokens. Running workers are not stopped.
    fn reset(&self) {
        self.shared.reset_with(|_| {});
    }

    /// `/<name>/<busy>/<args>`; the busy token is mandatory.
    fn get_cgi(&self, path: &str) -> Option<Cgi> {
        let mut raw = self.shared.claim(path)?;
        let this = self.clone();
        Some(Cgi::new(move || {
            if raw.is_empty() {
                return Err(BlockError::InvalidBusy(String::new()));
            }
            let busy = parse_busy(&raw.remove(0))?;
            let args = wire_arguments(this.descriptor(), &raw)?;
            this.command(busy, args)?;
            Ok(String::new())
        }))
    }

    fn set_on_reset(&self, hook: Option<ResetFn>) {
        *self.shared.on_reset.write() = hook;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::command_fn;
    use parking_lot::Mutex;
    use std::sync::mpsc;
    use std::time::Duration;

    fn command(name: &str, description: &str) -> Command {
        let d = BlockDescriptor::command(name)
            .description(description)
            .build()
            .unwrap();
        Command::new(d, "ext")
    }

    fn waiter() -> WaiterCommand {
        let d = BlockDescriptor::waiter_command("wait").build().unwrap();
        WaiterCommand::new(d, "ext")
    }

    #[test]
    fn value_shapes() {
        let c = command("go", "go");
        assert_eq!(c.value(), None);
        c.command(vec![Value::from(1)]).unwrap();
        assert_eq!(c.value(), Some(Value::from(1)));
        c.command(vec![Value::from(1), Value::from("a")]).unwrap();
        assert_eq!(
            c.value(),
            Some(Value::List(vec![Value::from(1), Value::from("a")]))
        );
        c.command(vec![]).unwrap();
        assert_eq!(c.value(), Some(Value::List(vec![])));
    }

    #[test]
    fn callback_runs_with_arguments() {
        let c = command("go", "go %n");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        c.set_do_command(Some(command_fn(move |args| {
            s.lock().extend_from_slice(args);
            Ok(())
        })));
        c.get_cgi("/go/2.5").unwrap().call().unwrap();
        assert_eq!(*seen.lock(), vec![Value::from(2.5)]);
        assert_eq!(c.value(), Some(Value::from(2.5)));
    }

    #[test]
    fn failing_callback_keeps_previous_value() {
        let c = command("go", "go");
        c.command(vec![Value::from("first")]).unwrap();
        c.set_do_command(Some(command_fn(|_| Err("nope".into()))));
        assert!(c.command(vec![Value::from("second")]).is_err());
        assert_eq!(c.value(), Some(Value::from("first")));
    }

    #[test]
    fn cgi_text_arguments_without_placeholders() {
        let c = command("say", "say");
        assert_eq!(c.get_cgi("/say/hello%20there").unwrap().call().unwrap(), "");
        assert_eq!(c.value(), Some(Value::from("hello there")));
        let c = command("n", "n %n");
        assert!(c.get_cgi("/n/abc").unwrap().call().unwrap_err().is_client_error());
        assert_eq!(c.value(), None);
    }

    #[test]
    fn waiter_clears_busy_on_completion() {
        let w = waiter();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        w.set_do_command(Some(command_fn(move |_| {
            let _ = release_rx.lock().recv_timeout(Duration::from_secs(5));
            Ok(())
        })));
        let handle = w.command(3, vec![Value::from("x")]).unwrap().unwrap();
        assert_eq!(w.busy(), HashSet::from([3]));
        assert_eq!(w.value(), Some(Value::from("x")));
        release_tx.send(()).unwrap();
        handle.join().unwrap().unwrap();
        assert!(w.busy().is_empty());
    }

    #[test]
    fn waiter_clears_busy_when_callback_fails_or_panics() {
        let w = waiter();
        w.set_do_command(Some(command_fn(|_| Err("failed".into()))));
        let handle = w.command(1, vec![]).unwrap().unwrap();
        assert!(handle.join().unwrap().is_err());
        assert!(w.busy().is_empty());

        w.set_do_command(Some(command_fn(|_| panic!("exploded"))));
        let handle = w.command(2, vec![]).unwrap().unwrap();
        assert!(handle.join().is_err());
        assert!(w.busy().is_empty());
    }

    #[test]
    fn waiter_without_callback_only_records() {
        let w = waiter();
        assert!(w.command(5, vec![Value::from(1)]).unwrap().is_none());
        assert!(w.busy().is_empty());
        assert_eq!(w.value(), Some(Value::from(1)));
    }

    #[test]
    fn waiter_cgi_requires_integer_busy() {
        let w = waiter();
        assert!(matches!(
            w.get_cgi("/wait").unwrap().call(),
            Err(BlockError::InvalidBusy(_))
        ));
        assert!(matches!(
            w.get_cgi("/wait/abc").unwrap().call(),
            Err(BlockError::InvalidBusy(_))
        ));
        assert_eq!(w.get_cgi("/wait/4/a").unwrap().call().unwrap(), "");
        assert_eq!(w.value(), Some(Value::from("a")));
    }

    #[test]
    fn reset_forgets_busy_but_worker_finishes() {
        let w = waiter();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        w.set_do_command(Some(command_fn(move |_| {
            let _ = release_rx.lock().recv_timeout(Duration::from_secs(5));
            Ok(())
        })));
        let handle = w.command(8, vec![]).unwrap().unwrap();
        w.reset();
        assert!(w.busy().is_empty());
        release_tx.send(()).unwrap();
        assert!(handle.join().unwrap().is_ok());
        assert!(w.busy().is_empty());
    }
}
