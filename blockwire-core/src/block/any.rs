use std::collections::HashSet;
use std::sync::Arc;

use super::{
    AsyncResult, Block, BlockError, BooleanBlock, Busy, Callback, Cgi, Command, Hat, PollMap,
    Reporter, Requester, ResetFn, Sensor, WaiterCommand,
};
use crate::descriptor::{BlockDescriptor, BlockKind, DefinitionError};

/// Any live block, as created from a descriptor.
#[derive(Clone)]
pub enum AnyBlock {
    Sensor(Sensor),
    Boolean(BooleanBlock),
    Reporter(Reporter),
    Requester(Requester),
    Command(Command),
    WaiterCommand(WaiterCommand),
    Hat(Hat),
}

impl std::fmt::Debug for AnyBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            AnyBlock::Sensor(_) => "Sensor",
            AnyBlock::Boolean(_) => "Boolean",
            AnyBlock::Reporter(_) => "Reporter",
            AnyBlock::Requester(_) => "Requester",
            AnyBlock::Command(_) => "Command",
            AnyBlock::WaiterCommand(_) => "WaiterCommand",
            AnyBlock::Hat(_) => "Hat",
        };
        f.debug_tuple("AnyBlock").field(&variant).finish()
    }
}

impl AnyBlock {
    pub fn new(descriptor: Arc<BlockDescriptor>, extension: &str) -> Self {
        match descriptor.kind() {
            BlockKind::Sensor => AnyBlock::Sensor(Sensor::new(descriptor, extension)),
            BlockKind::Boolean => AnyBlock::Boolean(BooleanBlock::new(descriptor, extension)),
            BlockKind::Reporter => AnyBlock::Reporter(Reporter::new(descriptor, extension)),
            BlockKind::Requester => AnyBlock::Requester(Requester::new(descriptor, extension)),
            BlockKind::Command => AnyBlock::Command(Command::new(descriptor, extension)),
            BlockKind::WaiterCommand => {
                AnyBlock::WaiterCommand(WaiterCommand::new(descriptor, extension))
            }
            BlockKind::Hat => AnyBlock::Hat(Hat::new(descriptor, extension)),
        }
    }

    fn inner(&self) -> &dyn Block {
        match self {
            AnyBlock::Sensor(b) => b,
            AnyBlock::Boolean(b) => b,
            AnyBlock::Reporter(b) => b,
            AnyBlock::Requester(b) => b,
            AnyBlock::Command(b) => b,
            AnyBlock::WaiterCommand(b) => b,
            AnyBlock::Hat(b) => b,
        }
    }

    /// Install the primary callback. Read callbacks drive readable kinds, command
    /// callbacks drive commands and flag callbacks drive hats.
    pub fn install(&self, callback: Callback) -> Result<(), DefinitionError> {
        match (self, callback) {
            (AnyBlock::Sensor(b), Callback::Read(f)) => b.set_do_read(Some(f)),
            (AnyBlock::Boolean(b), Callback::Read(f)) => b.set_do_read(Some(f)),
            (AnyBlock::Reporter(b), Callback::Read(f)) => b.set_do_read(Some(f)),
            (AnyBlock::Requester(b), Callback::Read(f)) => b.set_do_read(Some(f)),
            (AnyBlock::Command(b), Callback::Command(f)) => b.set_do_command(Some(f)),
            (AnyBlock::WaiterCommand(b), Callback::Command(f)) => b.set_do_command(Some(f)),
            (AnyBlock::Hat(b), Callback::Flag(f)) => b.set_do_flag(Some(f)),
            (block, callback) => {
                return Err(DefinitionError::CallbackMismatch {
                    name: block.name().to_string(),
                    kind: block.kind(),
                    callback: callback.family(),
                })
            }
        }
        Ok(())
    }

    pub fn as_sensor(&self) -> Option<&Sensor> {
        match self {
            AnyBlock::Sensor(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<&BooleanBlock> {
        match self {
            AnyBlock::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_reporter(&self) -> Option<&Reporter> {
        match self {
            AnyBlock::Reporter(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_requester(&self) -> Option<&Requester> {
        match self {
            AnyBlock::Requester(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_command(&self) -> Option<&Command> {
        match self {
            AnyBlock::Command(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_waiter_command(&self) -> Option<&WaiterCommand> {
        match self {
            AnyBlock::WaiterCommand(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_hat(&self) -> Option<&Hat> {
        match self {
            AnyBlock::Hat(b) => Some(b),
            _ => None,
        }
    }
}

impl Block for AnyBlock {
    fn descriptor(&self) -> &Arc<BlockDescriptor> {
        self.inner().descriptor()
    }

    fn extension(&self) -> &str {
        self.inner().extension()
    }

    fn busy(&self) -> HashSet<Busy> {
        self.inner().busy()
    }

    fn reset(&self) {
        self.inner().reset()
    }

    fn poll(&self) -> Result<PollMap, BlockError> {
        self.inner().poll()
    }

    fn take_poll(&self) -> Result<PollMap, BlockError> {
        self.inner().take_poll()
    }

    fn get_cgi(&self, path: &str) -> Option<Cgi> {
        self.inner().get_cgi(path)
    }

    fn take_results(&self) -> Vec<AsyncResult> {
        self.inner().take_results()
    }

    fn set_on_reset(&self, hook: Option<ResetFn>) {
        self.inner().set_on_reset(hook)
    }
}
