/// Command dispatch: tokenising, routing and failure isolation
mod command;
mod dispatcher;
mod env;
mod magic;
mod registry;

pub use command::{CommandOutcome, DispatchError, ParsedLine, SessionEnd, parse_line};
pub use dispatcher::Dispatcher;
pub use env::ScopedEnv;
pub use magic::{Alias, AliasOutput, Magic, MagicFn};
pub use registry::{CommandRegistry, LocalCommand};
