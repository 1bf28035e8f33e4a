/// Entry points for code that wants to be debugged remotely
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::OnceLock;

use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use crate::config::{AttachConfig, ConfigLoader, init_logging};
use crate::debugger::DebuggerCore;
use crate::dispatch::{DispatchError, Dispatcher, SessionEnd};
use crate::session::{AttachError, AttachOptions, SessionSlot, connect_and_start_in, global_slot};

static LOG_GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

fn load_config() -> Result<AttachConfig, AttachError> {
    let config = ConfigLoader::new().load()?;
    LOG_GUARD.get_or_init(|| init_logging(&config.log_level));
    Ok(config)
}

/// Attach with configuration from `rs_debug.toml` and `RS_DEBUG_*`, then run
/// the dispatch loop until the core quits or the client disconnects.
///
/// Blocks until a client connects unless a session is already active, in
/// which case the loop runs on that session.
pub fn attach(core: &mut dyn DebuggerCore) -> Result<SessionEnd, AttachError> {
    let config = load_config()?;
    attach_with(&config, AttachOptions::default(), core)
}

pub fn attach_with(
    config: &AttachConfig,
    options: AttachOptions,
    core: &mut dyn DebuggerCore,
) -> Result<SessionEnd, AttachError> {
    attach_in(global_slot(), config, &options, core, None)
}

/// Attach to inspect a failure that already happened: the error is reported
/// on the remote terminal before the first prompt
pub fn attach_post_mortem(error: &anyhow::Error, core: &mut dyn DebuggerCore) -> Result<SessionEnd, AttachError> {
    let config = load_config()?;
    attach_post_mortem_with(&config, AttachOptions::default(), error, core)
}

pub fn attach_post_mortem_with(
    config: &AttachConfig,
    options: AttachOptions,
    error: &anyhow::Error,
    core: &mut dyn DebuggerCore,
) -> Result<SessionEnd, AttachError> {
    attach_in(global_slot(), config, &options, core, Some(error))
}

/// Run `body`; if it fails or panics, attach post-mortem before handing the
/// failure back.
///
/// A panic is returned as an error carrying its message. A failed attach is
/// logged and does not replace the error of `body`.
pub fn attach_on_error<T, F>(core: &mut dyn DebuggerCore, body: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    let error = match guarded(body) {
        Ok(value) => return Ok(value),
        Err(error) => error,
    };
    match load_config() {
        Ok(config) => debug_failure(global_slot(), &config, &AttachOptions::default(), core, &error),
        Err(e) => error!("Post-mortem attach failed: {}", e),
    }
    Err(error)
}

pub(crate) fn attach_on_error_in<T, F>(
    slot: &'static SessionSlot,
    config: &AttachConfig,
    options: &AttachOptions,
    core: &mut dyn DebuggerCore,
    body: F,
) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    let error = match guarded(body) {
        Ok(value) => return Ok(value),
        Err(error) => error,
    };
    debug_failure(slot, config, options, core, &error);
    Err(error)
}

/// `body`'s result, with a panic turned into an error
fn guarded<T, F>(body: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::Error::new(DispatchError::from_panic(payload)).context("panicked")),
    }
}

fn debug_failure(
    slot: &'static SessionSlot,
    config: &AttachConfig,
    options: &AttachOptions,
    core: &mut dyn DebuggerCore,
    error: &anyhow::Error,
) {
    info!("Attaching post-mortem: {:#}", error);
    if let Err(e) = attach_in(slot, config, options, core, Some(error)) {
        error!("Post-mortem attach failed: {}", e);
    }
}

pub(crate) fn attach_in(
    slot: &'static SessionSlot,
    config: &AttachConfig,
    options: &AttachOptions,
    core: &mut dyn DebuggerCore,
    post_mortem: Option<&anyhow::Error>,
) -> Result<SessionEnd, AttachError> {
    let handle = connect_and_start_in(slot, &config.ip, config.effective_port(), options)?;
    handle.set_prompt(options.prompt.as_deref().unwrap_or(&config.prompt));
    if let Some(error) = post_mortem {
        handle.enter_post_mortem(error);
    }

    let end = Dispatcher::new(&handle, core)
        .redirect_stdio(options.redirect_stdio)
        .run();
    Ok(end)
}
