/// Session-local commands, checked before the debugger's own
use std::collections::HashMap;
use std::fmt;

use crate::console::render;
use crate::debugger::DebuggerCore;
use crate::dispatch::env::ScopedEnv;
use crate::dispatch::{CommandOutcome, DispatchError};
use crate::session::Session;

pub type LocalCommand = fn(&Session, &mut dyn DebuggerCore, &str) -> Result<CommandOutcome, DispatchError>;

/// Name → handler table built once per session
pub struct CommandRegistry {
    commands: HashMap<&'static str, LocalCommand>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            commands: HashMap::new(),
        };
        registry.register(&["v", "vars"], do_vars);
        registry.register(&["varstree", "vt"], do_varstree);
        registry.register(&["inspect", "i"], do_inspect);
        registry.register(&["inspectall", "ia"], do_inspectall);
        registry.register(&["pinfo"], do_pinfo);
        registry.register(&["pinfo2"], do_pinfo2);
        registry
    }

    fn register(&mut self, names: &[&'static str], handler: LocalCommand) {
        for &name in names {
            self.commands.insert(name, handler);
        }
    }

    pub fn get(&self, name: &str) -> Option<LocalCommand> {
        self.commands.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Sorted command names, for help listings
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

/// v(ars): local variables as a table
fn do_vars(session: &Session, core: &mut dyn DebuggerCore, _arg: &str) -> Result<CommandOutcome, DispatchError> {
    if let Some(table) = render::variables_table(&core.variables()) {
        session.message(table);
    }
    Ok(CommandOutcome::Continue)
}

/// varstree | vt: local variables grouped by type
fn do_varstree(session: &Session, core: &mut dyn DebuggerCore, _arg: &str) -> Result<CommandOutcome, DispatchError> {
    if let Some(tree) = render::variables_tree(&core.variables()) {
        session.message(tree);
    }
    Ok(CommandOutcome::Continue)
}

fn inspect(session: &Session, core: &mut dyn DebuggerCore, arg: &str, all: bool) -> Result<CommandOutcome, DispatchError> {
    // failures are not reported
    if let Ok(description) = core.inspect(arg, all) {
        session.message(description);
    }
    Ok(CommandOutcome::Continue)
}

/// (i)nspect: data, methods and docs of an object
fn do_inspect(session: &Session, core: &mut dyn DebuggerCore, arg: &str) -> Result<CommandOutcome, DispatchError> {
    inspect(session, core, arg, false)
}

/// inspectall | ia: inspect including private attributes
fn do_inspectall(session: &Session, core: &mut dyn DebuggerCore, arg: &str) -> Result<CommandOutcome, DispatchError> {
    inspect(session, core, arg, true)
}

/// Run the core's command with a dumb terminal so nothing tries to page
fn with_dumb_term(
    session: &Session,
    core: &mut dyn DebuggerCore,
    line: &str,
) -> Result<CommandOutcome, DispatchError> {
    let _term = ScopedEnv::set("TERM", "dumb");
    Ok(core.execute(line, session)?)
}

fn do_pinfo(session: &Session, core: &mut dyn DebuggerCore, arg: &str) -> Result<CommandOutcome, DispatchError> {
    with_dumb_term(session, core, &format!("pinfo {arg}"))
}

fn do_pinfo2(session: &Session, core: &mut dyn DebuggerCore, arg: &str) -> Result<CommandOutcome, DispatchError> {
    with_dumb_term(session, core, &format!("pinfo2 {arg}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_share_handlers() {
        let registry = CommandRegistry::new();
        for (a, b) in [("v", "vars"), ("vt", "varstree"), ("i", "inspect"), ("ia", "inspectall")] {
            assert!(registry.get(a).unwrap() as usize == registry.get(b).unwrap() as usize, "{a} vs {b}");
        }
        assert!(registry.contains("pinfo2"));
        assert!(!registry.contains("where"));
    }

    #[test]
    fn test_names_are_sorted() {
        let names = CommandRegistry::new().names();
        assert_eq!(
            names,
            ["i", "ia", "inspect", "inspectall", "pinfo", "pinfo2", "v", "vars", "varstree", "vt"]
        );
    }
}
