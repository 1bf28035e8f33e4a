/// Temporary environment overrides
use std::env;
use std::ffi::{OsStr, OsString};

use tracing::debug;

/// Sets an environment variable until dropped, then restores the previous
/// value (or removes the variable if it was unset).
#[derive(Debug)]
pub struct ScopedEnv {
    key: OsString,
    previous: Option<OsString>,
}

impl ScopedEnv {
    pub fn set(key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        let key = key.as_ref().to_os_string();
        let previous = env::var_os(&key);
        debug!("Overriding {:?} for the current command", key);
        // SAFETY: the environment is process-wide. The caller must ensure no
        // other thread reads or writes it while the override is set or
        // restored; this crate's own threads (piping, log writer) never do,
        // threads of the embedding process are the caller's responsibility.
        unsafe { env::set_var(&key, value) };
        Self { key, previous }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        // SAFETY: see `ScopedEnv::set`.
        unsafe {
            match &self.previous {
                Some(value) => env::set_var(&self.key, value),
                None => env::remove_var(&self.key),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_previous_value_is_restored() {
        const KEY: &str = "RS_DEBUG_SCOPED_ENV_RESTORE";
        unsafe { env::set_var(KEY, "xterm-256color") };
        {
            let _dumb = ScopedEnv::set(KEY, "dumb");
            assert_eq!(env::var(KEY).unwrap(), "dumb");
        }
        assert_eq!(env::var(KEY).unwrap(), "xterm-256color");
    }

    #[test]
    fn test_unset_variable_is_removed_again() {
        const KEY: &str = "RS_DEBUG_SCOPED_ENV_REMOVE";
        {
            let _dumb = ScopedEnv::set(KEY, "dumb");
            assert_eq!(env::var(KEY).unwrap(), "dumb");
        }
        assert!(env::var_os(KEY).is_none());
    }

    #[test]
    fn test_restored_on_panic() {
        const KEY: &str = "RS_DEBUG_SCOPED_ENV_PANIC";
        let result = std::panic::catch_unwind(|| {
            let _dumb = ScopedEnv::set(KEY, "dumb");
            panic!("command failed");
        });
        assert!(result.is_err());
        assert!(env::var_os(KEY).is_none());
    }
}
