use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ================ 尺寸与错误类型 ================

/// Terminal dimensions in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

impl TerminalSize {
    pub const fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Both dimensions are non-zero
    pub fn is_valid(&self) -> bool {
        self.rows > 0 && self.cols > 0
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::new(24, 80)
    }
}

impl fmt::Display for TerminalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Cached rendering-surface dimensions shared between the piping thread
/// (writer, on resize) and the console (reader, when laying out output).
#[derive(Debug, Clone, Default)]
pub struct SharedSize {
    inner: Arc<Mutex<TerminalSize>>,
}

impl SharedSize {
    pub fn new(size: TerminalSize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(size)),
        }
    }

    pub fn get(&self) -> TerminalSize {
        match self.inner.lock() {
            Ok(size) => *size,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, size: TerminalSize) {
        match self.inner.lock() {
            Ok(mut current) => *current = size,
            Err(poisoned) => *poisoned.into_inner() = size,
        }
    }
}

#[derive(Debug, Error)]
pub enum PtyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("System call failed: {0}")]
    Sys(#[from] nix::Error),
    #[error("Failed to allocate PTY: {0}")]
    Open(nix::Error),
    #[error("Resize failed: {0}")]
    ResizeFailed(String),
    #[error("Invalid terminal size: {0}")]
    InvalidSize(TerminalSize),
    #[error("Failed to apply terminal attributes: {0}")]
    Attributes(String),
    #[error("Failed to assign controlling terminal: {0}")]
    ControllingTerminal(nix::Error),
}

// ================ 核心Trait定义 ================

/// A terminal device whose window size can be queried and changed
pub trait ResizablePty: Send {
    /// 调整终端大小
    fn resize(&self, size: TerminalSize) -> Result<(), PtyError>;

    /// 当前终端大小
    fn size(&self) -> Result<TerminalSize, PtyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_size_updates_are_visible_to_clones() {
        let shared = SharedSize::new(TerminalSize::new(24, 80));
        let reader = shared.clone();

        shared.set(TerminalSize::new(40, 120));

        assert_eq!(reader.get(), TerminalSize::new(40, 120));
    }

    #[test]
    fn test_terminal_size_validity() {
        assert!(TerminalSize::new(1, 1).is_valid());
        assert!(!TerminalSize::new(0, 80).is_valid());
        assert!(!TerminalSize::new(24, 0).is_valid());
        assert_eq!(TerminalSize::new(24, 80).to_string(), "24x80");
    }
}
