//! Exec limits and user layout constants

use crate::error::{ExecError, ExecResult};

/// Page size in bytes
pub const PAGE_SIZE: u64 = 4096;

/// Capacity of a process's segment table
pub const MAX_EXEC_SEGS: usize = 16;

/// Default number of argument strings accepted by exec
pub const MAX_ARGS: usize = 32;

/// Default number of stack pages reserved above the guard page
pub const USER_STACK_PAGES: usize = 1;

/// Highest user virtual address plus one (Sv39 user half)
pub const MAX_USER_VA: u64 = 1 << 38;

/// Bytes kept for a process's display name, terminator included
pub const PROC_NAME_LEN: usize = 16;

/// Stack pointer alignment required by the calling convention
pub const STACK_ALIGN: u64 = 16;

/// Size of one entry in the argv pointer table
pub const POINTER_SIZE: u64 = core::mem::size_of::<u64>() as u64;

/// Tunable exec limits.
///
/// The segment table capacity is not tunable: it is the fixed array size
/// [`MAX_EXEC_SEGS`] carried by every process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecConfig {
    /// Stack pages reserved for the new image (guard page not included)
    pub stack_pages: usize,
    /// Maximum argc
    pub max_args: usize,
    /// Images must end at or below this address
    pub user_va_limit: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            stack_pages: USER_STACK_PAGES,
            max_args: MAX_ARGS,
            user_va_limit: MAX_USER_VA,
        }
    }
}

impl ExecConfig {
    pub fn with_stack_pages(mut self, pages: usize) -> Self {
        self.stack_pages = pages;
        self
    }

    pub fn with_max_args(mut self, max_args: usize) -> Self {
        self.max_args = max_args;
        self
    }

    pub fn with_user_va_limit(mut self, limit: u64) -> Self {
        self.user_va_limit = limit;
        self
    }

    /// Bytes reserved for the stack region, excluding the guard page
    pub fn stack_bytes(&self) -> u64 {
        self.stack_pages as u64 * PAGE_SIZE
    }

    /// Check the limits are usable
    pub fn validate(&self) -> ExecResult<()> {
        if self.stack_pages == 0 {
            return Err(ExecError::Config {
                reason: "zero stack pages",
            });
        }
        if self.max_args == 0 {
            return Err(ExecError::Config {
                reason: "zero argument slots",
            });
        }
        if self.user_va_limit % PAGE_SIZE != 0 {
            return Err(ExecError::Config {
                reason: "user address limit not page aligned",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecErrorKind;

    #[test]
    fn test_default_config_is_valid() {
        let config = ExecConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stack_bytes(), PAGE_SIZE);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ExecConfig::default().with_stack_pages(4).with_max_args(2);
        assert_eq!(config.stack_pages, 4);
        assert_eq!(config.max_args, 2);
        assert_eq!(config.stack_bytes(), 4 * PAGE_SIZE);
    }

    #[test]
    fn test_rejects_degenerate_limits() {
        assert_eq!(
            ExecConfig::default().with_stack_pages(0).validate(),
            Err(ExecError::Config {
                reason: "zero stack pages"
            })
        );
        for config in [
            ExecConfig::default().with_max_args(0),
            ExecConfig::default().with_user_va_limit(PAGE_SIZE + 1),
        ] {
            assert_eq!(
                config.validate().map_err(|e| e.kind()),
                Err(ExecErrorKind::Config)
            );
        }
    }
}
