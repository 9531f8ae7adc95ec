use std::collections::HashMap;

mod cmd;
mod env;
pub mod path;

pub use crate::{
    cmd::{run_with_timeout, CmdOutput, TIMEOUT_EXIT_CODE},
    env::{is_benchmark, is_ci, is_test, keys, suite, temp_dir, user_name, ConfigEnv, Env, OsEnv},
};

/// The execution environment a process runs in.
///
/// Decides which file backend variant the process should use; see the
/// `goatdb-vfs` crate for the variants themselves.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Platform {
    /// Host filesystem with kernel-side file positions.
    Native,
    /// Host whose file API is position-less; file positions are tracked in
    /// userspace.
    PositionLess,
    /// Browser sandbox with exclusive synchronous access handles (OPFS).
    Browser,
}

/// Descriptor of the runtime a process was started in.
///
/// Constructed once at process start and passed to whoever wires up the
/// storage stack. Modules never sniff the environment themselves; they ask
/// the descriptor.
#[derive(Clone, Debug)]
pub struct Runtime<E = OsEnv> {
    platform: Platform,
    env: E,
}

impl Runtime {
    /// A native host process using the process environment.
    pub fn native() -> Self {
        Self {
            platform: Platform::Native,
            env: OsEnv,
        }
    }

    /// A host process whose file API is position-less.
    pub fn position_less() -> Self {
        Self {
            platform: Platform::PositionLess,
            env: OsEnv,
        }
    }
}

impl Runtime<ConfigEnv> {
    /// A browser process, configured through the injected `GoatDBConfig`
    /// table.
    pub fn browser(config: HashMap<String, String>) -> Self {
        Self {
            platform: Platform::Browser,
            env: ConfigEnv::new(config),
        }
    }
}

impl<E: Env> Runtime<E> {
    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn temp_dir(&self) -> String {
        temp_dir(&self.env)
    }

    pub fn user_name(&self) -> Option<String> {
        user_name(&self.env)
    }

    pub fn is_ci(&self) -> bool {
        is_ci(&self.env)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn browser_runtime_reads_injected_config() {
        let rt = Runtime::browser(HashMap::from([
            ("tmpdir".to_owned(), "/scratch".to_owned()),
            ("user".to_owned(), "goat".to_owned()),
        ]));

        assert_eq!(rt.platform(), Platform::Browser);
        assert_eq!(rt.temp_dir(), "/scratch");
        assert_eq!(rt.user_name().as_deref(), Some("goat"));
        assert!(!rt.is_ci());
    }

    #[test]
    fn native_runtime_uses_the_process_environment() {
        let rt = Runtime::native();
        assert_eq!(rt.platform(), Platform::Native);
        // Whatever the host says, asking must not panic.
        assert!(!rt.temp_dir().is_empty());
        let _user = rt.user_name();
    }
}
