use std::collections::HashMap;

/// Environment variables the storage core recognizes.
pub mod keys {
    pub const SUITE: &str = "GOATDB_SUITE";
    pub const TEST: &str = "GOATDB_TEST";
    pub const BENCHMARK: &str = "GOATDB_BENCHMARK";
    pub const TMPDIR: &str = "TMPDIR";
    pub const TMP: &str = "TMP";
    pub const TEMP: &str = "TEMP";
    pub const USER: &str = "USER";
    pub const LOGNAME: &str = "LOGNAME";
    pub const USERNAME: &str = "USERNAME";
    pub const CI: &str = "CI";
    pub const GITHUB_ACTIONS: &str = "GITHUB_ACTIONS";
}

/// A source of environment variables.
///
/// Looked up by the process-environment names ([`keys`]); each source maps
/// those onto whatever it actually stores.
pub trait Env {
    fn get(&self, key: &str) -> Option<String>;

    /// `true` if `key` is set to a non-empty value.
    fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_empty())
    }
}

/// The process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEnv;

impl Env for OsEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// An injected configuration table, as handed to a browser runtime through
/// the `GoatDBConfig` global.
///
/// The table's keys are the recognized names with the `GOATDB_` prefix
/// stripped and lowercased, e.g. `GOATDB_SUITE` is stored as `suite` and
/// `CI` as `ci`.
#[derive(Clone, Debug, Default)]
pub struct ConfigEnv {
    table: HashMap<String, String>,
}

impl ConfigEnv {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self { table }
    }
}

impl Env for ConfigEnv {
    fn get(&self, key: &str) -> Option<String> {
        let key = key.strip_prefix("GOATDB_").unwrap_or(key).to_ascii_lowercase();
        self.table.get(&key).cloned()
    }
}

/// The directory for temporary files: `TMPDIR`, `TMP`, or `TEMP`, in that
/// order, defaulting to `/tmp`.
pub fn temp_dir(env: &impl Env) -> String {
    [keys::TMPDIR, keys::TMP, keys::TEMP]
        .iter()
        .find_map(|key| env.get(key).filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "/tmp".to_owned())
}

/// The current user's login name, if the environment exposes one.
pub fn user_name(env: &impl Env) -> Option<String> {
    [keys::USER, keys::LOGNAME, keys::USERNAME]
        .iter()
        .find_map(|key| env.get(key).filter(|v| !v.is_empty()))
}

/// `true` when running under a CI service.
pub fn is_ci(env: &impl Env) -> bool {
    env.is_set(keys::CI) || env.is_set(keys::GITHUB_ACTIONS)
}

/// The test suite selector, set by the test runner.
pub fn suite(env: &impl Env) -> Option<String> {
    env.get(keys::SUITE).filter(|v| !v.is_empty())
}

/// `true` when running under the test runner.
pub fn is_test(env: &impl Env) -> bool {
    env.is_set(keys::TEST)
}

/// `true` when running benchmarks.
pub fn is_benchmark(env: &impl Env) -> bool {
    env.is_set(keys::BENCHMARK)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> ConfigEnv {
        ConfigEnv::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn config_env_strips_prefix_and_lowercases() {
        let env = config(&[("suite", "e2e"), ("ci", "1"), ("tmpdir", "/scratch")]);

        assert_eq!(suite(&env).as_deref(), Some("e2e"));
        assert!(is_ci(&env));
        assert_eq!(temp_dir(&env), "/scratch");
        assert!(!is_test(&env));
    }

    #[test]
    fn temp_dir_falls_back_in_order() {
        assert_eq!(temp_dir(&config(&[])), "/tmp");
        assert_eq!(temp_dir(&config(&[("temp", "/t3")])), "/t3");
        assert_eq!(temp_dir(&config(&[("tmp", "/t2"), ("temp", "/t3")])), "/t2");
        assert_eq!(
            temp_dir(&config(&[("tmpdir", "/t1"), ("tmp", "/t2")])),
            "/t1"
        );
    }

    #[test]
    fn user_name_falls_back_in_order() {
        assert_eq!(user_name(&config(&[])), None);
        assert_eq!(
            user_name(&config(&[("logname", "goat")])).as_deref(),
            Some("goat")
        );
        assert_eq!(
            user_name(&config(&[("user", "a"), ("username", "b")])).as_deref(),
            Some("a")
        );
    }

    #[test]
    fn empty_values_do_not_count_as_set() {
        let env = config(&[("ci", "")]);
        assert!(!is_ci(&env));
    }
}
