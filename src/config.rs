/// Configuration for harness execution.
pub struct HarnessConfig {
    /// Hard cap on resumes per execution context. A test that suspends
    /// in a loop without finishing would otherwise hang the driver.
    pub max_resumes: usize,
    /// Prefix for identifiers synthesized by `schedule_once`.
    pub timer_prefix: String,
    /// Extra source paths (suffix-matched) whose frames are skipped
    /// during attribution, for framework glue layered above the harness.
    pub internal_modules: Vec<String>,
}

/// Source files whose frames never count as user code. Paths are as
/// produced by `file!()` within this crate.
const INTERNAL_SOURCES: &[&str] = &[
    "src/async_env.rs",
    "src/env.rs",
    "src/expect.rs",
    "src/fiber.rs",
    "src/host.rs",
    "src/inspect.rs",
    "src/report.rs",
    "src/runner.rs",
    "src/sandbox.rs",
    "src/stub.rs",
    "src/trace.rs",
    "src/tracker.rs",
    "src/value.rs",
];

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_resumes: 10_000,
            timer_prefix: "__cordon_timer_".to_string(),
            internal_modules: Vec::new(),
        }
    }
}

impl HarnessConfig {
    /// True when `path` belongs to the harness (or registered framework
    /// glue) rather than to test/user code.
    pub fn is_internal_source(&self, path: &str) -> bool {
        INTERNAL_SOURCES.iter().any(|m| path.ends_with(m))
            || self.internal_modules.iter().any(|m| path.ends_with(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_sources_are_internal() {
        let config = HarnessConfig::default();
        assert!(config.is_internal_source("src/expect.rs"));
        assert!(config.is_internal_source("/build/cordon/src/fiber.rs"));
        assert!(!config.is_internal_source("tests/runner_tests.rs"));
    }

    #[test]
    fn embedders_extend_the_skip_list() {
        let mut config = HarnessConfig::default();
        config.internal_modules.push("glue/dsl.rs".to_string());
        assert!(config.is_internal_source("my_framework/glue/dsl.rs"));
    }
}
