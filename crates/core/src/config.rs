use std::time::Duration;

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_MAX_ROUNDS: usize = 16;

/// Builder for [`ExecutorConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutorConfigBuilder {
    max_concurrency: Option<usize>,
    operation_timeout: Option<Duration>,
    max_rounds: Option<usize>,
}

impl ExecutorConfigBuilder {
    /// Creates a builder with every option unset.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps how many nodes may run at the same time.
    ///
    /// A ceiling of `0` is treated as `1`.
    #[inline]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency.max(1));
        self
    }

    /// Sets the deadline applied to every single operation.
    #[inline]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Caps the inference round trips of the sequential executor.
    ///
    /// A cap of `0` is treated as `1`.
    #[inline]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = Some(max_rounds.max(1));
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> ExecutorConfig {
        ExecutorConfig {
            max_concurrency: self.max_concurrency,
            operation_timeout: self
                .operation_timeout
                .unwrap_or(DEFAULT_OPERATION_TIMEOUT),
            max_rounds: self.max_rounds.unwrap_or(DEFAULT_MAX_ROUNDS),
        }
    }
}

/// Limits shared by the parallel and sequential executors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub(crate) max_concurrency: Option<usize>,
    pub(crate) operation_timeout: Duration,
    pub(crate) max_rounds: usize,
}

impl ExecutorConfig {
    /// The dispatch ceiling, `None` when unbounded.
    #[inline]
    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    /// The per-operation deadline.
    #[inline]
    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// The maximum number of sequential inference rounds.
    #[inline]
    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }
}

impl Default for ExecutorConfig {
    #[inline]
    fn default() -> Self {
        ExecutorConfigBuilder::new().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.max_concurrency(), None);
        assert_eq!(config.operation_timeout(), Duration::from_secs(300));
        assert_eq!(config.max_rounds(), 16);
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let config = ExecutorConfigBuilder::new()
            .with_max_concurrency(0)
            .with_max_rounds(2)
            .build();
        assert_eq!(config.max_concurrency(), Some(1));
        assert_eq!(config.max_rounds(), 2);
    }

    #[test]
    fn test_zero_rounds_is_clamped() {
        let config = ExecutorConfigBuilder::new().with_max_rounds(0).build();
        assert_eq!(config.max_rounds(), 1);
    }
}
