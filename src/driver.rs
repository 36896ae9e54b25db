use std::sync::Arc;
use std::time::Duration;

use crate::connection::Connection;
use crate::context::QueryContext;
use crate::engine::Session;
use crate::error::CsvMiddlewareError;

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Options for opening a CSV connection.
#[derive(Debug, Clone)]
pub struct CsvqOptions {
    /// Locator: repository path plus optional `?key=value` parameters.
    pub dsn: String,
    /// How long to wait for another writer's table lock.
    pub wait_timeout: Duration,
    /// Pause between lock attempts.
    pub retry_delay: Duration,
    /// Dedicated session; `None` shares the process-wide one.
    pub session: Option<Arc<Session>>,
}

impl CsvqOptions {
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            session: None,
        }
    }

    #[must_use]
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: Arc<Session>) -> Self {
        self.session = Some(session);
        self
    }
}

/// Fluent builder for CSV connection options.
#[derive(Debug, Clone)]
pub struct CsvqOptionsBuilder {
    opts: CsvqOptions,
}

impl CsvqOptionsBuilder {
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            opts: CsvqOptions::new(dsn),
        }
    }

    #[must_use]
    pub fn wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.opts.wait_timeout = wait_timeout;
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.opts.retry_delay = retry_delay;
        self
    }

    /// Give the connection its own session, isolated from the process-wide sinks.
    #[must_use]
    pub fn session(mut self, session: Arc<Session>) -> Self {
        self.opts.session = Some(session);
        self
    }

    #[must_use]
    pub fn finish(self) -> CsvqOptions {
        self.opts
    }

    /// # Errors
    /// Returns [`CsvMiddlewareError::BadConnection`] if the connection cannot be opened.
    pub fn open(self, ctx: &QueryContext) -> Result<Connection, CsvMiddlewareError> {
        Connection::open_with_options(ctx, &self.finish())
    }
}

/// Entry point that opens connections with shared lock settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Driver {
    wait_timeout: Duration,
    retry_delay: Duration,
}

impl Default for Driver {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl Driver {
    #[must_use]
    pub fn new(wait_timeout: Duration, retry_delay: Duration) -> Self {
        Self {
            wait_timeout,
            retry_delay,
        }
    }

    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// # Errors
    /// Returns [`CsvMiddlewareError::BadConnection`] if the connection cannot be opened.
    pub fn open(&self, ctx: &QueryContext, dsn: &str) -> Result<Connection, CsvMiddlewareError> {
        self.open_connector(dsn).connect(ctx)
    }

    /// Bind a locator once and open connections from it on demand.
    #[must_use]
    pub fn open_connector(&self, dsn: &str) -> Connector {
        Connector {
            options: CsvqOptions::new(dsn)
                .with_wait_timeout(self.wait_timeout)
                .with_retry_delay(self.retry_delay),
        }
    }
}

/// A locator bound to a [`Driver`]'s settings.
#[derive(Debug, Clone)]
pub struct Connector {
    options: CsvqOptions,
}

impl Connector {
    #[must_use]
    pub fn options(&self) -> &CsvqOptions {
        &self.options
    }

    /// # Errors
    /// Returns [`CsvMiddlewareError::BadConnection`] if the connection cannot be opened.
    pub fn connect(&self, ctx: &QueryContext) -> Result<Connection, CsvMiddlewareError> {
        Connection::open_with_options(ctx, &self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let opts = CsvqOptionsBuilder::new("/data")
            .wait_timeout(Duration::from_millis(100))
            .retry_delay(Duration::from_millis(5))
            .finish();
        assert_eq!(opts.dsn, "/data");
        assert_eq!(opts.wait_timeout, Duration::from_millis(100));
        assert_eq!(opts.retry_delay, Duration::from_millis(5));
        assert!(opts.session.is_none());
    }

    #[test]
    fn connector_carries_driver_settings() {
        let driver = Driver::new(Duration::from_secs(1), Duration::from_millis(1));
        let connector = driver.open_connector("/data?timezone=UTC");
        assert_eq!(connector.options().wait_timeout, Duration::from_secs(1));
        assert_eq!(connector.options().retry_delay, Duration::from_millis(1));
        assert_eq!(Driver::default().wait_timeout(), DEFAULT_WAIT_TIMEOUT);
    }
}
