//! Pool options application trait to deduplicate configuration logic.

use sqlx::pool::PoolOptions;

use crate::ConnectOpts;

/// Trait for applying connection options to pool builders.
///
/// Every sqlx backend shares the same generic builder, so a single impl covers
/// all enabled engines.
pub trait ApplyPoolOpts {
    /// Apply connection options to the pool builder.
    #[must_use]
    fn apply(self, opts: &ConnectOpts) -> Self;
}

impl<DB: sqlx::Database> ApplyPoolOpts for PoolOptions<DB> {
    fn apply(mut self, opts: &ConnectOpts) -> Self {
        if let Some(limits) = opts.limits {
            // max-idle maps onto the retained minimum: the pool is kept warm at its
            // cap and idle connections are never reclaimed below it.
            self = self
                .max_connections(limits.max_open)
                .min_connections(limits.max_idle);
        }
        if let Some(t) = opts.acquire_timeout {
            self = self.acquire_timeout(t);
        }
        if let Some(t) = opts.idle_timeout {
            self = self.idle_timeout(t);
        }
        if let Some(t) = opts.max_lifetime {
            self = self.max_lifetime(t);
        }
        if opts.test_before_acquire {
            self = self.test_before_acquire(true);
        }
        self
    }
}
