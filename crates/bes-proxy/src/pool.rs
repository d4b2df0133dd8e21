//! Bounded connection pool
//!
//! A fixed-size pool of pre-built [`BesConnection`]s per upstream. The pool
//! bounds concurrency against a single BES server, which is usually the
//! binding resource. Availability rides on a tokio semaphore (FIFO between
//! waiters, so no live waiter starves under steady traffic); a single mutex
//! guards only the idle stack.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::client::{BesConnection, BesConnectionConfig};
use crate::error::ProxyError;

/// Fixed-size pool of reusable authenticated connections.
///
/// Invariant: one semaphore permit is outstanding for every idle connection,
/// so a successful acquire always finds a connection to pop.
pub struct ConnectionPool {
    idle: Mutex<Vec<BesConnection>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl ConnectionPool {
    /// Create a pool of `size` connections bound to one upstream's
    /// credentials.
    pub fn new(config: BesConnectionConfig, size: usize) -> Result<Self, ProxyError> {
        let mut idle = Vec::with_capacity(size);
        for _ in 0..size {
            idle.push(BesConnection::new(config.clone())?);
        }

        debug!(
            "Created connection pool for {} (size: {})",
            config.base_url, size
        );

        Ok(Self {
            idle: Mutex::new(idle),
            permits: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    /// Take a connection from the pool, waiting until one is available.
    ///
    /// Fails only with [`ProxyError::PoolClosed`] once [`close`] has been
    /// called. Safe for many concurrent callers.
    ///
    /// [`close`]: ConnectionPool::close
    pub async fn acquire(&self) -> Result<BesConnection, ProxyError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ProxyError::PoolClosed)?;
        permit.forget();

        // The permit guarantees an idle connection unless close() drained
        // the stack between the acquire and the pop.
        self.idle.lock().pop().ok_or(ProxyError::PoolClosed)
    }

    /// Return a connection to the pool.
    ///
    /// On a closed pool the connection is dropped and its idle network
    /// resources are freed.
    pub fn release(&self, conn: BesConnection) {
        if self.permits.is_closed() {
            drop(conn);
            return;
        }

        self.idle.lock().push(conn);
        self.permits.add_permits(1);
    }

    /// Close the pool. Idempotent: refuses further acquires and drains the
    /// remaining idle connections.
    pub fn close(&self) {
        self.permits.close();
        let drained = {
            let mut idle = self.idle.lock();
            std::mem::take(&mut *idle)
        };
        if !drained.is_empty() {
            debug!("Closed pool, dropped {} idle connections", drained.len());
        }
    }

    /// Approximate count of currently available connections (informational).
    pub fn len(&self) -> usize {
        self.idle.lock().len()
    }

    /// Whether no connections are currently available
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured pool size
    pub fn size(&self) -> usize {
        self.size
    }
}
