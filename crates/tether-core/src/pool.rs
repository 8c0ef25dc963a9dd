//! Bounded component pools.
//!
//! A [`ComponentPool`] recycles instances of one component class. Up to
//! `pool_max` instances are pooled; once all of them are checked out the
//! [`OverflowPolicy`] decides whether a throwaway instance is created or the
//! caller waits for a release.
//!
//! Checked-out instances are held through a [`Lease`]. Releasing a lease
//! consumes it; a lease dropped without an explicit release is returned to
//! the pool as well.

use crate::class::ComponentClass;
use crate::component::{Component, ComponentFactory};
use crate::config::{OverflowPolicy, PoolConfig};
use crate::error::{ComponentError, PoolError, Result};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Maximum number of pooled instances.
    pub max: usize,
    /// Instances currently idle in the pool.
    pub idle: usize,
    /// Instances currently checked out, overflow instances included.
    pub checked_out: usize,
    /// Total instances created, overflow instances included.
    pub created: u64,
    /// Overflow instances created beyond `max`.
    pub overflow_created: u64,
    /// Successful acquisitions.
    pub acquired: u64,
    /// Releases, successful or not.
    pub released: u64,
    /// Instances disposed instead of pooled.
    pub discarded: u64,
}

struct PoolState<C> {
    idle: Vec<C>,
    /// Pooled (non-overflow) instances currently checked out.
    pooled_out: usize,
    disposed: bool,
}

struct PoolShared<C> {
    class: ComponentClass,
    factory: Box<dyn ComponentFactory<C>>,
    max: usize,
    policy: OverflowPolicy,
    timeout: Duration,
    state: Mutex<PoolState<C>>,
    released: Condvar,
    checked_out: AtomicUsize,
    created: AtomicU64,
    overflow_created: AtomicU64,
    acquired: AtomicU64,
    releases: AtomicU64,
    discarded: AtomicU64,
}

impl<C: Component> PoolShared<C> {
    fn create(&self) -> Result<C> {
        let mut instance =
            self.factory
                .create_component()
                .map_err(|source| PoolError::Create {
                    class: self.class.name().to_string(),
                    source,
                })?;

        if let Err(source) = instance.initialize() {
            instance.dispose();
            return Err(PoolError::Initialize {
                class: self.class.name().to_string(),
                source,
            });
        }

        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(instance)
    }

    /// Gives back a pooled slot reserved for a creation that failed.
    fn cancel_reservation(&self) {
        let mut state = self.state.lock();
        state.pooled_out -= 1;
        drop(state);
        self.released.notify_one();
    }

    fn discard(&self, mut instance: C) {
        instance.dispose();
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    fn restore(&self, mut instance: C, overflow: bool) -> Result<()> {
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.checked_out.fetch_sub(1, Ordering::Relaxed);

        let recycled = match catch_unwind(AssertUnwindSafe(|| instance.recycle())) {
            Ok(result) => result,
            Err(panic) => Err(panic_error(panic.as_ref())),
        };

        if overflow {
            tracing::debug!(class = %self.class.name(), "discarding overflow instance");
            self.discard(instance);
        } else {
            let mut state = self.state.lock();
            state.pooled_out -= 1;
            if recycled.is_ok() && !state.disposed {
                state.idle.push(instance);
                drop(state);
            } else {
                drop(state);
                self.discard(instance);
            }
            self.released.notify_one();
        }

        recycled.map_err(|source| PoolError::Recycle {
            class: self.class.name().to_string(),
            source,
        })
    }
}

/// A pooled slot reserved for an instance being created.
///
/// Dropped without [`Reservation::keep`], including while unwinding from a
/// panicking factory, it gives the slot back.
struct Reservation<'a, C: Component> {
    shared: &'a PoolShared<C>,
    held: bool,
}

impl<'a, C: Component> Reservation<'a, C> {
    fn new(shared: &'a PoolShared<C>) -> Self {
        Self { shared, held: true }
    }

    fn keep(mut self) {
        self.held = false;
    }
}

impl<C: Component> Drop for Reservation<'_, C> {
    fn drop(&mut self) {
        if self.held {
            self.shared.cancel_reservation();
        }
    }
}

fn panic_error(panic: &(dyn Any + Send)) -> ComponentError {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}").into()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}").into()
    } else {
        "panicked".into()
    }
}

/// A bounded pool of component instances.
pub struct ComponentPool<C> {
    shared: Arc<PoolShared<C>>,
}

impl<C> Clone for ComponentPool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Component> ComponentPool<C> {
    /// Creates a pool drawing instances from `factory`.
    ///
    /// No instance is created until the first acquisition; see [`ComponentPool::warm_up`].
    pub fn new<F>(factory: F, config: &PoolConfig) -> Self
    where
        F: ComponentFactory<C> + 'static,
    {
        let class = factory.created_class();
        Self {
            shared: Arc::new(PoolShared {
                class,
                factory: Box::new(factory),
                max: config.pool_max,
                policy: config.overflow,
                timeout: config.timeout_duration(),
                state: Mutex::new(PoolState {
                    idle: Vec::with_capacity(config.pool_max),
                    pooled_out: 0,
                    disposed: false,
                }),
                released: Condvar::new(),
                checked_out: AtomicUsize::new(0),
                created: AtomicU64::new(0),
                overflow_created: AtomicU64::new(0),
                acquired: AtomicU64::new(0),
                releases: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the class of the pooled instances.
    pub fn class(&self) -> &ComponentClass {
        &self.shared.class
    }

    /// Fills the pool with idle instances until it holds `count` of them.
    pub fn warm_up(&self, count: usize) -> Result<()> {
        let target = count.min(self.shared.max);
        loop {
            {
                let mut state = self.shared.state.lock();
                if state.disposed {
                    return Err(PoolError::Disposed(self.shared.class.name().to_string()));
                }
                if state.idle.len() + state.pooled_out >= target {
                    return Ok(());
                }
                state.pooled_out += 1;
            }

            let reservation = Reservation::new(&self.shared);
            let instance = self.shared.create()?;
            reservation.keep();

            let mut state = self.shared.state.lock();
            state.pooled_out -= 1;
            state.idle.push(instance);
        }
    }

    /// Checks an instance out of the pool.
    ///
    /// Reuses an idle instance when one exists, otherwise creates one. Once
    /// `pool_max` pooled instances are checked out the overflow policy applies.
    pub fn get(&self) -> Result<Lease<C>> {
        let shared = &self.shared;
        let deadline = Instant::now() + shared.timeout;
        let mut state = shared.state.lock();

        let overflow = loop {
            if state.disposed {
                return Err(PoolError::Disposed(shared.class.name().to_string()));
            }

            if let Some(instance) = state.idle.pop() {
                state.pooled_out += 1;
                drop(state);
                tracing::trace!(class = %shared.class.name(), "reusing idle instance");
                return Ok(self.lease(instance, false));
            }

            if state.pooled_out < shared.max {
                state.pooled_out += 1;
                break false;
            }

            match shared.policy {
                OverflowPolicy::Create => break true,
                OverflowPolicy::Block => {
                    if shared.released.wait_until(&mut state, deadline).timed_out() {
                        let waited_ms = shared.timeout.as_millis().try_into().unwrap_or(u64::MAX);
                        tracing::warn!(
                            class = %shared.class.name(),
                            waited_ms,
                            "pool exhausted"
                        );
                        return Err(PoolError::Exhausted {
                            class: shared.class.name().to_string(),
                            waited_ms,
                        });
                    }
                }
            }
        };
        drop(state);

        let reservation = (!overflow).then(|| Reservation::new(shared));
        let instance = shared.create()?;
        if let Some(reservation) = reservation {
            reservation.keep();
        }

        if overflow {
            shared.overflow_created.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(class = %shared.class.name(), overflow, "created instance");
        Ok(self.lease(instance, overflow))
    }

    fn lease(&self, instance: C, overflow: bool) -> Lease<C> {
        self.shared.acquired.fetch_add(1, Ordering::Relaxed);
        self.shared.checked_out.fetch_add(1, Ordering::Relaxed);
        Lease {
            instance: Some(instance),
            overflow,
            pool: Arc::clone(&self.shared),
        }
    }

    /// Returns a checked-out instance to the pool.
    pub fn put(&self, lease: Lease<C>) -> Result<()> {
        lease.release()
    }

    /// Disposes all idle instances and closes the pool.
    ///
    /// Instances still checked out are disposed when they are released.
    pub fn dispose(&self) {
        let idle = {
            let mut state = self.shared.state.lock();
            state.disposed = true;
            std::mem::take(&mut state.idle)
        };
        self.shared.released.notify_all();

        tracing::debug!(
            class = %self.shared.class.name(),
            idle = idle.len(),
            "disposing pool"
        );
        for instance in idle {
            self.shared.discard(instance);
        }
    }

    /// Returns true once the pool has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().disposed
    }

    /// Returns pool statistics.
    pub fn stats(&self) -> PoolStats {
        let idle = self.shared.state.lock().idle.len();
        PoolStats {
            max: self.shared.max,
            idle,
            checked_out: self.shared.checked_out.load(Ordering::Relaxed),
            created: self.shared.created.load(Ordering::Relaxed),
            overflow_created: self.shared.overflow_created.load(Ordering::Relaxed),
            acquired: self.shared.acquired.load(Ordering::Relaxed),
            released: self.shared.releases.load(Ordering::Relaxed),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
        }
    }
}

impl<C> fmt::Debug for ComponentPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentPool")
            .field("class", &self.shared.class.name())
            .field("max", &self.shared.max)
            .field("policy", &self.shared.policy)
            .finish_non_exhaustive()
    }
}

/// A checked-out component instance.
///
/// Returned to its pool by [`Lease::release`] or on drop.
pub struct Lease<C: Component> {
    instance: Option<C>,
    overflow: bool,
    pool: Arc<PoolShared<C>>,
}

impl<C: Component> Lease<C> {
    /// Returns true if this instance was created beyond the pool maximum.
    pub fn is_overflow(&self) -> bool {
        self.overflow
    }

    /// Returns the instance to its pool, reporting recycle failures.
    pub fn release(mut self) -> Result<()> {
        match self.instance.take() {
            Some(instance) => self.pool.restore(instance, self.overflow),
            None => Ok(()),
        }
    }
}

impl<C: Component> Deref for Lease<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        self.instance
            .as_ref()
            .unwrap_or_else(|| unreachable!("lease accessed after release"))
    }
}

impl<C: Component> DerefMut for Lease<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.instance
            .as_mut()
            .unwrap_or_else(|| unreachable!("lease accessed after release"))
    }
}

impl<C: Component> Drop for Lease<C> {
    fn drop(&mut self) {
        if let Some(instance) = self.instance.take() {
            if let Err(e) = self.pool.restore(instance, self.overflow) {
                tracing::warn!(error = %e, "dropped lease failed to recycle");
            }
        }
    }
}

impl<C: Component> fmt::Debug for Lease<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("class", &self.pool.class.name())
            .field("overflow", &self.overflow)
            .finish()
    }
}
