//! Handler for poolable components.

use crate::class::{ComponentClass, InterfaceSet, ADMINISTRATIVE_INTERFACES};
use crate::component::{Component, ComponentFactory};
use crate::config::PoolConfig;
use crate::error::HandlerError;
use crate::pool::{ComponentPool, PoolStats};
use crate::proxy::Proxy;

/// Manages a pool of component instances behind a single proxy.
///
/// Construction discovers the interface set of the factory's class, builds
/// the pool and warms it up to `pool_min` instances. Every lookup returns the
/// same proxy; instances are bound to units of work on first use.
pub struct PoolableComponentHandler<C> {
    class: ComponentClass,
    config: PoolConfig,
    pool: ComponentPool<C>,
    proxy: Proxy<C>,
}

impl<C: Component> PoolableComponentHandler<C> {
    /// Creates a handler, excluding the default administrative interfaces.
    pub fn new<F>(factory: F, config: PoolConfig) -> Result<Self, HandlerError>
    where
        F: ComponentFactory<C> + 'static,
    {
        Self::with_denylist(factory, config, ADMINISTRATIVE_INTERFACES)
    }

    /// Creates a handler whose proxy excludes the named interfaces.
    pub fn with_denylist<F>(
        factory: F,
        config: PoolConfig,
        denylist: &[&str],
    ) -> Result<Self, HandlerError>
    where
        F: ComponentFactory<C> + 'static,
    {
        config.check()?;

        let class = factory.created_class();
        let interfaces = InterfaceSet::discover_excluding(&class, denylist);
        if interfaces.is_empty() {
            return Err(HandlerError::NoInterfaces(class.name().to_string()));
        }

        let pool = ComponentPool::new(factory, &config);
        pool.warm_up(config.pool_min)?;

        tracing::info!(
            class = %class.name(),
            interfaces = ?interfaces,
            pool_max = config.pool_max,
            pool_min = config.pool_min,
            overflow = ?config.overflow,
            "component handler ready"
        );

        let proxy = Proxy::new(interfaces, pool.clone());
        Ok(Self {
            class,
            config,
            pool,
            proxy,
        })
    }

    /// Returns the proxy for this component.
    pub fn proxy(&self) -> Proxy<C> {
        self.proxy.clone()
    }

    /// Returns the component class.
    pub fn class(&self) -> &ComponentClass {
        &self.class
    }

    /// Returns the interfaces the proxy implements.
    pub fn interfaces(&self) -> &InterfaceSet {
        self.proxy.interfaces()
    }

    /// Returns the handler configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &ComponentPool<C> {
        &self.pool
    }

    /// Returns pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Disposes the pool. Outstanding borrows are disposed on release.
    pub fn dispose(&self) {
        tracing::info!(class = %self.class.name(), "disposing component handler");
        self.pool.dispose();
    }

    /// Returns true once the handler has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.pool.is_disposed()
    }
}
