//! Pooled component proxies for Tether.
//!
//! This crate manages bounded pools of reusable, non-shareable component
//! instances behind proxies. A proxy borrows one instance per unit of work on
//! first use and returns it when the unit of work ends, including when the
//! work fails or panics.
//!
//! ```rust,ignore
//! let handler = PoolableComponentHandler::new(factory, PoolConfig::default())?;
//! let proxy = handler.proxy();
//!
//! let (greeting, report) = UnitOfWork::run(|cx| proxy.bind(cx).greet("Ann"));
//! ```

mod class;
mod component;
mod config;
mod error;
mod handler;
mod pool;
mod proxy;
mod unit_of_work;

pub use class::{ComponentClass, Interface, InterfaceSet, ADMINISTRATIVE_INTERFACES};
pub use component::{factory_fn, Component, ComponentFactory, FnFactory};
pub use config::{OverflowPolicy, PoolConfig, DEFAULT_POOL_MAX, ENV_PREFIX};
pub use error::{ComponentError, ConfigError, HandlerError, PoolError, ProxyError, Result};
pub use handler::PoolableComponentHandler;
pub use pool::{ComponentPool, Lease, PoolStats};
pub use proxy::{Bound, Method, Proxy};
pub use unit_of_work::{CleanupFailure, CleanupReport, UnitOfWork};
