//! Proxies that bind pooled instances to units of work.
//!
//! A [`Proxy`] stands in for a pooled component. The first call made through
//! it within a [`UnitOfWork`] checks an instance out of the pool, records the
//! borrow in the unit of work and registers one cleanup task that returns the
//! instance when the unit of work ends. Later calls in the same unit of work
//! reuse that instance.

use crate::class::{ComponentClass, InterfaceSet};
use crate::component::Component;
use crate::error::ProxyError;
use crate::pool::{ComponentPool, Lease};
use crate::unit_of_work::{BorrowKey, UnitOfWork};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_PROXY_ID: AtomicU64 = AtomicU64::new(1);

/// Names a method by its interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Method {
    interface: &'static str,
    name: &'static str,
}

impl Method {
    /// Creates a method reference.
    pub const fn new(interface: &'static str, name: &'static str) -> Self {
        Self { interface, name }
    }

    /// Returns the interface declaring the method.
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Returns the method name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.interface, self.name)
    }
}

struct ProxyInner<C> {
    id: BorrowKey,
    interfaces: InterfaceSet,
    pool: ComponentPool<C>,
}

/// A handle standing in for a pooled component.
///
/// Clones share identity. Identity queries ([`Proxy::hash_code`], equality,
/// hashing, formatting) never touch the pool.
pub struct Proxy<C> {
    inner: Arc<ProxyInner<C>>,
}

impl<C: Component> Proxy<C> {
    pub(crate) fn new(interfaces: InterfaceSet, pool: ComponentPool<C>) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                id: NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed),
                interfaces,
                pool,
            }),
        }
    }

    /// Returns a stable identity code for this proxy.
    pub fn hash_code(&self) -> u64 {
        self.inner.id
    }

    /// Returns the class of the proxied component.
    pub fn class(&self) -> &ComponentClass {
        self.inner.pool.class()
    }

    /// Returns the interfaces this proxy answers for.
    pub fn interfaces(&self) -> &InterfaceSet {
        &self.inner.interfaces
    }

    /// Returns true if the proxy implements the named interface.
    pub fn implements(&self, interface: &str) -> bool {
        self.inner.interfaces.contains(interface)
    }

    /// Returns true if an instance is bound to `cx` through this proxy.
    pub fn is_bound(&self, cx: &UnitOfWork) -> bool {
        cx.is_bound(self.inner.id)
    }

    /// Returns a view of this proxy bound to `cx`.
    pub fn bind<'a>(&'a self, cx: &'a UnitOfWork) -> Bound<'a, C> {
        Bound { proxy: self, cx }
    }

    /// Dispatches `call` to the instance bound to `cx`, binding one first if needed.
    ///
    /// Errors returned by `call` reach the caller unchanged. Failures of the
    /// proxy itself are converted through `From<ProxyError>`.
    pub fn invoke<R, E, F>(&self, cx: &UnitOfWork, method: Method, call: F) -> Result<R, E>
    where
        F: FnOnce(&mut C) -> Result<R, E>,
        E: From<ProxyError>,
    {
        if !self.implements(method.interface()) {
            return Err(ProxyError::UnsupportedInterface {
                class: self.class().name().to_string(),
                interface: method.interface().to_string(),
                method: method.name().to_string(),
            }
            .into());
        }

        let key = self.inner.id;
        let Ok(bound) = cx.enter::<Lease<C>>(key) else {
            return Err(ProxyError::Reentrant {
                class: self.class().name().to_string(),
                method: method.name().to_string(),
            }
            .into());
        };

        // From here on the slot is marked in use; the guard rebinds or vacates it.
        let mut guard = CallGuard {
            cx,
            key,
            lease: bound,
        };
        if guard.lease.is_none() {
            guard.lease = Some(self.acquire(cx)?);
        }
        tracing::trace!(parent: cx.span(), %method, "dispatching call");
        call(guard.instance())
    }

    fn acquire(&self, cx: &UnitOfWork) -> Result<Lease<C>, ProxyError> {
        let lease = self.inner.pool.get()?;

        let key = self.inner.id;
        let pool = self.inner.pool.clone();
        cx.add_cleanup_task(format!("release {}", self.class().name()), move |cx| {
            match cx.take_bound::<Lease<C>>(key) {
                Some(lease) => pool.put(lease).map_err(Into::into),
                None => Ok(()),
            }
        });

        tracing::debug!(
            parent: cx.span(),
            class = %self.class().name(),
            overflow = lease.is_overflow(),
            "bound instance to unit of work"
        );
        Ok(lease)
    }
}

/// Puts the lease back into the unit of work when a call ends, even by panic.
///
/// Without a lease (acquisition failed or unwound) the in-use marker is cleared.
struct CallGuard<'a, C: Component> {
    cx: &'a UnitOfWork,
    key: BorrowKey,
    lease: Option<Lease<C>>,
}

impl<C: Component> CallGuard<'_, C> {
    fn instance(&mut self) -> &mut C {
        self.lease
            .as_deref_mut()
            .unwrap_or_else(|| unreachable!("call guard holds a lease until dropped"))
    }
}

impl<C: Component> Drop for CallGuard<'_, C> {
    fn drop(&mut self) {
        match self.lease.take() {
            Some(lease) => self.cx.bind(self.key, lease),
            None => self.cx.vacate(self.key),
        }
    }
}

impl<C> Clone for Proxy<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> PartialEq for Proxy<C> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<C> Eq for Proxy<C> {}

impl<C> Hash for Proxy<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<C> fmt::Debug for Proxy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("id", &self.inner.id)
            .field("interfaces", &self.inner.interfaces)
            .finish()
    }
}

/// A proxy bound to one unit of work.
///
/// Component interface traits are implemented for `Bound` with [`delegate!`](crate::delegate).
pub struct Bound<'a, C> {
    proxy: &'a Proxy<C>,
    cx: &'a UnitOfWork,
}

impl<'a, C: Component> Bound<'a, C> {
    /// Returns the underlying proxy.
    pub fn proxy(&self) -> &'a Proxy<C> {
        self.proxy
    }

    /// Returns the unit of work.
    pub fn unit_of_work(&self) -> &'a UnitOfWork {
        self.cx
    }

    /// Dispatches `call` through the proxy; see [`Proxy::invoke`].
    pub fn invoke<R, E, F>(&self, method: Method, call: F) -> Result<R, E>
    where
        F: FnOnce(&mut C) -> Result<R, E>,
        E: From<ProxyError>,
    {
        self.proxy.invoke(self.cx, method, call)
    }
}

/// Implements a component interface trait for [`Bound`] by forwarding every
/// method to the pooled instance.
///
/// Each method must take `&self` and return a `Result` whose error type
/// implements `From<ProxyError>`. The interface name used for dispatch checks
/// is the trait's name.
///
/// ```ignore
/// trait Greeter {
///     fn greet(&self, name: &str) -> Result<String, GreetError>;
/// }
///
/// tether_core::delegate!(Greeter for Echo {
///     fn greet(&self, name: &str) -> Result<String, GreetError>;
/// });
///
/// let greeting = proxy.bind(&cx).greet("Ann")?;
/// ```
#[macro_export]
macro_rules! delegate {
    ($iface:ident for $component:ty {
        $(fn $method:ident(&self $(, $arg:ident: $ty:ty)*) -> $ret:ty;)*
    }) => {
        impl $iface for $crate::Bound<'_, $component> {
            $(
                fn $method(&self $(, $arg: $ty)*) -> $ret {
                    self.invoke(
                        $crate::Method::new(stringify!($iface), stringify!($method)),
                        |target: &mut $component| <$component as $iface>::$method(target $(, $arg)*),
                    )
                }
            )*
        }
    };
}
