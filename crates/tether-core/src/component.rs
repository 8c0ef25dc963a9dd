//! Component lifecycle and factory contracts.

use crate::class::ComponentClass;
use crate::error::ComponentError;

/// Lifecycle contract for a poolable component instance.
///
/// Instances are created by a [`ComponentFactory`], initialized once, recycled
/// every time they go back to the pool and disposed when the pool discards
/// them.
pub trait Component: Send + 'static {
    /// Called once after creation, before first use.
    fn initialize(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Resets per-request state before the instance is reused.
    ///
    /// An error discards the instance instead of pooling it.
    fn recycle(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Releases resources held by the instance.
    fn dispose(&mut self) {}
}

/// Creates raw component instances of one class.
pub trait ComponentFactory<C>: Send + Sync {
    /// Creates a new, uninitialized instance.
    fn create_component(&self) -> Result<C, ComponentError>;

    /// Returns the class of the instances this factory creates.
    fn created_class(&self) -> ComponentClass;
}

/// A factory backed by a closure.
pub struct FnFactory<F> {
    class: ComponentClass,
    create: F,
}

impl<F> FnFactory<F> {
    /// Creates a factory producing `class` instances with `create`.
    pub fn new(class: ComponentClass, create: F) -> Self {
        Self { class, create }
    }
}

impl<C, F> ComponentFactory<C> for FnFactory<F>
where
    F: Fn() -> Result<C, ComponentError> + Send + Sync,
{
    fn create_component(&self) -> Result<C, ComponentError> {
        (self.create)()
    }

    fn created_class(&self) -> ComponentClass {
        self.class.clone()
    }
}

/// Creates a closure-backed factory.
pub fn factory_fn<C, F>(class: ComponentClass, create: F) -> FnFactory<F>
where
    F: Fn() -> Result<C, ComponentError> + Send + Sync,
{
    FnFactory::new(class, create)
}
