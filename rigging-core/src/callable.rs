//! The async callable contract shared by signal handlers and hook
//! implementations.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::stdio::StdioHandles;

/// Everything one invocation of a callable receives.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Positional string arguments.
    pub args: Vec<String>,

    /// The process exit status captured before the invocation started.
    pub status: i32,

    /// Output handles; captured or passthrough depending on the caller.
    pub io: StdioHandles,
}

impl Invocation {
    /// An invocation with no arguments and passthrough output.
    pub fn bare(status: i32) -> Self {
        Self {
            args: Vec::new(),
            status,
            io: StdioHandles::passthrough(),
        }
    }
}

/// One unit of user logic, registered under a name and invoked by the
/// signal dispatcher or the hook executor.
///
/// The returned `i32` is the callable's exit status; zero is success.
pub trait Callable: Send + Sync {
    fn call(&self, invocation: Invocation) -> BoxFuture<'static, i32>;
}

/// Wrap an async closure as a [`Callable`].
pub fn callable_from_fn<F, Fut>(f: F) -> Arc<dyn Callable>
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = i32> + Send + 'static,
{
    Arc::new(FnCallable { f })
}

struct FnCallable<F> {
    f: F,
}

impl<F, Fut> Callable for FnCallable<F>
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = i32> + Send + 'static,
{
    fn call(&self, invocation: Invocation) -> BoxFuture<'static, i32> {
        Box::pin((self.f)(invocation))
    }
}

/// A callable paired with the name it was registered under.
#[derive(Clone)]
pub struct NamedCallable {
    pub name: String,
    pub callable: Arc<dyn Callable>,
}

impl NamedCallable {
    pub fn new(name: impl Into<String>, callable: Arc<dyn Callable>) -> Self {
        Self {
            name: name.into(),
            callable,
        }
    }
}

impl fmt::Debug for NamedCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCallable")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
