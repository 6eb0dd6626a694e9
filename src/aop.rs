use alloc::{
    boxed::Box,
    collections::BTreeMap,
    string::{String, ToString as _},
    sync::Arc,
};
use core::{
    any::{type_name, Any},
    fmt::{self, Display, Formatter},
};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::{
    any::TypeInfo,
    descriptor::Descriptor,
    errors::{BuildErrorKind, InterceptErrorKind, PostProcessErrorKind, ResolveErrorKind},
    instantiator::Instantiator,
    post_processor::PostProcessor,
    Instance,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSignature {
    pub owner: &'static str,
    pub method: &'static str,
}

impl MethodSignature {
    #[inline]
    #[must_use]
    pub const fn new(owner: &'static str, method: &'static str) -> Self {
        Self { owner, method }
    }
}

impl Display for MethodSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.method)
    }
}

/// Intercepted method call
pub struct Invocation<'a> {
    target: &'a Instance,
    signature: MethodSignature,
    proceed: &'a mut dyn FnMut() -> Box<dyn Any + Send>,
}

impl Invocation<'_> {
    /// The original instance the proxy delegates to
    #[inline]
    #[must_use]
    pub const fn target(&self) -> &Instance {
        self.target
    }

    #[inline]
    #[must_use]
    pub const fn signature(&self) -> MethodSignature {
        self.signature
    }

    #[inline]
    #[must_use]
    pub const fn method(&self) -> &'static str {
        self.signature.method
    }

    /// Calls the original method and returns its boxed result.
    /// Handlers may call it any number of times, including zero.
    #[inline]
    pub fn proceed(&mut self) -> Box<dyn Any + Send> {
        (self.proceed)()
    }
}

/// Code run around every intercepted call of a proxied component.
///
/// Handlers are components themselves, referenced by name from [`DescriptorBuilder::around`](crate::DescriptorBuilder::around).
/// The returned value must have the return type of the intercepted method.
pub trait InvocationHandler: Send + Sync {
    fn invoke(&self, invocation: Invocation<'_>) -> Box<dyn Any + Send>;
}

/// Routes a proxied method call through the handler.
/// Proxy implementations call it from every intercepted method with a closure calling the original.
///
/// # Errors
/// Returns [`InterceptErrorKind::ReturnTypeMismatch`] if the handler returned a value of another type than `R`
pub fn intercept<R, F>(
    handler: &dyn InvocationHandler,
    target: &Instance,
    signature: MethodSignature,
    mut call: F,
) -> Result<R, InterceptErrorKind>
where
    R: Send + 'static,
    F: FnMut() -> R,
{
    let mut proceed = || Box::new(call()) as Box<dyn Any + Send>;
    let result = handler.invoke(Invocation {
        target,
        signature,
        proceed: &mut proceed,
    });

    match result.downcast::<R>() {
        Ok(result) => Ok(*result),
        Err(_) => {
            let err = InterceptErrorKind::ReturnTypeMismatch {
                method: signature.to_string(),
                expected: type_name::<R>(),
            };
            error!("{}", err);
            Err(err)
        }
    }
}

/// Builds the stand-in of a component that routes its calls through a handler.
///
/// The returned instance replaces the original, so it must expose every type the descriptor declares.
/// It's usually a wrapper struct that keeps `Instance::from_arc(target)` for [`Invocation::target`]
/// and calls [`intercept`] from each method.
pub trait ProxyFactory<T: ?Sized>: Send + Sync {
    fn wrap(&self, target: Arc<T>, handler: Arc<dyn InvocationHandler>) -> Instance;
}

impl<T, F> ProxyFactory<T> for F
where
    T: ?Sized,
    F: Fn(Arc<T>, Arc<dyn InvocationHandler>) -> Instance + Send + Sync,
{
    #[inline]
    fn wrap(&self, target: Arc<T>, handler: Arc<dyn InvocationHandler>) -> Instance {
        self(target, handler)
    }
}

type WrapFn = Arc<dyn Fn(&Instance, Arc<dyn InvocationHandler>) -> Option<Instance> + Send + Sync>;

/// Interception declared on a descriptor: the name of the handler component and the proxy factory
#[derive(Clone)]
pub struct Around {
    handler: String,
    target: TypeInfo,
    wrap: WrapFn,
}

impl Around {
    #[must_use]
    pub fn new<T, F>(handler: impl Into<String>, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: ProxyFactory<T> + 'static,
    {
        Self {
            handler: handler.into(),
            target: TypeInfo::of::<T>(),
            wrap: Arc::new(move |instance: &Instance, handler: Arc<dyn InvocationHandler>| {
                instance.get::<T>().map(|target| factory.wrap(target, handler))
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Type the proxy factory wraps
    #[inline]
    #[must_use]
    pub const fn target(&self) -> TypeInfo {
        self.target
    }

    /// Returns `None` if the instance can't be viewed as the target type
    #[inline]
    fn wrap(&self, instance: &Instance, handler: Arc<dyn InvocationHandler>) -> Option<Instance> {
        (self.wrap)(instance, handler)
    }
}

/// Replaces components declaring [`Around`] with their proxies.
///
/// Originals are kept by name and handed back for property injection and destroy hooks,
/// until the component is destroyed.
#[derive(Default)]
pub struct AroundPostProcessor {
    originals: Mutex<BTreeMap<String, Instance>>,
}

impl AroundPostProcessor {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor of the post-processor, registered as `name`
    #[must_use]
    pub fn descriptor(name: impl Into<String>) -> Descriptor {
        Descriptor::builder::<Self>()
            .name(name)
            .alias::<dyn PostProcessor>()
            .constructor(|_| {
                Ok(Instance::new(Self::new()).view(|processor: Arc<Self>| processor as Arc<dyn PostProcessor>))
            })
    }

    fn handler(
        handler: &str,
        ctx: &mut Instantiator<'_>,
    ) -> Result<Arc<dyn InvocationHandler>, PostProcessErrorKind> {
        let instance = ctx.get_or_create(handler).map_err(|err| match err {
            BuildErrorKind::Resolve(ResolveErrorKind::NoDefinition { .. }) => PostProcessErrorKind::NoHandler {
                handler: handler.to_owned(),
            },
            err => PostProcessErrorKind::Build(Box::new(err)),
        })?;

        instance
            .get::<dyn InvocationHandler>()
            .ok_or_else(|| PostProcessErrorKind::NotAHandler {
                handler: handler.to_owned(),
            })
    }
}

impl PostProcessor for AroundPostProcessor {
    fn before_init(
        &self,
        instance: Instance,
        name: &str,
        ctx: &mut Instantiator<'_>,
    ) -> Result<Option<Instance>, PostProcessErrorKind> {
        let Some(around) = ctx.descriptor(name).and_then(Descriptor::around).cloned() else {
            return Ok(Some(instance));
        };

        let handler = Self::handler(around.handler(), ctx)?;
        let Some(proxy) = around.wrap(&instance, handler) else {
            return Err(PostProcessErrorKind::Unwrappable {
                actual: instance.type_info().name,
            });
        };

        debug!(name, handler = around.handler(), "Proxy created");

        self.originals.lock().insert(name.to_owned(), instance);
        Ok(Some(proxy))
    }

    fn on_property_injection(&self, instance: Instance, name: &str) -> Instance {
        self.originals.lock().get(name).cloned().unwrap_or(instance)
    }

    fn on_destroy(&self, name: &str) {
        self.originals.lock().remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::{intercept, Invocation, InvocationHandler, MethodSignature};
    use crate::{errors::InterceptErrorKind, Instance};

    use alloc::{boxed::Box, string::String};
    use core::any::Any;
    use tracing_test::traced_test;

    struct Upper;

    impl InvocationHandler for Upper {
        fn invoke(&self, mut invocation: Invocation<'_>) -> Box<dyn Any + Send> {
            let result = invocation.proceed();
            match result.downcast::<String>() {
                Ok(text) => Box::new(text.to_uppercase()),
                Err(other) => other,
            }
        }
    }

    struct Skip;

    impl InvocationHandler for Skip {
        fn invoke(&self, _: Invocation<'_>) -> Box<dyn Any + Send> {
            Box::new(())
        }
    }

    const GREET: MethodSignature = MethodSignature::new("Greeter", "greet");

    #[test]
    #[traced_test]
    fn test_intercept() {
        let target = Instance::new(String::from("original"));

        let result = intercept(&Upper, &target, GREET, || String::from("hello")).unwrap();
        assert_eq!(result, "HELLO");

        let result = intercept(&Upper, &target, GREET, || 5u8).unwrap();
        assert_eq!(result, 5);
    }

    #[test]
    #[traced_test]
    fn test_skipped_call() {
        let target = Instance::new(());
        let mut calls = 0;

        let err = intercept(&Skip, &target, GREET, || {
            calls += 1;
            String::new()
        })
        .unwrap_err();

        assert_eq!(calls, 0);
        assert!(matches!(err, InterceptErrorKind::ReturnTypeMismatch { method, .. } if method == "Greeter::greet"));
    }
}
