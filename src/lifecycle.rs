use alloc::{string::String, sync::Arc};
use tracing::{debug, error};

use crate::{
    any::TypeInfo,
    descriptor::Descriptor,
    errors::{LifecycleErrorKind, Stage},
    post_processor::Pipeline,
    Instance,
};

/// States are only ever advanced by the container, one step at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Uninstantiated,
    Instantiated,
    Wired,
    Initialized,
    Destroyed,
}

/// Zero-argument methods of a component callable by name.
///
/// Hooks declared with [`Hook::named`] are looked up in the table of the instance they're called on,
/// see [`Instance::with_methods`].
pub trait MethodTable: Send + Sync {
    /// Returns `None` if the method doesn't exist
    fn call_method(&self, method: &str) -> Option<anyhow::Result<()>>;
}

type DirectHookFn = Arc<dyn Fn(&Instance) -> Option<anyhow::Result<()>> + Send + Sync>;

#[derive(Clone)]
pub struct DirectHook {
    target: TypeInfo,
    call: DirectHookFn,
}

impl DirectHook {
    #[inline]
    #[must_use]
    pub const fn target(&self) -> TypeInfo {
        self.target
    }
}

/// Init or destroy hook of a descriptor
#[derive(Clone)]
pub enum Hook {
    /// Method known when the descriptor is built, called on the instance viewed as the hook target type
    Direct(DirectHook),
    /// Method resolved by name on the instance when the hook is called
    Named(String),
}

impl Hook {
    #[must_use]
    pub fn direct<T, F>(call: F) -> Self
    where
        T: ?Sized + 'static,
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Direct(DirectHook {
            target: TypeInfo::of::<T>(),
            call: Arc::new(move |instance: &Instance| instance.get::<T>().map(|value| call(&value))),
        })
    }

    #[inline]
    #[must_use]
    pub fn named(method: impl Into<String>) -> Self {
        Self::Named(method.into())
    }

    /// Returns `None` if the instance doesn't have the hook's method
    fn call(&self, instance: &Instance) -> Option<anyhow::Result<()>> {
        match self {
            Self::Direct(DirectHook { call, .. }) => call(instance),
            Self::Named(method) => instance
                .get::<dyn MethodTable>()
                .and_then(|table| table.call_method(method)),
        }
    }

    fn missing(&self, name: &str, stage: Stage) -> LifecycleErrorKind {
        match self {
            Self::Direct(DirectHook { target, .. }) => LifecycleErrorKind::IncompatibleHook {
                name: name.to_owned(),
                stage,
                expected: target.name,
            },
            Self::Named(method) => LifecycleErrorKind::MissingLifecycleMethod {
                name: name.to_owned(),
                method: method.clone(),
            },
        }
    }
}

/// Calls the init hook on the current instance.
///
/// A direct hook falls back to the unwrapped instance when the current one is a substitute
/// that doesn't expose the hook target type.
pub(crate) fn init(descriptor: &mut Descriptor, pipeline: &Pipeline) -> Result<(), LifecycleErrorKind> {
    let name = descriptor.name().to_owned();

    if let (Some(hook), Some(instance)) = (descriptor.init_hook(), descriptor.instance()) {
        let mut result = hook.call(instance);
        if result.is_none() && matches!(hook, Hook::Direct(_)) {
            result = hook.call(&pipeline.unwrap(instance, &name));
        }

        match result {
            Some(Ok(())) => debug!(%name, "Init hook called"),
            Some(Err(source)) => {
                let err = LifecycleErrorKind::HookFailure {
                    name,
                    stage: Stage::Init,
                    source,
                };
                error!("{}", err);
                return Err(err);
            }
            None => {
                let err = hook.missing(&name, Stage::Init);
                error!("{}", err);
                return Err(err);
            }
        }
    }

    descriptor.state = LifecycleState::Initialized;
    Ok(())
}

/// Instance and destroy hook taken out of a descriptor that is shut down
pub(crate) struct Teardown {
    name: String,
    instance: Option<Instance>,
    hook: Option<Hook>,
}

/// Takes the instance out of the descriptor, its destroy hook is called later by [`destroy`]
pub(crate) fn release(descriptor: &mut Descriptor) -> Teardown {
    descriptor.state = LifecycleState::Destroyed;

    Teardown {
        name: descriptor.name().to_owned(),
        instance: descriptor.instance.take(),
        hook: descriptor.destroy_hook().cloned(),
    }
}

/// Calls the destroy hook on the unwrapped instance, then lets post-processors drop what they keep for it.
/// The instance is dropped even if the hook fails.
pub(crate) fn destroy(teardown: Teardown, pipeline: &Pipeline) -> Result<(), LifecycleErrorKind> {
    let Teardown { name, instance, hook } = teardown;

    let result = match (hook, instance) {
        (Some(hook), Some(instance)) => match hook.call(&pipeline.unwrap(&instance, &name)) {
            Some(Ok(())) => {
                debug!(%name, "Destroy hook called");
                Ok(())
            }
            Some(Err(source)) => Err(LifecycleErrorKind::HookFailure {
                name: name.clone(),
                stage: Stage::Destroy,
                source,
            }),
            None => Err(hook.missing(&name, Stage::Destroy)),
        },
        _ => Ok(()),
    };

    pipeline.release(&name);
    result
}
