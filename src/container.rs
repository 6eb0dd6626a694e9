use alloc::{
    string::{String, ToString as _},
    sync::Arc,
    vec::Vec,
};
use core::{
    any::type_name,
    fmt::{self, Debug, Formatter},
    sync::atomic::{AtomicBool, Ordering},
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info_span, warn};

use crate::{
    any::TypeInfo,
    descriptor::Descriptor,
    discovery::{self, Discovery},
    errors::{BuildErrorKind, DefinitionErrorKind, LifecycleErrorKind, ResolveErrorKind},
    injector,
    instantiator::Instantiator,
    lifecycle::{self, LifecycleState},
    post_processor::Pipeline,
    property::PropertyResolver,
    registry::Registry,
    Instance,
};

/// Collects descriptors and builds a [`Container`] from them
#[derive(Default)]
pub struct ContainerBuilder {
    registry: Registry,
    properties: PropertyResolver,
    error: Option<DefinitionErrorKind>,
}

impl ContainerBuilder {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the descriptor.
    /// A duplicate name is reported by [`ContainerBuilder::build`].
    #[inline]
    #[must_use]
    pub fn register(mut self, descriptor: Descriptor) -> Self {
        if let Err(err) = self.registry.register(descriptor) {
            self.error.get_or_insert(err);
        }
        self
    }

    /// Registers descriptors of the source and its imports
    #[must_use]
    pub fn scan(self, discovery: &dyn Discovery) -> Self {
        let mut descriptors = Vec::new();
        discovery::collect(discovery, &mut descriptors);
        descriptors.into_iter().fold(self, Self::register)
    }

    #[inline]
    #[must_use]
    pub fn properties(mut self, properties: PropertyResolver) -> Self {
        self.properties = properties;
        self
    }

    /// Creates every registered component, injects their properties and calls their init hooks.
    ///
    /// # Errors
    /// Returns the first error of the build. Components created before it are dropped without destroy hooks.
    pub fn build(self) -> Result<Container, BuildErrorKind> {
        let Self {
            mut registry,
            properties,
            error,
        } = self;

        let span = info_span!("build", definitions = registry.len());
        let _guard = span.enter();

        if let Some(err) = error {
            return Err(err.into());
        }
        registry.validate()?;

        let mut ctx = Instantiator::new(&mut registry, &properties);
        ctx.create_all()?;
        injector::inject_all(&mut ctx)?;
        let (pipeline, created) = ctx.finish();

        for index in &created {
            lifecycle::init(registry.at_mut(*index), &pipeline)?;
        }

        debug!(processors = ?pipeline.names(), "Container built");

        Ok(Container {
            inner: Arc::new(ContainerInner {
                registry: RwLock::new(registry),
                properties,
                pipeline: Mutex::new(pipeline),
                created,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

/// Destroy hook failures collected while closing a container
#[derive(Debug, Default)]
pub struct ShutdownReport {
    failures: Vec<LifecycleErrorKind>,
}

impl ShutdownReport {
    /// Returns `true` if every destroy hook succeeded
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn failures(&self) -> &[LifecycleErrorKind] {
        &self.failures
    }

    #[inline]
    #[must_use]
    pub fn into_failures(self) -> Vec<LifecycleErrorKind> {
        self.failures
    }
}

/// Built components.
///
/// Cloning is cheap, every clone refers to the same components.
/// The components are destroyed by [`Container::close`] or when the last clone is dropped.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    #[inline]
    #[must_use]
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// Gets the component assignable to `T`.
    /// If several are, the one marked as primary is returned.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::NoDefinition`] if there's no such component
    /// - Returns [`ResolveErrorKind::AmbiguousDependency`] if there are several, but not exactly one primary
    pub fn get<T: ?Sized + 'static>(&self) -> Result<Arc<T>, ResolveErrorKind> {
        let span = info_span!("get", dependency = type_name::<T>());
        let _guard = span.enter();

        let type_info = TypeInfo::of::<T>();
        let registry = self.inner.registry.read();
        let Some(descriptor) = registry.resolve_unique(&type_info)? else {
            let err = ResolveErrorKind::NoDefinition {
                key: type_info.name.to_string(),
            };
            error!("{}", err);
            return Err(err);
        };

        view(descriptor)
    }

    /// Gets the component registered with the name, which must be assignable to `T`
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::NoDefinition`] if there's no such component
    /// - Returns [`ResolveErrorKind::TypeMismatch`] if it isn't assignable to `T`
    pub fn get_named<T: ?Sized + 'static>(&self, name: &str) -> Result<Arc<T>, ResolveErrorKind> {
        let span = info_span!("get_named", name, dependency = type_name::<T>());
        let _guard = span.enter();

        let registry = self.inner.registry.read();
        let Some(descriptor) = registry.resolve_named(name, &TypeInfo::of::<T>())? else {
            let err = ResolveErrorKind::NoDefinition { key: name.to_owned() };
            error!("{}", err);
            return Err(err);
        };

        view(descriptor)
    }

    /// Current instance of the component, which is the substitute if a post-processor replaced it
    #[must_use]
    pub fn instance(&self, name: &str) -> Option<Instance> {
        self.inner.registry.read().get(name).and_then(Descriptor::instance).cloned()
    }

    /// Snapshot of the descriptor, it doesn't follow later state changes
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<Descriptor> {
        self.inner.registry.read().get(name).cloned()
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<LifecycleState> {
        self.inner.registry.read().get(name).map(Descriptor::state)
    }

    /// Names of the components in registration order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.inner
            .registry
            .read()
            .iter()
            .map(|descriptor| descriptor.name().to_owned())
            .collect()
    }

    #[inline]
    #[must_use]
    pub fn properties(&self) -> &PropertyResolver {
        &self.inner.properties
    }

    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Calls destroy hooks in reverse creation order and releases every component, post-processors included.
    /// Hooks run without any lock held, so they may use the container.
    /// Hook failures don't stop the shutdown, they're logged and reported.
    /// Closing a closed container does nothing.
    pub fn close(&self) -> ShutdownReport {
        self.inner.close()
    }
}

fn view<T: ?Sized + 'static>(descriptor: &Descriptor) -> Result<Arc<T>, ResolveErrorKind> {
    let Some(instance) = descriptor.instance() else {
        let err = ResolveErrorKind::NotInstantiated {
            name: descriptor.name().to_owned(),
        };
        error!("{}", err);
        return Err(err);
    };

    instance.get::<T>().ok_or_else(|| {
        let err = ResolveErrorKind::IncorrectType {
            name: descriptor.name().to_owned(),
            expected: type_name::<T>(),
        };
        error!("{}", err);
        err
    })
}

impl Debug for Container {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("components", &self.inner.created.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

struct ContainerInner {
    registry: RwLock<Registry>,
    properties: PropertyResolver,
    pipeline: Mutex<Pipeline>,
    created: Vec<usize>,
    closed: AtomicBool,
}

impl ContainerInner {
    fn close(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Container already closed");
            return report;
        }

        let span = info_span!("close");
        let _guard = span.enter();

        let pipeline = core::mem::take(&mut *self.pipeline.lock());
        let teardowns = {
            let mut registry = self.registry.write();
            self.created
                .iter()
                .rev()
                .map(|index| lifecycle::release(registry.at_mut(*index)))
                .collect::<Vec<_>>()
        };

        for teardown in teardowns {
            if let Err(err) = lifecycle::destroy(teardown, &pipeline) {
                error!("{}", err);
                report.failures.push(err);
            }
        }
        drop(pipeline);
        self.registry.write().clear();

        if report.is_clean() {
            debug!("Container closed");
        } else {
            warn!(failures = report.failures.len(), "Container closed with failures");
        }
        report
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        self.close();
        debug!("Container closed on drop");
    }
}

#[cfg(test)]
mod tests {
    use super::{Container, ContainerBuilder};
    use crate::{
        descriptor::{Descriptor, DescriptorBuilder},
        inject::Args,
        errors::{BuildErrorKind, DefinitionErrorKind, LifecycleErrorKind, ResolveErrorKind},
        lifecycle::{Hook, LifecycleState},
        Instance,
    };

    use alloc::{string::String, sync::Arc, vec::Vec};
    use anyhow::anyhow;
    use core::{
        sync::atomic::{AtomicU8, Ordering},
        time::Duration,
    };
    use parking_lot::Mutex;
    use std::{sync::mpsc, thread};
    use tracing_test::traced_test;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;
    struct French;

    impl Greeter for English {
        fn greet(&self) -> String {
            String::from("hello")
        }
    }

    impl Greeter for French {
        fn greet(&self) -> String {
            String::from("bonjour")
        }
    }

    fn english_instance(_: &Args) -> anyhow::Result<Instance> {
        Ok(Instance::new(English).view(|english: Arc<English>| english as Arc<dyn Greeter>))
    }

    fn english_builder() -> DescriptorBuilder<English> {
        Descriptor::builder::<English>().alias::<dyn Greeter>()
    }

    fn english() -> Descriptor {
        english_builder().constructor(english_instance)
    }

    fn french() -> Descriptor {
        Descriptor::builder::<French>()
            .alias::<dyn Greeter>()
            .constructor(|_| Ok(Instance::new(French).view(|french: Arc<French>| french as Arc<dyn Greeter>)))
    }

    #[test]
    #[traced_test]
    fn test_get() {
        let container = Container::builder().register(english()).build().unwrap();

        assert_eq!(container.get::<dyn Greeter>().unwrap().greet(), "hello");
        assert_eq!(container.get_named::<dyn Greeter>("english").unwrap().greet(), "hello");
        assert!(Arc::ptr_eq(
            &container.get::<English>().unwrap(),
            &container.get_named::<English>("english").unwrap()
        ));
        assert_eq!(container.state("english"), Some(LifecycleState::Initialized));
        assert_eq!(container.names(), ["english"]);
        assert!(matches!(
            container.get::<French>(),
            Err(ResolveErrorKind::NoDefinition { .. })
        ));
        assert!(matches!(
            container.get_named::<French>("english"),
            Err(ResolveErrorKind::TypeMismatch { .. })
        ));
    }

    #[test]
    #[traced_test]
    fn test_get_primary() {
        let container = ContainerBuilder::new()
            .register(english())
            .register(french())
            .build()
            .unwrap();

        assert!(matches!(
            container.get::<dyn Greeter>(),
            Err(ResolveErrorKind::AmbiguousDependency { primaries: 0, .. })
        ));

        let container = ContainerBuilder::new()
            .register(english())
            .register(
                Descriptor::builder::<French>()
                    .alias::<dyn Greeter>()
                    .primary()
                    .constructor(|_| Ok(Instance::new(French).view(|french: Arc<French>| french as Arc<dyn Greeter>))),
            )
            .build()
            .unwrap();

        assert_eq!(container.get::<dyn Greeter>().unwrap().greet(), "bonjour");
    }

    #[test]
    #[traced_test]
    fn test_duplicate_definition() {
        let err = Container::builder().register(english()).register(english()).build().unwrap_err();

        assert!(matches!(
            err,
            BuildErrorKind::Definition(DefinitionErrorKind::DuplicateDefinition { name }) if name == "english"
        ));
    }

    #[test]
    #[traced_test]
    fn test_close() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let destroy = |label: &'static str| {
            let log = log.clone();
            Hook::direct(move |_: &English| {
                log.lock().push(label);
                if label == "broken" {
                    Err(anyhow!("can't flush"))
                } else {
                    Ok(())
                }
            })
        };

        let container = Container::builder()
            .register(english_builder().destroy(destroy("first")).constructor(english_instance))
            .register(
                Descriptor::builder::<English>()
                    .name("broken")
                    .destroy(destroy("broken"))
                    .provide(|_| Ok(English)),
            )
            .register(
                Descriptor::builder::<English>()
                    .name("last")
                    .destroy(destroy("last"))
                    .provide(|_| Ok(English)),
            )
            .build()
            .unwrap();

        let report = container.close();

        assert_eq!(*log.lock(), ["last", "broken", "first"]);
        assert_eq!(report.failures().len(), 1);
        assert!(matches!(
            &report.failures()[0],
            LifecycleErrorKind::HookFailure { name, .. } if name == "broken"
        ));
        assert!(container.is_closed());
        assert!(container.names().is_empty());
        assert!(container.close().is_clean());
        assert_eq!(log.lock().len(), 3);
    }

    #[test]
    #[traced_test]
    fn test_close_on_drop() {
        let destroyed = Arc::new(AtomicU8::new(0));

        let container = {
            let destroyed = destroyed.clone();
            Container::builder()
                .register(
                    english_builder()
                        .destroy(Hook::direct(move |_: &English| {
                            destroyed.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }))
                        .constructor(english_instance),
                )
                .build()
                .unwrap()
        };
        let clone = container.clone();

        drop(container);
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);

        drop(clone);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[traced_test]
    fn test_concurrent_get() {
        let container = Container::builder().register(english()).build().unwrap();

        let handles = (0..4)
            .map(|_| {
                let container = container.clone();
                thread::spawn(move || container.get::<dyn Greeter>().unwrap().greet())
            })
            .collect::<Vec<_>>();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), "hello");
        }
    }

    #[test]
    #[traced_test]
    fn test_close_while_reading() {
        let slot: Arc<Mutex<Option<Container>>> = Arc::default();
        let states = Arc::new(Mutex::new(Vec::new()));

        let container = {
            let slot = slot.clone();
            let states = states.clone();
            Container::builder()
                .register(english())
                .register(
                    Descriptor::builder::<French>()
                        .destroy(Hook::direct(move |_: &French| {
                            if let Some(container) = slot.lock().as_ref() {
                                states.lock().push(container.state("english"));
                            }
                            Ok(())
                        }))
                        .provide(|_| Ok(French)),
                )
                .build()
                .unwrap()
        };
        *slot.lock() = Some(container.clone());

        let snapshot = container.descriptor("english").unwrap();
        let (sender, receiver) = mpsc::channel();
        let closing = container.clone();
        thread::spawn(move || {
            let _ = sender.send(closing.close());
        });

        let report = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        slot.lock().take();

        assert!(report.is_clean());
        assert_eq!(*states.lock(), [Some(LifecycleState::Destroyed)]);
        assert_eq!(snapshot.state(), LifecycleState::Initialized);
        assert!(snapshot.instance().is_some());
        assert!(container.descriptor("english").is_none());
    }

    #[test]
    #[traced_test]
    fn test_close_releases_post_processors() {
        struct Noop;

        impl crate::post_processor::PostProcessor for Noop {
            fn before_init(
                &self,
                instance: Instance,
                _: &str,
                _: &mut crate::instantiator::Instantiator<'_>,
            ) -> Result<Option<Instance>, crate::errors::PostProcessErrorKind> {
                Ok(Some(instance))
            }
        }

        let processor = Arc::new(Noop);
        let container = Container::builder()
            .register(
                Descriptor::builder::<Noop>()
                    .alias::<dyn crate::post_processor::PostProcessor>()
                    .singleton(
                        Instance::from_arc(processor.clone())
                            .view(|noop: Arc<Noop>| noop as Arc<dyn crate::post_processor::PostProcessor>),
                    ),
            )
            .register(english())
            .build()
            .unwrap();

        assert!(Arc::strong_count(&processor) > 1);
        assert!(container.close().is_clean());
        assert_eq!(Arc::strong_count(&processor), 1);
        assert_eq!(alloc::format!("{container:?}"), "Container { components: 2, closed: true, .. }");
    }
}
