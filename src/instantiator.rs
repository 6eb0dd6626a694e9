use alloc::{
    collections::BTreeSet,
    format,
    string::ToString as _,
    vec::Vec,
};
use tracing::{debug, debug_span, error, warn};

use crate::{
    any::TypeInfo,
    descriptor::{CreationStrategy, Descriptor},
    errors::{BuildErrorKind, DefinitionErrorKind, InjectionSpecErrorKind, PropertyErrorKind, ResolveErrorKind},
    inject::{Args, Injection, Param},
    lifecycle::LifecycleState,
    post_processor::{Pipeline, PostProcessor},
    property::PropertyResolver,
    registry::Registry,
    Instance,
};

/// Creates instances of descriptors, depth-first.
///
/// It's also the build context handed to post-processors, see [`PostProcessor::before_init`].
pub struct Instantiator<'a> {
    registry: &'a mut Registry,
    properties: &'a PropertyResolver,
    pipeline: Pipeline,
    in_progress: BTreeSet<usize>,
    created: Vec<usize>,
}

impl<'a> Instantiator<'a> {
    #[inline]
    #[must_use]
    pub(crate) fn new(registry: &'a mut Registry, properties: &'a PropertyResolver) -> Self {
        Self {
            registry,
            properties,
            pipeline: Pipeline::default(),
            in_progress: BTreeSet::new(),
            created: Vec::new(),
        }
    }

    /// Descriptor registered with the name
    #[inline]
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&Descriptor> {
        self.registry.get(name)
    }

    /// Current instance of the descriptor registered with the name, creating it first if needed
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::NoDefinition`] if there's no such descriptor
    /// or any error of the creation
    pub fn get_or_create(&mut self, name: &str) -> Result<Instance, BuildErrorKind> {
        let Some(index) = self.registry.index_of(name) else {
            let err = ResolveErrorKind::NoDefinition { key: name.to_owned() };
            error!("{}", err);
            return Err(err.into());
        };
        self.ensure_created(index)
    }

    #[inline]
    #[must_use]
    pub const fn properties(&self) -> &PropertyResolver {
        self.properties
    }

    /// Creates every descriptor: factory owners first, then post-processors, then the rest.
    /// Each group is created by order, then by registration.
    /// A factory owner exposing `dyn PostProcessor` is created with the owners, but still joins the pipeline.
    pub(crate) fn create_all(&mut self) -> Result<(), BuildErrorKind> {
        for index in self.registry.sorted_indices(Descriptor::is_factory_owner) {
            self.ensure_created(index)?;
        }

        let processor_type = TypeInfo::of::<dyn PostProcessor>();
        let processors = self
            .registry
            .sorted_indices(|descriptor| descriptor.is_assignable_to(&processor_type));
        for index in &processors {
            self.ensure_created(*index)?;
        }
        for index in processors {
            let descriptor = self.registry.at(index);
            let Some(processor) = descriptor.instance().and_then(Instance::get::<dyn PostProcessor>) else {
                let err = ResolveErrorKind::IncorrectType {
                    name: descriptor.name().to_owned(),
                    expected: processor_type.name,
                };
                error!("{}", err);
                return Err(err.into());
            };
            self.pipeline.push(descriptor.name().to_owned(), processor);
        }

        for index in self.registry.sorted_indices(|_| true) {
            self.ensure_created(index)?;
        }
        Ok(())
    }

    /// Pipeline of the registered post-processors and indices of descriptors in creation order
    #[inline]
    pub(crate) fn finish(self) -> (Pipeline, Vec<usize>) {
        (self.pipeline, self.created)
    }

    #[inline]
    pub(crate) fn created(&self) -> &[usize] {
        &self.created
    }

    #[inline]
    pub(crate) const fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[inline]
    pub(crate) fn registry(&self) -> &Registry {
        self.registry
    }

    #[inline]
    pub(crate) fn registry_mut(&mut self) -> &mut Registry {
        self.registry
    }

    fn ensure_created(&mut self, index: usize) -> Result<Instance, BuildErrorKind> {
        match self.registry.at(index).instance() {
            Some(instance) => Ok(instance.clone()),
            None => self.create(index),
        }
    }

    fn create(&mut self, index: usize) -> Result<Instance, BuildErrorKind> {
        let name = self.registry.at(index).name().to_owned();

        let span = debug_span!("create", name = %name);
        let _guard = span.enter();

        if !self.in_progress.insert(index) {
            let err = BuildErrorKind::CircularDependency { name };
            error!("{}", err);
            return Err(err);
        }

        let result = self.instantiate(index, &name);
        self.in_progress.remove(&index);
        result
    }

    fn instantiate(&mut self, index: usize, name: &str) -> Result<Instance, BuildErrorKind> {
        let descriptor = self.registry.at(index);
        let strategy = descriptor.strategy().clone();
        let is_factory_owner = descriptor.is_factory_owner();

        let mut args = Vec::with_capacity(strategy.params().len());
        for (position, param) in strategy.params().iter().enumerate() {
            let point = format!("parameter #{position}");
            let injection = classify(name, &point, param)?;
            if is_factory_owner && matches!(injection, Injection::Bean(_)) {
                let err = BuildErrorKind::InvalidInjectionSpec {
                    name: name.to_owned(),
                    point,
                    kind: InjectionSpecErrorKind::AutowiredFactoryOwner,
                };
                error!("{}", err);
                return Err(err);
            }
            args.push(self.resolve(name, &point, param, injection, true)?);
        }
        let args = Args::new(args);

        let created = match &strategy {
            CreationStrategy::Constructor { call, .. } => call(&args),
            CreationStrategy::Factory { owner, call, .. } => {
                let owner = self.factory_owner(name, owner)?;
                call(&owner, &args)
            }
        };
        let instance = created.map_err(|source| {
            let err = BuildErrorKind::CreationFailure {
                name: name.to_owned(),
                source,
            };
            error!("{:#}", err);
            err
        })?;

        let descriptor = self.registry.at(index);
        if let Some(missing) = descriptor.types().find(|type_info| !instance.has_view(type_info)) {
            let err = ResolveErrorKind::IncorrectType {
                name: name.to_owned(),
                expected: missing.name,
            };
            error!("{}", err);
            return Err(err.into());
        }
        let expected = descriptor.types().copied().collect::<Vec<_>>();

        let descriptor = self.registry.at_mut(index);
        descriptor.instance = Some(instance.clone());
        descriptor.state = LifecycleState::Instantiated;
        self.created.push(index);

        debug!("Instance created");

        if self.pipeline.is_empty() {
            return Ok(instance);
        }

        let pipeline = self.pipeline.clone();
        let instance = pipeline.before_init(instance, name, &expected, self)?;
        self.registry.at_mut(index).instance = Some(instance.clone());

        Ok(instance)
    }

    fn factory_owner(&mut self, name: &str, owner: &str) -> Result<Instance, BuildErrorKind> {
        let Some(index) = self.registry.index_of(owner) else {
            let err = DefinitionErrorKind::MissingFactoryOwner {
                name: name.to_owned(),
                owner: owner.to_owned(),
            };
            error!("{}", err);
            return Err(err.into());
        };
        self.ensure_created(index)
    }

    /// Resolves the value of a parameter or a property point.
    /// Returns `None` only for optional dependencies that aren't registered.
    pub(crate) fn resolve(
        &mut self,
        name: &str,
        point: &str,
        param: &Param,
        injection: Injection<'_>,
        create_missing: bool,
    ) -> Result<Option<Instance>, BuildErrorKind> {
        let target = param.target();

        match injection {
            Injection::Value(marker) => {
                let property_failure = |source| {
                    let err = BuildErrorKind::Property {
                        name: name.to_owned(),
                        point: point.to_owned(),
                        source,
                    };
                    error!("{}", err);
                    err
                };

                match self.properties.resolve(&marker.key, &target) {
                    Ok(Some(value)) => Ok(Some(value)),
                    Ok(None) => Err(property_failure(PropertyErrorKind::NotFound {
                        key: marker.key.clone(),
                    })),
                    Err(source) => Err(property_failure(source)),
                }
            }
            Injection::Bean(marker) => {
                let index = match &marker.name {
                    Some(dependency) => self.registry.resolve_named_index(dependency, &target)?,
                    None => self.registry.resolve_unique_index(&target)?,
                };

                let Some(index) = index else {
                    let dependency = marker.name.clone().unwrap_or_else(|| target.name.to_string());
                    if marker.required {
                        let err = BuildErrorKind::MissingDependency {
                            name: name.to_owned(),
                            point: point.to_owned(),
                            dependency,
                        };
                        error!("{}", err);
                        return Err(err);
                    }

                    warn!(point, %dependency, "Optional dependency not found");
                    return Ok(None);
                };

                match self.registry.at(index).instance() {
                    Some(instance) => Ok(Some(instance.clone())),
                    None if create_missing => self.create(index).map(Some),
                    None => {
                        let err = ResolveErrorKind::NotInstantiated {
                            name: self.registry.at(index).name().to_owned(),
                        };
                        error!("{}", err);
                        Err(err.into())
                    }
                }
            }
        }
    }
}

pub(crate) fn classify<'p>(name: &str, point: &str, param: &'p Param) -> Result<Injection<'p>, BuildErrorKind> {
    param.classify().map_err(|kind| {
        let err = BuildErrorKind::InvalidInjectionSpec {
            name: name.to_owned(),
            point: point.to_owned(),
            kind,
        };
        error!("{}", err);
        err
    })
}

#[cfg(test)]
mod tests {
    use super::Instantiator;
    use crate::{
        descriptor::Descriptor,
        errors::{BuildErrorKind, InjectionSpecErrorKind, PostProcessErrorKind, PropertyErrorKind, ResolveErrorKind},
        inject::Param,
        lifecycle::LifecycleState,
        post_processor::PostProcessor,
        property::PropertyResolver,
        registry::Registry,
        Instance,
    };

    use alloc::{
        format,
        string::{String, ToString as _},
        sync::Arc,
        vec::Vec,
    };
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    struct Request(u16);
    struct Handler(Arc<Request>);
    struct Config {
        port: u16,
    }
    struct Server {
        port: u16,
    }

    fn registered(descriptors: impl IntoIterator<Item = Descriptor>) -> Registry {
        let mut registry = Registry::new();
        for descriptor in descriptors {
            registry.register(descriptor).unwrap();
        }
        registry
    }

    #[test]
    #[traced_test]
    fn test_create_dependencies_first() {
        let mut registry = registered([
            Descriptor::builder::<Handler>()
                .param(Param::bean::<Request>())
                .provide(|args| Ok(Handler(args.bean(0)?))),
            Descriptor::builder::<Request>()
                .param(Param::value::<u16>("${request.id:7}"))
                .provide(|args| Ok(Request(args.value(0)?))),
        ]);
        let properties = PropertyResolver::new();

        let mut instantiator = Instantiator::new(&mut registry, &properties);
        instantiator.create_all().unwrap();
        let (_, created) = instantiator.finish();

        assert_eq!(created, [1, 0]);

        let request = registry.get("request").unwrap().instance().unwrap().get::<Request>().unwrap();
        let handler = registry.get("handler").unwrap().instance().unwrap().get::<Handler>().unwrap();

        assert_eq!(request.0, 7);
        assert!(Arc::ptr_eq(&request, &handler.0));
        assert_eq!(registry.get("handler").unwrap().state(), LifecycleState::Instantiated);
    }

    #[test]
    #[traced_test]
    fn test_circular_dependency() {
        struct A;
        struct B;

        for reversed in [false, true] {
            let mut descriptors = Vec::from([
                Descriptor::builder::<A>().param(Param::bean::<B>()).provide(|_| Ok(A)),
                Descriptor::builder::<B>().param(Param::bean::<A>()).provide(|_| Ok(B)),
            ]);
            if reversed {
                descriptors.reverse();
            }

            let mut registry = registered(descriptors);
            let properties = PropertyResolver::new();

            let err = Instantiator::new(&mut registry, &properties).create_all().unwrap_err();
            assert!(matches!(err, BuildErrorKind::CircularDependency { .. }));
        }
    }

    #[test]
    #[traced_test]
    fn test_self_dependency() {
        let mut registry = registered([Descriptor::builder::<Request>()
            .param(Param::bean::<Request>())
            .provide(|_| Ok(Request(0)))]);
        let properties = PropertyResolver::new();

        let err = Instantiator::new(&mut registry, &properties).create_all().unwrap_err();
        assert!(matches!(err, BuildErrorKind::CircularDependency { name } if name == "request"));
    }

    #[test]
    #[traced_test]
    fn test_invalid_markers() {
        let mut registry = registered([Descriptor::builder::<Server>()
            .param(Param::value::<u16>("${server.port:80}").with_autowired_marker(Default::default()))
            .provide(|_| Ok(Server { port: 0 }))]);
        let properties = PropertyResolver::new();

        let err = Instantiator::new(&mut registry, &properties).create_all().unwrap_err();
        assert!(matches!(
            err,
            BuildErrorKind::InvalidInjectionSpec {
                kind: InjectionSpecErrorKind::ConflictingMarkers,
                ..
            }
        ));

        let mut registry = registered([Descriptor::builder::<Server>()
            .param(Param::of::<u16>())
            .provide(|_| Ok(Server { port: 0 }))]);

        let err = Instantiator::new(&mut registry, &properties).create_all().unwrap_err();
        assert!(matches!(
            err,
            BuildErrorKind::InvalidInjectionSpec {
                kind: InjectionSpecErrorKind::NoMarker,
                ..
            }
        ));
    }

    #[test]
    #[traced_test]
    fn test_autowired_factory_owner() {
        let mut registry = registered([
            Descriptor::builder::<Request>().provide(|_| Ok(Request(1))),
            Descriptor::builder::<Config>()
                .factory_owner()
                .param(Param::bean::<Request>())
                .provide(|_| Ok(Config { port: 0 })),
        ]);
        let properties = PropertyResolver::new();

        let err = Instantiator::new(&mut registry, &properties).create_all().unwrap_err();
        assert!(matches!(
            err,
            BuildErrorKind::InvalidInjectionSpec {
                kind: InjectionSpecErrorKind::AutowiredFactoryOwner,
                ..
            }
        ));
    }

    #[test]
    #[traced_test]
    fn test_factory_method() {
        let mut registry = registered([
            Descriptor::builder::<Server>()
                .param(Param::value::<u16>("server.workers"))
                .factory_method("config", |config: &Config, args| {
                    let workers: u16 = args.value(0)?;
                    Ok(Instance::new(Server {
                        port: config.port + workers,
                    }))
                }),
            Descriptor::builder::<Config>()
                .factory_owner()
                .param(Param::value::<u16>("${server.port}"))
                .provide(|args| Ok(Config { port: args.value(0)? })),
        ]);
        let properties = PropertyResolver::new()
            .with_property("server.port", "8000")
            .with_property("server.workers", "80");

        let mut instantiator = Instantiator::new(&mut registry, &properties);
        instantiator.create_all().unwrap();
        assert_eq!(instantiator.created(), [1, 0]);

        let server = registry.get("server").unwrap().instance().unwrap().get::<Server>().unwrap();
        assert_eq!(server.port, 8080);
    }

    #[test]
    #[traced_test]
    fn test_missing_value() {
        let mut registry = registered([Descriptor::builder::<Server>()
            .param(Param::value::<u16>("${server.port}"))
            .provide(|args| Ok(Server { port: args.value(0)? }))]);
        let properties = PropertyResolver::new();

        let err = Instantiator::new(&mut registry, &properties).create_all().unwrap_err();
        assert!(matches!(
            &err,
            BuildErrorKind::Property {
                source: PropertyErrorKind::NotFound { .. },
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "Value for `server` at parameter #0 can't be resolved"
        );
    }

    #[test]
    #[traced_test]
    fn test_missing_dependency() {
        let mut registry = registered([Descriptor::builder::<Handler>()
            .param(Param::bean::<Request>())
            .provide(|args| Ok(Handler(args.bean(0)?)))]);
        let properties = PropertyResolver::new();

        let err = Instantiator::new(&mut registry, &properties).create_all().unwrap_err();
        assert!(matches!(err, BuildErrorKind::MissingDependency { name, .. } if name == "handler"));
    }

    #[test]
    #[traced_test]
    fn test_optional_dependency() {
        struct Metrics;
        struct Service(Option<Arc<Metrics>>);

        let mut registry = registered([Descriptor::builder::<Service>()
            .param(Param::bean::<Metrics>().optional())
            .provide(|args| Ok(Service(args.optional_bean(0))))]);
        let properties = PropertyResolver::new();

        Instantiator::new(&mut registry, &properties).create_all().unwrap();

        let service = registry.get("service").unwrap().instance().unwrap().get::<Service>().unwrap();
        assert!(service.0.is_none());
    }

    #[test]
    #[traced_test]
    fn test_creation_failure() {
        let mut registry = registered([Descriptor::builder::<Server>()
            .provide(|_| Err(anyhow::anyhow!("address in use")))]);
        let properties = PropertyResolver::new();

        let err = Instantiator::new(&mut registry, &properties).create_all().unwrap_err();
        assert!(matches!(&err, BuildErrorKind::CreationFailure { name, .. } if name == "server"));
        assert_eq!(format!("{:#}", anyhow::Error::from(err)), "Creation of `server` failed: address in use");
    }

    #[test]
    #[traced_test]
    fn test_incorrect_instance_type() {
        trait Named: Send + Sync {}

        let mut registry = registered([Descriptor::builder::<Server>()
            .alias::<dyn Named>()
            .provide(|_| Ok(Server { port: 0 }))]);
        let properties = PropertyResolver::new();

        let err = Instantiator::new(&mut registry, &properties).create_all().unwrap_err();
        assert!(matches!(err, BuildErrorKind::Resolve(ResolveErrorKind::IncorrectType { .. })));
    }

    #[test]
    #[traced_test]
    fn test_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let descriptors = [3, 1, 2].map(|order: i32| {
            let log = log.clone();
            Descriptor::builder::<String>()
                .name(format!("component{order}"))
                .order(order)
                .provide(move |_| {
                    log.lock().push(order);
                    Ok(order.to_string())
                })
        });

        let mut registry = registered(descriptors);
        let properties = PropertyResolver::new();

        Instantiator::new(&mut registry, &properties).create_all().unwrap();

        assert_eq!(*log.lock(), [1, 2, 3]);
    }

    #[test]
    #[traced_test]
    fn test_get_or_create() {
        let mut registry = registered([Descriptor::builder::<Request>().provide(|_| Ok(Request(3)))]);
        let properties = PropertyResolver::new();
        let mut instantiator = Instantiator::new(&mut registry, &properties);

        let first = instantiator.get_or_create("request").unwrap();
        let second = instantiator.get_or_create("request").unwrap();

        assert!(first.ptr_eq(&second));
        assert!(matches!(
            instantiator.get_or_create("response"),
            Err(BuildErrorKind::Resolve(ResolveErrorKind::NoDefinition { .. }))
        ));
    }

    #[test]
    #[traced_test]
    fn test_named_dependency_type_mismatch() {
        let mut registry = registered([
            Descriptor::builder::<Request>().provide(|_| Ok(Request(1))),
            Descriptor::builder::<Handler>()
                .param(Param::named::<Config>("request"))
                .provide(|_| Ok(Handler(Arc::new(Request(0))))),
        ]);
        let properties = PropertyResolver::new();

        let err = Instantiator::new(&mut registry, &properties).create_all().unwrap_err();
        assert!(matches!(
            err,
            BuildErrorKind::Resolve(ResolveErrorKind::TypeMismatch { name, .. }) if name == "request"
        ));
    }

    struct Audit {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl PostProcessor for Audit {
        fn before_init(
            &self,
            instance: Instance,
            name: &str,
            _: &mut Instantiator<'_>,
        ) -> Result<Option<Instance>, PostProcessErrorKind> {
            self.seen.lock().push(name.to_owned());
            Ok(Some(instance))
        }
    }

    #[test]
    #[traced_test]
    fn test_factory_owner_post_processor() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let audit_seen = seen.clone();

        let mut registry = registered([
            Descriptor::builder::<Request>().provide(|_| Ok(Request(1))),
            Descriptor::builder::<Audit>()
                .factory_owner()
                .alias::<dyn PostProcessor>()
                .constructor(move |_| {
                    let audit = Audit {
                        seen: audit_seen.clone(),
                    };
                    Ok(Instance::new(audit).view(|audit: Arc<Audit>| audit as Arc<dyn PostProcessor>))
                }),
        ]);
        let properties = PropertyResolver::new();

        let mut instantiator = Instantiator::new(&mut registry, &properties);
        instantiator.create_all().unwrap();
        let (pipeline, created) = instantiator.finish();

        assert_eq!(created, [1, 0]);
        assert_eq!(pipeline.names(), ["audit"]);
        assert_eq!(*seen.lock(), ["request"]);
    }
}
