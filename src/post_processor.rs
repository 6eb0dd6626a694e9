use alloc::{
    string::{String, ToString as _},
    sync::Arc,
    vec::Vec,
};
use tracing::{debug, error};

use crate::{
    any::TypeInfo,
    errors::{BuildErrorKind, PostProcessErrorKind},
    instantiator::Instantiator,
    Instance,
};

/// Hook into the creation of components.
///
/// A descriptor becomes a post-processor by exposing `dyn PostProcessor`:
/// ```ignore
/// Descriptor::builder::<Audit>()
///     .alias::<dyn PostProcessor>()
///     .constructor(|_| Ok(Instance::new(Audit).view(|audit: Arc<Audit>| audit as Arc<dyn PostProcessor>)))
/// ```
/// Post-processors are created before ordinary components and applied only to them,
/// in the order of their descriptors.
pub trait PostProcessor: Send + Sync {
    /// Called right after a component is instantiated.
    /// The returned instance replaces the created one, so every dependent receives it.
    /// A substitute must expose the same types as the original.
    ///
    /// # Errors
    /// Any error fails the build. Returning `None` fails it too.
    fn before_init(
        &self,
        instance: Instance,
        name: &str,
        ctx: &mut Instantiator<'_>,
    ) -> Result<Option<Instance>, PostProcessErrorKind>;

    /// Called in reverse order before property injection and destroy hooks,
    /// to hand back the instance those should act on instead of a substitute
    fn on_property_injection(&self, instance: Instance, name: &str) -> Instance {
        let _ = name;
        instance
    }

    /// Called in reverse order after the destroy hook of a component,
    /// to drop whatever the processor keeps for it
    fn on_destroy(&self, name: &str) {
        let _ = name;
    }
}

/// Registered post-processors in application order
#[derive(Clone, Default)]
pub(crate) struct Pipeline {
    processors: Vec<(String, Arc<dyn PostProcessor>)>,
}

impl Pipeline {
    #[inline]
    pub(crate) fn push(&mut self, name: String, processor: Arc<dyn PostProcessor>) {
        debug!(%name, "Post-processor registered");
        self.processors.push((name, processor));
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub(crate) fn before_init(
        &self,
        mut instance: Instance,
        name: &str,
        expected: &[TypeInfo],
        ctx: &mut Instantiator<'_>,
    ) -> Result<Instance, BuildErrorKind> {
        for (processor_name, processor) in &self.processors {
            let failure = |kind| {
                let err = BuildErrorKind::PostProcessingFailure {
                    name: name.to_owned(),
                    processor: processor_name.clone(),
                    kind,
                };
                error!("{}", err);
                err
            };

            instance = match processor.before_init(instance, name, ctx) {
                Ok(Some(instance)) => instance,
                Ok(None) => return Err(failure(PostProcessErrorKind::ReturnedNothing)),
                Err(kind) => return Err(failure(kind)),
            };

            if let Some(missing) = expected.iter().find(|type_info| !instance.has_view(type_info)) {
                return Err(failure(PostProcessErrorKind::IncompatibleSubstitute { expected: missing.name }));
            }
        }
        Ok(instance)
    }

    /// Instance that property injection and destroy hooks act on
    pub(crate) fn unwrap(&self, instance: &Instance, name: &str) -> Instance {
        self.processors
            .iter()
            .rev()
            .fold(instance.clone(), |instance, (_, processor)| {
                processor.on_property_injection(instance, name)
            })
    }

    pub(crate) fn release(&self, name: &str) {
        for (_, processor) in self.processors.iter().rev() {
            processor.on_destroy(name);
        }
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.processors.iter().map(|(name, _)| name.to_string()).collect()
    }
}
