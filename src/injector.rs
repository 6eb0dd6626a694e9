use alloc::{string::ToString as _, vec::Vec};
use tracing::{debug, debug_span, error};

use crate::{
    errors::{BuildErrorKind, ResolveErrorKind},
    instantiator::{classify, Instantiator},
    lifecycle::LifecycleState,
};

/// Fills the property points of a created descriptor.
///
/// Points act on the unwrapped instance and are injected by level, the most derived type first.
/// Every descriptor already has an instance here, so nothing is created.
pub(crate) fn inject(ctx: &mut Instantiator<'_>, index: usize) -> Result<(), BuildErrorKind> {
    let descriptor = ctx.registry().at(index);
    let name = descriptor.name().to_owned();

    let span = debug_span!("inject", name = %name);
    let _guard = span.enter();

    let Some(instance) = descriptor.instance() else {
        let err = ResolveErrorKind::NotInstantiated { name };
        error!("{}", err);
        return Err(err.into());
    };
    let target = ctx.pipeline().unwrap(instance, &name);

    let mut points = descriptor.properties().to_vec();
    points.sort_by_key(|point| point.level());

    for point in points {
        let location = point.to_string();
        let injection = classify(&name, &location, point.param())?;

        let Some(value) = ctx.resolve(&name, &location, point.param(), injection, false)? else {
            continue;
        };

        point.apply(&target, value).map_err(|source| {
            let err = BuildErrorKind::CreationFailure {
                name: name.clone(),
                source: source.context(location.clone()),
            };
            error!("{:#}", err);
            err
        })?;

        debug!(point = %location, "Property injected");
    }

    ctx.registry_mut().at_mut(index).state = LifecycleState::Wired;
    Ok(())
}

/// Injects every created descriptor in creation order
pub(crate) fn inject_all(ctx: &mut Instantiator<'_>) -> Result<(), BuildErrorKind> {
    let created = ctx.created().iter().copied().collect::<Vec<_>>();
    for index in created {
        inject(ctx, index)?;
    }
    Ok(())
}
