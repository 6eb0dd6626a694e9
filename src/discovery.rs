use alloc::{boxed::Box, vec::Vec};

use crate::descriptor::Descriptor;

/// Source of descriptors, e.g. a module of an application.
///
/// A source may import others, they're scanned right after it. Imports must not form a cycle.
pub trait Discovery {
    fn discover(&self) -> Vec<Descriptor>;

    fn imports(&self) -> Vec<Box<dyn Discovery>> {
        Vec::new()
    }
}

impl<F> Discovery for F
where
    F: Fn() -> Vec<Descriptor>,
{
    #[inline]
    fn discover(&self) -> Vec<Descriptor> {
        self()
    }
}

/// Descriptors of the source and all its imports, depth-first
pub(crate) fn collect(discovery: &dyn Discovery, descriptors: &mut Vec<Descriptor>) {
    descriptors.extend(discovery.discover());
    for import in discovery.imports() {
        collect(import.as_ref(), descriptors);
    }
}

#[cfg(test)]
mod tests {
    use super::{collect, Discovery};
    use crate::descriptor::Descriptor;

    use alloc::{boxed::Box, vec, vec::Vec};

    struct Storage;
    struct Web;
    struct Repository;
    struct Router;

    impl Discovery for Storage {
        fn discover(&self) -> Vec<Descriptor> {
            vec![Descriptor::builder::<Repository>().provide(|_| Ok(Repository))]
        }
    }

    impl Discovery for Web {
        fn discover(&self) -> Vec<Descriptor> {
            vec![Descriptor::builder::<Router>().provide(|_| Ok(Router))]
        }

        fn imports(&self) -> Vec<Box<dyn Discovery>> {
            vec![
                Box::new(Storage) as Box<dyn Discovery>,
                Box::new(|| vec![Descriptor::builder::<u16>().name("port").provide(|_| Ok(8080))]),
            ]
        }
    }

    #[test]
    fn test_collect_imports() {
        let mut descriptors = Vec::new();
        collect(&Web, &mut descriptors);

        let names = descriptors.iter().map(Descriptor::name).collect::<Vec<_>>();
        assert_eq!(names, ["router", "repository", "port"]);
    }
}
