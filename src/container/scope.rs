//! Which container a running pipeline executes its steps in

use super::runtime::ContainerHandle;

/// Container binding of one pipeline frame
///
/// A frame owns a handle only if its pipeline declared `helper_image`;
/// otherwise steps run in the nearest ancestor's container.
#[derive(Debug)]
pub struct ContainerScope<'p> {
    pipeline: String,
    owned: Option<ContainerHandle>,
    parent: Option<&'p ContainerScope<'p>>,
}

impl<'p> ContainerScope<'p> {
    pub fn new(
        pipeline: impl Into<String>,
        owned: Option<ContainerHandle>,
        parent: Option<&'p ContainerScope<'p>>,
    ) -> Self {
        Self {
            pipeline: pipeline.into(),
            owned,
            parent,
        }
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// The handle this frame started, if it still holds one
    pub fn owned(&self) -> Option<&ContainerHandle> {
        self.owned.as_ref()
    }

    /// Nearest handle walking from this frame up to the root
    pub fn nearest(&self) -> Option<&ContainerHandle> {
        self.owned
            .as_ref()
            .or_else(|| self.parent.and_then(|parent| parent.nearest()))
    }

    pub(crate) fn take_owned(&mut self) -> Option<ContainerHandle> {
        self.owned.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_walks_ancestors() {
        let root = ContainerScope::new("root", Some(ContainerHandle::new("c1")), None);
        let child = ContainerScope::new("child", None, Some(&root));
        let grandchild = ContainerScope::new("gc", None, Some(&child));
        assert_eq!(grandchild.nearest(), Some(&ContainerHandle::new("c1")));
        assert!(grandchild.owned().is_none());
    }

    #[test]
    fn test_own_handle_wins() {
        let root = ContainerScope::new("root", Some(ContainerHandle::new("c1")), None);
        let child = ContainerScope::new("child", Some(ContainerHandle::new("c2")), Some(&root));
        assert_eq!(child.nearest(), Some(&ContainerHandle::new("c2")));
    }

    #[test]
    fn test_nothing_to_resolve() {
        let orphan = ContainerScope::new("orphan", None, None);
        assert!(orphan.nearest().is_none());
    }
}
