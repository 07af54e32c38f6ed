use mimic_common::protocol::{Element, UiSnapshot};

/// Snapshot view used during one resolution.
pub struct ResolutionContext<'a> {
    pub snapshot: &'a UiSnapshot,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(snapshot: &'a UiSnapshot) -> Self {
        Self { snapshot }
    }

    /// Rendered elements in document order. Zero-area elements are never candidates.
    pub fn candidates(&self) -> impl Iterator<Item = &'a Element> + 'a {
        self.snapshot.rendered()
    }

    /// A candidate by id, if it is rendered.
    pub fn get_element(&self, id: u32) -> Option<&'a Element> {
        self.snapshot.get(id).filter(|e| e.rect.has_area())
    }
}
