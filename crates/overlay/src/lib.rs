use serde_json::Value;

/// Deep field-level overlay over json values
pub trait OverlayExt: Sized {
    /// Returns a copy of `self` with `overlay`'s fields layered on top.
    /// Keys absent from `overlay` keep the base value, present keys are
    /// merged recursively for objects and replaced for everything else.
    fn overlay(&self, overlay: &Self) -> Self;
    /// In-place version of [`OverlayExt::overlay`]
    fn overlay_in_place(&mut self, overlay: &Self);
}

impl OverlayExt for Value {
    fn overlay(&self, overlay: &Self) -> Self {
        let mut out = self.clone();
        out.overlay_in_place(overlay);
        out
    }

    fn overlay_in_place(&mut self, overlay: &Self) {
        match (self, overlay) {
            (Value::Object(base), Value::Object(overlay)) => {
                for (key, value) in overlay {
                    match base.get_mut(key) {
                        Some(slot) => slot.overlay_in_place(value),
                        None => {
                            base.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            // arrays are replaced wholesale, there is no way to know how
            // their items should be matched up
            (slot, overlay) => *slot = overlay.clone(),
        }
    }
}
