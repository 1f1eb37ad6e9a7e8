//! Per-entity texture bookkeeping on the interactive thread.
//!
//! A [`PageSlot`] remembers which cached texture an entity currently shows
//! and decides each frame whether the cache has to be asked again. Holding
//! the texture as a [`TextureLease`] means the reference is given back as soon
//! as the slot lets go of it, in either freeing mode.

use crate::registry::{DisplayId, DisplayRegistry, EntityId};
use pdf_desktop_cache::{Scale, TextureCache, TextureHandle, TextureLease};
use pdf_desktop_render::PageRef;
use std::sync::Arc;

/// What a [`PageSlot::sync`] call changed on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChange {
    /// Nothing to add or remove.
    Unchanged,
    /// A texture appeared where there was none.
    Shown(DisplayId),
    /// A different variant replaced the one on screen.
    Swapped { previous: DisplayId, current: DisplayId },
    /// The texture was taken off screen.
    Hidden(DisplayId),
}

struct Shown {
    lease: TextureLease,
    display: DisplayId,
}

pub struct PageSlot {
    entity: EntityId,
    page: PageRef,
    shown: Option<Shown>,
}

impl PageSlot {
    pub fn new(entity: EntityId, page: PageRef) -> Self {
        Self { entity, page, shown: None }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn page(&self) -> PageRef {
        self.page
    }

    /// Point the slot at another page. The next sync re-queries.
    pub fn set_page(&mut self, page: PageRef) {
        self.page = page;
    }

    /// Texture currently on screen.
    pub fn texture(&self) -> Option<&TextureHandle> {
        self.shown.as_ref().map(|shown| &*shown.lease)
    }

    pub fn display(&self) -> Option<DisplayId> {
        self.shown.as_ref().map(|shown| shown.display)
    }

    /// Scale to draw the current texture at for `view_scale`.
    pub fn display_factor(&self, view_scale: f32) -> Option<f32> {
        self.texture().map(|texture| texture.display_factor(view_scale))
    }

    /// Bring the slot up to date with the cache for this frame.
    ///
    /// While visible, the cache is asked again when the slot shows nothing,
    /// the cache changed since the texture was fetched, the texture's scale
    /// differs from the view scale, or the page changed. The display object
    /// is only replaced when the cache hands back a different variant. An
    /// invisible slot drops its texture.
    pub fn sync(
        &mut self,
        cache: &Arc<TextureCache>,
        view_scale: f32,
        visible: bool,
        registry: &mut DisplayRegistry,
    ) -> SlotChange {
        if !visible {
            return self.hide(registry);
        }
        if !self.needs_query(cache, view_scale) {
            return SlotChange::Unchanged;
        }

        let Some(requested) = Scale::new(view_scale) else {
            return SlotChange::Unchanged;
        };
        let Some(lease) = cache.acquire(self.page, requested) else {
            return self.hide(registry);
        };

        match self.shown.as_mut() {
            Some(shown) if shown.lease.same_entry(&lease) => {
                // Same variant; refresh the stamp and let the old lease go.
                shown.lease = lease;
                SlotChange::Unchanged
            }
            Some(shown) => {
                let previous = shown.display;
                registry.detach(previous);
                let current = registry.attach(self.entity);
                *shown = Shown { lease, display: current };
                SlotChange::Swapped { previous, current }
            }
            None => {
                let display = registry.attach(self.entity);
                self.shown = Some(Shown { lease, display });
                SlotChange::Shown(display)
            }
        }
    }

    fn needs_query(&self, cache: &TextureCache, view_scale: f32) -> bool {
        let Some(shown) = &self.shown else {
            return true;
        };
        !cache.is_fresh(shown.lease.stamp())
            || shown.lease.scale().get() != view_scale
            || shown.lease.page() != self.page
    }

    /// Take the texture off screen and give its reference back.
    pub fn hide(&mut self, registry: &mut DisplayRegistry) -> SlotChange {
        match self.shown.take() {
            Some(shown) => {
                registry.detach(shown.display);
                SlotChange::Hidden(shown.display)
            }
            None => SlotChange::Unchanged,
        }
    }
}
