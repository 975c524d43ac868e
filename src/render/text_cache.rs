//! Per-node text layout cache.
//!
//! Entries are keyed by node id and slot. Each entry remembers a fingerprint
//! of everything that shapes the text (content, size, max width, colour,
//! pixel ratio); a lookup with a different fingerprint re-lays the text out
//! in place. Least recently used entries are evicted past the capacity.

use iced::Color;
use std::collections::HashMap;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::node::{NodeId, PortDirection};

/// Average glyph advance relative to font size, per terminal column.
const ADVANCE_RATIO: f32 = 0.6;
const LINE_HEIGHT_RATIO: f32 = 1.2;
const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextSlot {
    Label,
    Subtitle,
    Status,
    Port(PortDirection, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    /// Possibly truncated with a trailing ellipsis.
    pub content: String,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Fingerprint {
    text: String,
    size: u32,
    max_width: u32,
    color: [u32; 4],
    dpr: u32,
}

impl Fingerprint {
    fn new(text: &str, size: f32, max_width: f32, color: Color, dpr: f32) -> Self {
        Self {
            text: text.to_string(),
            size: size.to_bits(),
            max_width: max_width.to_bits(),
            color: [color.r, color.g, color.b, color.a].map(f32::to_bits),
            dpr: dpr.to_bits(),
        }
    }

    fn matches(&self, text: &str, size: f32, max_width: f32, color: Color, dpr: f32) -> bool {
        self.text == text
            && self.size == size.to_bits()
            && self.max_width == max_width.to_bits()
            && self.color == [color.r, color.g, color.b, color.a].map(f32::to_bits)
            && self.dpr == dpr.to_bits()
    }
}

struct Entry {
    fingerprint: Fingerprint,
    layout: TextLayout,
    last_used: u64,
}

pub struct TextCache {
    entries: HashMap<NodeId, HashMap<TextSlot, Entry>>,
    capacity: usize,
    clock: u64,
    len: usize,
    hits: u64,
    misses: u64,
}

impl TextCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
            len: 0,
            hits: 0,
            misses: 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn layout(
        &mut self,
        node: &NodeId,
        slot: TextSlot,
        text: &str,
        size: f32,
        max_width: f32,
        color: Color,
        dpr: f32,
    ) -> TextLayout {
        self.clock += 1;
        let now = self.clock;

        if let Some(entry) = self.entries.get_mut(node).and_then(|slots| slots.get_mut(&slot)) {
            entry.last_used = now;
            if entry.fingerprint.matches(text, size, max_width, color, dpr) {
                self.hits += 1;
            } else {
                self.misses += 1;
                entry.fingerprint = Fingerprint::new(text, size, max_width, color, dpr);
                entry.layout = layout_text(text, size, max_width);
            }
            return entry.layout.clone();
        }

        self.misses += 1;
        let layout = layout_text(text, size, max_width);
        self.entries.entry(node.clone()).or_default().insert(
            slot,
            Entry {
                fingerprint: Fingerprint::new(text, size, max_width, color, dpr),
                layout: layout.clone(),
                last_used: now,
            },
        );
        self.len += 1;
        self.prune();
        layout
    }

    pub fn invalidate_node(&mut self, node: &NodeId) {
        if let Some(slots) = self.entries.remove(node) {
            self.len -= slots.len();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    fn prune(&mut self) {
        while self.len > self.capacity {
            let oldest = self
                .entries
                .iter()
                .flat_map(|(id, slots)| {
                    slots
                        .iter()
                        .map(move |(slot, entry)| (entry.last_used, id, *slot))
                })
                .min_by_key(|(used, _, _)| *used)
                .map(|(_, id, slot)| (id.clone(), slot));

            let Some((id, slot)) = oldest else { break };
            if let Some(slots) = self.entries.get_mut(&id) {
                slots.remove(&slot);
                if slots.is_empty() {
                    self.entries.remove(&id);
                }
            }
            self.len -= 1;
        }
    }
}

pub fn measure(text: &str, size: f32) -> f32 {
    text.width() as f32 * size * ADVANCE_RATIO
}

/// Lay out a single line, truncating with an ellipsis past `max_width`.
/// A non-positive `max_width` means unbounded.
pub fn layout_text(text: &str, size: f32, max_width: f32) -> TextLayout {
    let height = size * LINE_HEIGHT_RATIO;
    let full = measure(text, size);
    if max_width <= 0.0 || full <= max_width {
        return TextLayout {
            content: text.to_string(),
            width: full,
            height,
        };
    }

    let advance = size * ADVANCE_RATIO;
    let room = max_width - ELLIPSIS.width().unwrap_or(1) as f32 * advance;
    let mut content = String::new();
    let mut width = 0.0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0) as f32 * advance;
        if width + w > room {
            break;
        }
        width += w;
        content.push(c);
    }
    content.push(ELLIPSIS);
    TextLayout {
        width: measure(&content, size),
        content,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_labels() {
        let layout = layout_text("A very long node label indeed", 10.0, 60.0);
        assert!(layout.content.ends_with(ELLIPSIS));
        assert!(layout.width <= 60.0);
        let short = layout_text("Hi", 10.0, 60.0);
        assert_eq!(short.content, "Hi");
    }

    #[test]
    fn fingerprint_change_relayouts() {
        let mut cache = TextCache::new(10);
        let id = NodeId::new("n");
        cache.layout(&id, TextSlot::Label, "One", 12.0, 100.0, Color::WHITE, 1.0);
        cache.layout(&id, TextSlot::Label, "One", 12.0, 100.0, Color::WHITE, 1.0);
        let changed = cache.layout(&id, TextSlot::Label, "Two!", 12.0, 100.0, Color::WHITE, 1.0);
        assert_eq!(changed.content, "Two!");
        assert_eq!((cache.hits(), cache.misses()), (1, 2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = TextCache::new(2);
        let (a, b, c) = (NodeId::new("a"), NodeId::new("b"), NodeId::new("c"));
        cache.layout(&a, TextSlot::Label, "a", 12.0, 0.0, Color::WHITE, 1.0);
        cache.layout(&b, TextSlot::Label, "b", 12.0, 0.0, Color::WHITE, 1.0);
        // Touch a so b becomes the oldest.
        cache.layout(&a, TextSlot::Label, "a", 12.0, 0.0, Color::WHITE, 1.0);
        cache.layout(&c, TextSlot::Label, "c", 12.0, 0.0, Color::WHITE, 1.0);
        assert_eq!(cache.len(), 2);

        let misses = cache.misses();
        cache.layout(&a, TextSlot::Label, "a", 12.0, 0.0, Color::WHITE, 1.0);
        assert_eq!(cache.misses(), misses);
        cache.layout(&b, TextSlot::Label, "b", 12.0, 0.0, Color::WHITE, 1.0);
        assert_eq!(cache.misses(), misses + 1);
    }

    #[test]
    fn invalidating_a_node_drops_all_its_slots() {
        let mut cache = TextCache::new(10);
        let (a, b) = (NodeId::new("a"), NodeId::new("b"));
        cache.layout(&a, TextSlot::Label, "a", 12.0, 0.0, Color::WHITE, 1.0);
        cache.layout(&a, TextSlot::Status, "idle", 12.0, 0.0, Color::WHITE, 1.0);
        cache.layout(&b, TextSlot::Label, "b", 12.0, 0.0, Color::WHITE, 1.0);
        cache.invalidate_node(&a);
        assert_eq!(cache.len(), 1);
        cache.invalidate_node(&a);
        assert_eq!(cache.len(), 1);
    }
}
