// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Applies decoded frames to visible generation state.

use quill_core::{Frame, GenerationStatus, Product};

/// Running state built from an ordered frame sequence.
///
/// Text frames concatenate into the answer, thinking frames into the
/// reasoning trace. Products are upserted by id: a product whose id was
/// already seen is replaced in place, new ids are appended. Products
/// without an id are always appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameAccumulator {
    content: String,
    thinking: String,
    status: Option<GenerationStatus>,
    status_history: Vec<GenerationStatus>,
    products: Vec<Product>,
    frames_applied: u64,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds state from a checkpoint taken after `frame_offset` frames.
    pub fn resume_from(content: String, thinking: Option<String>, frame_offset: u64) -> Self {
        Self {
            content,
            thinking: thinking.unwrap_or_default(),
            frames_applied: frame_offset,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, frame: &Frame) {
        match frame {
            Frame::Status(status) => {
                self.status = Some(*status);
                self.status_history.push(*status);
            }
            Frame::Thinking(delta) => self.thinking.push_str(delta),
            Frame::Text(delta) => self.content.push_str(delta),
            Frame::Products(products) => {
                for product in products {
                    let existing = product.id.as_ref().and_then(|id| {
                        self.products
                            .iter_mut()
                            .find(|p| p.id.as_ref() == Some(id))
                    });
                    match existing {
                        Some(existing) => *existing = product.clone(),
                        None => self.products.push(product.clone()),
                    }
                }
            }
        }
        self.frames_applied += 1;
    }

    pub fn apply_all<'a>(&mut self, frames: impl IntoIterator<Item = &'a Frame>) {
        for frame in frames {
            self.apply(frame);
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Reasoning trace, or `None` if no thinking frames were applied.
    pub fn thinking(&self) -> Option<&str> {
        (!self.thinking.is_empty()).then_some(self.thinking.as_str())
    }

    pub fn status(&self) -> Option<GenerationStatus> {
        self.status
    }

    pub fn status_history(&self) -> &[GenerationStatus] {
        &self.status_history
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn frames_applied(&self) -> u64 {
        self.frames_applied
    }

    /// True when nothing visible has been accumulated or restored.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
            && self.thinking.is_empty()
            && self.products.is_empty()
            && self.status.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_lines;

    fn product(id: &str, name: &str) -> Product {
        Product {
            id: Some(id.into()),
            name: name.into(),
            url: None,
            price: None,
            image_url: None,
            attributes: serde_json::Map::new(),
        }
    }

    #[test]
    fn mixed_stream_decodes_to_hello() {
        let blob = concat!(
            "{\"type\":\"status\",\"content\":\"analyzing\"}\n",
            "{\"type\":\"text\",\"content\":\"Hel\"}\n",
            "{\"type\":\"text\",\"content\":\"lo\"}\n",
            "{\"type\":\"products\",\"content\":[{\"id\":\"p1\",\"name\":\"Mug\"}]}\n",
        );
        let mut acc = FrameAccumulator::new();
        acc.apply_all(&decode_lines(blob));

        assert_eq!(acc.content(), "Hello");
        assert_eq!(acc.status_history(), &[GenerationStatus::Analyzing]);
        assert_eq!(acc.products().len(), 1);
        assert_eq!(acc.products()[0].name, "Mug");
        assert_eq!(acc.thinking(), None);
        assert_eq!(acc.frames_applied(), 4);
    }

    #[test]
    fn products_upsert_by_id() {
        let mut acc = FrameAccumulator::new();
        acc.apply(&Frame::Products(vec![product("a", "A"), product("b", "B")]));
        acc.apply(&Frame::Products(vec![product("b", "B v2"), product("c", "C")]));

        let names: Vec<&str> = acc.products().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["A", "B v2", "C"]);
    }

    #[test]
    fn products_without_id_are_appended() {
        let unnamed = Product {
            id: None,
            ..product("", "Loose")
        };
        let mut acc = FrameAccumulator::new();
        acc.apply(&Frame::Products(vec![product("a", "A"), unnamed.clone()]));
        acc.apply(&Frame::Products(vec![unnamed, product("a", "A v2")]));

        let names: Vec<&str> = acc.products().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["A v2", "Loose", "Loose"]);
    }

    #[test]
    fn resumed_accumulator_matches_uninterrupted_one() {
        let frames: Vec<Frame> = (0..10)
            .map(|i| {
                if i % 3 == 0 {
                    Frame::thinking(format!("t{i} "))
                } else {
                    Frame::text(format!("w{i} "))
                }
            })
            .collect();

        let mut full = FrameAccumulator::new();
        full.apply_all(&frames);

        let mut first = FrameAccumulator::new();
        first.apply_all(&frames[..4]);
        let mut resumed = FrameAccumulator::resume_from(
            first.content().to_string(),
            first.thinking().map(str::to_string),
            first.frames_applied(),
        );
        resumed.apply_all(&frames[4..]);

        assert_eq!(resumed.content(), full.content());
        assert_eq!(resumed.thinking(), full.thinking());
        assert_eq!(resumed.frames_applied(), full.frames_applied());
    }
}
