//! Image suggestions: insert, resize, caption, delete and move.

use tracing::debug;

use super::SuggestionSink;
use crate::doc::{Document, ImageProps, NodeKey, NodeKind, Point};
use crate::error::Result;
use crate::suggestion::{ChangedProperties, ImageSnapshot, SuggestionId, SuggestionMark, SuggestionType};

fn image_props(doc: &Document, key: NodeKey) -> Option<ImageProps> {
    match doc.kind(key) {
        Some(NodeKind::Image(props)) => Some(props.clone()),
        _ => None,
    }
}

/// The suggestion range directly around an image, if it is of `kind`.
fn wrapper_of(doc: &Document, image: NodeKey, kind: SuggestionType) -> Option<NodeKey> {
    doc.parent(image).filter(|&p| doc.mark(p).is_some_and(|m| m.kind == kind))
}

/// Place `node` at a caret, splitting text when the caret is inside it.
fn place_at(doc: &mut Document, node: NodeKey, at: Point) -> Result<bool> {
    let Some(target) = doc.get(at.key) else { return Ok(false) };
    if target.text().is_some() {
        doc.split_text(at.key, at.offset)?;
        doc.insert_after(at.key, node)?;
        return Ok(true);
    }
    if target.kind.is_leaf() {
        return Ok(false);
    }
    doc.insert_at(at.key, at.offset, node)?;
    Ok(true)
}

pub fn insert_image(doc: &mut Document, at: Point, props: ImageProps, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let id = SuggestionId::generate();
    let image = doc.create(NodeKind::Image(props));
    let wrapper = doc.create_suggestion(SuggestionMark::new(id.clone(), SuggestionType::InsertImage));
    doc.append(wrapper, image)?;
    if !place_at(doc, wrapper, at)? {
        debug!(key = %at.key, "cannot place an image here");
        doc.remove(wrapper)?;
        return Ok(false);
    }
    sink.on_created(&id);
    Ok(true)
}

fn change_image(
    doc: &mut Document,
    image: NodeKey,
    sink: &mut dyn SuggestionSink,
    edit: impl Fn(&mut ImageProps),
) -> Result<bool> {
    let Some(before) = image_props(doc, image) else {
        debug!(key = %image, "not an image");
        return Ok(false);
    };
    let mut after = before.clone();
    edit(&mut after);
    if after == before {
        return Ok(true);
    }
    doc.node_mut(image)?.kind = NodeKind::Image(after.clone());

    if wrapper_of(doc, image, SuggestionType::InsertImage).is_some() {
        return Ok(true);
    }
    if let Some(wrapper) = wrapper_of(doc, image, SuggestionType::ImageChange) {
        let snapshot = doc.mark(wrapper).and_then(|m| m.changed()).and_then(|c| c.image);
        if snapshot == Some(ImageSnapshot::of(&after)) {
            doc.unwrap(wrapper)?;
        }
        return Ok(true);
    }
    let id = SuggestionId::generate();
    let changed = ChangedProperties { image: Some(ImageSnapshot::of(&before)), ..Default::default() };
    doc.wrap_in_suggestion(image, SuggestionMark::with_changes(id.clone(), SuggestionType::ImageChange, changed))?;
    sink.on_created(&id);
    Ok(true)
}

pub fn resize_image(
    doc: &mut Document,
    image: NodeKey,
    width: Option<u32>,
    height: Option<u32>,
    sink: &mut dyn SuggestionSink,
) -> Result<bool> {
    change_image(doc, image, sink, |p| {
        p.width = width;
        p.height = height;
    })
}

pub fn set_image_caption(doc: &mut Document, image: NodeKey, show: bool, sink: &mut dyn SuggestionSink) -> Result<bool> {
    change_image(doc, image, sink, |p| p.show_caption = show)
}

pub fn delete_image(doc: &mut Document, image: NodeKey, sink: &mut dyn SuggestionSink) -> Result<bool> {
    if image_props(doc, image).is_none() {
        return Ok(false);
    }
    if let Some(inserted) = wrapper_of(doc, image, SuggestionType::InsertImage) {
        doc.remove(inserted)?;
        return Ok(true);
    }
    // An image-change range goes down together with its image.
    let target = wrapper_of(doc, image, SuggestionType::ImageChange).unwrap_or(image);
    if wrapper_of(doc, target, SuggestionType::DeleteImage).is_some() {
        return Ok(true);
    }
    let id = SuggestionId::generate();
    doc.wrap_in_suggestion(target, SuggestionMark::new(id.clone(), SuggestionType::DeleteImage))?;
    sink.on_created(&id);
    Ok(true)
}

/// Move an image to `to`. Moving an image inserted in this session just moves
/// it; otherwise the source is marked deleted and a copy inserted, under one id.
pub fn move_image(doc: &mut Document, image: NodeKey, to: Point, sink: &mut dyn SuggestionSink) -> Result<bool> {
    let Some(props) = image_props(doc, image) else { return Ok(false) };
    if let Some(inserted) = wrapper_of(doc, image, SuggestionType::InsertImage) {
        if doc.mark(inserted).is_some_and(|m| sink.is_local(&m.id)) {
            doc.detach(inserted)?;
            if !place_at(doc, inserted, to)? {
                return Ok(false);
            }
            return Ok(true);
        }
    }

    let id = SuggestionId::generate();
    let copy = doc.create(NodeKind::Image(props));
    let wrapper = doc.create_suggestion(SuggestionMark::new(id.clone(), SuggestionType::InsertImage));
    doc.append(wrapper, copy)?;
    if !place_at(doc, wrapper, to)? {
        doc.remove(wrapper)?;
        return Ok(false);
    }
    let source = wrapper_of(doc, image, SuggestionType::ImageChange).unwrap_or(image);
    doc.wrap_in_suggestion(source, SuggestionMark::new(id.clone(), SuggestionType::DeleteImage))?;
    sink.on_created(&id);
    Ok(true)
}
