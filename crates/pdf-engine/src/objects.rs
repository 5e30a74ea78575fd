//! lopdf object graph helpers: inherited page attributes and cross-document
//! page copying.

use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guard against malformed page trees with parent cycles.
const MAX_TREE_DEPTH: usize = 64;

/// Default US Letter media box used when a page declares none.
pub(crate) const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Look up `key` on a page, walking `/Parent` links for inherited values.
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// `[x0, y0, x1, y1]` of a box-valued entry such as `/MediaBox`.
pub(crate) fn read_box(doc: &Document, object: &Object) -> Option<[f32; 4]> {
    let array = resolve(doc, object)?.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let mut values = [0.0; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = resolve(doc, item)?.as_float().ok()?;
    }
    Some([
        values[0].min(values[2]),
        values[1].min(values[3]),
        values[0].max(values[2]),
        values[1].max(values[3]),
    ])
}

pub(crate) fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|object| read_box(doc, &object))
        .unwrap_or(DEFAULT_MEDIA_BOX)
}

pub(crate) fn box_object(values: [f32; 4]) -> Object {
    Object::Array(values.into_iter().map(Object::Real).collect())
}

/// Dictionary stored directly or behind a reference, cloned for editing.
pub(crate) fn owned_dictionary(doc: &Document, object: Option<&Object>) -> Dictionary {
    match object.and_then(|object| resolve(doc, object)) {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    }
}

/// Copies objects from one document into another, following references.
pub(crate) struct ObjectCopier<'a> {
    source: &'a Document,
    target: &'a mut Document,
    id_map: HashMap<ObjectId, ObjectId>,
}

impl<'a> ObjectCopier<'a> {
    pub(crate) fn new(source: &'a Document, target: &'a mut Document) -> Self {
        Self { source, target, id_map: HashMap::new() }
    }

    /// Copy one page as a standalone page dictionary: inherited attributes are
    /// materialized and `/Parent` is dropped so the source page tree is not
    /// dragged along. Returns the new page id; the caller links it into the
    /// target's page tree.
    pub(crate) fn copy_page(&mut self, page_id: ObjectId) -> Result<ObjectId, lopdf::Error> {
        let mut page = self.source.get_dictionary(page_id)?.clone();
        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(self.source, page_id, key) {
                    page.set(key.to_vec(), value);
                }
            }
        }
        page.remove(b"Parent");

        // Reserve the id first so back-references (e.g. an annotation's /P)
        // resolve to the copy instead of recursing into the page again.
        let new_id = self.target.add_object(Object::Null);
        self.id_map.insert(page_id, new_id);

        let remapped = self.remap(Object::Dictionary(page))?;
        self.target.objects.insert(new_id, remapped);
        Ok(new_id)
    }

    fn copy_object(&mut self, source_id: ObjectId) -> Result<ObjectId, lopdf::Error> {
        if let Some(target_id) = self.id_map.get(&source_id) {
            return Ok(*target_id);
        }

        // Map before recursing to break reference cycles.
        let new_id = self.target.add_object(Object::Null);
        self.id_map.insert(source_id, new_id);

        let object = self.source.get_object(source_id)?.clone();
        let remapped = self.remap(object)?;
        self.target.objects.insert(new_id, remapped);
        Ok(new_id)
    }

    fn remap(&mut self, object: Object) -> Result<Object, lopdf::Error> {
        match object {
            Object::Reference(id) => Ok(Object::Reference(self.copy_object(id)?)),
            Object::Array(items) => Ok(Object::Array(
                items.into_iter().map(|item| self.remap(item)).collect::<Result<Vec<_>, _>>()?,
            )),
            Object::Dictionary(mut dict) => {
                for (_, value) in dict.iter_mut() {
                    *value = self.remap(value.clone())?;
                }
                Ok(Object::Dictionary(dict))
            }
            Object::Stream(mut stream) => {
                for (_, value) in stream.dict.iter_mut() {
                    *value = self.remap(value.clone())?;
                }
                Ok(Object::Stream(stream))
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn tree_with_inherited_media_box() -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 300.into(), 400.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        (doc, page_id)
    }

    #[test]
    fn media_box_is_inherited_from_parent() {
        let (doc, page_id) = tree_with_inherited_media_box();
        assert_eq!(media_box(&doc, page_id), [0.0, 0.0, 300.0, 400.0]);
    }

    #[test]
    fn copied_page_materializes_inherited_attributes_and_drops_parent() {
        let (source, page_id) = tree_with_inherited_media_box();
        let mut target = Document::with_version("1.7");

        let new_id = ObjectCopier::new(&source, &mut target).copy_page(page_id).unwrap();
        let copied = target.get_dictionary(new_id).unwrap();

        assert!(!copied.has(b"Parent"));
        assert_eq!(media_box(&target, new_id), [0.0, 0.0, 300.0, 400.0]);
        // Only the page itself was copied, not the source page tree.
        assert_eq!(target.objects.len(), 1);
    }
}
