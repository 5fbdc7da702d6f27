// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — open existing documents with `lopdf`, inspect their page tree,
// overwrite the /Info metadata slots, re-save with structure sharing, and
// import pages from one document into another.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use mediawerk_core::error::{MediawerkError, Result};
use tracing::{debug, instrument, warn};

/// US Letter, used when no /MediaBox can be found anywhere up the page tree.
pub const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Page attributes a page may inherit from its ancestors in the page tree.
pub const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Value written into the date slots when scrubbing (the Unix epoch).
pub const EPOCH_DATE: &str = "D:19700101000000Z";

/// /Info string slots blanked when scrubbing, paired with their display names.
pub const INFO_TEXT_SLOTS: [(&str, &str); 6] = [
    ("Title", "Title"),
    ("Author", "Author"),
    ("Subject", "Subject"),
    ("Keywords", "Keywords"),
    ("Producer", "Producer"),
    ("Creator", "Creator"),
];

/// /Info date slots reset to the epoch, paired with their display names.
pub const INFO_DATE_SLOTS: [(&str, &str); 2] = [
    ("CreationDate", "Creation date"),
    ("ModDate", "Modification date"),
];

/// Guard against malformed (cyclic) /Parent chains.
const MAX_TREE_DEPTH: usize = 32;

/// A parsed PDF document.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Parse raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data)
            .map_err(|err| MediawerkError::Decode(format!("failed to load PDF document: {err}")))?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Page object ids in reading order.
    pub fn page_ids(&self) -> Vec<ObjectId> {
        self.document.get_pages().into_values().collect()
    }

    /// The page's effective /MediaBox as `[x0, y0, x1, y1]`, normalised so
    /// that `x0 < x1` and `y0 < y1`.
    pub fn media_box(&self, page_id: ObjectId) -> [f32; 4] {
        media_box(&self.document, page_id)
    }

    // -- Mutation -------------------------------------------------------------

    /// Overwrite every /Info metadata slot, creating the dictionary if the
    /// document has none. Returns the display names of the cleared slots.
    #[instrument(skip(self))]
    pub fn clear_info_metadata(&mut self) -> Result<Vec<String>> {
        let info_id = match self.document.trailer.get(b"Info") {
            Ok(Object::Reference(id)) => *id,
            Ok(Object::Dictionary(dict)) => {
                let dict = dict.clone();
                let id = self.document.add_object(dict);
                self.document.trailer.set("Info", id);
                id
            }
            _ => {
                let id = self.document.add_object(dictionary! {});
                self.document.trailer.set("Info", id);
                id
            }
        };

        let info = self
            .document
            .get_object_mut(info_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| MediawerkError::Decode(format!("PDF /Info is not a dictionary: {err}")))?;

        let mut cleared = Vec::with_capacity(INFO_TEXT_SLOTS.len() + INFO_DATE_SLOTS.len());
        for (key, label) in INFO_TEXT_SLOTS {
            info.set(key, Object::string_literal(""));
            cleared.push(label.to_string());
        }
        for (key, label) in INFO_DATE_SLOTS {
            info.set(key, Object::string_literal(EPOCH_DATE));
            cleared.push(label.to_string());
        }

        debug!(slots = cleared.len(), "Document metadata cleared");
        Ok(cleared)
    }

    /// Drop unreachable objects and empty streams, renumber, and
    /// Flate-compress every stream that allows it. Output keeps a classic
    /// cross-reference table; objects are not packed into object streams.
    #[instrument(skip(self))]
    pub fn compact(&mut self) {
        let pruned = self.document.prune_objects();
        let empty = self.document.delete_zero_length_streams();
        self.document.renumber_objects();
        self.document.compress();
        debug!(pruned = pruned.len(), empty_streams = empty.len(), "Document compacted");
    }

    /// Serialise the document.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .map_err(|err| MediawerkError::Encode(format!("failed to serialise PDF: {err}")))?;
        Ok(output)
    }
}

// -- Page tree helpers --------------------------------------------------------

/// Follow one level of indirection.
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

/// Look `key` up on the page, then on each ancestor in the page tree.
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

pub(crate) fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let rect = inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|object| object.as_array().ok())
        .and_then(|array| {
            let values: Vec<f32> = array
                .iter()
                .filter_map(|v| resolve(doc, v).as_float().ok())
                .collect();
            <[f32; 4]>::try_from(values).ok()
        });

    match rect {
        Some([x0, y0, x1, y1]) if x0 != x1 && y0 != y1 => {
            [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]
        }
        _ => DEFAULT_MEDIA_BOX,
    }
}

// -- Page import ----------------------------------------------------------------

/// Copies pages of one source document into a target document.
///
/// Every source object is copied at most once per importer: a memo maps
/// source ids to target ids, so resources shared between pages stay shared
/// and reference cycles terminate.
pub(crate) struct PageImporter<'a> {
    source: &'a Document,
    memo: HashMap<ObjectId, ObjectId>,
}

impl<'a> PageImporter<'a> {
    pub(crate) fn new(source: &'a Document) -> Self {
        Self {
            source,
            memo: HashMap::new(),
        }
    }

    /// Copy `page_id` (and everything it references) into `target`, with its
    /// /Parent set to `parent_id`. Inherited attributes are materialised on
    /// the copy since the source's page tree is left behind.
    pub(crate) fn import_page(
        &mut self,
        target: &mut Document,
        page_id: ObjectId,
        parent_id: ObjectId,
    ) -> Result<ObjectId> {
        let page = self.source.get_dictionary(page_id).map_err(|err| {
            MediawerkError::Merge(format!("cannot read page object {page_id:?}: {err}"))
        })?;

        let new_id = target.new_object_id();
        self.memo.insert(page_id, new_id);

        let mut copy = self.clone_dictionary(target, page);
        for key in INHERITABLE_KEYS {
            if copy.has(key) {
                continue;
            }
            if let Some(value) = inherited_attribute(self.source, page_id, key) {
                let value = self.clone_object(target, value);
                copy.set(key, value);
            }
        }
        copy.set("Parent", parent_id);

        target.objects.insert(new_id, Object::Dictionary(copy));
        Ok(new_id)
    }

    fn import_object(&mut self, target: &mut Document, id: ObjectId) -> ObjectId {
        if let Some(existing) = self.memo.get(&id) {
            return *existing;
        }
        let new_id = target.new_object_id();
        self.memo.insert(id, new_id);

        let copy = match self.source.get_object(id) {
            Ok(object) => self.clone_object(target, object),
            Err(err) => {
                warn!(?id, %err, "Cannot resolve reference, using Null");
                Object::Null
            }
        };
        target.objects.insert(new_id, copy);
        new_id
    }

    fn clone_object(&mut self, target: &mut Document, object: &Object) -> Object {
        match object {
            Object::Dictionary(dict) => Object::Dictionary(self.clone_dictionary(target, dict)),
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.clone_object(target, item))
                    .collect(),
            ),
            Object::Reference(id) => Object::Reference(self.import_object(target, *id)),
            Object::Stream(stream) => {
                let mut copy = stream.clone();
                copy.dict = self.clone_dictionary(target, &stream.dict);
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    /// /Parent is skipped: the page tree is rebuilt by the caller.
    fn clone_dictionary(&mut self, target: &mut Document, dict: &Dictionary) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            if key == b"Parent" {
                continue;
            }
            copy.set(key.clone(), self.clone_object(target, value));
        }
        copy
    }
}
