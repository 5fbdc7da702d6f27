// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF merger — concatenate every page of every input document, in the
// requested order, into one fresh document.

use lopdf::{Document, Object, dictionary};
use mediawerk_core::error::{MediawerkError, Result};
use mediawerk_core::{AssetFormat, EncodedAsset};
use tracing::{debug, info, instrument};

use crate::pdf::PdfReader;
use crate::pdf::reader::PageImporter;

pub const MERGED_NAME: &str = "merged.pdf";

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentMerger;

impl DocumentMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge `assets` into one PDF. `order`, when given, must be a permutation
    /// of the input indices; otherwise inputs are taken as listed.
    #[instrument(skip(self, assets, order), fields(inputs = assets.len()))]
    pub fn merge(&self, assets: &[EncodedAsset], order: Option<&[usize]>) -> Result<EncodedAsset> {
        if assets.is_empty() {
            return Err(MediawerkError::Merge("no documents to merge".into()));
        }
        let order = resolve_order(assets.len(), order)?;

        // Parse everything up front so nothing is built from a partial set.
        let mut sources = Vec::with_capacity(order.len());
        for &index in &order {
            let asset = &assets[index];
            if asset.format() != AssetFormat::Pdf {
                return Err(MediawerkError::Merge(format!(
                    "{} is {}, only PDF documents can be merged",
                    asset.name(),
                    asset.format()
                )));
            }
            let reader = PdfReader::from_bytes(asset.bytes()).map_err(|err| {
                MediawerkError::Merge(format!("failed to parse {}: {err}", asset.name()))
            })?;
            sources.push((asset.name(), reader));
        }

        let mut target = Document::with_version("1.5");
        let pages_id = target.new_object_id();
        let mut kids: Vec<Object> = Vec::new();

        for (name, reader) in &sources {
            let mut importer = PageImporter::new(reader.document());
            for page_id in reader.page_ids() {
                let new_id = importer.import_page(&mut target, page_id, pages_id)?;
                kids.push(Object::Reference(new_id));
            }
            debug!(source = %name, pages = reader.page_count(), "Pages imported");
        }

        let count = kids.len() as i64;
        target.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = target.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        target.trailer.set("Root", catalog_id);
        target.compress();

        let mut bytes = Vec::new();
        target
            .save_to(&mut bytes)
            .map_err(|err| MediawerkError::Merge(format!("failed to write merged PDF: {err}")))?;

        info!(pages = count, output_bytes = bytes.len(), "Merge complete");
        Ok(EncodedAsset::new(MERGED_NAME, AssetFormat::Pdf, bytes))
    }
}

/// Validate `order` as a permutation of `0..len`, or default to identity.
fn resolve_order(len: usize, order: Option<&[usize]>) -> Result<Vec<usize>> {
    let Some(order) = order else {
        return Ok((0..len).collect());
    };
    if order.len() != len {
        return Err(MediawerkError::Merge(format!(
            "order lists {} entries for {len} documents",
            order.len()
        )));
    }
    let mut seen = vec![false; len];
    for &index in order {
        match seen.get_mut(index) {
            Some(slot) if !*slot => *slot = true,
            Some(_) => {
                return Err(MediawerkError::Merge(format!("document {index} listed twice")));
            }
            None => {
                return Err(MediawerkError::Merge(format!("no document at index {index}")));
            }
        }
    }
    Ok(order.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        TestPage, build_pdf, op, page_widths, pdf_asset, pdf_with_page_widths, rgb_image_stream,
    };

    fn two_documents() -> Vec<EncodedAsset> {
        vec![
            pdf_asset("a.pdf", pdf_with_page_widths(&[101, 102])),
            pdf_asset("b.pdf", pdf_with_page_widths(&[201, 202, 203])),
        ]
    }

    #[test]
    fn pages_follow_input_order() {
        let merged = DocumentMerger::new().merge(&two_documents(), None).unwrap();
        assert_eq!(merged.name(), "merged.pdf");
        assert_eq!(merged.format(), AssetFormat::Pdf);
        assert_eq!(page_widths(merged.bytes()), vec![101, 102, 201, 202, 203]);
    }

    #[test]
    fn explicit_order_reorders_documents_not_pages() {
        let merged = DocumentMerger::new().merge(&two_documents(), Some(&[1, 0])).unwrap();
        assert_eq!(page_widths(merged.bytes()), vec![201, 202, 203, 101, 102]);
    }

    #[test]
    fn order_must_be_a_permutation() {
        let merger = DocumentMerger::new();
        for order in [&[0, 0][..], &[0][..], &[0, 2][..], &[0, 1, 1][..]] {
            let err = merger.merge(&two_documents(), Some(order)).unwrap_err();
            assert!(matches!(err, MediawerkError::Merge(_)), "{order:?}");
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = DocumentMerger::new().merge(&[], None).unwrap_err();
        assert!(matches!(err, MediawerkError::Merge(_)));
    }

    #[test]
    fn non_pdf_input_is_rejected() {
        let mut assets = two_documents();
        assets.push(EncodedAsset::new("photo.png", AssetFormat::Png, vec![0x89, b'P']));
        let err = DocumentMerger::new().merge(&assets, None).unwrap_err();
        assert!(err.to_string().contains("photo.png"));
    }

    #[test]
    fn corrupt_input_fails_the_whole_merge() {
        let mut assets = two_documents();
        assets.push(pdf_asset("broken.pdf", b"%PDF-1.4 garbage".to_vec()));
        let err = DocumentMerger::new().merge(&assets, None).unwrap_err();
        assert!(matches!(err, MediawerkError::Merge(_)));
        assert!(err.to_string().contains("broken.pdf"));
    }

    #[test]
    fn shared_resources_survive_the_merge() {
        let image = rgb_image_stream(1, 1, vec![255, 0, 0]);
        let mut page = TestPage::blank(10, 10);
        page.xobjects.push(("Im0", image));
        page.operations = vec![op("Do", vec![Object::Name(b"Im0".to_vec())])];
        let asset = pdf_asset("img.pdf", build_pdf(vec![page], None));

        let merged = DocumentMerger::new()
            .merge(&[asset.clone(), asset], None)
            .unwrap();
        let reader = PdfReader::from_bytes(merged.bytes()).unwrap();
        assert_eq!(reader.page_count(), 2);
        for page_id in reader.page_ids() {
            let page = reader.document().get_dictionary(page_id).unwrap();
            let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
            let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
            let image_ref = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
            assert!(reader.document().get_object(image_ref).unwrap().as_stream().is_ok());
        }
    }

    #[test]
    fn resolve_order_defaults_to_identity() {
        assert_eq!(resolve_order(3, None).unwrap(), vec![0, 1, 2]);
        assert_eq!(resolve_order(3, Some(&[2, 0, 1])).unwrap(), vec![2, 0, 1]);
    }
}
