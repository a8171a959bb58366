use std::{
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::{
    config::Settings,
    error::{Error, Result},
    index::{CodeIndex, IndexEntry},
    indexer::{Document, DocumentIndexer},
    walker,
};

/// Counts from a finished build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub documents: usize,
    /// Ids of documents skipped after an extraction failure.
    pub skipped: Vec<String>,
    pub codes: usize,
    pub entries: usize,
}

enum Outcome {
    Indexed(Vec<IndexEntry>),
    Skipped,
    Failed(Error),
    Cancelled,
}

/// Index `documents` on a pool of `workers` threads.
///
/// Documents are processed independently; each worker hands back its own
/// entries and they are appended to the index in document order, so the
/// result does not depend on scheduling. A document that fails extraction
/// is logged and skipped; any other error aborts the build. Once `cancel` is set, documents not yet started
/// are abandoned and the build returns [`Error::Cancelled`].
pub fn build_index(
    indexer: &DocumentIndexer,
    documents: &[Document],
    workers: usize,
    cancel: &AtomicBool,
) -> Result<(CodeIndex, BuildReport)> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| Error::Config(format!("cannot start worker pool: {e}")))?;

    let outcomes: Vec<Outcome> = pool.install(|| {
        documents
            .par_iter()
            .map(|document| {
                if cancel.load(Ordering::Relaxed) {
                    return Outcome::Cancelled;
                }
                match indexer.index_document(document) {
                    Ok(entries) => Outcome::Indexed(entries),
                    Err(e) if e.is_extraction_failure() => {
                        warn!(
                            document = %document.id,
                            error = %e,
                            "skipping document"
                        );
                        Outcome::Skipped
                    }
                    Err(e) => Outcome::Failed(e),
                }
            })
            .collect()
    });

    if cancel.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }

    let mut index = CodeIndex::new();
    let mut report = BuildReport {
        documents: documents.len(),
        ..BuildReport::default()
    };
    for (document, outcome) in documents.iter().zip(outcomes) {
        match outcome {
            Outcome::Indexed(entries) => {
                for entry in entries {
                    index.insert(entry);
                }
            }
            Outcome::Skipped => report.skipped.push(document.id.clone()),
            Outcome::Failed(e) => return Err(e),
            Outcome::Cancelled => return Err(Error::Cancelled),
        }
    }
    report.codes = index.code_count();
    report.entries = index.entry_count();

    info!(
        documents = report.documents,
        skipped = report.skipped.len(),
        codes = report.codes,
        entries = report.entries,
        "index build finished"
    );
    Ok((index, report))
}

/// Full build over every PDF under `root` with the production pipeline.
pub fn build_from_dir(
    root: &Path,
    settings: &Settings,
    cancel: &AtomicBool,
) -> Result<(CodeIndex, BuildReport)> {
    let indexer = DocumentIndexer::from_settings(settings)?;
    let documents: Vec<Document> = walker::discover_files(root)?
        .iter()
        .map(|file| Document::from_discovered(file, &settings.link_prefix))
        .collect();
    info!(
        root = %root.display(),
        documents = documents.len(),
        workers = settings.workers,
        "building index"
    );
    build_index(&indexer, &documents, settings.workers, cancel)
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        path::{Path, PathBuf},
    };

    use super::*;
    use crate::{
        codes::CodeExtractor,
        config::{CodeGrammar, Locale, NumericOrder, OcrMode},
        extract::{
            TextExtractor,
            TextLayer,
            testing::{FakeLayer, FakeOcr},
        },
        index::IndexStore,
        indexer::{link_for, testing::fake_indexer},
        period::DateResolver,
    };

    /// A minimal PDF with one line of Helvetica text per page.
    fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let kids = (0..pages.len())
            .map(|i| format!("{} 0 R", 4 + 2 * i))
            .collect::<Vec<_>>()
            .join(" ");
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];
        for (i, text) in pages.iter().enumerate() {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                5 + 2 * i
            ));
            let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
            objects.push(format!(
                "<< /Length {} >>\nstream\n{content}\nendstream",
                content.len()
            ));
        }

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(
                format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes(),
            );
        }
        let xref = pdf.len();
        let size = objects.len() + 1;
        let mut tail = format!("xref\n0 {size}\n0000000000 65535 f \n");
        for offset in offsets {
            tail.push_str(&format!("{offset:010} 00000 n \n"));
        }
        tail.push_str(&format!(
            "trailer\n<< /Size {size} /Root 1 0 R >>\nstartxref\n{xref}\n%EOF\n"
        ));
        pdf.extend_from_slice(tail.as_bytes());
        pdf
    }

    struct MisconfiguredLayer;

    impl TextLayer for MisconfiguredLayer {
        fn page_texts(&self, _path: &Path) -> Result<Vec<String>> {
            Err(Error::Config("no text backend".into()))
        }
    }

    fn document(name: &str) -> Document {
        Document {
            id: name.to_string(),
            path: PathBuf::from("/docs").join(name),
            link: link_for("/static/pdfs", name),
            mtime: 1_713_182_400,
        }
    }

    fn fixture() -> (DocumentIndexer, Vec<Document>) {
        let layer = FakeLayer::default()
            .with("ENERO 2024.pdf", &["Ref: ABC-1/", "Ref: abc-1/ Ref: q/"])
            .with("MARZO 2025 Informe.pdf", &["x", "Ref: ABC-123/"])
            .with("Sin fecha.pdf", &["Ref: ABC-1/"]);
        let docs = vec![
            document("ENERO 2024.pdf"),
            document("MARZO 2025 Informe.pdf"),
            document("broken.pdf"),
            document("Sin fecha.pdf"),
        ];
        (fake_indexer(layer, FakeOcr::default()), docs)
    }

    #[test]
    fn failed_document_is_skipped_not_fatal() {
        let (indexer, docs) = fixture();
        let (index, report) =
            build_index(&indexer, &docs, 2, &AtomicBool::new(false)).unwrap();

        assert_eq!(report.documents, 4);
        assert_eq!(report.skipped, vec!["broken.pdf".to_string()]);
        assert!(
            index
                .iter()
                .flat_map(|(_, entries)| entries)
                .all(|e| e.document_id != "broken.pdf")
        );

        let abc1: Vec<_> = index
            .get("abc-1")
            .unwrap()
            .iter()
            .map(|e| (e.document_id.as_str(), e.pages.clone()))
            .collect();
        assert_eq!(
            abc1,
            vec![("ENERO 2024.pdf", vec![1, 2]), ("Sin fecha.pdf", vec![1])]
        );

        let abc123 = index.get("abc-123").unwrap();
        assert_eq!(abc123.len(), 1);
        assert_eq!(abc123[0].period.as_u32(), 202503);
        assert_eq!(abc123[0].pages, vec![2]);
        assert_eq!(report.codes, 3);
        assert_eq!(report.entries, 4);
    }

    #[test]
    fn result_does_not_depend_on_worker_count() {
        let (indexer, docs) = fixture();
        let cancel = AtomicBool::new(false);
        let (serial, _) = build_index(&indexer, &docs, 1, &cancel).unwrap();
        let (parallel, _) = build_index(&indexer, &docs, 8, &cancel).unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn cancelled_build_produces_nothing() {
        let (indexer, docs) = fixture();
        let err = build_index(&indexer, &docs, 2, &AtomicBool::new(true))
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn empty_source_builds_empty_index() {
        let (indexer, _) = fixture();
        let (index, report) =
            build_index(&indexer, &[], 2, &AtomicBool::new(false)).unwrap();
        assert!(index.is_empty());
        assert_eq!(report, BuildReport::default());
    }

    #[test]
    fn build_from_dir_skips_unparseable_pdfs() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("garbage.pdf"), b"not a pdf").unwrap();
        let settings = Settings {
            ocr_mode: OcrMode::Off,
            workers: 1,
            ..Settings::default()
        };

        let (index, report) =
            build_from_dir(tmp.path(), &settings, &AtomicBool::new(false))
                .unwrap();
        assert!(index.is_empty());
        assert_eq!(report.documents, 1);
    }

    #[test]
    fn build_from_missing_dir_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = build_from_dir(
            &tmp.path().join("missing"),
            &Settings::default(),
            &AtomicBool::new(false),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn non_extraction_error_aborts_the_build() {
        let indexer = DocumentIndexer::new(
            TextExtractor::new(
                Box::new(MisconfiguredLayer),
                None,
                "Ref:",
                OcrMode::Off,
            ),
            CodeExtractor::new("Ref:", &CodeGrammar::UntilSlash).unwrap(),
            DateResolver::new(Locale::Es, NumericOrder::MonthYear).unwrap(),
        );
        let docs = vec![document("a.pdf"), document("b.pdf")];

        let err = build_index(&indexer, &docs, 2, &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_index_is_built_once_from_real_pdfs() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("pdfs");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(
            docs.join("MARZO 2025 Informe.pdf"),
            pdf_with_pages(&["Portada", "Ref: ABC-123/"]),
        )
        .unwrap();
        let settings = Settings {
            ocr_mode: OcrMode::Off,
            workers: 1,
            ..Settings::default()
        };
        let store = IndexStore::new(tmp.path().join("index.json"));
        let builds = Cell::new(0);

        let index = store
            .load_or_build(|| {
                builds.set(builds.get() + 1);
                build_from_dir(&docs, &settings, &AtomicBool::new(false))
                    .map(|(index, _)| index)
            })
            .unwrap();
        assert_eq!(builds.get(), 1);

        let entries = index.get("abc-123").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].document_id, "MARZO 2025 Informe.pdf");
        assert_eq!(entries[0].pages, vec![2]);
        assert_eq!(entries[0].period.as_u32(), 202503);

        let reloaded = store
            .load_or_build(|| {
                builds.set(builds.get() + 1);
                Ok(CodeIndex::new())
            })
            .unwrap();
        assert_eq!(builds.get(), 1);
        assert_eq!(reloaded, index);
    }
}
