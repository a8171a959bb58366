use std::{collections::BTreeMap, path::PathBuf};

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tracing::debug;

use crate::{
    codes::CodeExtractor,
    config::Settings,
    error::Result,
    extract::TextExtractor,
    index::IndexEntry,
    period::{DateResolver, Period},
    walker::DiscoveredFile,
};

/// Characters escaped in each segment of a document link.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A document scheduled for indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Relative path under the documents directory.
    pub id: String,
    pub path: PathBuf,
    pub link: String,
    /// Seconds since the Unix epoch.
    pub mtime: u64,
}

impl Document {
    pub fn from_discovered(file: &DiscoveredFile, link_prefix: &str) -> Self {
        let id = file
            .relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Self {
            link: link_for(link_prefix, &id),
            id,
            path: file.absolute_path.clone(),
            mtime: file.mtime,
        }
    }
}

/// `prefix/<id>` with every path segment percent-encoded.
pub fn link_for(prefix: &str, id: &str) -> String {
    let encoded = id
        .split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{encoded}", prefix.trim_end_matches('/'))
}

/// Per-code occurrence counts for one document, keyed by page.
#[derive(Debug, Default)]
struct Occurrences {
    /// Codes in order of first appearance.
    order: Vec<String>,
    pages: BTreeMap<String, BTreeMap<u32, u32>>,
}

impl Occurrences {
    fn record(&mut self, code: String, page: u32) {
        if !self.pages.contains_key(&code) {
            self.order.push(code.clone());
        }
        *self.pages.entry(code).or_default().entry(page).or_default() += 1;
    }

    fn into_entries(self, document: &Document, period: Period) -> Vec<IndexEntry> {
        let Occurrences { order, mut pages } = self;
        order
            .into_iter()
            .filter_map(|code| {
                let per_page = pages.remove(&code)?;
                Some(IndexEntry {
                    document_id: document.id.clone(),
                    link: document.link.clone(),
                    pages: per_page.keys().copied().collect(),
                    occurrences: per_page.values().sum(),
                    period,
                    code,
                })
            })
            .collect()
    }
}

/// Turns one document into its index entries.
pub struct DocumentIndexer {
    text: TextExtractor,
    codes: CodeExtractor,
    dates: DateResolver,
}

impl DocumentIndexer {
    pub fn new(
        text: TextExtractor,
        codes: CodeExtractor,
        dates: DateResolver,
    ) -> Self {
        Self { text, codes, dates }
    }

    /// The production pipeline: PDF text layer, Tesseract OCR, and the
    /// configured grammar and locale.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            TextExtractor::from_settings(settings),
            CodeExtractor::new(&settings.trigger, &settings.grammar)?,
            DateResolver::new(settings.locale, settings.numeric_order)?,
        ))
    }

    /// Extract, match and aggregate one document.
    ///
    /// Emits one entry per distinct code, in order of first appearance,
    /// carrying every page the code occurs on. Errors are extraction
    /// failures of the whole document; the caller decides whether to skip.
    pub fn index_document(&self, document: &Document) -> Result<Vec<IndexEntry>> {
        let period = self.dates.resolve(&document.id, document.mtime);
        let extracted = self.text.extract(&document.path)?;

        let mut occurrences = Occurrences::default();
        for page in &extracted.pages {
            for code in self.codes.extract(&page.text) {
                occurrences.record(code, page.number);
            }
        }

        let entries = occurrences.into_entries(document, period);
        debug!(
            document = %document.id,
            %period,
            pages = extracted.pages.len(),
            ocr_pages = extracted.ocr_page_count(),
            codes = entries.len(),
            "indexed document"
        );
        Ok(entries)
    }
}

/// Indexer wired to in-memory fakes, for tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::DocumentIndexer;
    use crate::{
        codes::CodeExtractor,
        config::{CodeGrammar, Locale, NumericOrder, OcrMode},
        extract::{
            TextExtractor,
            testing::{FakeLayer, FakeOcr},
        },
        period::DateResolver,
    };

    pub fn fake_indexer(layer: FakeLayer, ocr: FakeOcr) -> DocumentIndexer {
        DocumentIndexer::new(
            TextExtractor::new(
                Box::new(layer),
                Some(Box::new(ocr)),
                "Ref:",
                OcrMode::PerPage,
            ),
            CodeExtractor::new("Ref:", &CodeGrammar::UntilSlash).unwrap(),
            DateResolver::new(Locale::Es, NumericOrder::MonthYear).unwrap(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{testing::fake_indexer as indexer, *};
    use crate::extract::testing::{FakeLayer, FakeOcr, FakePage};

    // 2024-04-15T12:00:00Z
    const APRIL_2024: u64 = 1_713_182_400;

    fn document(name: &str) -> Document {
        Document {
            id: name.to_string(),
            path: PathBuf::from("/docs").join(name),
            link: link_for("/static/pdfs", name),
            mtime: APRIL_2024,
        }
    }

    #[test]
    fn code_on_second_page_only() {
        let name = "MARZO 2025 Informe.pdf";
        let layer = FakeLayer::default()
            .with(name, &["Portada", "Texto Ref: ABC-123/2025 fin"]);
        let entries = indexer(layer, FakeOcr::default())
            .index_document(&document(name))
            .unwrap();

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.code, "abc-123");
        assert_eq!(entry.document_id, name);
        assert_eq!(entry.period.as_u32(), 202503);
        assert_eq!(entry.pages, vec![2]);
        assert_eq!(entry.link, "/static/pdfs/MARZO%202025%20Informe.pdf");
    }

    #[test]
    fn occurrences_aggregate_per_document() {
        let layer = FakeLayer::default().with(
            "a.pdf",
            &[
                "Ref: B-2/ and Ref: A-1/",
                "Ref: a-1./ again ref: A-1;/",
                "nothing",
                "REF: b-2/",
            ],
        );
        let entries = indexer(layer, FakeOcr::default())
            .index_document(&document("a.pdf"))
            .unwrap();

        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.code.as_str(), e.pages.clone(), e.occurrences))
            .collect();
        assert_eq!(
            summary,
            vec![("b-2", vec![1, 4], 2), ("a-1", vec![1, 2], 3)]
        );
    }

    #[test]
    fn scanned_page_uses_ocr_text() {
        let layer = FakeLayer::default().with("Sin fecha.pdf", &["", "x"]);
        let ocr = FakeOcr::default()
            .with("Sin fecha.pdf", 1, FakePage::Text("Ref: SCAN-7/".into()));
        let entries = indexer(layer, ocr)
            .index_document(&document("Sin fecha.pdf"))
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].code, "scan-7");
        assert_eq!(entries[0].pages, vec![1]);
        assert_eq!(entries[0].period.as_u32(), 202404);
    }

    #[test]
    fn custom_grammar_with_upper_case_pattern() {
        use crate::config::{CodeGrammar, Locale, NumericOrder, OcrMode};

        let name = "MARZO 2025 Informe.pdf";
        let layer = FakeLayer::default().with(name, &["Ref: ABC-123/"]);
        let custom = DocumentIndexer::new(
            TextExtractor::new(Box::new(layer), None, "Ref:", OcrMode::Off),
            CodeExtractor::new(
                "Ref:",
                &CodeGrammar::Custom(r"Ref:\s*([A-Z0-9-]+)/".into()),
            )
            .unwrap(),
            DateResolver::new(Locale::Es, NumericOrder::MonthYear).unwrap(),
        );

        let entries = custom.index_document(&document(name)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].code, "abc-123");
    }

    #[test]
    fn document_without_codes_yields_nothing() {
        let layer = FakeLayer::default().with("a.pdf", &["plain text"]);
        let entries = indexer(layer, FakeOcr::default())
            .index_document(&document("a.pdf"))
            .unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn unreadable_document_is_an_error() {
        let err = indexer(FakeLayer::default(), FakeOcr::default())
            .index_document(&document("broken.pdf"))
            .unwrap_err();
        assert!(err.is_extraction_failure());
    }

    #[test]
    fn document_from_discovered_file() {
        let file = DiscoveredFile {
            relative_path: Path::new("2024").join("a b#1.pdf"),
            absolute_path: PathBuf::from("/docs/2024/a b#1.pdf"),
            mtime: 7,
        };
        let doc = Document::from_discovered(&file, "/static/pdfs/");
        assert_eq!(doc.id, "2024/a b#1.pdf");
        assert_eq!(doc.link, "/static/pdfs/2024/a%20b%231.pdf");
        assert_eq!(doc.mtime, 7);
    }

    #[test]
    fn link_percent_encodes_non_ascii() {
        assert_eq!(link_for("/f", "año.pdf"), "/f/a%C3%B1o.pdf");
    }
}
