use std::{
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::{Duration, Instant},
};

use pdf_oxide::PdfDocument;
use tracing::{debug, warn};

use crate::{
    config::{OcrMode, Settings},
    error::{Error, Result},
    strategy::first_some,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Reads the native (selectable) text of every page of a document.
pub trait TextLayer: Send + Sync {
    /// One string per page, first page first.
    fn page_texts(&self, path: &Path) -> Result<Vec<String>>;
}

/// Recognizes the text of a single rasterized page.
pub trait OcrEngine: Send + Sync {
    /// `page` is 1-based.
    fn recognize(&self, path: &Path, page: u32) -> Result<String>;
}

/// Native text layer backed by `pdf_oxide`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextLayer;

impl TextLayer for PdfTextLayer {
    fn page_texts(&self, path: &Path) -> Result<Vec<String>> {
        let pdf_error = |message: String| Error::Pdf {
            path: path.to_path_buf(),
            message,
        };

        // A malformed file can panic deep inside the parser; contain it to
        // this document.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut doc = PdfDocument::open(path)
                .map_err(|e| pdf_error(e.to_string()))?;
            let page_count =
                doc.page_count().map_err(|e| pdf_error(e.to_string()))?;
            (0..page_count)
                .map(|index| {
                    doc.extract_text(index)
                        .map_err(|e| pdf_error(format!("page {}: {e}", index + 1)))
                })
                .collect::<Result<Vec<String>>>()
        }));

        outcome.unwrap_or_else(|_| Err(pdf_error("parser panicked".into())))
    }
}

/// OCR through the `pdftoppm` and `tesseract` executables.
///
/// Each page is rasterized to a grayscale PNG in a scratch directory and
/// recognized there. Both steps share one wall-clock budget; a child that
/// outlives it is killed and the page reports [`Error::OcrTimeout`].
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    language: String,
    dpi: u32,
    timeout: Duration,
    pdftoppm: PathBuf,
    tesseract: PathBuf,
}

impl TesseractOcr {
    pub fn new(language: &str, dpi: u32, timeout: Duration) -> Self {
        Self {
            language: language.to_string(),
            dpi,
            timeout,
            pdftoppm: PathBuf::from("pdftoppm"),
            tesseract: PathBuf::from("tesseract"),
        }
    }

    /// Use specific executables instead of looking them up on `PATH`.
    pub fn with_programs(mut self, pdftoppm: PathBuf, tesseract: PathBuf) -> Self {
        self.pdftoppm = pdftoppm;
        self.tesseract = tesseract;
        self
    }

    fn run(&self, mut command: Command, page: u32, deadline: Instant) -> Result<()> {
        let program = command.get_program().to_string_lossy().into_owned();
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Ocr {
                page,
                message: format!("cannot run {program}: {e}"),
            })?;

        loop {
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    return Ok(());
                }
                return Err(Error::Ocr {
                    page,
                    message: format!("{program} exited with {status}"),
                });
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::OcrTimeout {
                    page,
                    budget: self.timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, path: &Path, page: u32) -> Result<String> {
        let deadline = Instant::now() + self.timeout;
        let scratch = tempfile::tempdir()?;
        let image_base = scratch.path().join("page");
        let text_base = scratch.path().join("text");
        let page_arg = page.to_string();

        let mut rasterize = Command::new(&self.pdftoppm);
        rasterize
            .args(["-f", &page_arg, "-l", &page_arg])
            .args(["-r", &self.dpi.to_string()])
            .args(["-gray", "-png", "-singlefile"])
            .arg(path)
            .arg(&image_base);
        self.run(rasterize, page, deadline)?;

        let mut recognize = Command::new(&self.tesseract);
        recognize
            .arg(image_base.with_extension("png"))
            .arg(&text_base)
            .args(["-l", &self.language]);
        self.run(recognize, page, deadline)?;

        Ok(std::fs::read_to_string(text_base.with_extension("txt"))?)
    }
}

/// Where a page's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    Native,
    Ocr,
}

/// The lower-cased text chosen for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    /// 1-based page number.
    pub number: u32,
    pub text: String,
    pub source: TextSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub pages: Vec<ExtractedPage>,
}

impl ExtractedDocument {
    pub fn ocr_page_count(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| p.source == TextSource::Ocr)
            .count()
    }
}

/// Picks the best available text for each page of a document.
///
/// The native text layer is always read first. Whether OCR is consulted
/// depends on [`OcrMode`] and on whether the native text contains the
/// trigger marker.
pub struct TextExtractor {
    layer: Box<dyn TextLayer>,
    ocr: Option<Box<dyn OcrEngine>>,
    marker: String,
    mode: OcrMode,
}

impl TextExtractor {
    pub fn new(
        layer: Box<dyn TextLayer>,
        ocr: Option<Box<dyn OcrEngine>>,
        trigger: &str,
        mode: OcrMode,
    ) -> Self {
        Self {
            layer,
            ocr,
            marker: trigger.trim().to_lowercase(),
            mode,
        }
    }

    /// PDF text layer plus Tesseract OCR, configured from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let ocr: Option<Box<dyn OcrEngine>> = match settings.ocr_mode {
            OcrMode::Off => None,
            OcrMode::PerPage | OcrMode::Document => Some(Box::new(
                TesseractOcr::new(
                    settings.ocr_language(),
                    settings.dpi,
                    settings.ocr_timeout,
                ),
            )),
        };
        Self::new(
            Box::new(PdfTextLayer),
            ocr,
            &settings.trigger,
            settings.ocr_mode,
        )
    }

    /// Case-insensitive check for the trigger marker.
    pub fn has_marker(&self, text: &str) -> bool {
        text.to_lowercase().contains(&self.marker)
    }

    /// Extract every page of the document at `path`.
    ///
    /// Fails only when the native text layer cannot be read; OCR failures
    /// and timeouts degrade the affected page to its native text.
    pub fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let native: Vec<String> = self
            .layer
            .page_texts(path)?
            .into_iter()
            .map(|text| text.to_lowercase())
            .collect();

        let ocr_everything = self.mode == OcrMode::Document
            && !native.iter().any(|text| self.has_marker(text));
        if ocr_everything {
            debug!(
                path = %path.display(),
                "no marker in text layer, running OCR on all pages"
            );
        }

        let pages = native
            .into_iter()
            .enumerate()
            .map(|(index, native)| {
                let number = index as u32 + 1;
                let (text, source) = match self.mode {
                    OcrMode::Off => (native, TextSource::Native),
                    OcrMode::Document if !ocr_everything => {
                        (native, TextSource::Native)
                    }
                    OcrMode::Document => self
                        .ocr_page(path, number)
                        .map(|text| (text, TextSource::Ocr))
                        .unwrap_or((native, TextSource::Native)),
                    OcrMode::PerPage => {
                        let chosen = first_some(&[
                            &|| {
                                self.has_marker(&native)
                                    .then(|| (native.clone(), TextSource::Native))
                            },
                            &|| {
                                self.ocr_page(path, number)
                                    .filter(|text| self.has_marker(text))
                                    .map(|text| (text, TextSource::Ocr))
                            },
                        ]);
                        chosen.unwrap_or((native, TextSource::Native))
                    }
                };
                ExtractedPage {
                    number,
                    text,
                    source,
                }
            })
            .collect();

        Ok(ExtractedDocument { pages })
    }

    fn ocr_page(&self, path: &Path, page: u32) -> Option<String> {
        let engine = self.ocr.as_ref()?;
        match engine.recognize(path, page) {
            Ok(text) => Some(text.to_lowercase()),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    page,
                    error = %e,
                    "OCR failed, keeping native text"
                );
                None
            }
        }
    }
}
