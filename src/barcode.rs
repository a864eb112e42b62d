//! Code128 barcode rendering to files on disk.
//!
//! Rendering tries a primary encoder (PNG) and falls back to a secondary
//! one (SVG). The caller learns which path produced the artifact through
//! [`RenderOutcome`]; if neither works the error carries both causes.
//! Artifacts are named `<product>_<unix millis>_<sku>.<ext>` and earlier
//! artifacts of the same product are removed before a new one is written.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use barcoders::generators::image::Image;
use barcoders::generators::svg::SVG;
use barcoders::sym::code128::Code128;
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::normalize_url_prefix;
use crate::error::BarcodeError;

/// Code128 character set B prefix understood by `barcoders`.
const CODE128_SET_B: char = 'Ɓ';

pub const DEFAULT_HEIGHT: u32 = 80;

fn code128_modules(sku: &str) -> Result<Vec<u8>, BarcodeError> {
    let symbol = Code128::new(format!("{CODE128_SET_B}{sku}")).map_err(|e| BarcodeError::Encode {
        sku: sku.to_string(),
        reason: format!("{e:?}"),
    })?;
    Ok(symbol.encode())
}

/// One way of turning a SKU into artifact bytes.
pub trait BarcodeEncoder: Send + Sync {
    fn format(&self) -> &'static str;
    fn extension(&self) -> &'static str;
    fn encode(&self, sku: &str) -> Result<Vec<u8>, BarcodeError>;
}

/// Code128 rendered as a PNG raster.
#[derive(Debug, Clone)]
pub struct PngCode128 {
    height: u32,
}

impl PngCode128 {
    pub fn new(height: u32) -> Self {
        Self { height }
    }
}

impl BarcodeEncoder for PngCode128 {
    fn format(&self) -> &'static str {
        "PNG"
    }

    fn extension(&self) -> &'static str {
        "png"
    }

    fn encode(&self, sku: &str) -> Result<Vec<u8>, BarcodeError> {
        let modules = code128_modules(sku)?;
        Image::png(self.height)
            .generate(&modules[..])
            .map_err(|e| BarcodeError::Generate {
                format: self.format(),
                reason: format!("{e:?}"),
            })
    }
}

/// Code128 rendered as an SVG document.
#[derive(Debug, Clone)]
pub struct SvgCode128 {
    height: u32,
}

impl SvgCode128 {
    pub fn new(height: u32) -> Self {
        Self { height }
    }
}

impl BarcodeEncoder for SvgCode128 {
    fn format(&self) -> &'static str {
        "SVG"
    }

    fn extension(&self) -> &'static str {
        "svg"
    }

    fn encode(&self, sku: &str) -> Result<Vec<u8>, BarcodeError> {
        let modules = code128_modules(sku)?;
        SVG::new(self.height)
            .generate(&modules[..])
            .map(String::into_bytes)
            .map_err(|e| BarcodeError::Generate {
                format: self.format(),
                reason: format!("{e:?}"),
            })
    }
}

/// Which strategy produced the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RenderOutcome {
    Primary,
    Fallback { primary_error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBarcode {
    pub path: PathBuf,
    pub url: String,
    pub format: &'static str,
    pub outcome: RenderOutcome,
}

/// File-name stem for a product: runs of non-word characters become `_`.
pub fn safe_file_stem(product_name: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let pattern = NON_WORD.get_or_init(|| Regex::new(r"\W+").expect("static pattern is valid"));
    pattern.replace_all(product_name, "_").into_owned()
}

/// File-name token for a SKU. Never contains `_`, so it cannot be confused
/// with part of a product stem.
pub fn safe_sku_token(sku: &str) -> String {
    static NON_SKU: OnceLock<Regex> = OnceLock::new();
    let pattern =
        NON_SKU.get_or_init(|| Regex::new(r"[^A-Za-z0-9-]+").expect("static pattern is valid"));
    pattern.replace_all(sku, "-").into_owned()
}

/// Encoded bytes waiting to be written.
struct Encoded<'a> {
    sku: &'a str,
    stem: String,
    encoder: &'a dyn BarcodeEncoder,
    bytes: Vec<u8>,
    outcome: RenderOutcome,
}

/// Renders barcodes into a directory served under `url_prefix`.
pub struct BarcodeRenderer {
    dir: PathBuf,
    url_prefix: String,
    primary: Box<dyn BarcodeEncoder>,
    fallback: Option<Box<dyn BarcodeEncoder>>,
}

impl BarcodeRenderer {
    /// PNG primary with SVG fallback.
    pub fn new(
        dir: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
        height: u32,
    ) -> Result<Self, BarcodeError> {
        Self::with_encoders(
            dir,
            url_prefix,
            Box::new(PngCode128::new(height)),
            Some(Box::new(SvgCode128::new(height))),
        )
    }

    pub fn with_encoders(
        dir: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
        primary: Box<dyn BarcodeEncoder>,
        fallback: Option<Box<dyn BarcodeEncoder>>,
    ) -> Result<Self, BarcodeError> {
        let url_prefix =
            normalize_url_prefix(&url_prefix.into()).map_err(BarcodeError::InvalidUrlPrefix)?;
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| BarcodeError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            url_prefix,
            primary,
            fallback,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Render `sku` for `product_name`, replacing that product's earlier
    /// artifacts.
    pub fn render(&self, sku: &str, product_name: &str) -> Result<RenderedBarcode, BarcodeError> {
        let item = self.encode(sku, product_name)?;
        self.remove_previous(&item.stem)?;
        self.write(item)
    }

    /// Render every `(sku, product_name)` pair, in order.
    ///
    /// Everything is encoded before the directory is touched. Earlier
    /// artifacts of each product are removed once, so a product listed
    /// twice keeps both of this batch's artifacts. A failed write removes
    /// the files this call already wrote.
    pub fn render_batch(
        &self,
        items: &[(&str, &str)],
    ) -> Result<Vec<RenderedBarcode>, BarcodeError> {
        let encoded = items
            .iter()
            .map(|&(sku, product_name)| self.encode(sku, product_name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut stems: Vec<&str> = Vec::new();
        for item in &encoded {
            if !stems.contains(&item.stem.as_str()) {
                stems.push(&item.stem);
                self.remove_previous(&item.stem)?;
            }
        }

        let mut rendered: Vec<RenderedBarcode> = Vec::with_capacity(encoded.len());
        for item in encoded {
            match self.write(item) {
                Ok(barcode) => rendered.push(barcode),
                Err(e) => {
                    for barcode in &rendered {
                        if let Err(cleanup) = fs::remove_file(&barcode.path) {
                            warn!(
                                path = %barcode.path.display(),
                                error = %cleanup,
                                "Failed to remove partial barcode batch"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(rendered)
    }

    fn write(&self, item: Encoded<'_>) -> Result<RenderedBarcode, BarcodeError> {
        let filename = format!(
            "{}_{}_{}.{}",
            item.stem,
            Utc::now().timestamp_millis(),
            safe_sku_token(item.sku),
            item.encoder.extension()
        );
        let path = self.dir.join(&filename);
        fs::write(&path, &item.bytes).map_err(|source| BarcodeError::Io {
            path: path.clone(),
            source,
        })?;

        info!(
            sku = %item.sku,
            path = %path.display(),
            format = item.encoder.format(),
            "Rendered barcode"
        );
        Ok(RenderedBarcode {
            url: format!("{}/{}", self.url_prefix, filename),
            path,
            format: item.encoder.format(),
            outcome: item.outcome,
        })
    }

    fn encode<'a>(
        &'a self,
        sku: &'a str,
        product_name: &str,
    ) -> Result<Encoded<'a>, BarcodeError> {
        let stem = safe_file_stem(product_name);
        let primary_error = match self.primary.encode(sku) {
            Ok(bytes) => {
                return Ok(Encoded {
                    sku,
                    stem,
                    encoder: self.primary.as_ref(),
                    bytes,
                    outcome: RenderOutcome::Primary,
                })
            }
            Err(e) => e.to_string(),
        };

        let Some(fallback) = self.fallback.as_deref() else {
            return Err(BarcodeError::AllStrategiesFailed {
                primary: primary_error,
                fallback: "no fallback configured".to_string(),
            });
        };

        warn!(
            sku = %sku,
            error = %primary_error,
            fallback = fallback.format(),
            "Primary barcode rendering failed, trying fallback"
        );
        match fallback.encode(sku) {
            Ok(bytes) => Ok(Encoded {
                sku,
                stem,
                encoder: fallback,
                bytes,
                outcome: RenderOutcome::Fallback { primary_error },
            }),
            Err(e) => Err(BarcodeError::AllStrategiesFailed {
                primary: primary_error,
                fallback: e.to_string(),
            }),
        }
    }

    /// Delete this product's earlier artifacts from the directory.
    fn remove_previous(&self, stem: &str) -> Result<usize, BarcodeError> {
        let io_err = |source| BarcodeError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut removed = 0;
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if is_artifact_of(name, stem) {
                let path = entry.path();
                fs::remove_file(&path).map_err(|source| BarcodeError::Io { path, source })?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(stem = %stem, removed, "Removed previous barcode artifacts");
        }
        Ok(removed)
    }
}

/// Whether `file_name` has the shape `<stem>_<digits>_<sku token>.<ext>`.
fn is_artifact_of(file_name: &str, stem: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };
    let Some((base, ext)) = rest.rsplit_once('.') else {
        return false;
    };
    let Some((millis, token)) = base.split_once('_') else {
        return false;
    };
    !millis.is_empty()
        && millis.bytes().all(|b| b.is_ascii_digit())
        && !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        && !ext.is_empty()
        && ext.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingEncoder;

    impl BarcodeEncoder for FailingEncoder {
        fn format(&self) -> &'static str {
            "BROKEN"
        }
        fn extension(&self) -> &'static str {
            "bin"
        }
        fn encode(&self, _sku: &str) -> Result<Vec<u8>, BarcodeError> {
            Err(BarcodeError::Generate {
                format: "BROKEN",
                reason: "writer unavailable".into(),
            })
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn safe_stem_replaces_non_word_runs() {
        assert_eq!(safe_file_stem("Super Gadget"), "Super_Gadget");
        assert_eq!(safe_file_stem("Mug (12 oz.)"), "Mug_12_oz_");
    }

    #[test]
    fn png_encoder_emits_png_bytes() {
        let bytes = PngCode128::new(DEFAULT_HEIGHT).encode("SUP-GAD-RED-STE").unwrap();
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn svg_encoder_emits_svg_document() {
        let bytes = SvgCode128::new(DEFAULT_HEIGHT).encode("SUP-GAD").unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("<svg"));
    }

    #[test]
    fn primary_render_writes_png_and_url() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = BarcodeRenderer::new(dir.path(), "/static/barcodes/", 60).unwrap();

        let rendered = renderer.render("SUP-GAD-RED-STE", "Super Gadget").unwrap();
        assert_eq!(rendered.outcome, RenderOutcome::Primary);
        assert_eq!(rendered.format, "PNG");
        assert!(rendered.path.exists());
        assert!(rendered.url.starts_with("/static/barcodes/Super_Gadget_"));
        assert!(rendered.url.ends_with("_SUP-GAD-RED-STE.png"));
    }

    #[test]
    fn sku_token_keeps_letters_digits_and_dashes() {
        assert_eq!(safe_sku_token("MUG-RED-ABCD"), "MUG-RED-ABCD");
        assert_eq!(safe_sku_token("O'N-3D_X"), "O-N-3D-X");
    }

    #[test]
    fn artifact_match_requires_exact_stem() {
        assert!(is_artifact_of("Lamp_1792371933525_LAM.png", "Lamp"));
        assert!(!is_artifact_of("Lamp_2_1792371933525_LAM-2.png", "Lamp"));
        assert!(!is_artifact_of("Lamp_Shade_1792371933525_LAM-SHA.png", "Lamp"));
        assert!(!is_artifact_of("Lamp_notes.txt", "Lamp"));
        assert!(!is_artifact_of("Lamp_1792371933525.png", "Lamp"));
    }

    #[test]
    fn rejects_root_url_prefix() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            BarcodeRenderer::new(dir.path(), "/", 40),
            Err(BarcodeError::InvalidUrlPrefix(_))
        ));
        assert!(matches!(
            BarcodeRenderer::new(dir.path(), "barcodes", 40),
            Err(BarcodeError::InvalidUrlPrefix(_))
        ));
    }

    #[test]
    fn falls_back_when_primary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = BarcodeRenderer::with_encoders(
            dir.path(),
            "/b",
            Box::new(FailingEncoder),
            Some(Box::new(SvgCode128::new(40))),
        )
        .unwrap();

        let rendered = renderer.render("LAM-MB", "Lamp").unwrap();
        assert!(matches!(rendered.outcome, RenderOutcome::Fallback { .. }));
        assert!(rendered.url.ends_with(".svg"));
    }

    #[test]
    fn total_failure_reports_both_causes_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = BarcodeRenderer::with_encoders(
            dir.path(),
            "/b",
            Box::new(FailingEncoder),
            Some(Box::new(FailingEncoder)),
        )
        .unwrap();

        let err = renderer.render("LAM-MB", "Lamp").unwrap_err();
        match err {
            BarcodeError::AllStrategiesFailed { primary, fallback } => {
                assert!(primary.contains("writer unavailable"));
                assert!(fallback.contains("writer unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(files_in(dir.path()).is_empty());
    }

    #[test]
    fn unencodable_sku_fails_both_strategies() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = BarcodeRenderer::new(dir.path(), "/b", 40).unwrap();
        let err = renderer.render("ÜBE-ÉCL", "Über Éclair").unwrap_err();
        assert!(matches!(err, BarcodeError::AllStrategiesFailed { .. }));
    }

    #[test]
    fn rerender_replaces_only_that_products_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = BarcodeRenderer::new(dir.path(), "/b", 40).unwrap();

        renderer.render("LAM", "Lamp").unwrap();
        renderer.render("LAM-SHA", "Lamp Shade").unwrap();
        fs::write(dir.path().join("Lamp_notes.txt"), b"keep").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let latest = renderer.render("LAM-XYZW", "Lamp").unwrap();

        let files = files_in(dir.path());
        assert_eq!(files.len(), 3, "{files:?}");
        assert!(files.iter().any(|f| f.starts_with("Lamp_Shade_")));
        assert!(files.contains(&"Lamp_notes.txt".to_string()));
        assert!(latest.path.exists());
    }

    #[test]
    fn batch_keeps_every_artifact_of_a_repeated_product() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = BarcodeRenderer::new(dir.path(), "/b", 40).unwrap();
        let stale = renderer.render("MUG-RED", "Mug").unwrap();

        let rendered = renderer
            .render_batch(&[("MUG-RED-ABCD", "Mug"), ("MUG-RED-EFGH", "Mug"), ("LAM", "Lamp")])
            .unwrap();

        assert_eq!(rendered.len(), 3);
        assert!(!stale.path.exists());
        for barcode in &rendered {
            assert!(barcode.path.exists(), "{} missing", barcode.url);
        }
        assert_ne!(rendered[0].path, rendered[1].path);
        assert_eq!(files_in(dir.path()).len(), 3);
    }

    #[test]
    fn batch_encodes_everything_before_touching_files() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = BarcodeRenderer::new(dir.path(), "/b", 40).unwrap();
        let earlier = renderer.render("MUG", "Mug").unwrap();

        let err = renderer
            .render_batch(&[("MUG-ABCD", "Mug"), ("ÜBE", "Über")])
            .unwrap_err();
        assert!(matches!(err, BarcodeError::AllStrategiesFailed { .. }));
        assert!(earlier.path.exists());
        assert_eq!(files_in(dir.path()).len(), 1);
    }
}
