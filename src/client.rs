//! Consumer side of `POST /predict`: turns a local image into a JPEG upload,
//! sends it and renders the answer for a terminal.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use image::{codecs::jpeg::JpegEncoder, ColorType, DynamicImage};
use reqwest::multipart::{Form, Part};
use thiserror::Error;

use crate::{server::UPLOAD_FIELD, service::PredictionResponse};

pub const DEFAULT_URL: &str = "http://localhost:8000/predict";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

const JPEG_QUALITY: u8 = 75;
const BAR_CELLS: usize = 20;

/// Local problems with the chosen file, raised before anything is sent.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("unsupported file type for {0}; expected JPG, JPEG or PNG")]
    Unsupported(PathBuf),

    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Error opening image: {0}")]
    Image(#[from] image::ImageError),
}

/// The four ways a prediction request can fail, as shown to the user.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Could not connect to the API. Is the backend server running?")]
    Connection(#[source] reqwest::Error),

    #[error("The request to the API timed out.")]
    Timeout,

    #[error("API Error (Status {status}): {message}")]
    Http { status: u16, message: String },

    #[error("An unexpected error occurred: {0}")]
    Other(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_connect() {
            ClientError::Connection(err)
        } else {
            ClientError::Other(err.to_string())
        }
    }
}

/// JPEG bytes ready for the multipart body.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn from_image(filename: impl Into<String>, img: &DynamicImage) -> Result<Self, UploadError> {
        Ok(Upload {
            filename: filename.into(),
            bytes: encode_jpeg(img)?,
        })
    }
}

pub fn check_extension(path: &Path) -> Result<(), UploadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(UploadError::Unsupported(path.to_path_buf())),
    }
}

/// Reads `path`, drops any alpha channel and re-encodes it as JPEG.
pub fn prepare_upload(path: &Path) -> Result<Upload, UploadError> {
    check_extension(path)?;

    let raw = fs::read(path).map_err(|source| UploadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let img = image::load_from_memory(&raw)?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.jpg".into());

    Upload::from_image(filename, &img)
}

/// Flattens `img` to 8-bit RGB (alpha discarded, not composited) and encodes
/// it as JPEG.
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut bytes = Vec::new();

    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ColorType::Rgb8,
    )?;

    Ok(bytes)
}

/// `detail` from a JSON error body, or the raw body when there is none.
pub fn error_detail(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        _ => body.to_string(),
    }
}

pub struct PredictClient {
    http: reqwest::Client,
    url: String,
}

impl PredictClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Other(e.to_string()))?;

        Ok(Self::with_http(url, http))
    }

    /// Uses a caller-built `reqwest::Client`; its timeout is the request timeout.
    pub fn with_http(url: impl Into<String>, http: reqwest::Client) -> Self {
        PredictClient {
            http,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One attempt, no retries.
    pub async fn predict(&self, upload: Upload) -> Result<PredictionResponse, ClientError> {
        let part = Part::bytes(upload.bytes)
            .file_name(upload.filename)
            .mime_str("image/jpeg")
            .map_err(|e| ClientError::Other(e.to_string()))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self.http.post(&self.url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(ClientError::Http {
                status: status.as_u16(),
                message: error_detail(&body),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::Other(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    Green,
    Amber,
    Red,
}

impl ConfidenceBand {
    pub fn of(confidence: f64) -> Self {
        if confidence >= 70.0 {
            ConfidenceBand::Green
        } else if confidence >= 40.0 {
            ConfidenceBand::Amber
        } else {
            ConfidenceBand::Red
        }
    }

    fn ansi(self) -> &'static str {
        match self {
            ConfidenceBand::Green => "\x1b[32m",
            ConfidenceBand::Amber => "\x1b[33m",
            ConfidenceBand::Red => "\x1b[31m",
        }
    }
}

/// `Tomato___Late_blight` -> `Tomato Late blight`
pub fn pretty_label(label: &str) -> String {
    label.replace("___", " ").replace('_', " ")
}

pub fn confidence_bar(confidence: f64, color: bool) -> String {
    let filled = ((confidence.clamp(0.0, 100.0) / 100.0) * BAR_CELLS as f64).round() as usize;
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(BAR_CELLS - filled));

    if color {
        format!("{}{bar}\x1b[0m {confidence:.2}%", ConfidenceBand::of(confidence).ansi())
    } else {
        format!("{bar} {confidence:.2}%")
    }
}

pub fn render(result: &PredictionResponse, color: bool) -> String {
    let label = pretty_label(&result.predicted_class);
    let mut lines = vec![
        format!("Predicted Condition: {label}"),
        format!("Confidence Score:    {}", confidence_bar(result.confidence, color)),
    ];

    if result.predicted_class.to_lowercase().contains("healthy") {
        lines.push("Great news! Your crop appears to be healthy.".into());
    } else {
        lines.push("Your crop might have an issue.".into());
        lines.push("Suggested Remedy / Management:".into());
        if result.remedy.is_empty() {
            lines.push(
                "  No specific remedy information provided by the API for this condition.".into(),
            );
        } else {
            lines.push(format!("  {}", result.remedy));
        }
        lines.push(format!("Tip: search online for '{label} symptoms and treatment'."));
    }

    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use image::{GenericImageView, ImageBuffer, Rgba};

    use super::*;

    #[test]
    fn bands_follow_thresholds() {
        assert_eq!(ConfidenceBand::of(100.0), ConfidenceBand::Green);
        assert_eq!(ConfidenceBand::of(70.0), ConfidenceBand::Green);
        assert_eq!(ConfidenceBand::of(69.99), ConfidenceBand::Amber);
        assert_eq!(ConfidenceBand::of(40.0), ConfidenceBand::Amber);
        assert_eq!(ConfidenceBand::of(39.99), ConfidenceBand::Red);
        assert_eq!(ConfidenceBand::of(0.0), ConfidenceBand::Red);
    }

    #[test]
    fn detail_is_extracted_from_json() {
        assert_eq!(error_detail(r#"{"detail":"internal error"}"#), "internal error");
        assert_eq!(error_detail(r#"{"detail":[1,2]}"#), "[1,2]");
    }

    #[test]
    fn raw_text_is_the_fallback() {
        assert_eq!(error_detail("Bad Gateway"), "Bad Gateway");
        assert_eq!(error_detail(r#"{"error":"x"}"#), r#"{"error":"x"}"#);
    }

    #[test]
    fn http_error_message_names_status_and_detail() {
        let err = ClientError::Http {
            status: 500,
            message: error_detail(r#"{"detail":"internal error"}"#),
        };
        assert_eq!(err.to_string(), "API Error (Status 500): internal error");
    }

    #[test]
    fn labels_are_prettified() {
        assert_eq!(pretty_label("Tomato___Late_blight"), "Tomato Late blight");
        assert_eq!(pretty_label("Corn_(maize)___healthy"), "Corn (maize) healthy");
    }

    #[test]
    fn extensions_are_checked_case_insensitively() {
        assert!(check_extension(Path::new("leaf.JPG")).is_ok());
        assert!(check_extension(Path::new("leaf.png")).is_ok());
        assert!(matches!(
            check_extension(Path::new("leaf.gif")),
            Err(UploadError::Unsupported(_))
        ));
        assert!(check_extension(Path::new("leaf")).is_err());
    }

    #[test]
    fn rgba_is_flattened_to_rgb_jpeg() {
        let rgba = ImageBuffer::from_pixel(6, 4, Rgba([200u8, 100, 50, 128]));
        let bytes = encode_jpeg(&DynamicImage::ImageRgba8(rgba)).unwrap();

        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgb8);
        assert_eq!(decoded.dimensions(), (6, 4));
    }

    #[test]
    fn prepare_upload_reads_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.png");
        ImageBuffer::from_pixel(3, 3, Rgba([0u8, 255, 0, 255]))
            .save(&path)
            .unwrap();

        let upload = prepare_upload(&path).unwrap();
        assert_eq!(upload.filename, "leaf.png");
        assert_eq!(&upload.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn prepare_upload_rejects_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.jpg");
        fs::write(&path, b"not a jpeg").unwrap();

        assert!(matches!(prepare_upload(&path), Err(UploadError::Image(_))));
    }

    #[test]
    fn healthy_result_skips_remedy() {
        let result = PredictionResponse {
            predicted_class: "Tomato___healthy".into(),
            confidence: 97.5,
            remedy: "No specific remedy available".into(),
        };
        let text = render(&result, false);

        assert!(text.contains("Tomato healthy"));
        assert!(text.contains("97.50%"));
        assert!(text.contains("healthy."));
        assert!(!text.contains("Remedy"));
    }

    #[test]
    fn diseased_result_shows_remedy() {
        let result = PredictionResponse {
            predicted_class: "Tomato___Late_blight".into(),
            confidence: 91.0,
            remedy: "Apply copper-based fungicide.".into(),
        };
        let text = render(&result, false);

        assert!(text.contains("Apply copper-based fungicide."));
        assert!(text.contains("Tomato Late blight symptoms and treatment"));
    }

    #[test]
    fn empty_remedy_shows_caption() {
        let result = PredictionResponse {
            predicted_class: "Tomato___Leaf_Mold".into(),
            confidence: 35.0,
            remedy: String::new(),
        };
        let text = render(&result, false);

        assert!(text.contains("No specific remedy information provided"));
        assert!(text.ends_with("symptoms and treatment'.\n"));
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn bar_is_proportional() {
        let bar = confidence_bar(50.0, false);
        assert_eq!(bar.matches('█').count(), 10);
        assert_eq!(bar.matches('░').count(), 10);
        assert!(bar.ends_with("50.00%"));
    }
}
