// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Text recognition on images
//!
//! The pipeline only needs recognized fragments; the engine is pluggable.
//! `TesseractOcr` drives the `tesseract` CLI and reads its TSV report.

use crate::error::{ExplainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Default recognition languages (English + Tagalog)
pub const DEFAULT_OCR_LANGUAGES: &str = "eng+tgl";

/// Pixel rectangle of a recognized fragment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Right edge, saturating for malformed reports
    pub fn right(&self) -> u32 {
        self.left.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.top.saturating_add(self.height)
    }

    /// Smallest box containing both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        BoundingBox {
            left,
            top,
            width: right - left,
            height: bottom - top,
        }
    }
}

/// One piece of recognized text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrFragment {
    pub text: String,
    /// Recognition confidence in [0, 1]
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// Image bytes -> recognized fragments, in reading order
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &[u8]) -> Result<Vec<OcrFragment>>;

    fn name(&self) -> &str;
}

/// Runs `tesseract stdin stdout -l <languages> tsv`
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: PathBuf,
    languages: String,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new(DEFAULT_OCR_LANGUAGES)
    }
}

impl TesseractOcr {
    pub fn new(languages: &str) -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            languages: languages.to_string(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Parse a TSV report into one fragment per text line
    pub fn parse_tsv(report: &str) -> Result<Vec<OcrFragment>> {
        let mut rows = report.lines();
        let header = rows
            .next()
            .ok_or_else(|| ExplainError::OcrFailed("empty tsv report".to_string()))?;
        if !header.starts_with("level") {
            return Err(ExplainError::OcrFailed(format!("unexpected tsv header: {}", header)));
        }

        // (page, block, paragraph, line) -> words with confidences and boxes
        let mut lines: BTreeMap<(u32, u32, u32, u32), Vec<(String, f64, BoundingBox)>> = BTreeMap::new();

        for (idx, row) in rows.enumerate() {
            let fields: Vec<&str> = row.split('\t').collect();
            if fields.len() < 12 {
                tracing::warn!("Skipping malformed tsv row {}: {} fields", idx + 1, fields.len());
                continue;
            }
            if fields[0] != "5" {
                continue;
            }
            let text = fields[11].trim();
            if text.is_empty() {
                continue;
            }

            let num = |i: usize| fields[i].trim().parse::<u32>().unwrap_or(0);
            let key = (num(1), num(2), num(3), num(4));
            let bbox = BoundingBox {
                left: num(6),
                top: num(7),
                width: num(8),
                height: num(9),
            };
            let confidence = fields[10].trim().parse::<f64>().unwrap_or(0.0).clamp(0.0, 100.0) / 100.0;
            lines.entry(key).or_default().push((text.to_string(), confidence, bbox));
        }

        Ok(lines
            .into_values()
            .map(|words| {
                let text = words.iter().map(|(t, _, _)| t.as_str()).collect::<Vec<_>>().join(" ");
                let confidence = words.iter().map(|(_, c, _)| c).sum::<f64>() / words.len() as f64;
                let bbox = words
                    .iter()
                    .skip(1)
                    .fold(words[0].2, |acc, (_, _, b)| acc.union(b));
                OcrFragment { text, confidence, bbox }
            })
            .collect())
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &[u8]) -> Result<Vec<OcrFragment>> {
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", self.languages.as_str(), "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExplainError::OcrFailed(format!("cannot run {}: {}", self.binary.display(), e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExplainError::OcrFailed("tesseract stdin unavailable".to_string()))?;
        let bytes = image.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&bytes));

        let output = child
            .wait_with_output()
            .map_err(|e| ExplainError::OcrFailed(e.to_string()))?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to stream image to tesseract: {}", e),
            Err(_) => return Err(ExplainError::OcrFailed("image writer thread panicked".to_string())),
        }

        if !output.status.success() {
            return Err(ExplainError::OcrFailed(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let fragments = Self::parse_tsv(&String::from_utf8_lossy(&output.stdout))?;
        tracing::debug!("Tesseract recognized {} line(s)", fragments.len());
        Ok(fragments)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
4\t1\t1\t1\t1\t0\t10\t10\t200\t20\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t90\t20\t96.5\tBreaking:
5\t1\t1\t1\t1\t2\t110\t12\t100\t18\t91.5\taliens
5\t1\t1\t1\t2\t1\t10\t40\t50\t20\t80\tland
5\t1\t1\t1\t2\t2\t70\t40\t30\t20\t70\t
5\t1\t1\t1\t2\t3\t110\t40\t60\t22\t60\tnow";

    #[test]
    fn test_parse_groups_words_into_lines() {
        let fragments = TesseractOcr::parse_tsv(REPORT).unwrap();
        assert_eq!(fragments.len(), 2);

        assert_eq!(fragments[0].text, "Breaking: aliens");
        assert!((fragments[0].confidence - 0.94).abs() < 1e-9);
        assert_eq!(
            fragments[0].bbox,
            BoundingBox {
                left: 10,
                top: 10,
                width: 200,
                height: 20
            }
        );

        assert_eq!(fragments[1].text, "land now");
        assert!((fragments[1].confidence - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TesseractOcr::parse_tsv("").is_err());
        assert!(TesseractOcr::parse_tsv("not a report").is_err());
    }

    #[test]
    fn test_header_only_yields_nothing() {
        let header = REPORT.lines().next().unwrap();
        assert!(TesseractOcr::parse_tsv(header).unwrap().is_empty());
    }

    #[test]
    fn test_bbox_union_saturates() {
        let huge = BoundingBox { left: u32::MAX - 5, top: 10, width: 100, height: u32::MAX };
        let small = BoundingBox { left: 0, top: 0, width: 10, height: 10 };
        assert_eq!(huge.union(&small), BoundingBox { left: 0, top: 0, width: u32::MAX, height: u32::MAX });
    }

    #[test]
    fn test_parse_tolerates_oversized_boxes() {
        let report = format!(
            "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
             5\t1\t1\t1\t1\t1\t{max}\t0\t{max}\t20\t90\tBreaking\n\
             5\t1\t1\t1\t1\t2\t0\t0\t10\t20\t90\tnews",
            max = u32::MAX
        );
        let fragments = TesseractOcr::parse_tsv(&report).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].text, "Breaking news");
        assert_eq!(fragments[0].bbox.width, u32::MAX);
    }

    #[test]
    fn test_missing_binary_is_ocr_failure() {
        let engine = TesseractOcr::default().with_binary("/nonexistent/tesseract-binary");
        let err = engine.recognize(b"fake image").unwrap_err();
        assert!(matches!(err, ExplainError::OcrFailed(_)));
    }

    #[test]
    fn test_bbox_union() {
        let a = BoundingBox { left: 5, top: 5, width: 10, height: 10 };
        let b = BoundingBox { left: 12, top: 0, width: 10, height: 8 };
        assert_eq!(a.union(&b), BoundingBox { left: 5, top: 0, width: 17, height: 15 });
    }
}
