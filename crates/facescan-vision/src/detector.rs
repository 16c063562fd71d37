//! SCRFD face detector over decoded RGB images.
//!
//! The image is letterboxed into a 640×640 canvas, the network scores anchors
//! on three stride levels, and overlapping boxes are merged with NMS. Boxes
//! and landmarks come back in the source image's pixel coordinates.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
/// Minimum anchor score kept before NMS.
pub const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_OUTPUTS: usize = SCRFD_STRIDES.len() * 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("detector model has {0} outputs, expected 9 (score, bbox and kps per stride)")]
    UnexpectedOutputs(usize),
    #[error("detector output for stride {stride}: {reason}")]
    Output { stride: usize, reason: String },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// One detected face in source-image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Eyes, nose tip and mouth corners, in ArcFace template order.
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceBox {
    fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with `other`.
    pub fn iou(&self, other: &FaceBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let overlap = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - overlap;
        if union > 0.0 {
            overlap / union
        } else {
            0.0
        }
    }
}

/// Placement of the scaled source image inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    width: u32,
    height: u32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(src_width: u32, src_height: u32, size: u32) -> Self {
        let scale = (size as f32 / src_width as f32).min(size as f32 / src_height as f32);
        let width = ((src_width as f32 * scale).round() as u32).clamp(1, size);
        let height = ((src_height as f32 * scale).round() as u32).clamp(1, size);
        Self {
            scale,
            width,
            height,
            pad_x: (size - width) / 2,
            pad_y: (size - height) / 2,
        }
    }

    /// Map a point from model-input space back to the source image.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Output tensor positions for one stride level.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StrideSlots {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// Raw network outputs for one stride level.
struct StrideOutputs<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    slots: [StrideSlots; 3],
    confidence_threshold: f32,
}

impl FaceDetector {
    /// Load the SCRFD model. Anchors scoring at or below
    /// `confidence_threshold` are dropped.
    pub fn load(model_path: &Path, confidence_threshold: f32) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        if output_names.len() < SCRFD_OUTPUTS {
            return Err(DetectorError::UnexpectedOutputs(output_names.len()));
        }

        let slots = stride_slots(&output_names);
        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            confidence_threshold,
            "loaded SCRFD model"
        );

        Ok(Self {
            session,
            slots,
            confidence_threshold,
        })
    }

    /// Detect faces, strongest first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        let (input, letterbox) = letterbox_tensor(image, SCRFD_INPUT_SIZE);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slots, &stride) in self.slots.iter().zip(SCRFD_STRIDES.iter()) {
            let tensor = |index: usize| {
                outputs[index]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::Output {
                        stride,
                        reason: e.to_string(),
                    })
            };
            let level = StrideOutputs {
                scores: tensor(slots.score)?,
                bboxes: tensor(slots.bbox)?,
                kps: tensor(slots.kps)?,
            };
            candidates.extend(decode_stride(
                &level,
                stride,
                &letterbox,
                self.confidence_threshold,
            ));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            faces = faces.len(),
            "SCRFD detection"
        );
        Ok(faces)
    }
}

/// Scale `image` into a `size`×`size` NCHW tensor, centered, normalized to
/// the SCRFD input range. Padding stays at zero, which is the mean.
fn letterbox_tensor(image: &RgbImage, size: u32) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height(), size);
    let resized = imageops::resize(image, letterbox.width, letterbox.height, FilterType::Triangle);

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = (x + letterbox.pad_x) as usize;
        let ty = (y + letterbox.pad_y) as usize;
        for (channel, &value) in pixel.0.iter().enumerate() {
            tensor[[0, channel, ty, tx]] = (value as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }
    (tensor, letterbox)
}

/// Find each stride's score/bbox/kps outputs. Exports named `score_8`,
/// `bbox_16`, `kps_32` and so on are matched by name; anything else gets the
/// usual positional layout (scores 0-2, boxes 3-5, landmarks 6-8).
fn stride_slots(names: &[String]) -> [StrideSlots; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let mut named = [StrideSlots {
        score: 0,
        bbox: 0,
        kps: 0,
    }; 3];
    for (slot, &stride) in named.iter_mut().zip(SCRFD_STRIDES.iter()) {
        match (find("score", stride), find("bbox", stride), find("kps", stride)) {
            (Some(score), Some(bbox), Some(kps)) => *slot = StrideSlots { score, bbox, kps },
            _ => {
                tracing::debug!(?names, "SCRFD output names not recognized, using positional layout");
                return std::array::from_fn(|i| StrideSlots {
                    score: i,
                    bbox: i + 3,
                    kps: i + 6,
                });
            }
        }
    }
    named
}

/// Decode every anchor of one stride level that clears `threshold`.
fn decode_stride(
    level: &StrideOutputs<'_>,
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<FaceBox> {
    let grid = SCRFD_INPUT_SIZE as usize / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let mut faces = Vec::new();
    for (anchor, &score) in level.scores.iter().take(anchors).enumerate() {
        if score <= threshold {
            continue;
        }
        let Some(offsets) = level.bboxes.get(anchor * 4..anchor * 4 + 4) else {
            continue;
        };

        let cell = anchor / SCRFD_ANCHORS_PER_CELL;
        let cx = (cell % grid) as f32 * step;
        let cy = (cell / grid) as f32 * step;

        let (left, top) = letterbox.unmap(cx - offsets[0] * step, cy - offsets[1] * step);
        let (right, bottom) = letterbox.unmap(cx + offsets[2] * step, cy + offsets[3] * step);

        let landmarks = level.kps.get(anchor * 10..anchor * 10 + 10).map(|points| {
            let mut out = [(0.0f32, 0.0f32); 5];
            for (dst, pair) in out.iter_mut().zip(points.chunks_exact(2)) {
                *dst = letterbox.unmap(cx + pair[0] * step, cy + pair[1] * step);
            }
            out
        });

        faces.push(FaceBox {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
            confidence: score,
            landmarks,
        });
    }
    faces
}

/// Greedy NMS: keep the strongest box, drop anything overlapping a kept one.
fn nms(mut candidates: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<FaceBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, size: f32, confidence: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: size,
            height: size,
            confidence,
            landmarks: None,
        }
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = face(0.0, 0.0, 10.0, 0.9);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&face(20.0, 20.0, 10.0, 0.9)), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = face(0.0, 0.0, 10.0, 0.9);
        let b = FaceBox {
            x: 5.0,
            ..a.clone()
        };
        // overlap 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_strongest_of_cluster() {
        let kept = nms(
            vec![
                face(1.0, 1.0, 50.0, 0.7),
                face(0.0, 0.0, 50.0, 0.95),
                face(200.0, 200.0, 40.0, 0.6),
            ],
            SCRFD_NMS_THRESHOLD,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.95);
        assert_eq!(kept[1].confidence, 0.6);
    }

    #[test]
    fn test_letterbox_wide_image() {
        let lb = Letterbox::fit(1280, 640, 640);
        assert_eq!((lb.width, lb.height), (640, 320));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 160));
        let (x, y) = lb.unmap(320.0, 320.0);
        assert!((x - 640.0).abs() < 1e-3);
        assert!((y - 320.0).abs() < 1e-3);
    }

    #[test]
    fn test_letterbox_tensor_pads_with_zero() {
        let image = RgbImage::from_pixel(20, 10, image::Rgb([255, 0, 128]));
        let (tensor, lb) = letterbox_tensor(&image, 40);
        assert_eq!(tensor.shape(), &[1, 3, 40, 40]);
        assert_eq!(lb.pad_y, 10);
        // padding row
        assert_eq!(tensor[[0, 0, 0, 20]], 0.0);
        // inside the image, channels stay in RGB order
        let r = tensor[[0, 0, 20, 20]];
        let g = tensor[[0, 1, 20, 20]];
        assert!((r - (255.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-3);
        assert!((g - (0.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-3);
    }

    #[test]
    fn test_stride_slots_by_name() {
        let names: Vec<String> = [
            "kps_8", "kps_16", "kps_32", "score_8", "score_16", "score_32", "bbox_8", "bbox_16",
            "bbox_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let slots = stride_slots(&names);
        assert_eq!(
            slots[1],
            StrideSlots {
                score: 4,
                bbox: 7,
                kps: 1
            }
        );
    }

    #[test]
    fn test_stride_slots_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i| format!("{}", 400 + i)).collect();
        let slots = stride_slots(&names);
        assert_eq!(
            slots[2],
            StrideSlots {
                score: 2,
                bbox: 5,
                kps: 8
            }
        );
    }

    #[test]
    fn test_decode_stride_single_anchor() {
        // stride 32 on a 640 canvas: 20×20 cells, 2 anchors each
        let anchors = 20 * 20 * 2;
        let mut scores = vec![0.0f32; anchors];
        let mut bboxes = vec![0.0f32; anchors * 4];
        let mut kps = vec![0.0f32; anchors * 10];

        // cell (x=3, y=2), second anchor
        let anchor = (2 * 20 + 3) * 2 + 1;
        scores[anchor] = 0.9;
        bboxes[anchor * 4..anchor * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);
        kps[anchor * 10] = 0.5;

        let level = StrideOutputs {
            scores: &scores,
            bboxes: &bboxes,
            kps: &kps,
        };
        let identity = Letterbox {
            scale: 1.0,
            width: 640,
            height: 640,
            pad_x: 0,
            pad_y: 0,
        };
        let faces = decode_stride(&level, 32, &identity, 0.5);

        assert_eq!(faces.len(), 1);
        let f = &faces[0];
        assert_eq!((f.x, f.y, f.width, f.height), (64.0, 32.0, 64.0, 64.0));
        assert_eq!(f.landmarks.unwrap()[0], (112.0, 64.0));
    }

    #[test]
    fn test_decode_stride_skips_below_threshold() {
        let scores = vec![0.5f32; 800];
        let level = StrideOutputs {
            scores: &scores,
            bboxes: &[0.0; 3200],
            kps: &[],
        };
        let lb = Letterbox::fit(640, 640, 640);
        assert!(decode_stride(&level, 32, &lb, 0.5).is_empty());
    }
}
