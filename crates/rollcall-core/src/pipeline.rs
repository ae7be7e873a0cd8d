//! The verification pipeline: one uploaded frame in, one verdict out.
//!
//! A strict sequential state machine. Every gate either passes the request
//! to the next state or terminates it with a [`Rejection`]; nothing is
//! retried and no state is skipped. The expensive embedding step runs only
//! after the liveness gate has passed, so rejected frames never pay for it.
//!
//! Rejections are ordinary results. Only genuinely unexpected failures
//! (model inference, ledger I/O) leave through the error channel, to be
//! logged and masked at the service boundary.

use std::sync::Arc;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::capabilities::{FaceEncoder, FaceLocator, LandmarkPredictor, ModelError};
use crate::gallery::Gallery;
use crate::ledger::{AttendanceLedger, LedgerError};
use crate::liveness::{self, LivenessVerdict};
use crate::matcher::{EuclideanMatcher, MatchError, MatchVerdict, Matcher};
use crate::preprocess;
use crate::types::{Rejection, VerificationResult};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Tunable thresholds, one per gate.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Averaged-EAR threshold for the blink gate.
    pub ear_threshold: f32,
    /// Maximum accepted embedding distance.
    pub match_threshold: f32,
    /// Minimum face bounding-box side, in pixels.
    pub min_face_px: f32,
    /// Jitter count for the final, high-accuracy encoding.
    pub encoder_jitters: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            ear_threshold: liveness::DEFAULT_EAR_THRESHOLD,
            match_threshold: 0.5,
            min_face_px: 60.0,
            encoder_jitters: 2,
        }
    }
}

/// The assembled pipeline: models, gallery, ledger, thresholds.
pub struct VerificationPipeline {
    locator: Box<dyn FaceLocator + Send>,
    landmarker: Box<dyn LandmarkPredictor + Send>,
    encoder: Box<dyn FaceEncoder + Send>,
    matcher: EuclideanMatcher,
    gallery: Arc<Gallery>,
    ledger: Arc<AttendanceLedger>,
    settings: PipelineSettings,
}

impl VerificationPipeline {
    pub fn new(
        locator: Box<dyn FaceLocator + Send>,
        landmarker: Box<dyn LandmarkPredictor + Send>,
        encoder: Box<dyn FaceEncoder + Send>,
        gallery: Arc<Gallery>,
        ledger: Arc<AttendanceLedger>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            locator,
            landmarker,
            encoder,
            matcher: EuclideanMatcher,
            gallery,
            ledger,
            settings,
        }
    }

    /// Run one frame through every gate.
    ///
    /// `now` is the attendance timestamp; the caller supplies it so the
    /// pipeline stays deterministic under test.
    pub fn verify(
        &mut self,
        image_bytes: &[u8],
        now: NaiveDateTime,
    ) -> Result<VerificationResult, PipelineError> {
        // 1. Input validation
        if image_bytes.is_empty() {
            return Ok(VerificationResult::Rejected(Rejection::EmptyImage));
        }
        let decoded = match image::load_from_memory(image_bytes) {
            Ok(img) => img.to_rgb8(),
            Err(err) => {
                tracing::debug!(error = %err, "frame failed to decode");
                return Ok(VerificationResult::Rejected(Rejection::InvalidFormat));
            }
        };

        // 2. Preprocessing — fixed denoise + contrast pass
        let frame = preprocess::enhance(&decoded);

        // 3. Face localization, single-face policy
        let faces = self.locator.locate(&frame)?;
        let face = match faces.as_slice() {
            [] => return Ok(VerificationResult::Rejected(Rejection::NoFaceDetected)),
            [face] => face,
            multiple => {
                tracing::debug!(count = multiple.len(), "ambiguous frame rejected");
                return Ok(VerificationResult::Rejected(Rejection::MultipleFacesDetected));
            }
        };

        // 4. Frame quality gate — embeddings from tiny crops are unreliable
        if face.width < self.settings.min_face_px || face.height < self.settings.min_face_px {
            tracing::debug!(
                width = face.width,
                height = face.height,
                min = self.settings.min_face_px,
                "face below minimum size"
            );
            return Ok(VerificationResult::Rejected(Rejection::FaceTooSmall));
        }

        // 5. Landmark extraction on the grayscale frame
        let gray = preprocess::to_grayscale(&frame);
        let Some(landmarks) = self.landmarker.predict(&gray, face)? else {
            return Ok(VerificationResult::Rejected(Rejection::LivenessUnavailable));
        };

        // 6. Liveness gate
        let check = match liveness::evaluate_blink(&landmarks, self.settings.ear_threshold) {
            Ok(check) => check,
            Err(err) => {
                // Degenerate eye geometry: liveness cannot be evaluated.
                tracing::debug!(error = %err, "blink gate could not run");
                return Ok(VerificationResult::Rejected(Rejection::LivenessUnavailable));
            }
        };
        if check.verdict == LivenessVerdict::NotLive {
            tracing::debug!(averaged_ear = check.averaged_ear, "no blink in frame");
            return Ok(VerificationResult::Rejected(Rejection::LivenessFailed));
        }

        // 7. Embedding + match — high-accuracy configuration, live frames only
        let Some(embedding) =
            self.encoder
                .encode(&frame, face, self.settings.encoder_jitters)?
        else {
            return Ok(VerificationResult::Rejected(Rejection::EncodingFailed));
        };

        let verdict = self.matcher.find_match(
            &embedding,
            self.gallery.entries(),
            self.settings.match_threshold,
        )?;
        let (name, distance) = match verdict {
            MatchVerdict::Matched { label, distance } => (label, distance),
            MatchVerdict::Unmatched { nearest } => {
                tracing::debug!(nearest, "no gallery entry within threshold");
                return Ok(VerificationResult::Rejected(Rejection::UnknownFace));
            }
        };

        // 8. Attendance write — idempotent per (identity, date)
        let appended = self.ledger.mark(&name, now)?;
        tracing::info!(
            name,
            distance,
            averaged_ear = check.averaged_ear,
            appended,
            "verification accepted"
        );

        Ok(VerificationResult::Accepted { name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BoundingBox, Embedding, GalleryEntry, LandmarkSet, LANDMARK_COUNT, LEFT_EYE, RIGHT_EYE,
    };
    use chrono::{NaiveDate, NaiveTime};
    use image::{GrayImage, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicU32, Ordering};

    // ── Mock capability implementations ──────────────────────────────────────

    struct FixedLocator(Vec<BoundingBox>);

    impl FaceLocator for FixedLocator {
        fn locate(&mut self, _frame: &RgbImage) -> Result<Vec<BoundingBox>, ModelError> {
            Ok(self.0.clone())
        }
    }

    struct FixedLandmarker(Option<LandmarkSet>);

    impl LandmarkPredictor for FixedLandmarker {
        fn predict(
            &mut self,
            _gray: &GrayImage,
            _face: &BoundingBox,
        ) -> Result<Option<LandmarkSet>, ModelError> {
            Ok(self.0.clone())
        }
    }

    struct CountingEncoder {
        result: Option<Embedding>,
        calls: Arc<AtomicU32>,
    }

    impl FaceEncoder for CountingEncoder {
        fn encode(
            &mut self,
            _frame: &RgbImage,
            _face: &BoundingBox,
            _jitters: u32,
        ) -> Result<Option<Embedding>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    // ── Fixtures ─────────────────────────────────────────────────────────────

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(96, 96, Rgb([120, 110, 100]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn face(width: f32, height: f32) -> BoundingBox {
        BoundingBox {
            x: 8.0,
            y: 8.0,
            width,
            height,
            confidence: 0.95,
            landmarks: Some([(20.0, 30.0), (60.0, 30.0), (40.0, 45.0), (25.0, 60.0), (55.0, 60.0)]),
        }
    }

    /// Landmark set whose eyes both measure the given EAR.
    fn landmarks_with_ear(ear: f32) -> LandmarkSet {
        let mut points = [(0.0f32, 0.0f32); LANDMARK_COUNT];
        let width = 10.0f32;
        let half = ear * width / 2.0;
        for (region, x_off) in [(RIGHT_EYE, 20.0f32), (LEFT_EYE, 60.0f32)] {
            let eye = [
                (x_off, 50.0),
                (x_off + width / 3.0, 50.0 - half),
                (x_off + 2.0 * width / 3.0, 50.0 - half),
                (x_off + width, 50.0),
                (x_off + 2.0 * width / 3.0, 50.0 + half),
                (x_off + width / 3.0, 50.0 + half),
            ];
            points[region].copy_from_slice(&eye);
        }
        LandmarkSet::new(points)
    }

    fn embedding(values: Vec<f32>) -> Embedding {
        Embedding {
            values,
            model_version: None,
        }
    }

    fn gallery_with_bob() -> Arc<Gallery> {
        Arc::new(Gallery::from_entries(vec![GalleryEntry {
            label: "bob".into(),
            embedding: embedding(vec![0.2, 0.0]),
        }]))
    }

    fn temp_ledger() -> Arc<AttendanceLedger> {
        let path = std::env::temp_dir().join(format!(
            "rollcall-pipeline-test-{}.csv",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        Arc::new(AttendanceLedger::open(&path).unwrap())
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap())
    }

    struct Setup {
        faces: Vec<BoundingBox>,
        landmarks: Option<LandmarkSet>,
        encoding: Option<Embedding>,
        gallery: Arc<Gallery>,
    }

    impl Setup {
        fn build(self) -> (VerificationPipeline, Arc<AtomicU32>, Arc<AttendanceLedger>) {
            let calls = Arc::new(AtomicU32::new(0));
            let ledger = temp_ledger();
            let pipeline = VerificationPipeline::new(
                Box::new(FixedLocator(self.faces)),
                Box::new(FixedLandmarker(self.landmarks)),
                Box::new(CountingEncoder {
                    result: self.encoding,
                    calls: Arc::clone(&calls),
                }),
                self.gallery,
                Arc::clone(&ledger),
                PipelineSettings::default(),
            );
            (pipeline, calls, ledger)
        }
    }

    fn accepted_setup() -> Setup {
        Setup {
            faces: vec![face(80.0, 80.0)],
            landmarks: Some(landmarks_with_ear(0.10)),
            encoding: Some(embedding(vec![0.0, 0.0])), // distance 0.2 from bob
            gallery: gallery_with_bob(),
        }
    }

    // ── Gate-by-gate rejection coverage ──────────────────────────────────────

    #[test]
    fn test_empty_payload() {
        let (mut p, _, _) = accepted_setup().build();
        let result = p.verify(&[], noon()).unwrap();
        assert_eq!(result, VerificationResult::Rejected(Rejection::EmptyImage));
    }

    #[test]
    fn test_undecodable_payload() {
        let (mut p, _, _) = accepted_setup().build();
        let result = p.verify(b"definitely not an image", noon()).unwrap();
        assert_eq!(result, VerificationResult::Rejected(Rejection::InvalidFormat));
    }

    #[test]
    fn test_no_face() {
        let mut setup = accepted_setup();
        setup.faces = vec![];
        let (mut p, _, _) = setup.build();
        let result = p.verify(&png_bytes(), noon()).unwrap();
        assert_eq!(result, VerificationResult::Rejected(Rejection::NoFaceDetected));
    }

    #[test]
    fn test_multiple_faces() {
        let mut setup = accepted_setup();
        setup.faces = vec![face(80.0, 80.0), face(70.0, 70.0)];
        let (mut p, _, _) = setup.build();
        let result = p.verify(&png_bytes(), noon()).unwrap();
        assert_eq!(
            result,
            VerificationResult::Rejected(Rejection::MultipleFacesDetected)
        );
    }

    #[test]
    fn test_face_too_small() {
        let mut setup = accepted_setup();
        setup.faces = vec![face(40.0, 80.0)]; // one side below 60 px
        let (mut p, _, _) = setup.build();
        let result = p.verify(&png_bytes(), noon()).unwrap();
        assert_eq!(result, VerificationResult::Rejected(Rejection::FaceTooSmall));
    }

    #[test]
    fn test_no_landmarks() {
        let mut setup = accepted_setup();
        setup.landmarks = None;
        let (mut p, _, _) = setup.build();
        let result = p.verify(&png_bytes(), noon()).unwrap();
        assert_eq!(
            result,
            VerificationResult::Rejected(Rejection::LivenessUnavailable)
        );
    }

    #[test]
    fn test_degenerate_landmarks() {
        let mut setup = accepted_setup();
        setup.landmarks = Some(LandmarkSet::new([(0.0, 0.0); LANDMARK_COUNT]));
        let (mut p, _, _) = setup.build();
        let result = p.verify(&png_bytes(), noon()).unwrap();
        assert_eq!(
            result,
            VerificationResult::Rejected(Rejection::LivenessUnavailable)
        );
    }

    #[test]
    fn test_open_eyes_fail_liveness_before_encoding() {
        let mut setup = accepted_setup();
        setup.landmarks = Some(landmarks_with_ear(0.30));
        let (mut p, calls, _) = setup.build();
        let result = p.verify(&png_bytes(), noon()).unwrap();
        assert_eq!(result, VerificationResult::Rejected(Rejection::LivenessFailed));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "encoder must not run");
    }

    #[test]
    fn test_encoding_failure() {
        let mut setup = accepted_setup();
        setup.encoding = None;
        let (mut p, _, _) = setup.build();
        let result = p.verify(&png_bytes(), noon()).unwrap();
        assert_eq!(result, VerificationResult::Rejected(Rejection::EncodingFailed));
    }

    #[test]
    fn test_unknown_face() {
        let mut setup = accepted_setup();
        setup.encoding = Some(embedding(vec![0.9, 0.0])); // distance 0.7 from bob
        let (mut p, _, _) = setup.build();
        let result = p.verify(&png_bytes(), noon()).unwrap();
        assert_eq!(result, VerificationResult::Rejected(Rejection::UnknownFace));
    }

    #[test]
    fn test_empty_gallery_is_internal_error() {
        let mut setup = accepted_setup();
        setup.gallery = Arc::new(Gallery::from_entries(vec![]));
        let (mut p, _, _) = setup.build();
        let err = p.verify(&png_bytes(), noon()).unwrap_err();
        assert!(matches!(err, PipelineError::Match(MatchError::NoGallery)));
    }

    // ── Accepted path ────────────────────────────────────────────────────────

    #[test]
    fn test_accepted_marks_attendance() {
        let (mut p, calls, ledger) = accepted_setup().build();
        let result = p.verify(&png_bytes(), noon()).unwrap();

        assert_eq!(result, VerificationResult::Accepted { name: "bob".into() });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(ledger.is_marked("bob", noon().date()));

        let _ = std::fs::remove_file(ledger.path());
    }

    #[test]
    fn test_second_accept_same_day_appends_once() {
        let (mut p, _, ledger) = accepted_setup().build();

        assert_eq!(
            p.verify(&png_bytes(), noon()).unwrap(),
            VerificationResult::Accepted { name: "bob".into() }
        );
        assert_eq!(
            p.verify(&png_bytes(), noon()).unwrap(),
            VerificationResult::Accepted { name: "bob".into() }
        );

        let contents = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(contents.lines().count(), 2, "header plus one record");

        let _ = std::fs::remove_file(ledger.path());
    }
}
