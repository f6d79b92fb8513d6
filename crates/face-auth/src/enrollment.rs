//! Face enrollment store
//!
//! Owns the student -> label mapping, the current template per student and
//! the trained recognizer. Mutations are serialised on one mutex and end
//! with a full retrain. The recognizer and the label maps it was trained
//! against are published together as one snapshot, so readers never wait
//! on a retrain and never see a model paired with stale labels.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use frame::gray_patch;
use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing::{debug, info, warn};

use crate::config::FaceAuthConfig;
use crate::detector::FaceRegionDetector;
use crate::lbph::LbphModel;
use crate::{FaceAuthError, LabelId, StudentId};

/// Stored enrollment image
#[derive(Debug, Clone)]
pub struct Template {
    pub exam_id: String,
    pub patch: GrayImage,
}

/// What `remove_scope` deletes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalScope {
    /// Every student enrolled under the exam
    Exam(String),
    /// One student, only if enrolled under this exam
    Student { exam_id: String, student_id: String },
}

#[derive(Debug, Default)]
struct EnrollmentState {
    next_label: LabelId,
    labels: HashMap<StudentId, LabelId>,
    templates: BTreeMap<StudentId, Template>,
}

/// Recognizer generation plus the label maps it answers for
#[derive(Debug)]
pub struct EnrollmentSnapshot {
    model: Arc<LbphModel>,
    labels: HashMap<StudentId, LabelId>,
    students: HashMap<LabelId, StudentId>,
    registered: Vec<StudentId>,
}

impl EnrollmentSnapshot {
    fn empty(model: LbphModel) -> Self {
        Self {
            model: Arc::new(model),
            labels: HashMap::new(),
            students: HashMap::new(),
            registered: Vec::new(),
        }
    }

    pub fn model(&self) -> &Arc<LbphModel> {
        &self.model
    }

    pub fn label_of(&self, student_id: &str) -> Option<LabelId> {
        self.labels.get(student_id).copied()
    }

    pub fn student_of(&self, label: LabelId) -> Option<StudentId> {
        self.students.get(&label).cloned()
    }

    /// Enrolled student ids, sorted
    pub fn registered(&self) -> &[StudentId] {
        &self.registered
    }
}

/// Enrollment store with an atomically swapped recognizer
pub struct FaceEnrollmentStore {
    config: FaceAuthConfig,
    detector: Arc<dyn FaceRegionDetector>,
    state: Mutex<EnrollmentState>,
    snapshot: RwLock<Arc<EnrollmentSnapshot>>,
}

impl FaceEnrollmentStore {
    pub fn new(config: FaceAuthConfig, detector: Arc<dyn FaceRegionDetector>) -> Result<Self, FaceAuthError> {
        config.lbph.validate()?;
        let min_size = config.lbph.min_patch_size();
        if config.patch_size < min_size {
            return Err(FaceAuthError::InvalidConfig(format!(
                "patch_size {} is below the recognizer minimum of {}",
                config.patch_size, min_size
            )));
        }
        let model = LbphModel::empty(config.lbph);
        Ok(Self {
            config,
            detector,
            state: Mutex::new(EnrollmentState::default()),
            snapshot: RwLock::new(Arc::new(EnrollmentSnapshot::empty(model))),
        })
    }

    pub fn config(&self) -> &FaceAuthConfig {
        &self.config
    }

    /// Enroll (or re-enroll) a student from a single-face gray patch.
    ///
    /// Returns the student's label, fresh on first enrollment and reused after.
    /// A failed retrain leaves the previous enrollment in place.
    pub fn enroll(&self, student_id: &str, exam_id: &str, face_patch: &GrayImage) -> Result<LabelId, FaceAuthError> {
        if student_id.trim().is_empty() || exam_id.trim().is_empty() {
            return Err(FaceAuthError::InvalidInput("student_id and exam_id are required".into()));
        }
        if face_patch.width() == 0 || face_patch.height() == 0 {
            return Err(FaceAuthError::InvalidInput("face patch is empty".into()));
        }
        let patch = self.normalise(face_patch);

        let mut state = self.state.lock().map_err(|e| FaceAuthError::Lock(e.to_string()))?;

        let (label, fresh) = match state.labels.get(student_id) {
            Some(&label) => (label, false),
            None => {
                let label = state.next_label;
                state.next_label += 1;
                state.labels.insert(student_id.to_string(), label);
                (label, true)
            }
        };
        let previous = state.templates.insert(
            student_id.to_string(),
            Template {
                exam_id: exam_id.to_string(),
                patch,
            },
        );

        if let Err(e) = self.rebuild(&state) {
            match previous {
                Some(template) => {
                    state.templates.insert(student_id.to_string(), template);
                }
                None => {
                    state.templates.remove(student_id);
                }
            }
            if fresh {
                state.labels.remove(student_id);
            }
            return Err(e);
        }

        info!("Enrolled student {} for exam {} as label {}", student_id, exam_id, label);
        Ok(label)
    }

    /// Rebuild the recognizer from the current templates.
    ///
    /// Returns the number of students in the new model.
    pub fn retrain(&self) -> Result<usize, FaceAuthError> {
        let state = self.state.lock().map_err(|e| FaceAuthError::Lock(e.to_string()))?;
        self.rebuild(&state)
    }

    /// Remove templates and label mappings in scope, then retrain.
    ///
    /// Returns the number of students removed.
    pub fn remove_scope(&self, scope: &RemovalScope) -> Result<usize, FaceAuthError> {
        let mut state = self.state.lock().map_err(|e| FaceAuthError::Lock(e.to_string()))?;

        let doomed: Vec<StudentId> = state
            .templates
            .iter()
            .filter(|(student, template)| match scope {
                RemovalScope::Exam(exam_id) => &template.exam_id == exam_id,
                RemovalScope::Student { exam_id, student_id } => {
                    *student == student_id && &template.exam_id == exam_id
                }
            })
            .map(|(student, _)| student.clone())
            .collect();

        for student in &doomed {
            state.templates.remove(student);
            state.labels.remove(student);
        }
        info!("Removed {} enrolled students ({:?})", doomed.len(), scope);

        self.rebuild(&state)?;
        Ok(doomed.len())
    }

    /// Current recognizer generation with its label maps
    pub fn snapshot(&self) -> Arc<EnrollmentSnapshot> {
        match self.snapshot.read() {
            Ok(snapshot) => Arc::clone(&snapshot),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Enrolled student ids, sorted
    pub fn registered(&self) -> Vec<StudentId> {
        self.snapshot().registered().to_vec()
    }

    pub fn label_of(&self, student_id: &str) -> Option<LabelId> {
        self.snapshot().label_of(student_id)
    }

    pub fn student_of(&self, label: LabelId) -> Option<StudentId> {
        self.snapshot().student_of(label)
    }

    pub fn template_of(&self, student_id: &str) -> Option<Template> {
        self.state.lock().ok()?.templates.get(student_id).cloned()
    }

    /// Current recognizer
    pub fn model(&self) -> Arc<LbphModel> {
        Arc::clone(self.snapshot().model())
    }

    /// Serialized recognizer blob
    pub fn export_model(&self) -> Result<Vec<u8>, FaceAuthError> {
        self.model().serialize()
    }

    /// Resize a patch to the configured template size
    pub fn normalise(&self, patch: &GrayImage) -> GrayImage {
        let size = self.config.patch_size;
        if patch.dimensions() == (size, size) {
            patch.clone()
        } else {
            imageops::resize(patch, size, size, FilterType::Triangle)
        }
    }

    fn rebuild(&self, state: &EnrollmentState) -> Result<usize, FaceAuthError> {
        let size = self.config.patch_size;
        let mut samples = Vec::with_capacity(state.templates.len());

        for (student, template) in &state.templates {
            let Some(&label) = state.labels.get(student) else {
                continue;
            };
            let regions = match self.detector.detect(&template.patch) {
                Ok(regions) => regions,
                Err(e) => {
                    warn!("Face detection failed for {} during retrain: {}", student, e);
                    continue;
                }
            };
            let Some(face) = regions.first() else {
                warn!("No face found in template for {}; excluded from model", student);
                continue;
            };
            match gray_patch(&template.patch, &face.bbox, size) {
                Some(patch) => samples.push((label, patch)),
                None => warn!("Face region for {} lies outside its template; excluded", student),
            }
        }

        let model = LbphModel::train(self.config.lbph, samples.iter().map(|(l, p)| (*l, p)))?;
        let trained = model.len();
        let snapshot = EnrollmentSnapshot {
            model: Arc::new(model),
            labels: state.labels.clone(),
            students: state.labels.iter().map(|(s, &l)| (l, s.clone())).collect(),
            registered: state.templates.keys().cloned().collect(),
        };

        let mut current = self.snapshot.write().map_err(|e| FaceAuthError::Lock(e.to_string()))?;
        *current = Arc::new(snapshot);
        debug!("Recognizer retrained with {} of {} templates", trained, state.templates.len());
        Ok(trained)
    }
}
