//! Perspective-n-point head pose solver
//!
//! Fits the canonical 3-D face model to six observed landmarks by minimising
//! reprojection error with Levenberg-Marquardt. The pose is parameterised as
//! Euler angles relative to a face looking straight into the camera plus a
//! translation in millimetres.

use std::f64::consts::PI;

use nalgebra::{Matrix2, Matrix6, Point3, Rotation3, SMatrix, SVector, Vector2, Vector3, Vector6};

/// Canonical face model in millimetres.
///
/// Model frame: x towards the image right, y up, z towards the camera.
/// Order: nose tip, chin, image-left eye corner, image-right eye corner,
/// image-left mouth corner, image-right mouth corner.
pub const MODEL_POINTS: [[f64; 3]; 6] = [
    [0.0, 0.0, 0.0],
    [0.0, -330.0, -65.0],
    [-225.0, 170.0, -135.0],
    [225.0, 170.0, -135.0],
    [-150.0, -150.0, -125.0],
    [150.0, -150.0, -125.0],
];

/// Distance between the two model eye corners (mm)
const MODEL_EYE_SPAN: f64 = 450.0;

/// Stacked x/y reprojection residuals for the six landmarks
type Residuals = SVector<f64, 12>;
type Jacobian = SMatrix<f64, 12, 6>;

/// Rotation taking the model frame onto the camera frame for a frontal face
/// (180 degrees about x: model y-up/z-toward-camera to camera y-down/z-forward).
fn frontal() -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::x_axis(), PI)
}

/// Pinhole camera without lens distortion
#[derive(Debug, Clone, Copy)]
pub struct CameraIntrinsics {
    pub focal: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Focal length equal to the frame width, principal point at the centre
    pub fn for_frame(width: u32, height: u32) -> Self {
        Self {
            focal: width as f64,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        }
    }

    /// Project a camera-space point; `None` when it lies behind the camera
    pub fn project(&self, p: &Point3<f64>) -> Option<[f64; 2]> {
        if p.z <= 1e-6 {
            return None;
        }
        Some([self.focal * p.x / p.z + self.cx, self.focal * p.y / p.z + self.cy])
    }
}

/// Head pose: radians relative to the frontal pose, translation in mm
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
    pub translation: [f64; 3],
}

impl Pose {
    fn from_params(p: &Vector6<f64>) -> Self {
        Self {
            pitch: p[0],
            yaw: p[1],
            roll: p[2],
            translation: [p[3], p[4], p[5]],
        }
    }

    /// Rotation relative to the frontal pose: `Rx(pitch) * Ry(yaw) * Rz(roll)`
    pub fn relative_rotation(&self) -> Rotation3<f64> {
        Rotation3::from_axis_angle(&Vector3::x_axis(), self.pitch)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), self.yaw)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), self.roll)
    }

    /// Full model-to-camera rotation
    pub fn rotation(&self) -> Rotation3<f64> {
        self.relative_rotation() * frontal()
    }

    /// Project the canonical model through this pose
    pub fn project_model(&self, camera: &CameraIntrinsics) -> Option<[[f64; 2]; 6]> {
        let r = self.rotation();
        let t = Vector3::from(self.translation);
        let mut out = [[0.0; 2]; 6];
        for (dst, src) in out.iter_mut().zip(MODEL_POINTS.iter()) {
            *dst = camera.project(&(r * Point3::from(*src) + t))?;
        }
        Some(out)
    }

    /// Canonical (pitch, yaw, roll) in degrees, yaw within [-90, 90]
    pub fn euler_degrees(&self) -> (f64, f64, f64) {
        let (pitch, yaw, roll) = decompose(&self.relative_rotation());
        (pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees())
    }
}

/// Converged solver output
#[derive(Debug, Clone, Copy)]
pub struct PoseSolution {
    pub pose: Pose,
    /// Root-mean-square reprojection error per landmark (pixels)
    pub rms_error: f64,
}

/// Solver tuning
#[derive(Debug, Clone, Copy)]
pub struct SolverSettings {
    pub max_iterations: usize,
    /// Largest accepted RMS error as a fraction of the observed eye span
    pub max_relative_error: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_relative_error: 0.15,
        }
    }
}

/// Solve the head pose for six observed landmarks.
///
/// Returns `None` when the observation is degenerate (coincident or
/// collinear points, non-finite values) or no start converges to an
/// acceptable reprojection error.
pub fn solve(
    observed: &[[f64; 2]; 6],
    camera: &CameraIntrinsics,
    settings: &SolverSettings,
) -> Option<PoseSolution> {
    if observed.iter().flatten().any(|v| !v.is_finite()) || is_collinear(observed) {
        return None;
    }

    let left_eye = observed[2];
    let right_eye = observed[3];
    let eye_span = ((right_eye[0] - left_eye[0]).powi(2) + (right_eye[1] - left_eye[1]).powi(2)).sqrt();
    if eye_span < 1.0 {
        return None;
    }

    let depth = camera.focal * MODEL_EYE_SPAN / eye_span;
    let nose = observed[0];
    let tx = (nose[0] - camera.cx) * depth / camera.focal;
    let ty = (nose[1] - camera.cy) * depth / camera.focal;
    let roll0 = (right_eye[1] - left_eye[1]).atan2(right_eye[0] - left_eye[0]);

    let mut best: Option<(Vector6<f64>, f64)> = None;
    for yaw0 in [-40.0f64, 0.0, 40.0] {
        for pitch0 in [-25.0f64, 0.0, 25.0] {
            let start = Vector6::new(pitch0.to_radians(), yaw0.to_radians(), roll0, tx, ty, depth);
            if let Some((params, cost)) = refine(start, observed, camera, settings.max_iterations) {
                if best.map_or(true, |(_, c)| cost < c) {
                    best = Some((params, cost));
                }
            }
        }
    }

    let (params, cost) = best?;
    let rms_error = (cost / observed.len() as f64).sqrt();
    if !rms_error.is_finite() || rms_error > settings.max_relative_error * eye_span {
        return None;
    }

    Some(PoseSolution {
        pose: Pose::from_params(&params),
        rms_error,
    })
}

fn residuals(params: &Vector6<f64>, observed: &[[f64; 2]; 6], camera: &CameraIntrinsics) -> Option<Residuals> {
    let projected = Pose::from_params(params).project_model(camera)?;
    Some(Residuals::from_fn(|i, _| projected[i / 2][i % 2] - observed[i / 2][i % 2]))
}

/// Levenberg-Marquardt from one starting point; returns parameters and
/// final sum of squared residuals.
fn refine(
    start: Vector6<f64>,
    observed: &[[f64; 2]; 6],
    camera: &CameraIntrinsics,
    max_iterations: usize,
) -> Option<(Vector6<f64>, f64)> {
    let mut params = start;
    let mut r = residuals(&params, observed, camera)?;
    let mut cost = r.norm_squared();
    let mut lambda = 1e-3;

    for _ in 0..max_iterations {
        let jacobian = numeric_jacobian(&params, observed, camera)?;
        let jtj: Matrix6<f64> = jacobian.tr_mul(&jacobian);
        let gradient: Vector6<f64> = jacobian.tr_mul(&r);

        let mut improved = false;
        while lambda < 1e12 {
            let damping = Matrix6::from_diagonal(&jtj.diagonal().map(|d| lambda * d.max(1e-9)));
            let delta = match (jtj + damping).lu().solve(&(-gradient)) {
                Some(delta) if delta.iter().all(|v| v.is_finite()) => delta,
                _ => {
                    lambda *= 10.0;
                    continue;
                }
            };

            let trial = params + delta;
            match residuals(&trial, observed, camera) {
                Some(trial_r) if trial_r.norm_squared() < cost => {
                    params = trial;
                    cost = trial_r.norm_squared();
                    r = trial_r;
                    lambda = (lambda * 0.3).max(1e-12);
                    improved = delta.norm() > 1e-10;
                    break;
                }
                _ => lambda *= 10.0,
            }
        }

        if !improved || cost < 1e-12 {
            break;
        }
    }

    Some((params, cost))
}

/// Central differences, one column per pose parameter
fn numeric_jacobian(params: &Vector6<f64>, observed: &[[f64; 2]; 6], camera: &CameraIntrinsics) -> Option<Jacobian> {
    let mut jacobian = Jacobian::zeros();
    for k in 0..6 {
        let h = 1e-6 * params[k].abs().max(1.0);
        let mut step = Vector6::zeros();
        step[k] = h;
        let rp = residuals(&(params + step), observed, camera)?;
        let rm = residuals(&(params - step), observed, camera)?;
        jacobian.set_column(k, &((rp - rm) / (2.0 * h)));
    }
    Some(jacobian)
}

/// Points whose spread collapses onto a line (or a single point)
fn is_collinear(points: &[[f64; 2]; 6]) -> bool {
    let centroid = points
        .iter()
        .fold(Vector2::zeros(), |acc, p| acc + Vector2::new(p[0], p[1]))
        / points.len() as f64;
    let scatter = points.iter().fold(Matrix2::zeros(), |acc, p| {
        let d = Vector2::new(p[0], p[1]) - centroid;
        acc + d * d.transpose()
    });
    if scatter.trace() < 1e-9 {
        return true;
    }
    let eigenvalues = scatter.symmetric_eigenvalues();
    eigenvalues.min().max(0.0) / eigenvalues.max() < 1e-4
}

/// Inverse of `Rx(pitch) * Ry(yaw) * Rz(roll)`.
///
/// nalgebra's Euler angles describe `Rz * Ry * Rx`; the inverse of our
/// composition has that form with each angle negated.
fn decompose(rotation: &Rotation3<f64>) -> (f64, f64, f64) {
    let (x, y, z) = rotation.inverse().euler_angles();
    (-x, -y, -z)
}
