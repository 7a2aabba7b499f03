//! Constants used throughout the library

/// Number of facial landmarks for full face
pub const NUM_FACIAL_LANDMARKS: usize = 68;

/// Number of contour points outlining one eye
pub const EYE_CONTOUR_POINTS: usize = 6;

/// Eye ROI enlargement, as a percentage of the detected (left) eye width
pub const EYE_ROI_ENLARGE_FACTOR: f64 = 25.0;

/// Mask value for pixels inside the eye contour
pub const MASK_FOREGROUND: u8 = 255;

/// Camera matrix center factor
pub const CAMERA_CENTER_FACTOR: u32 = 2;

/// Solver working units (millimeters) per meter
pub const MILLIMETERS_PER_METER: f64 = 1000.0;

/// Initial rotation vector handed to the PnP solver.
///
/// Roughly a head facing the camera. Starting here keeps the iterative solver
/// away from the mirror solution with the head behind the camera.
pub const INITIAL_ROTATION_GUESS: [f64; 3] = [1.2, 1.2, -1.2];

/// Initial translation (millimeters) handed to the PnP solver: 1m in front of the camera
pub const INITIAL_TRANSLATION_GUESS: [f64; 3] = [0.0, 0.0, 1000.0];

/// Minimum number of 2D-3D correspondences for a PnP solve
pub const MIN_PNP_CORRESPONDENCES: usize = 4;

/// Default iteration cap for the iterative PnP solver
pub const DEFAULT_PNP_MAX_ITERATIONS: usize = 100;

/// Default relative step size below which the PnP solver has converged
pub const DEFAULT_PNP_EPSILON: f64 = 1e-10;

/// Eye patches are rescaled to this width before the eye-center search
pub const DEFAULT_FAST_EYE_WIDTH: u32 = 50;

/// Gradient magnitudes below `threshold * std_dev / sqrt(n) + mean` are ignored
pub const DEFAULT_GRADIENT_THRESHOLD: f64 = 50.0;

/// Sigma of the blur applied to the eye patch before inverting it into a weight map
pub const DEFAULT_WEIGHT_BLUR_SIGMA: f32 = 1.0;

/// Default focal length (pixels) when none is configured
pub const DEFAULT_FOCAL_LENGTH: f64 = 455.0;

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-10;
