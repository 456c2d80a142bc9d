use ndarray::{ArrayD, ArrayViewD};

/// The root mean square an update is allowed to have.
pub const CLIP_TARGET_RMS: f32 = 1.1;

/// Added to the root mean square so an all zero update doesn't divide by zero.
pub const CLIP_EPS: f32 = 1e-12;

/// Returns the root mean square of the entries of `g`, `0` if it is empty.
pub fn rms(g: ArrayViewD<f32>) -> f32 {
    g.mapv(|x| x * x).mean().unwrap_or_default().sqrt()
}

/// Rescales `g` so its root mean square doesn't exceed [`CLIP_TARGET_RMS`].
///
/// Updates already within the bound are returned unchanged.
pub fn clip_update_rms(g: ArrayD<f32>) -> ArrayD<f32> {
    let rms = rms(g.view()) + CLIP_EPS;
    let scale = (CLIP_TARGET_RMS / rms).min(1.0);
    if scale < 1.0 { g * scale } else { g }
}
