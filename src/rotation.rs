//! Re-expresses force and torque vectors in the canonical fingertip frame.

use std::f64::consts::PI;

/// A three-component vector, `[x, y, z]`
pub type Vector3 = [f64; 3];

/// Rotates `v` about the Z axis by `degrees`. The Z component is untouched.
pub fn rotate_z(v: Vector3, degrees: f64) -> Vector3 {
    let rad = degrees * PI / 180.0;
    let (sin, cos) = rad.sin_cos();

    [v[0] * cos - v[1] * sin, v[0] * sin + v[1] * cos, v[2]]
}

/// Moves a torque measured at the sensor origin to a point `d` metres along
/// the tool axis, adding the moment `r x F = [-d*Fy, d*Fx, 0]`.
pub fn fingertip_torque(torque: Vector3, force: Vector3, d: f64) -> Vector3 {
    [torque[0] - d * force[1], torque[1] + d * force[0], torque[2]]
}
