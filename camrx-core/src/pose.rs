//! Camera pose decoding and the source→target change of basis.
//!
//! The source describes the camera in a right-handed frame; consumers
//! expect a left-handed one. A fixed change-of-basis matrix `C` maps
//! between them:
//!
//! ```text
//! R' = C · R · Cᵗ        rotation
//! p' = C · (t / 100)     translation, centimeters → meters
//! ```
//!
//! In the calibrated protocol `C = H · A`, where `A` is the device axis
//! basis from the first axis packet and `H` flips the Z axis. Extrinsics
//! that arrive before calibration use `C = I`. In the position-only
//! protocol there is no calibration packet and `C = H` from the start.

use glam::{DVec3, Mat3, Quat, Vec3};
use tracing::debug;

use crate::packet::{AxisPacket, ExtrinsicsPacket, Packet, PositionPacket, ProtocolVariant};

/// Right-handed → left-handed flip (negate Z).
pub const HANDEDNESS_FLIP: Mat3 = Mat3::from_cols(Vec3::X, Vec3::Y, Vec3::NEG_Z);

const CM_PER_M: f32 = 100.0;

/// Build a matrix from nine row-major values.
pub fn mat3_from_rows(rows: &[f32; 9]) -> Mat3 {
    Mat3::from_cols_array(rows).transpose()
}

/// Flatten a matrix into nine row-major values.
pub fn mat3_to_rows(m: &Mat3) -> [f32; 9] {
    m.transpose().to_cols_array()
}

// ── Pose ─────────────────────────────────────────────────────────

/// Camera pose in the target (left-handed) frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: Mat3,
    /// Meters.
    pub position: Vec3,
    /// Vertical field of view as sent by the source, once known.
    pub vertical_fov: Option<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            rotation: Mat3::IDENTITY,
            position: Vec3::ZERO,
            vertical_fov: None,
        }
    }
}

impl Pose {
    /// Rotation as a unit quaternion.
    pub fn orientation(&self) -> Quat {
        Quat::from_mat3(&self.rotation).normalize()
    }
}

// ── CoordinateTransform ──────────────────────────────────────────

/// Fixed change of basis from the source frame to the target frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    basis: Mat3,
}

impl CoordinateTransform {
    pub const IDENTITY: Self = Self {
        basis: Mat3::IDENTITY,
    };

    pub const HANDEDNESS_FLIP: Self = Self {
        basis: HANDEDNESS_FLIP,
    };

    /// `C = H · A` for a device axis basis `A`.
    pub fn from_axis_basis(axis: Mat3) -> Self {
        Self {
            basis: HANDEDNESS_FLIP * axis,
        }
    }

    pub fn matrix(&self) -> Mat3 {
        self.basis
    }

    /// `C · R · Cᵗ`
    pub fn rotation(&self, r: Mat3) -> Mat3 {
        self.basis * r * self.basis.transpose()
    }

    /// `C · p`
    pub fn point(&self, p: Vec3) -> Vec3 {
        self.basis * p
    }
}

// ── PoseDecoder ──────────────────────────────────────────────────

/// Turns control packets into the current [`Pose`].
///
/// Holds the pose between packets: an extrinsics packet replaces rotation
/// and position, an axis packet updates the field of view, a position
/// packet replaces the position only.
#[derive(Debug)]
pub struct PoseDecoder {
    variant: ProtocolVariant,
    transform: Option<CoordinateTransform>,
    pose: Pose,
}

impl PoseDecoder {
    pub fn new(variant: ProtocolVariant) -> Self {
        let transform = match variant {
            ProtocolVariant::Calibrated => None,
            ProtocolVariant::PositionOnly => Some(CoordinateTransform::HANDEDNESS_FLIP),
        };
        Self {
            variant,
            transform,
            pose: Pose::default(),
        }
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Whether a change of basis has been established.
    pub fn is_calibrated(&self) -> bool {
        self.transform.is_some()
    }

    /// The change of basis in effect (identity until calibrated).
    pub fn transform(&self) -> CoordinateTransform {
        self.transform.unwrap_or(CoordinateTransform::IDENTITY)
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Apply a control packet. Returns the new pose, or `None` if the
    /// packet is not a control packet or carries non-finite values.
    pub fn apply(&mut self, packet: &Packet<'_>) -> Option<Pose> {
        match packet {
            Packet::Axis(p) => self.on_axis(p),
            Packet::Extrinsics(p) => self.on_extrinsics(p),
            Packet::Position(p) => self.on_position(p),
            Packet::FrameHeader(_) | Packet::Chunk(_) => None,
        }
    }

    fn on_axis(&mut self, packet: &AxisPacket) -> Option<Pose> {
        if !all_finite(&packet.basis) || !packet.vertical_fov.is_finite() {
            debug!("dropping axis packet with non-finite values");
            return None;
        }
        let basis = mat3_from_rows(&packet.basis);
        if !is_orthonormal_basis(basis) {
            debug!(?basis, "dropping axis packet with non-orthonormal basis");
            return None;
        }

        match self.transform {
            None => {
                let transform = CoordinateTransform::from_axis_basis(basis);
                debug!(basis = ?transform.matrix(), "calibrated change of basis");
                self.transform = Some(transform);
            }
            Some(current) => {
                let proposed = CoordinateTransform::from_axis_basis(basis);
                if !proposed.matrix().abs_diff_eq(current.matrix(), 1e-6) {
                    debug!("axis basis changed after calibration; keeping the original");
                }
            }
        }

        self.pose.vertical_fov = Some(packet.vertical_fov);
        Some(self.pose)
    }

    fn on_extrinsics(&mut self, packet: &ExtrinsicsPacket) -> Option<Pose> {
        if !all_finite(&packet.rotation) || !all_finite(&packet.translation_cm) {
            debug!("dropping extrinsics packet with non-finite values");
            return None;
        }

        let transform = self.transform();
        let rotation = mat3_from_rows(&packet.rotation);
        let translation = Vec3::from_array(packet.translation_cm) / CM_PER_M;

        self.pose.rotation = transform.rotation(rotation);
        self.pose.position = transform.point(translation);
        Some(self.pose)
    }

    fn on_position(&mut self, packet: &PositionPacket) -> Option<Pose> {
        if !packet.position_cm.iter().all(|v| v.is_finite()) {
            debug!("dropping position packet with non-finite values");
            return None;
        }

        let meters = (DVec3::from_array(packet.position_cm) / CM_PER_M as f64).as_vec3();
        self.pose.position = self.transform().point(meters);
        Some(self.pose)
    }
}

fn all_finite(values: &[f32]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Orthonormal columns with `|det| = 1`, within wire float tolerance.
/// Reflections are accepted.
fn is_orthonormal_basis(m: Mat3) -> bool {
    const TOL: f32 = 1e-3;
    (m.transpose() * m).abs_diff_eq(Mat3::IDENTITY, TOL) && (m.determinant().abs() - 1.0).abs() < TOL
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn rotation(yaw: f32, pitch: f32, roll: f32) -> Mat3 {
        Mat3::from_quat(Quat::from_euler(glam::EulerRot::YXZ, yaw, pitch, roll))
    }

    fn is_orthonormal(m: Mat3) -> bool {
        (m.transpose() * m).abs_diff_eq(Mat3::IDENTITY, EPS)
    }

    fn axis(basis: Mat3, fov: f32) -> Packet<'static> {
        Packet::Axis(AxisPacket {
            basis: mat3_to_rows(&basis),
            vertical_fov: fov,
        })
    }

    fn extrinsics(r: Mat3, t_cm: [f32; 3]) -> Packet<'static> {
        Packet::Extrinsics(ExtrinsicsPacket {
            rotation: mat3_to_rows(&r),
            translation_cm: t_cm,
        })
    }

    #[test]
    fn row_major_round_trip() {
        let rows = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let m = mat3_from_rows(&rows);
        assert_eq!(m.row(0), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(m.col(0), Vec3::new(1.0, 4.0, 7.0));
        assert_eq!(mat3_to_rows(&m), rows);
    }

    #[test]
    fn transform_preserves_orthonormality() {
        let axes = [
            Mat3::IDENTITY,
            rotation(0.3, -1.1, 2.0),
            rotation(std::f32::consts::FRAC_PI_2, 0.0, 0.0),
        ];
        let rotations = [
            rotation(0.1, 0.2, 0.3),
            rotation(-2.5, 1.2, 0.7),
            rotation(3.0, -0.4, -1.9),
        ];

        for a in axes {
            let c = CoordinateTransform::from_axis_basis(a);
            for r in rotations {
                let r2 = c.rotation(r);
                assert!(is_orthonormal(r2));
                assert!((r2.determinant() - 1.0).abs() < EPS);
            }
        }
    }

    #[test]
    fn centimeters_become_meters_before_basis() {
        let mut dec = PoseDecoder::new(ProtocolVariant::Calibrated);
        // Uncalibrated: identity fallback.
        let pose = dec.apply(&extrinsics(Mat3::IDENTITY, [250.0, 0.0, -50.0])).unwrap();
        assert!(pose.position.abs_diff_eq(Vec3::new(2.5, 0.0, -0.5), EPS));
        assert!(!dec.is_calibrated());
    }

    #[test]
    fn calibration_applies_handedness_flip() {
        let mut dec = PoseDecoder::new(ProtocolVariant::Calibrated);
        let pose = dec.apply(&axis(Mat3::IDENTITY, 60.0)).unwrap();
        assert_eq!(pose.vertical_fov, Some(60.0));
        assert!(dec.is_calibrated());

        let pose = dec.apply(&extrinsics(Mat3::IDENTITY, [100.0, 200.0, 250.0])).unwrap();
        assert!(pose.position.abs_diff_eq(Vec3::new(1.0, 2.0, -2.5), EPS));
        assert!(pose.rotation.abs_diff_eq(Mat3::IDENTITY, EPS));
        assert_eq!(pose.vertical_fov, Some(60.0));
    }

    #[test]
    fn calibrated_rotation_is_conjugated() {
        let a = rotation(0.5, 0.0, 0.0);
        let r = rotation(0.0, 0.3, 0.0);
        let mut dec = PoseDecoder::new(ProtocolVariant::Calibrated);
        dec.apply(&axis(a, 45.0));
        let pose = dec.apply(&extrinsics(r, [0.0; 3])).unwrap();

        let c = HANDEDNESS_FLIP * a;
        let expected = c * r * c.transpose();
        assert!(pose.rotation.abs_diff_eq(expected, EPS));
        assert!(is_orthonormal(pose.rotation));
    }

    #[test]
    fn calibration_is_set_once() {
        let mut dec = PoseDecoder::new(ProtocolVariant::Calibrated);
        dec.apply(&axis(Mat3::IDENTITY, 60.0));
        let first = dec.transform();

        let pose = dec.apply(&axis(rotation(1.0, 0.0, 0.0), 75.0)).unwrap();
        assert_eq!(dec.transform(), first);
        assert_eq!(pose.vertical_fov, Some(75.0));
    }

    #[test]
    fn position_only_uses_fixed_flip() {
        let mut dec = PoseDecoder::new(ProtocolVariant::PositionOnly);
        assert!(dec.is_calibrated());

        let pose = dec
            .apply(&Packet::Position(PositionPacket {
                position_cm: [250.0, -100.0, 300.0],
            }))
            .unwrap();
        assert!(pose.position.abs_diff_eq(Vec3::new(2.5, -1.0, -3.0), EPS));
        assert_eq!(pose.rotation, Mat3::IDENTITY);
        assert_eq!(pose.vertical_fov, None);
    }

    #[test]
    fn non_finite_values_are_dropped() {
        let mut dec = PoseDecoder::new(ProtocolVariant::Calibrated);
        let before = *dec.pose();
        assert!(dec.apply(&extrinsics(Mat3::IDENTITY, [f32::NAN, 0.0, 0.0])).is_none());
        assert!(dec.apply(&axis(Mat3::IDENTITY, f32::INFINITY)).is_none());
        assert_eq!(*dec.pose(), before);
        assert!(!dec.is_calibrated());
    }

    #[test]
    fn degenerate_basis_does_not_calibrate() {
        let mut dec = PoseDecoder::new(ProtocolVariant::Calibrated);
        assert!(dec.apply(&axis(Mat3::ZERO, 60.0)).is_none());
        assert!(dec.apply(&axis(Mat3::from_diagonal(Vec3::new(2.0, 1.0, 1.0)), 60.0)).is_none());
        assert!(!dec.is_calibrated());
        assert_eq!(dec.pose().vertical_fov, None);

        dec.apply(&axis(Mat3::IDENTITY, 60.0)).unwrap();
        let pose = dec.apply(&extrinsics(Mat3::IDENTITY, [250.0, 100.0, 50.0])).unwrap();
        assert!(pose.position.abs_diff_eq(Vec3::new(2.5, 1.0, -0.5), EPS));
        assert!(is_orthonormal(pose.rotation));
        assert!(pose.rotation.abs_diff_eq(Mat3::IDENTITY, EPS));
    }

    #[test]
    fn degenerate_basis_after_calibration_keeps_transform() {
        let mut dec = PoseDecoder::new(ProtocolVariant::Calibrated);
        dec.apply(&axis(Mat3::IDENTITY, 45.0)).unwrap();
        assert!(dec.apply(&axis(Mat3::ZERO, 90.0)).is_none());
        assert_eq!(dec.pose().vertical_fov, Some(45.0));

        let pose = dec.apply(&extrinsics(Mat3::IDENTITY, [0.0, 0.0, 100.0])).unwrap();
        assert!(pose.position.abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), EPS));
    }

    #[test]
    fn frame_packets_are_not_pose() {
        let mut dec = PoseDecoder::new(ProtocolVariant::Calibrated);
        let header = Packet::FrameHeader(crate::packet::FrameHeader {
            frame_id: 1,
            expected: 1,
        });
        assert!(dec.apply(&header).is_none());
    }

    #[test]
    fn orientation_matches_matrix() {
        let q = Quat::from_rotation_y(0.8);
        let pose = Pose {
            rotation: Mat3::from_quat(q),
            ..Pose::default()
        };
        let got = pose.orientation();
        assert!(got.abs_diff_eq(q, EPS) || got.abs_diff_eq(-q, EPS));
    }
}
