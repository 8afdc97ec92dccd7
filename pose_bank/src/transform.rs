use std::ops::Mul;

use glam::{Mat4, Quat, Vec3};

/// A decomposed bone transform as scale -> rotation -> translation (TRS).
///
/// Scale does not affect translation when multiplying [Transform].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn to_matrix(self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn from_matrix(value: Mat4) -> Self {
        let (scale, rotation, translation) = value.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Interpolate each component towards `rhs` at `factor` in `[0.0, 1.0]`.
    ///
    /// Rotation uses normalized lerp along the shortest arc,
    /// which is stable for the small per-frame deltas of a pose blend.
    pub fn lerp(self, rhs: Self, factor: f32) -> Self {
        Self {
            translation: self.translation.lerp(rhs.translation, factor),
            rotation: self.rotation.lerp(rhs.rotation, factor),
            scale: self.scale.lerp(rhs.scale, factor),
        }
    }
}

impl Mul<Transform> for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Self::Output {
        // Parent scale is deliberately not applied to the child translation.
        Transform {
            translation: self.rotation.mul_vec3(rhs.translation) + self.translation,
            rotation: self.rotation * rhs.rotation,
            scale: self.scale * rhs.scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use glam::{quat, vec3};

    #[test]
    fn transform_to_matrix() {
        assert_eq!(
            Mat4::from_cols_array_2d(&[
                [4.0, 0.0, 0.0, 0.0],
                [0.0, -5.0, 0.0, 0.0],
                [0.0, 0.0, -6.0, 0.0],
                [1.0, 2.0, 3.0, 1.0],
            ]),
            Transform {
                translation: vec3(1.0, 2.0, 3.0),
                rotation: quat(1.0, 0.0, 0.0, 0.0),
                scale: vec3(4.0, 5.0, 6.0),
            }
            .to_matrix()
        );
    }

    #[test]
    fn transform_from_matrix() {
        assert_eq!(
            Transform {
                translation: vec3(1.0, 2.0, 3.0),
                rotation: quat(1.0, 0.0, 0.0, 0.0),
                scale: vec3(4.0, 5.0, 6.0),
            },
            Transform::from_matrix(Mat4::from_cols_array_2d(&[
                [4.0, 0.0, 0.0, 0.0],
                [0.0, -5.0, 0.0, 0.0],
                [0.0, 0.0, -6.0, 0.0],
                [1.0, 2.0, 3.0, 1.0],
            ]))
        );
    }

    #[test]
    fn lerp_endpoints() {
        let a = Transform {
            translation: vec3(1.0, 0.0, 0.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        };
        let b = Transform {
            translation: vec3(3.0, 2.0, 0.0),
            rotation: Quat::from_rotation_z(1.0),
            scale: vec3(2.0, 2.0, 2.0),
        };
        assert_eq!(a, a.lerp(b, 0.0));
        assert_eq!(b, a.lerp(b, 1.0));
    }

    #[test]
    fn lerp_halfway_translation_scale() {
        let a = Transform {
            translation: vec3(0.0, 0.0, 0.0),
            rotation: Quat::IDENTITY,
            scale: vec3(1.0, 1.0, 1.0),
        };
        let b = Transform {
            translation: vec3(2.0, 4.0, 6.0),
            rotation: Quat::IDENTITY,
            scale: vec3(3.0, 3.0, 3.0),
        };
        let mid = a.lerp(b, 0.5);
        assert_eq!(vec3(1.0, 2.0, 3.0), mid.translation);
        assert_eq!(vec3(2.0, 2.0, 2.0), mid.scale);
        assert_eq!(Quat::IDENTITY, mid.rotation);
    }

    #[test]
    fn lerp_rotation_stays_normalized() {
        let a = Transform::IDENTITY;
        let b = Transform {
            rotation: Quat::from_rotation_y(1.2),
            ..Transform::IDENTITY
        };
        let mid = a.lerp(b, 0.25);
        assert!(approx::relative_eq!(
            1.0,
            mid.rotation.length(),
            epsilon = 0.0001f32
        ));
    }
}
