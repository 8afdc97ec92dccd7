use glam::Mat4;

use crate::Transform;

/// The bone hierarchy shared by every sequence and pose in a bank.
#[derive(Debug, PartialEq, Clone)]
pub struct Skeleton {
    /// The hierarchy of bones. Bones must appear after their parents.
    pub bones: Vec<Bone>,
}

/// A single node in the skeleton hierarchy.
#[derive(Debug, PartialEq, Clone)]
pub struct Bone {
    /// The name used by external drivers to identify this bone.
    pub name: String,
    /// The local rest transform of the bone relative to its parent.
    pub transform: Transform,
    /// The index of the parent [Bone] in [bones](struct.Skeleton.html#structfield.bones)
    /// or `None` if this is a root bone.
    pub parent_index: Option<usize>,
}

impl Skeleton {
    /// The rest transform for each bone in component space
    /// by recursively applying the parent transform.
    ///
    /// This is also known as the bone's "rest pose" or "bind pose".
    pub fn model_space_transforms(&self) -> Vec<Transform> {
        let mut final_transforms: Vec<_> = self.bones.iter().map(|b| b.transform).collect();

        for i in 0..final_transforms.len() {
            if let Some(parent) = self.bones[i].parent_index {
                final_transforms[i] = final_transforms[parent] * self.bones[i].transform;
            }
        }

        final_transforms
    }

    /// The inverse of each bone's rest transform in component space.
    pub fn inverse_bind_matrices(&self) -> Vec<Mat4> {
        self.model_space_transforms()
            .into_iter()
            .map(|t| t.to_matrix().inverse())
            .collect()
    }

}

/// Compute the matrix for each bone that transforms a vertex in component
/// space to its posed position in component space.
///
/// `local_pose` holds one bone-local transform per bone and `inverse_bind`
/// the matrices from [Skeleton::inverse_bind_matrices]. The result can be
/// used directly for linear blend skinning in a vertex shader.
pub fn skinning_matrices(
    skeleton: &Skeleton,
    local_pose: &[Transform],
    inverse_bind: &[Mat4],
    out: &mut [Mat4],
) {
    let mut model_space: Vec<_> = local_pose.to_vec();
    for i in 0..model_space.len() {
        if let Some(parent) = skeleton.bones[i].parent_index {
            model_space[i] = model_space[parent] * local_pose[i];
        }
    }

    for ((out, transform), inverse_bind) in out.iter_mut().zip(&model_space).zip(inverse_bind) {
        *out = transform.to_matrix() * *inverse_bind;
    }
}
