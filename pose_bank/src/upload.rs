use glam::Mat4;

/// Per-tick accumulator for sparse pose uploads.
///
/// Three parallel arrays grow together: one frame index per entry, one
/// `bone_count` matrix block per entry and one `curve_count` float block per
/// entry. Producers reserve entries and write into the blocks directly; the
/// whole accumulation is handed to the render backend once per tick as a
/// [ScatterBatch].
#[derive(Debug)]
pub struct UploadStage {
    bone_count: usize,
    curve_count: usize,
    frame_indices: Vec<u32>,
    bone_matrices: Vec<Mat4>,
    curve_values: Vec<f32>,
}

impl UploadStage {
    pub fn new(bone_count: usize, curve_count: usize) -> Self {
        Self {
            bone_count,
            curve_count,
            frame_indices: Vec::new(),
            bone_matrices: Vec::new(),
            curve_values: Vec::new(),
        }
    }

    /// Entries accumulated since the last [Self::take_batch].
    pub fn entry_count(&self) -> usize {
        self.frame_indices.len()
    }

    /// Grow all three arrays by `frame_count` entries and return the index
    /// of the first new entry for direct writing.
    pub fn reserve(&mut self, frame_count: usize) -> usize {
        let base = self.frame_indices.len();
        self.frame_indices.resize(base + frame_count, 0);
        self.bone_matrices
            .resize((base + frame_count) * self.bone_count, Mat4::IDENTITY);
        self.curve_values
            .resize((base + frame_count) * self.curve_count, 0.0);
        base
    }

    pub fn set_frame_index(&mut self, entry: usize, frame: u32) {
        self.frame_indices[entry] = frame;
    }

    /// Mutable access to the matrix and curve blocks of `frame_count`
    /// consecutive entries starting at `entry`.
    pub fn block_mut(&mut self, entry: usize, frame_count: usize) -> (&mut [Mat4], &mut [f32]) {
        let matrices =
            &mut self.bone_matrices[entry * self.bone_count..(entry + frame_count) * self.bone_count];
        let curves =
            &mut self.curve_values[entry * self.curve_count..(entry + frame_count) * self.curve_count];
        (matrices, curves)
    }

    /// Hand off everything accumulated this tick, leaving the stage empty.
    /// Returns `None` when the tick produced no entries, in which case no
    /// upload should be issued.
    pub fn take_batch(&mut self) -> Option<ScatterBatch> {
        if self.frame_indices.is_empty() {
            return None;
        }
        Some(ScatterBatch {
            bone_count: self.bone_count,
            curve_count: self.curve_count,
            frame_indices: std::mem::take(&mut self.frame_indices),
            bone_matrices: std::mem::take(&mut self.bone_matrices),
            curve_values: std::mem::take(&mut self.curve_values),
        })
    }
}

/// One tick's sparse pose upload, keyed by frame index.
///
/// The arrays are copies; the render backend never receives a live
/// reference into the bank's pose storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterBatch {
    bone_count: usize,
    curve_count: usize,
    pub frame_indices: Vec<u32>,
    pub bone_matrices: Vec<Mat4>,
    pub curve_values: Vec<f32>,
}

impl ScatterBatch {
    pub fn len(&self) -> usize {
        self.frame_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_indices.is_empty()
    }

    pub fn bone_count(&self) -> usize {
        self.bone_count
    }

    pub fn curve_count(&self) -> usize {
        self.curve_count
    }

    /// The matrix block for entry `entry`.
    pub fn matrices(&self, entry: usize) -> &[Mat4] {
        &self.bone_matrices[entry * self.bone_count..(entry + 1) * self.bone_count]
    }

    /// The curve block for entry `entry`.
    pub fn curves(&self, entry: usize) -> &[f32] {
        &self.curve_values[entry * self.curve_count..(entry + 1) * self.curve_count]
    }

    /// The matrix block as bytes for writing into a GPU buffer.
    pub fn matrix_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.bone_matrices)
    }

    /// The curve block as bytes for writing into a GPU buffer.
    pub fn curve_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.curve_values)
    }
}
