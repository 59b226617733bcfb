// OgmaNeo actor - SparseMatrix (receptive-field-restricted weights over one-hot inputs)

use crate::helpers::*;

/// Compressed-row weight matrix with a fixed sparsity pattern.
///
/// Row `r` owns the entries `row_ranges[r]..row_ranges[r + 1]`. Within a row the
/// entries of one input column are contiguous and ordered by input state, so a
/// one-hot input selects exactly one entry per `one_hot_size` block.
#[derive(Clone, Debug, Default)]
pub struct SparseMatrix {
    pub non_zero_values: FloatBuffer,
    pub row_ranges: Vec<usize>,
    pub column_indices: Vec<usize>,
}

impl SparseMatrix {
    pub fn num_rows(&self) -> usize {
        self.row_ranges.len().saturating_sub(1)
    }

    /// Number of connected (input column, state) entries feeding `row`.
    pub fn count(&self, row: usize) -> usize {
        self.row_ranges[row + 1] - self.row_ranges[row]
    }

    /// Sum of the weights selected by the active state of each connected input column.
    pub fn multiply_ohvs(&self, non_zero_indices: &[i32], row: usize, one_hot_size: usize) -> f32 {
        let mut sum = 0.0f32;

        for j in (self.row_ranges[row]..self.row_ranges[row + 1]).step_by(one_hot_size) {
            let i = self.column_indices[j] / one_hot_size;
            sum += self.non_zero_values[j + non_zero_indices[i] as usize];
        }

        sum
    }

    /// Adds `delta` to every weight selected by the one-hot input for `row`.
    pub fn delta_ohvs(&mut self, non_zero_indices: &[i32], delta: f32, row: usize, one_hot_size: usize) {
        for j in (self.row_ranges[row]..self.row_ranges[row + 1]).step_by(one_hot_size) {
            let i = self.column_indices[j] / one_hot_size;
            self.non_zero_values[j + non_zero_indices[i] as usize] += delta;
        }
    }
}

/// Wires every output cell to the input cells inside a square field of `radius`
/// around its projected center. All weights start at zero.
pub fn init_local_rf(in_size: Int3, out_size: Int3, radius: i32) -> SparseMatrix {
    let num_out = out_size.num_columns() * out_size.z as usize;
    let diam = (radius * 2 + 1) as usize;

    let mut row_ranges = Vec::with_capacity(num_out + 1);
    let mut column_indices = Vec::with_capacity(num_out * diam * diam * in_size.z as usize);

    row_ranges.push(0);

    let out_to_in = Float2::new(
        in_size.x as f32 / out_size.x as f32,
        in_size.y as f32 / out_size.y as f32,
    );

    // rows are visited in address3 order: x outer, then y, then z
    for ox in 0..out_size.x {
        for oy in 0..out_size.y {
            let in_center = project(Int2::new(ox, oy), out_to_in);
            let field_lower_bound = Int2::new(in_center.x - radius, in_center.y - radius);
            let iter_lower_bound =
                Int2::new(field_lower_bound.x.max(0), field_lower_bound.y.max(0));
            let iter_upper_bound = Int2::new(
                (in_center.x + radius).min(in_size.x - 1),
                (in_center.y + radius).min(in_size.y - 1),
            );

            for _oz in 0..out_size.z {
                for ix in iter_lower_bound.x..=iter_upper_bound.x {
                    for iy in iter_lower_bound.y..=iter_upper_bound.y {
                        for iz in 0..in_size.z {
                            column_indices.push(address3(Int3::new(ix, iy, iz), in_size));
                        }
                    }
                }

                row_ranges.push(column_indices.len());
            }
        }
    }

    let non_zero_values = vec![0.0f32; column_indices.len()];

    SparseMatrix {
        non_zero_values,
        row_ranges,
        column_indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_rf_row_layout() {
        let in_size = Int3::new(4, 4, 3);
        let mat = init_local_rf(in_size, Int3::new(2, 2, 5), 1);

        assert_eq!(mat.num_rows(), 2 * 2 * 5);
        assert_eq!(mat.non_zero_values.len(), *mat.row_ranges.last().unwrap());

        for row in 0..mat.num_rows() {
            // whole input columns only
            assert_eq!(mat.count(row) % in_size.z as usize, 0);
            assert!(mat.count(row) > 0);
        }

        // cells of one output column share their field
        let first = &mat.column_indices[mat.row_ranges[0]..mat.row_ranges[1]];
        let second = &mat.column_indices[mat.row_ranges[1]..mat.row_ranges[2]];
        assert_eq!(first, second);
    }

    #[test]
    fn local_rf_clips_at_borders() {
        // 1x1 output over a 3x3 input: center (1,1), radius 1 covers everything
        let full = init_local_rf(Int3::new(3, 3, 2), Int3::new(1, 1, 1), 1);
        assert_eq!(full.count(0), 3 * 3 * 2);

        // corner output of a 3x3 grid onto a 3x3 input only sees a 2x2 patch
        let clipped = init_local_rf(Int3::new(3, 3, 2), Int3::new(3, 3, 1), 1);
        assert_eq!(clipped.count(0), 2 * 2 * 2);
        assert_eq!(clipped.count(4), 3 * 3 * 2);
    }

    #[test]
    fn one_hot_multiply_and_delta_touch_active_states_only() {
        let in_size = Int3::new(2, 1, 3);
        let mut mat = init_local_rf(in_size, Int3::new(1, 1, 1), 1);
        assert_eq!(mat.count(0), 6);

        let inputs = [2, 0];
        mat.delta_ohvs(&inputs, 0.5, 0, 3);

        assert_eq!(mat.multiply_ohvs(&inputs, 0, 3), 1.0);
        assert_eq!(mat.multiply_ohvs(&[1, 1], 0, 3), 0.0);
        assert_eq!(mat.multiply_ohvs(&[2, 1], 0, 3), 0.5);

        let touched = mat.non_zero_values.iter().filter(|&&w| w != 0.0).count();
        assert_eq!(touched, 2);
    }
}
