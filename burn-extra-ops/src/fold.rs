//! # Fold (overlap-add)
//!
//! Reconstructs a `[batch, channels, height, width]` grid from sliding-window columns
//! `[batch, channels * kh * kw, blocks]`, summing the contributions of overlapping
//! windows. This is the adjoint of Burn's `unfold4d` and follows the same column
//! layout: channel `c`, kernel row `i` and kernel column `j` live in column channel
//! `c * kh * kw + i * kw + j`, and blocks are ordered row-major.
//!
//! Burn computes `unfold4d` as a convolution with a one-hot kernel; fold is the
//! matching transposed convolution with the same kernel, grouped per channel.

use burn::{
    prelude::*,
    tensor::{module::conv_transpose2d, ops::ConvTransposeOptions},
};

/// Sliding-window geometry for [`fold4d`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fold4dOptions {
    /// Window size `[kh, kw]`.
    pub kernel_size: [usize; 2],
    /// Window stride `[sh, sw]`.
    pub stride: [usize; 2],
    /// Implicit zero padding `[ph, pw]` on both sides of the output.
    pub padding: [usize; 2],
}

impl Fold4dOptions {
    pub const fn new(kernel_size: [usize; 2], stride: [usize; 2], padding: [usize; 2]) -> Self {
        Self {
            kernel_size,
            stride,
            padding,
        }
    }

    /// Number of sliding blocks `[blocks_h, blocks_w]` that fit into `output_size`.
    ///
    /// Returns `None` when the window does not fit into the padded output or when a
    /// stride is zero.
    pub fn num_blocks(&self, output_size: [usize; 2]) -> Option<[usize; 2]> {
        let blocks = |dim: usize| {
            let padded = output_size[dim] + 2 * self.padding[dim];
            if self.stride[dim] == 0 || padded < self.kernel_size[dim] {
                None
            } else {
                Some((padded - self.kernel_size[dim]) / self.stride[dim] + 1)
            }
        };
        Some([blocks(0)?, blocks(1)?])
    }
}

/// Sums sliding-window columns back into a spatial grid.
///
/// # Shapes
/// - columns: `[batch, channels * kh * kw, blocks_h * blocks_w]`
/// - output: `[batch, channels, output_size[0], output_size[1]]`
///
/// Output positions that no window covers are zero.
///
/// # Panics
/// If the column channel count is not a multiple of the kernel area, or if the number
/// of columns differs from [`Fold4dOptions::num_blocks`] for `output_size`.
pub fn fold4d<B: Backend>(
    columns: Tensor<B, 3>,
    output_size: [usize; 2],
    options: Fold4dOptions,
) -> Tensor<B, 4> {
    let [batch, column_channels, num_columns] = columns.dims();
    let [kh, kw] = options.kernel_size;
    let kernel_area = kh * kw;

    assert!(
        kernel_area > 0 && column_channels % kernel_area == 0,
        "fold4d: {column_channels} column channels are not a multiple of the kernel area {kernel_area}"
    );
    let Some([blocks_h, blocks_w]) = options.num_blocks(output_size) else {
        panic!("fold4d: kernel {:?} does not fit output {output_size:?}", options.kernel_size);
    };
    assert_eq!(
        num_columns,
        blocks_h * blocks_w,
        "fold4d: expected {blocks_h}x{blocks_w} columns for output {output_size:?}"
    );

    let channels = column_channels / kernel_area;
    let device = columns.device();

    // One-hot kernel: column channel `c * k² + o` writes kernel offset `o` of channel `c`.
    let mut weights = vec![0.0_f32; column_channels * kernel_area];
    for row in 0..column_channels {
        weights[row * kernel_area + row % kernel_area] = 1.0;
    }
    let weight = Tensor::<B, 4>::from_data(
        TensorData::new(weights, [column_channels, 1, kh, kw]).convert::<B::FloatElem>(),
        &device,
    );

    // A transposed convolution yields `(blocks - 1) * stride - 2 * padding + kernel`;
    // the remainder up to `output_size` is always smaller than the stride.
    let padding_out = |dim: usize, blocks: usize| {
        let natural = ((blocks - 1) * options.stride[dim] + options.kernel_size[dim])
            .checked_sub(2 * options.padding[dim])
            .unwrap_or_else(|| panic!("fold4d: padding {:?} exceeds the window", options.padding));
        output_size[dim] - natural
    };
    let padding_out = [padding_out(0, blocks_h), padding_out(1, blocks_w)];

    let x = columns.reshape([batch, column_channels, blocks_h, blocks_w]);
    conv_transpose2d(
        x,
        weight,
        None,
        ConvTransposeOptions::new(
            options.stride,
            options.padding,
            padding_out,
            [1, 1],
            channels,
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::NdArray,
        tensor::{module::unfold4d, ops::UnfoldOptions, Distribution},
    };

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_num_blocks() {
        let options = Fold4dOptions::new([3, 3], [2, 2], [1, 1]);
        assert_eq!(options.num_blocks([28, 28]), Some([14, 14]));

        let options = Fold4dOptions::new([7, 7], [4, 4], [2, 2]);
        assert_eq!(options.num_blocks([224, 224]), Some([56, 56]));

        let options = Fold4dOptions::new([9, 9], [1, 1], [0, 0]);
        assert_eq!(options.num_blocks([4, 4]), None);
    }

    #[test]
    fn test_fold_sums_overlaps() {
        let device = Default::default();
        let options = Fold4dOptions::new([3, 3], [2, 2], [1, 1]);
        let columns = Tensor::<TestBackend, 3>::ones([1, 9, 4], &device);

        let output = fold4d(columns, [4, 4], options);
        assert_eq!(output.dims(), [1, 1, 4, 4]);

        // Row coverage is [1, 2, 1, 1], and so is column coverage.
        let values = output.to_data().to_vec::<f32>().unwrap();
        assert_eq!(values[0], 1.0);
        assert_eq!(values[1], 2.0);
        assert_eq!(values[5], 4.0);
        assert_eq!(values[15], 1.0);
        assert_eq!(values.iter().sum::<f32>(), 25.0);
    }

    #[test]
    fn test_fold_inverts_non_overlapping_unfold() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::random([2, 3, 6, 6], Distribution::Default, &device);

        let columns = unfold4d(x.clone(), [2, 2], UnfoldOptions::new([2, 2], [0, 0], [1, 1]));
        assert_eq!(columns.dims(), [2, 12, 9]);

        let folded = fold4d(columns, [6, 6], Fold4dOptions::new([2, 2], [2, 2], [0, 0]));
        let diff = (folded - x).abs().max().into_scalar();
        assert!(diff < 1e-6, "fold did not invert unfold: max diff {diff}");
    }

    #[test]
    fn test_fold_upsamples_by_stride() {
        let device = Default::default();
        let options = Fold4dOptions::new([7, 7], [4, 4], [2, 2]);
        let columns = Tensor::<TestBackend, 3>::ones([1, 2 * 49, 8 * 8], &device);

        let output = fold4d(columns, [32, 32], options);
        assert_eq!(output.dims(), [1, 2, 32, 32]);
    }

    #[test]
    #[should_panic]
    fn test_fold_rejects_wrong_column_count() {
        let device = Default::default();
        let columns = Tensor::<TestBackend, 3>::ones([1, 9, 5], &device);
        let _ = fold4d(columns, [4, 4], Fold4dOptions::new([3, 3], [2, 2], [1, 1]));
    }
}
