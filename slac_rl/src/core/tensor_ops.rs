//! Host/device conversion helpers shared by the learners.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};

/// Build a tensor from a flat host buffer.
pub fn from_vec<B: Backend, const D: usize>(
    values: Vec<f32>,
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    Tensor::from_data(TensorData::new(values, shape), device)
}

/// Copy a tensor back to the host as `f32`.
pub fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

/// Extract a single-element tensor as `f32`.
pub fn scalar<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}

/// Returns true when every element is finite.
pub fn all_finite<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> bool {
    to_vec(tensor).iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_round_trip_preserves_layout() {
        let device = Default::default();
        let t: Tensor<B, 3> = from_vec((0..12).map(|v| v as f32).collect(), [2, 3, 2], &device);
        assert_eq!(t.dims(), [2, 3, 2]);
        let second_row: Vec<f32> = to_vec(t.slice([0..1, 1..2, 0..2]));
        assert_eq!(second_row, vec![2.0, 3.0]);
    }

    #[test]
    fn test_scalar_and_finite() {
        let device = Default::default();
        let t: Tensor<B, 1> = Tensor::from_floats([1.0, 3.0], &device);
        assert!((scalar(t.clone().mean()) - 2.0).abs() < 1e-6);
        assert!(all_finite(t.clone()));
        assert!(!all_finite(t.log().mul_scalar(f32::INFINITY)));
    }
}
