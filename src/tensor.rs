use rand::{
    distributions::{Distribution, Uniform},
    Rng,
};

use crate::error::{Error, Result};

/// Largest tensor a layer may ask for, 4 GiB of `f32`.
pub const MAX_ELEMENTS: usize = 1 << 30;

/// Element count of `shape`, or an error when it overflows or exceeds
/// [`MAX_ELEMENTS`].
pub fn checked_numel(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .filter(|&n| n <= MAX_ELEMENTS)
        .ok_or_else(|| Error::TooLarge {
            shape: shape.to_vec(),
            limit: MAX_ELEMENTS,
        })
}

/// Host-side dense `float` tensor in row-major layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl Tensor {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Tensor {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "data length does not match shape {:?}",
            shape
        );
        Tensor { data, shape }
    }

    pub fn zeros(shape: Vec<usize>) -> Tensor {
        Tensor {
            data: vec![0.0; shape.iter().product()],
            shape,
        }
    }

    pub fn rand(shape: Vec<usize>) -> Tensor {
        Tensor::rand_with(shape, &mut rand::thread_rng())
    }

    pub fn rand_with<R: Rng + ?Sized>(shape: Vec<usize>, rng: &mut R) -> Tensor {
        let uniform = Uniform::new(-1.0, 1.0);
        let data: Vec<f32> = (0..shape.iter().product::<usize>())
            .map(|_| uniform.sample(&mut *rng))
            .collect();

        Tensor { data, shape }
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn rand_in_range() {
        let t = Tensor::rand(vec![2, 3, 4]);

        assert_eq!(t.numel(), 24);
        assert!(t.data.iter().all(|&x| (-1.0..1.0).contains(&x)));
    }

    #[test]
    fn seeded_rand_is_reproducible() {
        let a = Tensor::rand_with(vec![16], &mut StdRng::seed_from_u64(7));
        let b = Tensor::rand_with(vec![16], &mut StdRng::seed_from_u64(7));

        assert_eq!(a, b);
    }

    #[test]
    fn numel_is_checked() {
        assert_eq!(checked_numel(&[1, 3, 226, 226]).unwrap(), 3 * 226 * 226);
        assert_eq!(checked_numel(&[]).unwrap(), 1);
        assert!(matches!(
            checked_numel(&[1 << 32, 1 << 32, 1, 1]),
            Err(Error::TooLarge { .. })
        ));
        assert!(checked_numel(&[MAX_ELEMENTS, 2]).is_err());
    }

    #[test]
    #[should_panic]
    fn new_checks_length() {
        Tensor::new(vec![1.0, 2.0], vec![3]);
    }
}
