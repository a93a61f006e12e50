//! Facelock Vault - Recognition Collaborator Boundary
//!
//! Face detection and embedding extraction live outside this crate. The vault
//! only consumes the resulting vectors, so the collaborator is a trait plus
//! two small pure helpers for candidate selection and identity matching.

use serde::{Deserialize, Serialize};

use crate::error::VaultResult;
use crate::store::EnrollmentImage;

/// Maximum L2 distance between embeddings of the same person. Anything
/// farther is treated as a different face.
pub const DISTANCE_THRESHOLD: f32 = 0.7;

/// Face location within an image, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// External recognition component: image in, one embedding per detected face
/// out. Implementations wrap whatever model the deployment ships.
pub trait FaceRecognizer {
    fn detect_and_embed(
        &self,
        image: &EnrollmentImage,
    ) -> VaultResult<Vec<(BoundingBox, Vec<f32>)>>;
}

/// Pick one face from the detection result. A single candidate short-circuits;
/// multiple candidates are delegated to the caller's chooser (the UI layer).
pub fn select_one<F>(
    mut candidates: Vec<(BoundingBox, Vec<f32>)>,
    chooser: F,
) -> Option<Vec<f32>>
where
    F: FnOnce(&[(BoundingBox, Vec<f32>)]) -> Option<usize>,
{
    match candidates.len() {
        0 => None,
        1 => Some(candidates.remove(0).1),
        _ => {
            let idx = chooser(&candidates)?;
            if idx < candidates.len() {
                Some(candidates.remove(idx).1)
            } else {
                None
            }
        }
    }
}

/// L2 distance between two embeddings. Mismatched lengths compare as
/// infinitely far apart.
pub fn embedding_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(v: Vec<f32>) -> (BoundingBox, Vec<f32>) {
        (
            BoundingBox {
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            },
            v,
        )
    }

    #[test]
    fn test_select_one_short_circuits_single() {
        let chosen = select_one(vec![boxed(vec![1.0])], |_| {
            panic!("chooser must not run for a single candidate")
        });
        assert_eq!(chosen, Some(vec![1.0]));
    }

    #[test]
    fn test_select_one_empty() {
        assert_eq!(select_one(vec![], |_| Some(0)), None);
    }

    #[test]
    fn test_select_one_delegates_multiple() {
        let chosen = select_one(vec![boxed(vec![1.0]), boxed(vec![2.0])], |c| {
            assert_eq!(c.len(), 2);
            Some(1)
        });
        assert_eq!(chosen, Some(vec![2.0]));

        let declined = select_one(vec![boxed(vec![1.0]), boxed(vec![2.0])], |_| None);
        assert_eq!(declined, None);
    }

    #[test]
    fn test_distance() {
        assert_eq!(embedding_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(embedding_distance(&[1.0], &[1.0, 2.0]), f32::INFINITY);
    }
}
