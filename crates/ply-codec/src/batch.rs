//! Batch-vectorized decode backend
//!
//! Decodes a whole compressed cloud in staged column passes (decode,
//! importance, serialize) instead of the scalar per-point loop. Both
//! backends go through the shared arithmetic in [`crate::packing`], so
//! their outputs are byte-identical for the same input.
//!
//! The rotation pass resolves the elided-component index per point with an
//! exhaustive match; a mask-per-case formulation can write entries twice
//! when case masks overlap, which the equivalence tests here would catch.

use rayon::prelude::*;

use crate::chunked::CompressedCloud;
use crate::packing::importance;
use crate::raw::GaussianPoint;
use crate::splat::{sorted_indices, write_record, SPLAT_RECORD_SIZE};

/// Build the splat buffer from a compressed cloud in whole-set passes
#[must_use]
pub fn build_splat_buffer_batch(cloud: &CompressedCloud) -> Vec<u8> {
    // Decode pass: all points into a column of decoded attributes.
    let decoded: Vec<GaussianPoint> = (0..cloud.vertices.len())
        .into_par_iter()
        .map(|i| cloud.decode_point(i))
        .collect();

    // Importance pass over the decoded columns.
    let scores: Vec<f32> = decoded
        .par_iter()
        .map(|p| importance(p.scale, p.opacity))
        .collect();
    let order = sorted_indices(&scores);

    // Serialize pass: one fixed-stride record per point, reordered.
    let mut buffer = vec![0u8; decoded.len() * SPLAT_RECORD_SIZE];
    buffer
        .par_chunks_mut(SPLAT_RECORD_SIZE)
        .enumerate()
        .for_each(|(row, record)| {
            write_record(&decoded[order[row] as usize], record);
        });
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunked::{compress, decompress};
    use crate::raw::{RawCloud, SchemaKind};
    use crate::splat::build_splat_buffer;

    fn fixture(count: usize) -> CompressedCloud {
        let points = (0..count)
            .map(|i| {
                let t = i as f32 / count.max(1) as f32;
                GaussianPoint {
                    position: [t * 8.0, -t * 2.0, (t * 11.0).sin()],
                    scale: [-5.0 + t, -4.0 + 2.0 * t, -3.0 - t],
                    rotation: crate::packing::normalize_quat([
                        0.2 + t,
                        -0.7 * t,
                        0.4,
                        1.0 - t,
                    ]),
                    color: [t, 1.0 - t, 0.3],
                    opacity: 0.05 + 0.9 * t,
                }
            })
            .collect();
        compress(&RawCloud {
            points,
            schema: SchemaKind::Gaussian,
        })
    }

    #[test]
    fn test_batch_matches_scalar_exactly() {
        let compressed = fixture(700);
        let scalar = build_splat_buffer(&decompress(&compressed).points);
        let batch = build_splat_buffer_batch(&compressed);
        assert_eq!(scalar, batch);
    }

    #[test]
    fn test_batch_handles_every_elided_component_case() {
        // One dominant component per case, including negatives.
        let quats = [
            [0.9f32, 0.2, 0.1, 0.3],
            [0.1, -0.95, 0.2, 0.1],
            [0.2, 0.1, 0.9, -0.3],
            [-0.1, 0.2, 0.3, 0.92],
        ];
        let points: Vec<GaussianPoint> = quats
            .iter()
            .map(|&q| GaussianPoint {
                position: [0.0; 3],
                scale: [-4.0; 3],
                rotation: crate::packing::normalize_quat(q),
                color: [0.5; 3],
                opacity: 0.5,
            })
            .collect();
        let compressed = compress(&RawCloud {
            points,
            schema: SchemaKind::Gaussian,
        });

        let scalar = build_splat_buffer(&decompress(&compressed).points);
        let batch = build_splat_buffer_batch(&compressed);
        assert_eq!(scalar, batch);

        // Every rotation byte quadruple should be a unit-ish quaternion,
        // written exactly once per record.
        for record in batch.chunks_exact(SPLAT_RECORD_SIZE) {
            let q: Vec<f32> = record[28..32]
                .iter()
                .map(|&b| (b as f32 - 128.0) / 128.0)
                .collect();
            let len: f32 = q.iter().map(|c| c * c).sum::<f32>().sqrt();
            assert!((len - 1.0).abs() < 0.05, "rotation bytes {:?}", &record[28..32]);
        }
    }
}
