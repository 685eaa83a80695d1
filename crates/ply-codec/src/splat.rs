//! Flat splat-record output
//!
//! Converts decoded points into the fixed 32-byte record format, ordered
//! by descending importance so high-impact splats render first. The
//! per-record transform reads shared input and writes disjoint rows, so it
//! fans out across rayon workers.

use rayon::prelude::*;

use crate::packing::{
    importance, normalize_quat, quat_component_to_byte, unorm_to_byte, SCALE_EXP_CLAMP,
};
use crate::raw::GaussianPoint;

/// Bytes per output record: 3xf32 position, 3xf32 scale, rgba, rotation
pub const SPLAT_RECORD_SIZE: usize = 32;

/// Point indices sorted by importance descending; ties keep the original
/// order (ascending index) so conversion output is deterministic.
#[must_use]
pub fn order_by_importance(points: &[GaussianPoint]) -> Vec<u32> {
    let scores: Vec<f32> = points
        .par_iter()
        .map(|p| importance(p.scale, p.opacity))
        .collect();
    sorted_indices(&scores)
}

/// Shared tie-break rule for both backends
#[must_use]
pub fn sorted_indices(scores: &[f32]) -> Vec<u32> {
    let mut order: Vec<u32> = (0..scores.len() as u32).collect();
    order.sort_unstable_by(|&a, &b| {
        scores[b as usize]
            .total_cmp(&scores[a as usize])
            .then(a.cmp(&b))
    });
    order
}

/// Serialize one point into a 32-byte record
pub fn write_record(p: &GaussianPoint, out: &mut [u8]) {
    debug_assert_eq!(out.len(), SPLAT_RECORD_SIZE);

    out[0..4].copy_from_slice(&p.position[0].to_le_bytes());
    out[4..8].copy_from_slice(&p.position[1].to_le_bytes());
    out[8..12].copy_from_slice(&p.position[2].to_le_bytes());

    out[12..16].copy_from_slice(&p.scale[0].min(SCALE_EXP_CLAMP).exp().to_le_bytes());
    out[16..20].copy_from_slice(&p.scale[1].min(SCALE_EXP_CLAMP).exp().to_le_bytes());
    out[20..24].copy_from_slice(&p.scale[2].min(SCALE_EXP_CLAMP).exp().to_le_bytes());

    out[24] = unorm_to_byte(p.color[0]);
    out[25] = unorm_to_byte(p.color[1]);
    out[26] = unorm_to_byte(p.color[2]);
    out[27] = unorm_to_byte(p.opacity);

    let q = normalize_quat(p.rotation);
    out[28] = quat_component_to_byte(q[0]);
    out[29] = quat_component_to_byte(q[1]);
    out[30] = quat_component_to_byte(q[2]);
    out[31] = quat_component_to_byte(q[3]);
}

/// Build the full splat buffer from decoded points, importance-ordered
#[must_use]
pub fn build_splat_buffer(points: &[GaussianPoint]) -> Vec<u8> {
    let order = order_by_importance(points);
    let mut buffer = vec![0u8; points.len() * SPLAT_RECORD_SIZE];
    buffer
        .par_chunks_mut(SPLAT_RECORD_SIZE)
        .enumerate()
        .for_each(|(row, record)| {
            write_record(&points[order[row] as usize], record);
        });
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packing::normalize_quat;

    fn point(scale: f32, opacity: f32) -> GaussianPoint {
        GaussianPoint {
            position: [0.0, 0.0, 0.0],
            scale: [scale; 3],
            rotation: [1.0, 0.0, 0.0, 0.0],
            color: [0.5, 0.5, 0.5],
            opacity,
        }
    }

    #[test]
    fn test_output_ordered_by_descending_importance() {
        let points = vec![point(-6.0, 0.1), point(-1.0, 0.9), point(-3.0, 0.5)];
        let order = order_by_importance(&points);
        assert_eq!(order, vec![1, 2, 0]);

        let buffer = build_splat_buffer(&points);
        assert_eq!(buffer.len(), 3 * SPLAT_RECORD_SIZE);
        // Biggest splat's scale lands in row 0.
        let s0 = f32::from_le_bytes(buffer[12..16].try_into().unwrap());
        assert!((s0 - (-1.0f32).exp()).abs() < 1e-6);
    }

    #[test]
    fn test_ties_break_by_original_index() {
        let points = vec![point(-2.0, 0.5); 4];
        assert_eq!(order_by_importance(&points), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_record_layout() {
        let p = GaussianPoint {
            position: [1.0, 2.0, 3.0],
            scale: [0.0, 0.0, 0.0],
            rotation: normalize_quat([1.0, 0.0, 0.0, 0.0]),
            color: [1.0, 0.0, 0.5],
            opacity: 1.0,
        };
        let mut record = [0u8; SPLAT_RECORD_SIZE];
        write_record(&p, &mut record);

        assert_eq!(f32::from_le_bytes(record[0..4].try_into().unwrap()), 1.0);
        assert_eq!(f32::from_le_bytes(record[12..16].try_into().unwrap()), 1.0);
        assert_eq!(record[24], 255);
        assert_eq!(record[25], 0);
        assert_eq!(record[26], 128);
        assert_eq!(record[27], 255);
        // Identity rotation maps to (255, 128, 128, 128).
        assert_eq!(&record[28..32], &[255, 128, 128, 128]);
    }

    #[test]
    fn test_extreme_scale_does_not_overflow() {
        let p = point(400.0, 1.0);
        let mut record = [0u8; SPLAT_RECORD_SIZE];
        write_record(&p, &mut record);
        let s = f32::from_le_bytes(record[12..16].try_into().unwrap());
        assert!(s.is_finite());
    }
}
