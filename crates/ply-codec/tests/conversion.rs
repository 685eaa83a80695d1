//! End-to-end conversion properties across the three formats

use splat_ply_codec::{
    convert, convert_with, detect_format, CodecError, DecodeBackend, GaussianPoint, RawCloud,
    SchemaKind, SourceFormat, TargetFormat, SPLAT_RECORD_SIZE,
};

fn make_raw(count: usize) -> Vec<u8> {
    let points = (0..count)
        .map(|i| {
            let t = i as f32 / count.max(1) as f32;
            GaussianPoint {
                position: [t * 6.0 - 3.0, (t * 5.0).sin() * 2.0, t * 0.5],
                scale: [-6.0 + 3.0 * t, -5.0 + t, -4.0 - t],
                rotation: [1.0 - 0.8 * t, 0.3 * t, -0.4 * t, 0.2],
                color: [t, 0.8 - 0.6 * t, 0.1 + 0.7 * t],
                opacity: 0.05 + 0.9 * t,
            }
        })
        .collect();
    RawCloud {
        points,
        schema: SchemaKind::Gaussian,
    }
    .write()
}

/// Record importance recomputed from serialized output bytes
fn record_importance(record: &[u8]) -> f32 {
    let sx = f32::from_le_bytes(record[12..16].try_into().unwrap());
    let sy = f32::from_le_bytes(record[16..20].try_into().unwrap());
    let sz = f32::from_le_bytes(record[20..24].try_into().unwrap());
    let alpha = record[27] as f32 / 255.0;
    sx * sy * sz * alpha
}

#[test]
fn detects_both_source_formats() {
    let raw = make_raw(40);
    assert_eq!(detect_format(&raw).unwrap(), SourceFormat::Raw);

    let compressed = convert(&raw, SourceFormat::Raw, TargetFormat::ChunkCompressed).unwrap();
    assert_eq!(
        detect_format(&compressed).unwrap(),
        SourceFormat::ChunkCompressed
    );
}

#[test]
fn splat_output_is_importance_ordered() {
    let raw = make_raw(500);
    for source in [
        (raw.clone(), SourceFormat::Raw),
        (
            convert(&raw, SourceFormat::Raw, TargetFormat::ChunkCompressed).unwrap(),
            SourceFormat::ChunkCompressed,
        ),
    ] {
        let splat = convert(&source.0, source.1, TargetFormat::Splat).unwrap();
        assert_eq!(splat.len(), 500 * SPLAT_RECORD_SIZE);

        let scores: Vec<f32> = splat
            .chunks_exact(SPLAT_RECORD_SIZE)
            .map(record_importance)
            .collect();
        for pair in scores.windows(2) {
            // Alpha-byte rounding can wiggle recomputed scores by a few
            // percent; the order must still be monotone within that.
            assert!(pair[0] >= pair[1] * 0.9, "{} < {}", pair[0], pair[1]);
        }
    }
}

#[test]
fn conversion_is_deterministic() {
    let raw = make_raw(300);
    let compressed = convert(&raw, SourceFormat::Raw, TargetFormat::ChunkCompressed).unwrap();

    let a = convert(&compressed, SourceFormat::ChunkCompressed, TargetFormat::Splat).unwrap();
    let b = convert(&compressed, SourceFormat::ChunkCompressed, TargetFormat::Splat).unwrap();
    assert_eq!(a, b, "same input must yield byte-identical output");

    let c = convert(&raw, SourceFormat::Raw, TargetFormat::Splat).unwrap();
    let d = convert(&raw, SourceFormat::Raw, TargetFormat::Splat).unwrap();
    assert_eq!(c, d);
}

#[test]
fn batch_and_scalar_backends_agree() {
    let raw = make_raw(777);
    let compressed = convert(&raw, SourceFormat::Raw, TargetFormat::ChunkCompressed).unwrap();
    let scalar = convert_with(
        &compressed,
        SourceFormat::ChunkCompressed,
        TargetFormat::Splat,
        DecodeBackend::Scalar,
    )
    .unwrap();
    let batch = convert_with(
        &compressed,
        SourceFormat::ChunkCompressed,
        TargetFormat::Splat,
        DecodeBackend::Batch,
    )
    .unwrap();
    assert_eq!(scalar, batch);
}

#[test]
fn compress_then_splat_tracks_direct_splat() {
    // Importance rises steeply with the point index here, so quantization
    // noise cannot reorder records between the two paths and the outputs
    // stay comparable row by row.
    let points = (0..256)
        .map(|i| {
            let t = i as f32 / 256.0;
            GaussianPoint {
                position: [t * 6.0 - 3.0, (t * 5.0).sin() * 2.0, t * 0.5],
                scale: [-8.0 + 6.0 * t; 3],
                rotation: [1.0 - 0.8 * t, 0.3 * t, -0.4 * t, 0.2],
                color: [t, 0.8 - 0.6 * t, 0.1 + 0.7 * t],
                opacity: 0.8,
            }
        })
        .collect();
    let raw = RawCloud {
        points,
        schema: SchemaKind::Gaussian,
    }
    .write();
    let direct = convert(&raw, SourceFormat::Raw, TargetFormat::Splat).unwrap();

    let compressed = convert(&raw, SourceFormat::Raw, TargetFormat::ChunkCompressed).unwrap();
    let via_compressed =
        convert(&compressed, SourceFormat::ChunkCompressed, TargetFormat::Splat).unwrap();

    assert_eq!(direct.len(), via_compressed.len());
    // Positions survive quantization within the 11/10/11-bit bounds of the
    // chunk ranges used above (a few units wide at most).
    for (a, b) in direct
        .chunks_exact(SPLAT_RECORD_SIZE)
        .zip(via_compressed.chunks_exact(SPLAT_RECORD_SIZE))
    {
        for k in 0..3 {
            let va = f32::from_le_bytes(a[4 * k..4 * k + 4].try_into().unwrap());
            let vb = f32::from_le_bytes(b[4 * k..4 * k + 4].try_into().unwrap());
            assert!((va - vb).abs() < 0.01, "axis {k}: {va} vs {vb}");
        }
        // Color bytes drift by at most one quantization step.
        for k in 24..28 {
            assert!((a[k] as i16 - b[k] as i16).abs() <= 3);
        }
    }
}

#[test]
fn garbage_input_yields_typed_errors() {
    assert!(matches!(
        convert(b"not a point cloud", SourceFormat::Raw, TargetFormat::Splat),
        Err(CodecError::MalformedHeader(_))
    ));

    let raw = make_raw(10);
    assert!(matches!(
        convert(&raw, SourceFormat::ChunkCompressed, TargetFormat::Splat),
        Err(CodecError::MissingElement(_))
    ));

    let compressed = convert(&raw, SourceFormat::Raw, TargetFormat::ChunkCompressed).unwrap();
    let truncated = &compressed[..compressed.len() - 8];
    assert!(matches!(
        convert(truncated, SourceFormat::ChunkCompressed, TargetFormat::Splat),
        Err(CodecError::TruncatedPayload { .. })
    ));
}
