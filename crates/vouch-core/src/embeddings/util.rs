use crate::errors::{EvalError, Result};
use sha2::{Digest, Sha256};

pub fn encode_vec_f32(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

pub fn decode_vec_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(EvalError::Storage(format!(
            "invalid embedding blob size {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Cache key for `(model, text)`. The text is hashed verbatim, no normalization.
pub fn embed_cache_key(model_id: &str, text: &str) -> String {
    format!("emb|{}|{}", model_id, sha256_hex(text))
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(EvalError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;

    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / denom).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() -> anyhow::Result<()> {
        let v = vec![0.1_f32, -0.2_f32, 3.5_f32];
        let blob = encode_vec_f32(&v);
        let out = decode_vec_f32(&blob)?;
        assert_eq!(v, out);
        assert!(decode_vec_f32(&blob[..5]).is_err());
        Ok(())
    }

    #[test]
    fn cosine_identical_is_one() -> anyhow::Result<()> {
        let a = vec![0.3_f32, -1.7, 2.2];
        let s = cosine_similarity(&a, &a)?;
        assert!((s - 1.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn cosine_opposite_and_orthogonal() -> anyhow::Result<()> {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0])? + 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 5.0])?.abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn cosine_zero_norm_is_zero() -> anyhow::Result<()> {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0])?, 0.0);
        assert_eq!(cosine_similarity(&[], &[])?, 0.0);
        Ok(())
    }

    #[test]
    fn cosine_rejects_mismatched_dims() {
        let err = cosine_similarity(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            EvalError::DimensionMismatch { left: 2, right: 1 }
        ));
    }

    #[test]
    fn cache_key_is_model_scoped() {
        assert_ne!(embed_cache_key("m1", "hi"), embed_cache_key("m2", "hi"));
        assert_ne!(embed_cache_key("m1", "hi"), embed_cache_key("m1", "hi "));
    }
}
