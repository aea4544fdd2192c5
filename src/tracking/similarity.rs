use ndarray::prelude::*;

use crate::tracking::{BBox, Ltrb};

/// Areas below this are treated as "no size signal".
pub const AREA_EPSILON: f32 = 1e-4;

/// Compute intersection over union.
///
/// Parameters
/// ----------
/// a, b : boxes in `(left, top, right, bottom)` format.
///
/// Returns
/// -------
/// f32
///     The intersection over union in [0, 1]. Disjoint, edge-touching and
///     zero-area boxes score 0.
pub fn iou(a: &BBox<Ltrb>, b: &BBox<Ltrb>) -> f32 {
    let (area_a, area_b) = (a.area(), b.area());
    if area_a <= 0.0 || area_b <= 0.0 {
        return 0.0;
    }

    let i_xmin = a.left().max(b.left());
    let i_ymin = a.top().max(b.top());

    let i_xmax = a.right().min(b.right());
    let i_ymax = a.bottom().min(b.bottom());

    let intersection_area = (i_xmax - i_xmin).max(0.0) * (i_ymax - i_ymin).max(0.0);
    let union = area_a + area_b - intersection_area;

    if intersection_area <= 0.0 || union <= 0.0 {
        0.0
    } else {
        (intersection_area / union).min(1.0)
    }
}

/// Euclidean distance between box centers. At most `√2` for normalized boxes.
#[inline]
pub fn centroid_distance(a: &BBox<Ltrb>, b: &BBox<Ltrb>) -> f32 {
    let (ax, ay) = a.center();
    let (bx, by) = b.center();

    ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
}

/// `min / max` of the two box areas, or 0 when either is degenerate.
#[inline]
pub fn area_ratio(a: &BBox<Ltrb>, b: &BBox<Ltrb>) -> f32 {
    ratio_of_areas(a.area(), b.area())
}

/// [`area_ratio`] for precomputed areas.
pub fn ratio_of_areas(area_a: f32, area_b: f32) -> f32 {
    if !(area_a >= AREA_EPSILON) || !(area_b >= AREA_EPSILON) {
        return 0.0;
    }

    area_a.min(area_b) / area_a.max(area_b)
}

/// Classic unit-cost edit distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }

    if b.is_empty() {
        return a.len();
    }

    let mut dp = Array2::<usize>::zeros((a.len() + 1, b.len() + 1));

    for i in 0..=a.len() {
        dp[(i, 0)] = i;
    }

    for j in 0..=b.len() {
        dp[(0, j)] = j;
    }

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let substitution = if a[i - 1] == b[j - 1] { 0 } else { 1 };

            dp[(i, j)] = (dp[(i - 1, j)] + 1)
                .min(dp[(i, j - 1)] + 1)
                .min(dp[(i - 1, j - 1)] + substitution);
        }
    }

    dp[(a.len(), b.len())]
}

/// Normalized label similarity in [0, 1], case and surrounding whitespace insensitive.
/// Empty labels never match anything.
pub fn label_similarity(a: &str, b: &str) -> f32 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    if a == b {
        return 1.0;
    }

    let max_len = a.chars().count().max(b.chars().count());

    1.0 - levenshtein(&a, &b) as f32 / max_len as f32
}

/// [`label_similarity`] over optional labels; a missing label scores 0.
#[inline]
pub fn optional_label_similarity(a: Option<&str>, b: Option<&str>) -> f32 {
    match (a, b) {
        (Some(a), Some(b)) => label_similarity(a, b),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn px(l: f32, t: f32, r: f32, b: f32) -> BBox<Ltrb> {
        BBox::from_pixels([l, t, r, b], 1000.0, 1000.0)
    }

    #[test]
    fn iou_partial_overlap() {
        let a = BBox::ltrb(0.0, 0.0, 0.1, 0.1);
        let b = BBox::ltrb(0.05, 0.05, 0.15, 0.15);
        assert_abs_diff_eq!(iou(&a, &b), 0.0025 / 0.0175, epsilon = 1e-4);
        assert_abs_diff_eq!(iou(&a, &a), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn iou_disjoint_touching_and_degenerate() {
        let a = BBox::ltrb(0.0, 0.0, 0.1, 0.1);
        assert_eq!(iou(&a, &BBox::ltrb(0.5, 0.5, 0.6, 0.6)), 0.0);
        assert_eq!(iou(&a, &BBox::ltrb(0.1, 0.0, 0.2, 0.1)), 0.0);
        assert_eq!(iou(&a, &BBox::ltrb(0.05, 0.05, 0.05, 0.09)), 0.0);
    }

    #[test]
    fn centroid_distance_spans_diagonal() {
        let a = BBox::ltrb(0.0, 0.0, 0.0, 0.0);
        let b = BBox::ltrb(1.0, 1.0, 1.0, 1.0);
        assert_abs_diff_eq!(centroid_distance(&a, &b), 2f32.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn area_ratio_examples() {
        let a = px(0.0, 0.0, 200.0, 200.0);
        assert_abs_diff_eq!(area_ratio(&a, &px(0.0, 0.0, 400.0, 400.0)), 0.25, epsilon = 1e-5);
        assert_abs_diff_eq!(area_ratio(&a, &px(0.0, 0.0, 210.0, 210.0)), 40000.0 / 44100.0, epsilon = 1e-5);
        assert_eq!(ratio_of_areas(0.00001, 0.5), 0.0);
        assert_eq!(ratio_of_areas(f32::NAN, 0.5), 0.0);
    }

    #[test]
    fn levenshtein_classic_cases() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn label_similarity_normalizes() {
        assert_eq!(label_similarity("  Coffee Mug ", "coffee mug"), 1.0);
        assert_eq!(label_similarity("", "mug"), 0.0);
        assert_eq!(label_similarity("   ", "   "), 0.0);
        assert_abs_diff_eq!(label_similarity("kitten", "sitting"), 1.0 - 3.0 / 7.0, epsilon = 1e-6);
        assert_eq!(optional_label_similarity(None, Some("mug")), 0.0);
    }
}
