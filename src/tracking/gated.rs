use crate::tracking::{ConfirmedItem, Detection, ItemCategory, Thumbnail};

/// A value that only yields to observations at least as confident as the one
/// that produced it.
///
/// Candidates, tracked objects and aggregated items all keep their displayed
/// category/label this way, so the shown value always comes from the most
/// confident sighting rather than the latest one.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceGated<T> {
    value: T,
    confidence: f32,
}

impl<T> ConfidenceGated<T> {
    #[inline]
    pub fn new(value: T, confidence: f32) -> Self {
        Self { value, confidence }
    }

    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    #[inline]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Replaces the value when `confidence >= self.confidence()`.
    /// Returns whether the replacement happened.
    pub fn update(&mut self, value: T, confidence: f32) -> bool {
        if confidence >= self.confidence {
            self.value = value;
            self.confidence = confidence;
            true
        } else {
            false
        }
    }
}

/// Category, label and thumbnail taken together from one sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub category: ItemCategory,
    pub label: Option<String>,
    pub thumbnail: Option<Thumbnail>,
}

impl<'a> From<&'a Detection> for Sighting {
    fn from(detection: &'a Detection) -> Self {
        Self {
            category: detection.category,
            label: detection.label.clone(),
            thumbnail: detection.thumbnail.clone(),
        }
    }
}

impl<'a> From<&'a ConfirmedItem> for Sighting {
    fn from(item: &'a ConfirmedItem) -> Self {
        Self {
            category: item.category,
            label: item.label.clone(),
            thumbnail: item.thumbnail.clone(),
        }
    }
}

impl ConfidenceGated<Sighting> {
    /// Adopts `next` when `confidence` reaches the running maximum.
    ///
    /// The category always follows the accepted sighting; a missing label or
    /// thumbnail keeps the previous one. Nothing changes below the maximum.
    pub fn update_sighting(&mut self, next: Sighting, confidence: f32) -> bool {
        if confidence < self.confidence {
            return false;
        }

        let label = next.label.or_else(|| self.value.label.take());
        let thumbnail = next.thumbnail.or_else(|| self.value.thumbnail.take());

        self.update(
            Sighting {
                category: next.category,
                label,
                thumbnail,
            },
            confidence,
        )
    }

    #[inline]
    pub fn category(&self) -> ItemCategory {
        self.value.category
    }

    #[inline]
    pub fn label(&self) -> Option<&str> {
        self.value.label.as_deref()
    }

    #[inline]
    pub fn thumbnail(&self) -> Option<&Thumbnail> {
        self.value.thumbnail.as_ref()
    }
}
