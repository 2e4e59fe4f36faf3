use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Normalized rectangle on a 0..=1000 grid over the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub ymin: f64,
    pub xmin: f64,
    pub ymax: f64,
    pub xmax: f64,
}

impl BoundingBox {
    pub const SCALE: f64 = 1000.0;

    /// Whether the box respects `0 <= min < max <= 1000` on both axes.
    /// Out-of-range boxes are kept untouched; this is only a quality signal.
    pub fn is_well_formed(&self) -> bool {
        let axis_ok = |lo: f64, hi: f64| {
            lo.is_finite() && hi.is_finite() && 0.0 <= lo && lo < hi && hi <= Self::SCALE
        };
        axis_ok(self.xmin, self.xmax) && axis_ok(self.ymin, self.ymax)
    }
}

/// Opaque meal identifier. New meals get a UUID; older histories may carry
/// ids such as `meal-1760000000000`, which are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MealId(String);

impl MealId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
impl From<&str> for MealId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for MealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque food item identifier, unique within its meal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
impl From<&str> for ItemId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub id: ItemId,
    pub name: String,
    pub portion: String,
    pub calories: f64,
    pub bounding_box: BoundingBox,
}

/// One confirmed meal. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealRecord {
    id: MealId,
    #[serde(with = "time::serde::timestamp::milliseconds")]
    timestamp: OffsetDateTime,
    /// Base64 of the captured photo, exactly as it was uploaded.
    image: String,
    #[serde(default)]
    content_type: Option<String>,
    items: Vec<FoodItem>,
    total_calories: f64,
}

impl MealRecord {
    pub fn new(
        image: String,
        content_type: Option<String>,
        items: Vec<FoodItem>,
        timestamp: OffsetDateTime,
    ) -> Self {
        let total_calories = items.iter().map(|i| i.calories).sum();
        Self {
            id: MealId::generate(),
            timestamp,
            image,
            content_type,
            items,
            total_calories,
        }
    }

    pub fn id(&self) -> &MealId {
        &self.id
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or("image/jpeg")
    }

    pub fn items(&self) -> &[FoodItem] {
        &self.items
    }

    pub fn total_calories(&self) -> f64 {
        self.total_calories
    }
}

/// Snapshot of every meal, newest first.
///
/// Cloning is cheap and a snapshot never changes: `prepend` and `without`
/// return new values and leave `self` as it was.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History(Arc<Vec<MealRecord>>);

impl History {
    pub fn new(records: Vec<MealRecord>) -> Self {
        Self(Arc::new(records))
    }

    pub fn records(&self) -> &[MealRecord] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: &MealId) -> Option<&MealRecord> {
        self.0.iter().find(|r| &r.id == id)
    }

    pub fn contains(&self, id: &MealId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn prepend(&self, record: MealRecord) -> Self {
        let mut next = Vec::with_capacity(self.0.len() + 1);
        next.push(record);
        next.extend(self.0.iter().cloned());
        Self::new(next)
    }

    pub(crate) fn without(&self, id: &MealId) -> Self {
        Self::new(self.0.iter().filter(|r| &r.id != id).cloned().collect())
    }

    /// First id that occurs more than once, if any.
    pub(crate) fn duplicate_id(&self) -> Option<&MealId> {
        let mut seen = HashSet::with_capacity(self.0.len());
        self.0.iter().map(|r| &r.id).find(|id| !seen.insert(*id))
    }
}

impl Serialize for History {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for History {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<MealRecord>::deserialize(deserializer).map(Self::new)
    }
}
