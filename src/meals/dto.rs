use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::model::{FoodItem, MealId, MealRecord};
use super::stats::{DailyTotal, TodayProgress};

#[derive(Debug, Serialize)]
pub struct MealListItem {
    pub id: MealId,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub total_calories: f64,
    pub item_names: Vec<String>,
    pub photo_url: String,
}

#[derive(Debug, Serialize)]
pub struct MealListResponse {
    pub total: usize,
    pub meals: Vec<MealListItem>,
}

#[derive(Debug, Serialize)]
pub struct MealDetails {
    pub id: MealId,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub total_calories: f64,
    pub items: Vec<FoodItem>,
    pub photo_url: String,
}

fn photo_url(id: &MealId) -> String {
    format!("/api/v1/meals/{id}/photo")
}

impl From<&MealRecord> for MealListItem {
    fn from(m: &MealRecord) -> Self {
        Self {
            id: m.id().clone(),
            timestamp: m.timestamp(),
            total_calories: m.total_calories(),
            item_names: m.items().iter().map(|i| i.name.clone()).collect(),
            photo_url: photo_url(m.id()),
        }
    }
}

impl From<&MealRecord> for MealDetails {
    fn from(m: &MealRecord) -> Self {
        Self {
            id: m.id().clone(),
            timestamp: m.timestamp(),
            total_calories: m.total_calories(),
            items: m.items().to_vec(),
            photo_url: photo_url(m.id()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}
fn default_limit() -> usize { 20 }

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    #[serde(default = "default_days")]
    pub days: usize,
}
fn default_days() -> usize { 7 }

#[derive(Debug, Serialize)]
pub struct TrendResponse {
    pub days: Vec<DailyTotal>,
    pub average: f64,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub today: TodayProgress,
    pub week: Vec<DailyTotal>,
    pub weekly_average: f64,
    pub meal_count: usize,
}
