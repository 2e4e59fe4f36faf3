//! Wire shapes for the Gemini `generateContent` call and the strict
//! validation of the food list the model sends back.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Language;
use crate::meals::model::{BoundingBox, FoodItem, ItemId};

const PROMPT_ZH: &str = "分析这张食物照片。识别所有食物项、它们的分量（例如“1杯”、“100克”、“1片”）、\
预计热量（大卡），以及它们的边界框（归一化坐标 0-1000：[ymin, xmin, ymax, xmax]）。\
请务必使用中文返回食物名称和分量。返回格式严格遵循 JSON。";

const PROMPT_EN: &str = "Analyze this food photo. Identify every food item, its portion \
(for example \"1 cup\", \"100 g\", \"1 slice\"), its estimated energy in kilocalories, and its \
bounding box in normalized 0-1000 coordinates [ymin, xmin, ymax, xmax]. Return names and \
portions in English. Respond strictly in JSON.";

pub fn prompt(language: Language) -> &'static str {
    match language {
        Language::Zh => PROMPT_ZH,
        Language::En => PROMPT_EN,
    }
}

/// Structured-output schema the model is asked to follow.
pub fn response_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "name": { "type": "STRING", "description": "food name" },
                "portion": { "type": "STRING", "description": "portion description" },
                "calories": { "type": "NUMBER", "description": "energy in kcal" },
                "boundingBox": {
                    "type": "OBJECT",
                    "properties": {
                        "ymin": { "type": "NUMBER" },
                        "xmin": { "type": "NUMBER" },
                        "ymax": { "type": "NUMBER" },
                        "xmax": { "type": "NUMBER" }
                    },
                    "required": ["ymin", "xmin", "ymax", "xmax"]
                }
            },
            "required": ["name", "portion", "calories", "boundingBox"]
        }
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

impl<'a> GenerateContentRequest<'a> {
    pub fn new(image_b64: &'a str, mime_type: &'a str, language: Language) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type,
                            data: image_b64,
                        },
                    },
                    Part::Text {
                        text: prompt(language),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if there is any.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawBox {
    ymin: f64,
    xmin: f64,
    ymax: f64,
    xmax: f64,
}

#[derive(Debug, Deserialize)]
struct RawFoodItem {
    name: String,
    portion: String,
    calories: f64,
    #[serde(rename = "boundingBox")]
    bounding_box: RawBox,
}

/// Parses the model's JSON text into food items with fresh local ids.
///
/// Every entry must carry all four fields with the right types and a finite,
/// non-negative calorie value; otherwise the whole response is rejected.
pub fn parse_items(text: &str) -> Result<Vec<FoodItem>, String> {
    let raw: Vec<RawFoodItem> =
        serde_json::from_str(text).map_err(|e| format!("response does not match schema: {e}"))?;

    raw.into_iter()
        .enumerate()
        .map(|(idx, r)| {
            if !r.calories.is_finite() || r.calories < 0.0 {
                return Err(format!("item {idx} has invalid calories {}", r.calories));
            }
            let bounding_box = BoundingBox {
                ymin: r.bounding_box.ymin,
                xmin: r.bounding_box.xmin,
                ymax: r.bounding_box.ymax,
                xmax: r.bounding_box.xmax,
            };
            if !bounding_box.is_well_formed() {
                tracing::warn!(item = idx, name = %r.name, ?bounding_box, "malformed bounding box");
            }
            Ok(FoodItem {
                id: ItemId::generate(),
                name: r.name,
                portion: r.portion,
                calories: r.calories,
                bounding_box,
            })
        })
        .collect()
}
