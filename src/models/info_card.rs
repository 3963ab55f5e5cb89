use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InfoCard {
    pub id: String,
    pub info_card_id: i64,
    pub active: bool,
    pub image: Option<String>,
    pub category_ids: Vec<i64>,
    pub details: Vec<InfoCardDetail>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InfoCardDetail {
    pub language_id: i64,
    pub title: String,
    pub subtitle: Option<String>,
    pub active: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfoCardDetailInput {
    pub language_id: Option<Value>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct InfoCardInput {
    pub info_card_id: Option<i64>,
    pub active: Option<bool>,
    pub image: Option<String>,
    pub category_ids: Option<Vec<i64>>,
    pub details: Option<Vec<InfoCardDetailInput>>,
}
