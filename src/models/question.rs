use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SUPPORTED_LANGUAGE_IDS: [i64; 3] = [1, 2, 3];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Question {
    pub id: String,
    pub question_id: Option<i64>,
    pub active: bool,
    pub category_id: Option<i64>,
    pub translations: Vec<Translation>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Translation {
    pub language_id: i64,
    pub question: String,
    pub answer: String,
}

// Raw translation entry as submitted; language_id may arrive as a number
// or a numeric string, so validation owns the coercion.
#[derive(Debug, Deserialize, Clone)]
pub struct TranslationInput {
    pub language_id: Option<Value>,
    pub question: Option<String>,
    pub answer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuestionInput {
    pub question_id: Option<i64>,
    pub active: Option<bool>,
    pub category_id: Option<i64>,
    pub translations: Option<Vec<TranslationInput>>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub active: Option<bool>,
}
