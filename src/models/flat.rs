use serde::{Deserialize, Serialize};

pub const SUPPORTED_CURRENCIES: [&str; 3] = ["GEL", "USD", "EUR"];
pub const DEFAULT_CURRENCY: &str = "GEL";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Flat {
    pub id: String,
    pub square: f64,
    pub price: f64,
    pub currency: String,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub images: Vec<FlatImage>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FlatImage {
    pub id: String,
    pub url: String,
    pub filename: String,
    pub size: i64,
    pub content_type: String,
    // 'local' or 'remote'; fixed at creation, selects the deletion path
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_url: Option<String>,
    pub created_at: String,
}
