use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Product {
    pub id: String,
    pub name: Option<String>,
    pub price: f64,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductInput {
    pub name: Option<String>,
    pub price: Option<f64>,
}
