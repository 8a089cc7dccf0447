use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Hall {
    pub id: i64,
    pub name: String,
    pub capacity: i32,
}
